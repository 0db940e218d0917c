//! The record format read by the downstream population simulation.
//!
//! Each decoded line is `<id>\t<neighbor>*\t<multiplier>\t<additive>`. The
//! simulation sends every value to the listed neighbors and then waits for
//! exactly four inbound values per process, so a usable population has a
//! fan-in of four everywhere.

use crate::trace::decoder::TraceRecord;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Inbound values each process waits for per round.
pub const FAN_IN: usize = 4;

/// One process of the population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: u32,
    pub neighbors: Vec<u32>,
    pub multiplier: i64,
    pub additive: i64,
}

impl EntityRecord {
    /// Build from tokens in record order.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, RecordError> {
        if tokens.len() < 3 {
            return Err(RecordError::TooFewFields(tokens.len()));
        }
        let last = tokens.len() - 1;

        let id = parse_field(tokens[0].as_ref())?;
        let neighbors = tokens[1..last - 1]
            .iter()
            .map(|t| parse_field(t.as_ref()))
            .collect::<Result<Vec<u32>, _>>()?;
        let multiplier = parse_field(tokens[last - 1].as_ref())?;
        let additive = parse_field(tokens[last].as_ref())?;

        Ok(Self { id, neighbors, multiplier, additive })
    }
}

impl FromStr for EntityRecord {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        Self::from_tokens(&tokens)
    }
}

impl TryFrom<&TraceRecord> for EntityRecord {
    type Error = RecordError;

    fn try_from(record: &TraceRecord) -> Result<Self, Self::Error> {
        Self::from_tokens(record.tokens())
    }
}

fn parse_field<T: FromStr>(token: &str) -> Result<T, RecordError> {
    token
        .parse()
        .map_err(|_| RecordError::BadField(token.to_string()))
}

/// Read a decoded record stream, one record per non-empty line.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<EntityRecord>, RecordError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RecordError::IoError(e.to_string()))?;
        if line.is_empty() {
            continue;
        }
        let record = line.parse().map_err(|e| RecordError::AtLine {
            line: index + 1,
            source: Box::new(e),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// A process whose inbound count differs from the expected fan-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanInMismatch {
    pub id: u32,
    pub inbound: usize,
}

/// Count inbound edges for every process and report those that differ from
/// `expected`, ordered by id. Edges to ids outside the population count
/// against those ids too.
pub fn check_fan_in(records: &[EntityRecord], expected: usize) -> Vec<FanInMismatch> {
    let mut inbound: BTreeMap<u32, usize> = records.iter().map(|r| (r.id, 0)).collect();
    for record in records {
        for &neighbor in &record.neighbors {
            *inbound.entry(neighbor).or_insert(0) += 1;
        }
    }

    inbound
        .into_iter()
        .filter(|&(_, count)| count != expected)
        .map(|(id, inbound)| FanInMismatch { id, inbound })
        .collect()
}

/// Errors in a decoded record stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has {0} fields, need at least 3")]
    TooFewFields(usize),

    #[error("bad field {0:?}")]
    BadField(String),

    #[error("line {line}: {source}")]
    AtLine { line: usize, source: Box<RecordError> },

    #[error("I/O error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let record: EntityRecord = "3\t7\t9\t2\t5".parse().unwrap();
        assert_eq!(
            record,
            EntityRecord { id: 3, neighbors: vec![7, 9], multiplier: 2, additive: 5 }
        );
    }

    #[test]
    fn test_parse_without_neighbors() {
        let record: EntityRecord = "12\t-1\t0\n".parse().unwrap();
        assert!(record.neighbors.is_empty());
        assert_eq!(record.multiplier, -1);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("1\t2".parse::<EntityRecord>(), Err(RecordError::TooFewFields(2)));
        assert_eq!(
            "1\t-2\t3\t4".parse::<EntityRecord>(),
            Err(RecordError::BadField("-2".into()))
        );
    }

    #[test]
    fn test_from_trace_record() {
        let trace: TraceRecord = ["0", "1", "2", "3", "4", "1", "0"].into_iter().collect();
        let record = EntityRecord::try_from(&trace).unwrap();
        assert_eq!(record.neighbors, vec![1, 2, 3, 4]);
        assert_eq!(record.additive, 0);
    }

    #[test]
    fn test_read_records_reports_line() {
        let input = "0\t1\t1\t0\n\n1\tx\t1\t0\n";
        let result = read_records(input.as_bytes());
        assert_eq!(
            result,
            Err(RecordError::AtLine {
                line: 3,
                source: Box::new(RecordError::BadField("x".into())),
            })
        );
    }

    #[test]
    fn test_fan_in() {
        // five processes on a ring where everyone sends to the other four
        let records: Vec<EntityRecord> = (0..5u32)
            .map(|id| EntityRecord {
                id,
                neighbors: (0..5).filter(|&n| n != id).collect(),
                multiplier: 1,
                additive: 0,
            })
            .collect();
        assert!(check_fan_in(&records, FAN_IN).is_empty());

        let mut short = records.clone();
        short[0].neighbors.retain(|&n| n != 1);
        assert_eq!(check_fan_in(&short, FAN_IN), vec![FanInMismatch { id: 1, inbound: 3 }]);
    }
}
