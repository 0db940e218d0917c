//! Simple assembler for word machine programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//!         ORG 0
//!         DAT '#'             ; payload marker in word 0
//!         ORG 36
//! START:  ADD SUM, SUM, 5     ; labels are relative to this instruction
//!         JL  DONE, 0, 1      ; taken, since 0 < 1
//!         PRN 'x'
//! DONE:   PRN 'A'
//!         PRN 10 @2           ; explicit offset to the next instruction
//!         HLT
//! SUM:    DAT 3
//! ```
//!
//! Inside an instruction a label stands for its distance from the
//! instruction's own address, since every operand the machine sees is
//! ip-relative. In `DAT` a label is its absolute address. The offset field
//! defaults to the instruction length and can be overridden with `@value`.

use crate::config::DEFAULT_MEMORY_WORDS;
use crate::vm::decode::{compose, Opcode};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to memory words, starting at address 0, for a
/// machine of the default size.
pub fn assemble(source: &str) -> Result<Vec<i32>, AssemblerError> {
    assemble_for(source, DEFAULT_MEMORY_WORDS)
}

/// Assemble for a memory of `capacity` words. Nothing may be placed at or
/// past `capacity`.
pub fn assemble_for(source: &str, capacity: usize) -> Result<Vec<i32>, AssemblerError> {
    let mut asm = Assembler::new(capacity);
    asm.assemble(source)
}

/// One parsed source line.
#[derive(Debug)]
enum Item<'a> {
    Org(&'a str),
    Data(Vec<&'a str>),
    Instr { opcode: Opcode, operands: Vec<&'a str>, offset: Option<&'a str> },
}

impl Item<'_> {
    fn size(&self) -> usize {
        match self {
            Item::Org(_) => 0,
            Item::Data(values) => values.len(),
            Item::Instr { opcode, .. } => 1 + opcode.operand_count(),
        }
    }
}

/// The assembler state.
struct Assembler {
    /// Current address (origin).
    current_addr: usize,
    /// Symbol table (label -> address).
    symbols: HashMap<String, usize>,
    /// Output words.
    output: Vec<i32>,
    /// Memory size of the target machine.
    capacity: usize,
}

impl Assembler {
    fn new(capacity: usize) -> Self {
        Self {
            current_addr: 0,
            symbols: HashMap::new(),
            output: Vec::new(),
            capacity,
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<i32>, AssemblerError> {
        let mut items = Vec::new();

        // Pass 1: parse and collect labels
        for (line_num, line) in source.lines().enumerate() {
            let line_num = line_num + 1;
            let (label, item) = parse_line(line, line_num)?;
            if let Some(label) = label {
                if self.symbols.insert(label.clone(), self.current_addr).is_some() {
                    return Err(AssemblerError::DuplicateLabel { line: line_num, label });
                }
            }
            match item {
                Some(Item::Org(value)) => {
                    self.current_addr = self.origin(value, line_num)?;
                    items.push((line_num, Item::Org(value)));
                }
                Some(item) => {
                    self.current_addr += item.size();
                    items.push((line_num, item));
                }
                None => {}
            }
            if self.current_addr > self.capacity {
                return Err(AssemblerError::ProgramTooLarge {
                    line: line_num,
                    end: self.current_addr,
                    capacity: self.capacity,
                });
            }
        }

        // Pass 2: emit, with every label known
        self.current_addr = 0;
        for (line_num, item) in &items {
            self.emit_item(item, *line_num)?;
        }

        Ok(std::mem::take(&mut self.output))
    }

    fn origin(&self, value: &str, line_num: usize) -> Result<usize, AssemblerError> {
        let addr = self.value(value, 0, line_num)?;
        usize::try_from(addr).map_err(|_| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("ORG address {} is negative", addr),
        })
    }

    fn emit_item(&mut self, item: &Item<'_>, line_num: usize) -> Result<(), AssemblerError> {
        match item {
            Item::Org(value) => {
                self.current_addr = self.origin(value, line_num)?;
            }
            Item::Data(values) => {
                for value in values {
                    let word = self.value(value, 0, line_num)?;
                    self.emit(word);
                }
            }
            Item::Instr { opcode, operands, offset } => {
                let here = self.current_addr as i64;
                if operands.len() != opcode.operand_count() {
                    return Err(AssemblerError::OperandCount {
                        line: line_num,
                        mnemonic: opcode.mnemonic().to_uppercase(),
                        expected: opcode.operand_count(),
                        found: operands.len(),
                    });
                }

                let offset = match offset {
                    Some(text) => self.value(text, here, line_num)?,
                    None => item.size() as i32,
                };
                if !(i32::from(i16::MIN)..=i32::from(i16::MAX)).contains(&offset) {
                    return Err(AssemblerError::OffsetOutOfRange { line: line_num, offset });
                }

                let words = operands
                    .iter()
                    .map(|operand| self.value(operand, here, line_num))
                    .collect::<Result<Vec<_>, _>>()?;

                self.emit(compose(opcode.raw(), offset));
                for word in words {
                    self.emit(word);
                }
            }
        }
        Ok(())
    }

    /// Evaluate an operand. Labels resolve to `address - base`.
    fn value(&self, text: &str, base: i64, line_num: usize) -> Result<i32, AssemblerError> {
        if let Some(value) = parse_literal(text) {
            return value.ok_or_else(|| AssemblerError::SyntaxError {
                line: line_num,
                message: format!("bad literal {}", text),
            });
        }
        let addr = self.symbols.get(&text.to_uppercase()).ok_or_else(|| {
            AssemblerError::UndefinedLabel { line: line_num, label: text.to_uppercase() }
        })?;
        let delta = *addr as i64 - base;
        i32::try_from(delta).map_err(|_| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("label {} too far away", text),
        })
    }

    fn emit(&mut self, word: i32) {
        if self.output.len() <= self.current_addr {
            self.output.resize(self.current_addr + 1, 0);
        }
        self.output[self.current_addr] = word;
        self.current_addr += 1;
    }
}

/// Split a line into an optional label and an optional item.
fn parse_line(line: &str, line_num: usize) -> Result<(Option<String>, Option<Item<'_>>), AssemblerError> {
    let mut line = strip_comment(line).trim();
    if line.is_empty() {
        return Ok((None, None));
    }

    let mut label = None;
    if let Some(colon_idx) = line.find(':') {
        let name = line[..colon_idx].trim();
        if is_label(name) {
            label = Some(name.to_uppercase());
            line = line[colon_idx + 1..].trim();
        }
    }
    if line.is_empty() {
        return Ok((label, None));
    }

    let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
        Some((m, rest)) => (m, rest.trim()),
        None => (line, ""),
    };
    let (rest, offset) = match unquoted(rest, '@').next() {
        Some(idx) => (rest[..idx].trim(), Some(rest[idx + 1..].trim())),
        None => (rest, None),
    };
    let operands: Vec<&str> = if rest.is_empty() {
        Vec::new()
    } else {
        let mut operands = Vec::new();
        let mut start = 0;
        for idx in unquoted(rest, ',') {
            operands.push(rest[start..idx].trim());
            start = idx + 1;
        }
        operands.push(rest[start..].trim());
        operands
    };
    if operands.iter().any(|o| o.is_empty()) {
        return Err(AssemblerError::SyntaxError {
            line: line_num,
            message: "empty operand".into(),
        });
    }

    let item = match mnemonic.to_uppercase().as_str() {
        "ORG" => match operands.as_slice() {
            [addr] => Item::Org(addr),
            _ => {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: "ORG requires one address".into(),
                })
            }
        },
        "DAT" | "DATA" => {
            if operands.is_empty() {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: "DAT requires a value".into(),
                });
            }
            Item::Data(operands)
        }
        other => {
            let opcode = Opcode::from_mnemonic(other).ok_or_else(|| AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: other.to_string(),
            })?;
            Item::Instr { opcode, operands, offset }
        }
    };

    Ok((label, Some(item)))
}

/// Byte positions of `sep` outside character literals.
fn unquoted(text: &str, sep: char) -> impl Iterator<Item = usize> + '_ {
    let mut quoted = false;
    text.char_indices().filter_map(move |(idx, c)| {
        if c == '\'' {
            quoted = !quoted;
        }
        (c == sep && !quoted).then_some(idx)
    })
}

/// Drop everything from the first `;` that is not inside a character literal.
fn strip_comment(line: &str) -> &str {
    match unquoted(line, ';').next() {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn is_label(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `Some(Some(v))` for a good literal, `Some(None)` for a malformed one,
/// `None` when the text is not a literal at all (a label).
fn parse_literal(text: &str) -> Option<Option<i32>> {
    if let Some(inner) = text.strip_prefix('\'') {
        let inner = inner.strip_suffix('\'')?;
        let mut chars = inner.chars();
        return Some(match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => Some(c as i32),
            _ => None,
        });
    }

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(i64::from),
        None => digits.parse::<i64>().ok(),
    };
    Some(magnitude.and_then(|m| {
        let value = if negative { -m } else { m };
        // hex words may use the full 32 bits
        i32::try_from(value).ok().or_else(|| u32::try_from(value).ok().map(|v| v as i32))
    }))
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic '{mnemonic}' on line {line}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label '{label}' on line {line}")]
    UndefinedLabel { line: usize, label: String },

    #[error("label '{label}' defined twice (line {line})")]
    DuplicateLabel { line: usize, label: String },

    #[error("{mnemonic} takes {expected} operands, found {found} (line {line})")]
    OperandCount { line: usize, mnemonic: String, expected: usize, found: usize },

    #[error("offset {offset} does not fit in 16 bits (line {line})")]
    OffsetOutOfRange { line: usize, offset: i32 },

    #[error("program reaches word {end}, memory holds {capacity} (line {line})")]
    ProgramTooLarge { line: usize, end: usize, capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::decode::{decode, Instruction};

    #[test]
    fn test_assemble_halt() {
        assert_eq!(assemble("HLT").unwrap(), vec![compose(0, 1)]);
    }

    #[test]
    fn test_default_offset_is_length() {
        let words = assemble("add 20, 21, 5\nnot 3, 4\nprn 10").unwrap();
        assert_eq!(
            words,
            vec![
                compose(1, 4), 20, 21, 5,
                compose(9, 3), 3, 4,
                compose(11, 2), 10,
            ]
        );
    }

    #[test]
    fn test_org_and_data() {
        let words = assemble("ORG 0\nDAT '#', -1, 0x7fffffff\nORG 5\nDAT 0xFFFFFFFF").unwrap();
        assert_eq!(words, vec![35, -1, i32::MAX, 0, 0, -1]);
    }

    #[test]
    fn test_labels_are_relative_in_instructions() {
        let source = "
            ORG 10
        TOP:    PRN 'x'
                JL TOP, 0, 1
                ADD VAL, VAL, 1 @-6
        VAL:    DAT 7
                DAT VAL
        ";
        let words = assemble(source).unwrap();

        // jl at 12 jumps back to 10
        assert_eq!(decode(words[12]), Instruction { opcode: Opcode::Jl, offset: 4 });
        assert_eq!(words[13], -2);
        // add at 16, VAL at 20
        assert_eq!(decode(words[16]), Instruction { opcode: Opcode::Add, offset: -6 });
        assert_eq!(&words[17..20], &[4, 4, 1]);
        assert_eq!(words[20], 7);
        // absolute in DAT
        assert_eq!(words[21], 20);
    }

    #[test]
    fn test_forward_label_offset() {
        let words = assemble("PRN 'a' @END\nPRN 'b'\nEND: HLT").unwrap();
        assert_eq!(decode(words[0]).offset, 4);
    }

    #[test]
    fn test_quoted_semicolon() {
        let words = assemble("PRN ';' ; prints a semicolon").unwrap();
        assert_eq!(words, vec![compose(11, 2), ';' as i32]);
    }

    #[test]
    fn test_separators_inside_literals() {
        let words = assemble("DAT ',', '@'\nPRN ',' @2").unwrap();
        assert_eq!(words, vec![',' as i32, '@' as i32, compose(11, 2), ',' as i32]);
    }

    #[test]
    fn test_program_must_fit_memory() {
        assert_eq!(
            assemble_for("ORG 0x7fffffff\nDAT 1", 64),
            Err(AssemblerError::ProgramTooLarge { line: 1, end: 0x7fff_ffff, capacity: 64 })
        );
        // ADD fills 60..64 exactly; HLT would be word 64
        assert_eq!(assemble_for("ORG 60\nADD 1, 2, 3", 64).unwrap().len(), 64);
        assert_eq!(
            assemble_for("ORG 60\nADD 1, 2, 3\nHLT", 64),
            Err(AssemblerError::ProgramTooLarge { line: 3, end: 65, capacity: 64 })
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            assemble("MOV 1, 2"),
            Err(AssemblerError::UnknownMnemonic { line: 1, .. })
        ));
        assert!(matches!(
            assemble("\nJL NOWHERE, 0, 1"),
            Err(AssemblerError::UndefinedLabel { line: 2, .. })
        ));
        assert!(matches!(
            assemble("ADD 1, 2"),
            Err(AssemblerError::OperandCount { expected: 3, found: 2, .. })
        ));
        assert!(matches!(
            assemble("A: HLT\nA: HLT"),
            Err(AssemblerError::DuplicateLabel { line: 2, .. })
        ));
        assert!(matches!(
            assemble("PRN 1 @40000"),
            Err(AssemblerError::OffsetOutOfRange { offset: 40000, .. })
        ));
        assert!(matches!(
            assemble("DAT 99999999999"),
            Err(AssemblerError::SyntaxError { .. })
        ));
    }
}
