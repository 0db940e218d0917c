//! The fixed line grammar of the process listing.
//!
//! The program prints one block per process:
//!
//! ```text
//! Process 3:
//!   send Value to process 7,
//!   send Value to process 9,
//!   [A,B,C,D] <- receive(4),
//!   X <- (A + B + C + D + 2) / 4,
//!   Value <- 2 * X / 64 + 5.
//! ```
//!
//! Each shape is matched structurally, in the order of [`classify`].

/// Indentation of every line inside a block.
pub const INDENT: &str = "  ";

/// Multiplier implied when the rate line has no `<m> *` clause.
pub const DEFAULT_MULTIPLIER: &str = "1";

/// Additive constant implied when the rate line has no `+ <c>` clause.
pub const DEFAULT_ADDITIVE: &str = "0";

/// A recognized line and the numbers it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineShape<'a> {
    /// `Process <n>:`
    Header(&'a str),
    /// `  send Value to process <n>,`
    Send(&'a str),
    /// `  Value <- [<m> * ]X / 64[ + <c>].`, defaults already filled in
    Rate { multiplier: &'a str, additive: &'a str },
    /// `  [A,B,C,D] <- receive(4),`
    Receive,
    /// `  X <- (A + B + C + D + 2) / 4,`
    Average,
}

impl<'a> LineShape<'a> {
    /// Captured tokens in record order.
    pub fn tokens(&self) -> Vec<&'a str> {
        match *self {
            LineShape::Header(n) | LineShape::Send(n) => vec![n],
            LineShape::Rate { multiplier, additive } => vec![multiplier, additive],
            LineShape::Receive | LineShape::Average => Vec::new(),
        }
    }
}

/// Match `line` against the five shapes, first match wins.
pub fn classify(line: &str) -> Option<LineShape<'_>> {
    let matchers: [fn(&str) -> Option<LineShape<'_>>; 5] = [
        header,
        send,
        rate,
        receive,
        average,
    ];
    matchers.iter().find_map(|matcher| matcher(line))
}

/// True when a line uses the block indentation.
pub fn is_indented(line: &str) -> bool {
    line.starts_with(INDENT)
}

fn header(line: &str) -> Option<LineShape<'_>> {
    let mut s = Scanner::new(line);
    s.literal("Process ")?;
    let n = s.digits()?;
    s.literal(":")?;
    s.end()?;
    Some(LineShape::Header(n))
}

fn send(line: &str) -> Option<LineShape<'_>> {
    let mut s = Scanner::new(line);
    s.literal(INDENT)?;
    s.literal("send Value to process ")?;
    let n = s.digits()?;
    s.literal(",")?;
    s.end()?;
    Some(LineShape::Send(n))
}

/// The rate line. The indentation is optional here, and anything between
/// `/ 64` and the additive constant is skipped.
fn rate(line: &str) -> Option<LineShape<'_>> {
    let mut s = Scanner::new(line);
    let _ = s.literal(INDENT);
    s.literal("Value <- ")?;

    let mut multiplier = None;
    let mut ahead = s;
    if let Some(m) = ahead.number_run() {
        if ahead.literal(" * ").is_some() {
            multiplier = Some(m);
            s = ahead;
        }
    }

    s.upper()?;
    s.literal(" / 64")?;

    let tail = s.rest.strip_suffix('.')?;
    let tail = tail.trim_start_matches(|c: char| !is_number_char(c));
    let additive = if tail.is_empty() {
        None
    } else if tail.chars().all(is_number_char) {
        Some(tail)
    } else {
        return None;
    };

    Some(LineShape::Rate {
        multiplier: multiplier.unwrap_or(DEFAULT_MULTIPLIER),
        additive: additive.unwrap_or(DEFAULT_ADDITIVE),
    })
}

fn receive(line: &str) -> Option<LineShape<'_>> {
    let mut s = Scanner::new(line);
    s.literal(INDENT)?;
    s.literal("[")?;
    s.upper()?;
    for _ in 0..3 {
        s.literal(",")?;
        s.upper()?;
    }
    s.literal("] <- receive(4),")?;
    s.end()?;
    Some(LineShape::Receive)
}

fn average(line: &str) -> Option<LineShape<'_>> {
    let mut s = Scanner::new(line);
    s.literal(INDENT)?;
    s.upper()?;
    s.literal(" <- (")?;
    for _ in 0..4 {
        s.upper()?;
        s.literal(" + ")?;
    }
    s.literal("2) / 4,")?;
    s.end()?;
    Some(LineShape::Average)
}

fn is_number_char(c: char) -> bool {
    c == '-' || c.is_ascii_digit()
}

/// Forward-only cursor over a line.
#[derive(Debug, Clone, Copy)]
struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    fn literal(&mut self, lit: &str) -> Option<()> {
        self.rest = self.rest.strip_prefix(lit)?;
        Some(())
    }

    fn upper(&mut self) -> Option<char> {
        let c = self.rest.chars().next().filter(char::is_ascii_uppercase)?;
        self.rest = &self.rest[1..];
        Some(c)
    }

    /// One or more ASCII digits.
    fn digits(&mut self) -> Option<&'a str> {
        self.take_while(|c| c.is_ascii_digit())
    }

    /// One or more digits or minus signs; validated later.
    fn number_run(&mut self) -> Option<&'a str> {
        self.take_while(is_number_char)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> Option<&'a str> {
        let len = self.rest.find(|c: char| !pred(c)).unwrap_or(self.rest.len());
        if len == 0 {
            return None;
        }
        let (taken, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some(taken)
    }

    fn end(&self) -> Option<()> {
        self.rest.is_empty().then_some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header() {
        assert_eq!(classify("Process 3:"), Some(LineShape::Header("3")));
        assert_eq!(classify("Process 1048575:"), Some(LineShape::Header("1048575")));
        assert_eq!(classify("Process 3: "), None);
        assert_eq!(classify("Process :"), None);
        assert_eq!(classify("  Process 3:"), None);
    }

    #[test]
    fn test_send() {
        assert_eq!(classify("  send Value to process 7,"), Some(LineShape::Send("7")));
        assert_eq!(classify("send Value to process 7,"), None);
        assert_eq!(classify("  send Value to process -7,"), None);
        assert_eq!(classify("  send Value to process 7"), None);
    }

    #[test]
    fn test_rate_full() {
        assert_eq!(
            classify("  Value <- 2 * X / 64 + 5."),
            Some(LineShape::Rate { multiplier: "2", additive: "5" })
        );
        assert_eq!(
            classify("  Value <- -3 * Q / 64 + -12."),
            Some(LineShape::Rate { multiplier: "-3", additive: "-12" })
        );
    }

    #[test]
    fn test_rate_defaults() {
        assert_eq!(
            classify("  Value <- X / 64."),
            Some(LineShape::Rate { multiplier: "1", additive: "0" })
        );
        assert_eq!(
            classify("Value <- X / 64."),
            Some(LineShape::Rate { multiplier: "1", additive: "0" })
        );
        assert_eq!(
            classify("  Value <- 7 * X / 64."),
            Some(LineShape::Rate { multiplier: "7", additive: "0" })
        );
        assert_eq!(
            classify("  Value <- X / 64 + 9."),
            Some(LineShape::Rate { multiplier: "1", additive: "9" })
        );
    }

    #[test]
    fn test_rate_keeps_suspicious_runs_for_validation() {
        assert_eq!(
            classify("  Value <- 1-2 * X / 64 + 5."),
            Some(LineShape::Rate { multiplier: "1-2", additive: "5" })
        );
    }

    #[test]
    fn test_rate_rejects() {
        assert_eq!(classify("  Value <- X / 32."), None);
        assert_eq!(classify("  Value <- x / 64."), None);
        assert_eq!(classify("  Value <- X / 64 + 5"), None);
        assert_eq!(classify("  Value <- X / 64 + 5a."), None);
    }

    #[test]
    fn test_confirmation_lines() {
        assert_eq!(classify("  [A,B,C,D] <- receive(4),"), Some(LineShape::Receive));
        assert_eq!(classify("  X <- (A + B + C + D + 2) / 4,"), Some(LineShape::Average));
        assert_eq!(classify("  [A,B,C] <- receive(4),"), None);
        assert_eq!(classify("  X <- (A + B + C + D + 3) / 4,"), None);
    }

    #[test]
    fn test_tokens() {
        assert_eq!(LineShape::Header("3").tokens(), vec!["3"]);
        assert_eq!(
            LineShape::Rate { multiplier: "1", additive: "0" }.tokens(),
            vec!["1", "0"]
        );
        assert!(LineShape::Receive.tokens().is_empty());
    }

    #[test]
    fn test_indentation() {
        assert!(is_indented("  anything"));
        assert!(!is_indented(" one space"));
        assert!(!is_indented("Process 1:"));
    }
}
