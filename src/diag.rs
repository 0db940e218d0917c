//! Side channel for non-fatal diagnostics.
//!
//! Both the simulator and the decoder report here. Nothing reported through a
//! sink ever stops execution.

use std::sync::Mutex;
use tracing::warn;

/// A non-fatal event worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A divide instruction at `ip` had a zero divisor; the result was forced to 0.
    DivideByZero { ip: i32 },
    /// An unindented line that matched no record shape.
    Passthrough(String),
}

/// Receiver for diagnostics, shared between the simulator and decoder threads.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::DivideByZero { ip } => {
                warn!(ip, "division by zero, result forced to 0");
            }
            Diagnostic::Passthrough(line) => {
                warn!(target: "wordvm::passthrough", "!!! {}", line);
            }
        }
    }
}

/// Keeps every diagnostic in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.report(Diagnostic::DivideByZero { ip: 40 });
        sink.report(Diagnostic::Passthrough("hello".into()));

        assert_eq!(
            sink.entries(),
            vec![
                Diagnostic::DivideByZero { ip: 40 },
                Diagnostic::Passthrough("hello".into()),
            ]
        );
    }
}
