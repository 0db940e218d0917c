//! Simulator and decoder running side by side.
//!
//! The machine runs on its own thread and hands each finished line over a
//! zero-capacity channel, so it can never get ahead of the decoder by more
//! than one line. The decoder runs on the calling thread.

use crate::diag::DiagnosticSink;
use crate::trace::decoder::{decode_stream, TraceError};
use crate::vm::execute::{EmittedLine, Halt, Machine, VmError};
use std::io::Write;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub halt: Halt,
    pub records: u64,
}

/// Run `machine` to completion and write decoded records to `out`.
pub fn run<W: Write>(
    machine: Machine,
    diag: Arc<dyn DiagnosticSink>,
    out: &mut W,
) -> Result<RunSummary, PipelineError> {
    let (tx, rx) = mpsc::sync_channel::<EmittedLine>(0);

    let vm_diag = Arc::clone(&diag);
    let simulator = thread::Builder::new()
        .name("simulator".into())
        .spawn(move || {
            let mut machine = machine;
            let mut tx = tx;
            // `tx` drops on return, which ends the decoder's stream
            machine.run(&mut tx, vm_diag.as_ref())
        })
        .map_err(|e| PipelineError::Spawn(e.to_string()))?;
    debug!("simulator thread started");

    // On failure the receiver is already gone. The simulator stops at its
    // next line, or never if it stops printing, so it is not joined.
    let records = decode_stream(rx, out, diag.as_ref())?;

    // The stream only ends once the simulator has dropped its sender.
    let halt = simulator.join().map_err(|_| PipelineError::SimulatorPanicked)??;

    info!(records, cycles = halt.cycles, "run complete");
    Ok(RunSummary { halt, records })
}

/// Run `machine` to completion and return its raw lines, without decoding.
pub fn run_raw<W: Write>(
    machine: Machine,
    diag: &dyn DiagnosticSink,
    out: &mut W,
) -> Result<Halt, PipelineError> {
    struct Passthrough<'w, W: Write>(&'w mut W);

    impl<W: Write> crate::vm::LineSink for Passthrough<'_, W> {
        fn emit(&mut self, line: EmittedLine) -> Result<(), VmError> {
            writeln!(self.0, "{}", line).map_err(|_| VmError::ChannelClosed)
        }
    }

    let mut machine = machine;
    let mut sink = Passthrough(out);
    let halt = machine.run(&mut sink, diag)?;
    sink.0.flush().map_err(|e| PipelineError::Output(e.to_string()))?;
    Ok(halt)
}

/// Errors that end a pipeline run.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("simulator: {0}")]
    Vm(#[from] VmError),

    #[error("decoder: {0}")]
    Trace(#[from] TraceError),

    #[error("could not start simulator thread: {0}")]
    Spawn(String),

    #[error("simulator thread panicked")]
    SimulatorPanicked,

    #[error("output error: {0}")]
    Output(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::{CollectingSink, Diagnostic};
    use crate::vm::decode::compose;
    use crate::vm::{Memory, Opcode};

    const ENTRY: usize = 8;

    /// `prefix`, then a program printing `text` one byte at a time, then halt.
    fn printer_after(prefix: &[i32], text: &str) -> Machine {
        let mut words = prefix.to_vec();
        for byte in text.bytes() {
            words.push(compose(Opcode::Prn.raw(), 2));
            words.push(i32::from(byte));
        }
        words.push(0);

        let mut mem = Memory::with_capacity(ENTRY + words.len() + 128);
        mem.load_words(ENTRY, &words).unwrap();
        Machine::new(mem, ENTRY as i32)
    }

    fn printer(text: &str) -> Machine {
        printer_after(&[], text)
    }

    #[test]
    fn test_end_to_end_records() {
        let machine = printer(
            "Process 3:\n  send Value to process 7,\n  send Value to process 9,\n  Value <- 2 * X / 64 + 5.\n\nProcess 4:\n  Value <- X / 64.",
        );
        let sink = Arc::new(CollectingSink::new());
        let mut out = Vec::new();

        let summary = run(machine, sink.clone(), &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "3\t7\t9\t2\t5\n4\t1\t0\n");
        assert_eq!(summary.records, 2);
        assert_eq!(summary.halt.opcode, 0);
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_passthrough_and_divide_by_zero_reach_sink() {
        // [ip+100] := [ip+100] / 0 ahead of the printer
        let div = [compose(Opcode::Div.raw(), 4), 100, 100, 0];
        let machine = printer_after(&div, "hello\nProcess 1:\n\n");

        let sink = Arc::new(CollectingSink::new());
        let mut out = Vec::new();
        let summary = run(machine, sink.clone(), &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "1\n");
        assert_eq!(summary.halt.divide_by_zero, 1);
        assert_eq!(
            sink.entries(),
            vec![
                Diagnostic::DivideByZero { ip: ENTRY as i32 },
                Diagnostic::Passthrough("hello".into()),
            ]
        );
    }

    #[test]
    fn test_decoder_failure_stops_simulator() {
        let machine = printer("Process 1:\n  garbage\n  more output the decoder never sees\n");
        let sink = Arc::new(CollectingSink::new());
        let mut out = Vec::<u8>::new();

        let result = run(machine, sink, &mut out);

        assert!(matches!(
            result,
            Err(PipelineError::Trace(TraceError::TemplateDrift { line_number: 2, .. }))
        ));
    }

    #[test]
    fn test_decoder_failure_does_not_wait_for_simulator() {
        // prints a drifting line, then spins forever without printing again
        let spin = [compose(Opcode::Jl.raw(), 4), 0, 0, 1];
        let mut words = Vec::new();
        for byte in "  x\n".bytes() {
            words.push(compose(Opcode::Prn.raw(), 2));
            words.push(i32::from(byte));
        }
        words.extend_from_slice(&spin);

        let mut mem = Memory::with_capacity(ENTRY + words.len() + 8);
        mem.load_words(ENTRY, &words).unwrap();
        let machine = Machine::new(mem, ENTRY as i32);

        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let result = run(machine, Arc::new(CollectingSink::new()), &mut Vec::<u8>::new());
            let _ = done_tx.send(result);
        });

        let result = done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("run should return once the decoder fails");
        assert!(matches!(
            result,
            Err(PipelineError::Trace(TraceError::TemplateDrift { line_number: 1, .. }))
        ));
    }

    #[test]
    fn test_simulator_failure_surfaces() {
        let mut mem = Memory::with_capacity(16);
        mem.load_words(ENTRY, &[compose(Opcode::Add.raw(), 4), 500, 0, 0]).unwrap();
        let machine = Machine::new(mem, ENTRY as i32);

        let result = run(machine, Arc::new(CollectingSink::new()), &mut Vec::<u8>::new());

        assert!(matches!(result, Err(PipelineError::Vm(VmError::Memory(_)))));
    }

    #[test]
    fn test_assembled_program_decodes() {
        let mut source = String::from("ORG 0\nDAT '#'\nORG 8\n");
        for byte in "Process 9:\n  send Value to process 2,\n  Value <- X / 64 + -3.\n".bytes() {
            source.push_str(&format!("PRN {}\n", byte));
        }
        source.push_str("HLT\n");
        let words = crate::asm::assemble(&source).unwrap();

        let mut mem = Memory::with_capacity(words.len() + 16);
        mem.load_words(0, &words).unwrap();
        let machine = Machine::new(mem, ENTRY as i32);

        let mut out = Vec::new();
        let summary = run(machine, Arc::new(CollectingSink::new()), &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "9\t2\t1\t-3\n");
        assert_eq!(summary.records, 1);
    }

    #[test]
    fn test_run_raw() {
        let machine = printer("a\n\nb");
        let mut out = Vec::new();
        let halt = run_raw(machine, &CollectingSink::new(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\n\nb\n");
        assert_eq!(halt.cycles, 4);
    }
}
