//! # wordvm
//!
//! A 32-bit word bytecode machine and a decoder for the process listing its
//! programs print.
//!
//! The machine loads a binary image, runs it from a fixed entry point and
//! prints text one byte at a time. The decoder turns that text, line by line,
//! into tab-separated numeric records. [`pipeline::run`] wires the two
//! together on separate threads.

pub mod config;
pub mod diag;
pub mod vm;
pub mod trace;
pub mod pipeline;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use config::{ConfigError, MachineConfig};
pub use diag::{CollectingSink, Diagnostic, DiagnosticSink, LogSink};
pub use vm::{load_file, load_image, Halt, LoadError, Machine, MachineState, Memory, Opcode, VmError};
pub use trace::{decode_stream, TraceDecoder, TraceError, TraceRecord};
pub use pipeline::{PipelineError, RunSummary};
pub use asm::{assemble, disassemble, save_image, AssemblerError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
