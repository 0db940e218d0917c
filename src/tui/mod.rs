//! TUI debugger for the word machine.
//!
//! Provides an interactive terminal-based debugger with:
//! - Disassembly from the instruction pointer
//! - Memory view with scrolling
//! - Step/run/breakpoint controls

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
