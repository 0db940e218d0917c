//! The word machine.
//!
//! - A flat memory of signed 32-bit words
//! - A single instruction pointer; every operand address is relative to it
//! - Eleven operations, with any other opcode halting the machine

pub mod memory;
pub mod decode;
pub mod loader;
pub mod execute;

pub use memory::{Memory, MemoryError};
pub use decode::{Instruction, Opcode, compose, decode, encode};
pub use loader::{LoadError, LoadSummary, load_file, load_image};
pub use execute::{EmittedLine, Halt, LineSink, Machine, MachineSnapshot, MachineState, StepEvent, VmError};
