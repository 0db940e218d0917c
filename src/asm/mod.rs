//! Assembler and disassembler for word machine programs.
//!
//! This module provides:
//! - A simple two-pass assembler (text → memory words)
//! - A disassembler (memory → readable text)
//! - An image writer producing files the loader accepts

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, assemble_for, AssemblerError};
pub use disasm::{disassemble, disassemble_at, disassemble_instruction};
pub use image::{save_image, write_image, ImageError};
