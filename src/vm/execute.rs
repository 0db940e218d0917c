//! Execution engine.
//!
//! Implements the fetch-decode-execute cycle. Every address is relative to the
//! instruction pointer, and the instruction's own offset field decides where
//! the next instruction is.

use crate::config::MachineConfig;
use crate::diag::{Diagnostic, DiagnosticSink};
use crate::vm::decode::{decode, Instruction, Opcode};
use crate::vm::memory::{Memory, MemoryError};
use serde::Serialize;
use std::sync::mpsc::SyncSender;
use thiserror::Error;
use tracing::{info, trace};

/// Character code that terminates a printed line.
const NEWLINE: i32 = 10;

/// A completed line of program output.
pub type EmittedLine = String;

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MachineState {
    /// Machine is running normally.
    Running,
    /// Machine reached an opcode outside the table.
    Halted,
    /// Machine stopped on an error.
    Error,
}

/// What a single step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    /// Nothing observable.
    Quiet,
    /// A newline was printed; the finished line.
    Line(EmittedLine),
    /// A divide by zero was absorbed.
    DivideByZero,
    /// The machine halted. Carries the last partial line, if any.
    Halted { opcode: i32, line: Option<EmittedLine> },
}

/// Where emitted lines go.
pub trait LineSink {
    /// Accept one line. Fails when the receiving side has gone away.
    fn emit(&mut self, line: EmittedLine) -> Result<(), VmError>;
}

impl LineSink for Vec<EmittedLine> {
    fn emit(&mut self, line: EmittedLine) -> Result<(), VmError> {
        self.push(line);
        Ok(())
    }
}

impl LineSink for SyncSender<EmittedLine> {
    fn emit(&mut self, line: EmittedLine) -> Result<(), VmError> {
        self.send(line).map_err(|_| VmError::ChannelClosed)
    }
}

/// Point-in-time view of a machine, for front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineSnapshot {
    pub ip: i32,
    pub cycles: u64,
    pub state: MachineState,
    pub last: Option<Instruction>,
    pub divide_by_zero: u64,
    /// Unflushed output, lossily decoded.
    pub pending: String,
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt {
    /// Raw opcode that stopped the machine.
    pub opcode: i32,
    /// Address of that instruction.
    pub ip: i32,
    /// Instructions executed, the halting one excluded.
    pub cycles: u64,
    /// Divide-by-zero events absorbed along the way.
    pub divide_by_zero: u64,
}

/// The word machine.
#[derive(Clone)]
pub struct Machine {
    /// Main memory.
    pub mem: Memory,
    /// Instruction pointer.
    pub ip: i32,
    /// Current execution state.
    pub state: MachineState,
    /// Instruction count (for profiling).
    pub cycles: u64,
    /// Divide-by-zero count.
    pub divide_by_zero: u64,
    /// Bytes printed since the last newline.
    buffer: Vec<u8>,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Machine {
    /// Create a machine over loaded memory, starting at `entry`.
    pub fn new(mem: Memory, entry: i32) -> Self {
        Self {
            mem,
            ip: entry,
            state: MachineState::Running,
            cycles: 0,
            divide_by_zero: 0,
            buffer: Vec::new(),
            last_instr: None,
        }
    }

    /// Create a machine using the configured entry point.
    pub fn with_config(mem: Memory, config: &MachineConfig) -> Self {
        Self::new(mem, config.entry_point)
    }

    /// Bytes printed since the last newline.
    pub fn pending_output(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            ip: self.ip,
            cycles: self.cycles,
            state: self.state,
            last: self.last_instr,
            divide_by_zero: self.divide_by_zero,
            pending: String::from_utf8_lossy(&self.buffer).into_owned(),
        }
    }

    /// Check if the machine is halted.
    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    /// Check if the machine is running.
    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    /// Execute a single instruction.
    pub fn step(&mut self) -> Result<StepEvent, VmError> {
        if self.state != MachineState::Running {
            return Err(VmError::NotRunning(self.state));
        }

        match self.execute() {
            Ok(event) => Ok(event),
            Err(e) => {
                self.state = MachineState::Error;
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<StepEvent, VmError> {
        let ip = self.ip;
        let instr = decode(self.mem.read(ip, 0)?);
        trace!(ip, ?instr, "step");

        let mut event = StepEvent::Quiet;
        let mut jumped = false;

        match instr.opcode {
            Opcode::Add => event = self.binary_op(BinaryOp::Add)?,
            Opcode::Sub => event = self.binary_op(BinaryOp::Sub)?,
            Opcode::Mul => event = self.binary_op(BinaryOp::Mul)?,
            Opcode::Div => event = self.binary_op(BinaryOp::Div)?,
            Opcode::And => event = self.binary_op(BinaryOp::And)?,
            Opcode::Or => event = self.binary_op(BinaryOp::Or)?,
            Opcode::Shl => event = self.binary_op(BinaryOp::Shl)?,
            Opcode::Shr => event = self.binary_op(BinaryOp::Shr)?,

            Opcode::Not => {
                let a = self.operand(1)?;
                let b = self.operand(2)?;
                // Complement of the literal operand, stored indirectly.
                self.mem.write(ip, a, !b)?;
            }

            Opcode::Jl => {
                let a = self.operand(1)?;
                let b = self.operand(2)?;
                let c = self.operand(3)?;
                if b < c {
                    self.ip = ip.wrapping_add(a);
                    jumped = true;
                }
            }

            Opcode::Prn => {
                let a = self.operand(1)?;
                if a == NEWLINE {
                    event = StepEvent::Line(self.take_line());
                } else {
                    self.buffer.push(a as u8);
                }
            }

            Opcode::Halt(raw) => {
                let line = if self.buffer.is_empty() { None } else { Some(self.take_line()) };
                self.state = MachineState::Halted;
                self.last_instr = Some(instr);
                return Ok(StepEvent::Halted { opcode: raw, line });
            }
        }

        if !jumped {
            self.ip = ip.wrapping_add(instr.offset);
        }
        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(event)
    }

    /// Run until halt, sending lines to `lines` and diagnostics to `diag`.
    ///
    /// A halting run flushes its last partial line before returning.
    pub fn run(&mut self, lines: &mut impl LineSink, diag: &dyn DiagnosticSink) -> Result<Halt, VmError> {
        loop {
            let ip = self.ip;
            match self.step()? {
                StepEvent::Quiet => {}
                StepEvent::Line(line) => lines.emit(line)?,
                StepEvent::DivideByZero => diag.report(Diagnostic::DivideByZero { ip }),
                StepEvent::Halted { opcode, line } => {
                    if let Some(line) = line {
                        lines.emit(line)?;
                    }
                    info!(opcode, ip, cycles = self.cycles, "machine halted");
                    return Ok(Halt {
                        opcode,
                        ip,
                        cycles: self.cycles,
                        divide_by_zero: self.divide_by_zero,
                    });
                }
            }
        }
    }

    /// Run for at most `max_cycles` instructions, collecting lines.
    ///
    /// Returns the number of instructions executed. Stops early on halt.
    pub fn run_limited(
        &mut self,
        max_cycles: u64,
        lines: &mut impl LineSink,
        diag: &dyn DiagnosticSink,
    ) -> Result<u64, VmError> {
        let start_cycles = self.cycles;
        while self.is_running() && self.cycles - start_cycles < max_cycles {
            let ip = self.ip;
            match self.step()? {
                StepEvent::Quiet => {}
                StepEvent::Line(line) => lines.emit(line)?,
                StepEvent::DivideByZero => diag.report(Diagnostic::DivideByZero { ip }),
                StepEvent::Halted { line, .. } => {
                    if let Some(line) = line {
                        lines.emit(line)?;
                    }
                }
            }
        }
        Ok(self.cycles - start_cycles)
    }

    /// Operand word `slot` positions after the instruction.
    #[inline]
    fn operand(&self, slot: i32) -> Result<i32, MemoryError> {
        self.mem.read(self.ip, slot)
    }

    /// `[ip+a] := [ip+b] OP c`. A zero divisor stores 0 and is counted.
    fn binary_op(&mut self, op: BinaryOp) -> Result<StepEvent, VmError> {
        let a = self.operand(1)?;
        let b = self.operand(2)?;
        let c = self.operand(3)?;
        let x = self.mem.read(self.ip, b)?;
        match op.apply(x, c) {
            Some(value) => {
                self.mem.write(self.ip, a, value)?;
                Ok(StepEvent::Quiet)
            }
            None => {
                self.mem.write(self.ip, a, 0)?;
                self.divide_by_zero += 1;
                Ok(StepEvent::DivideByZero)
            }
        }
    }

    fn take_line(&mut self) -> EmittedLine {
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        line
    }
}

/// The `[ip+a] := [ip+b] OP c` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Shl,
    Shr,
}

impl BinaryOp {
    /// `None` only for a zero divisor.
    fn apply(self, x: i32, c: i32) -> Option<i32> {
        let value = match self {
            BinaryOp::Add => x.wrapping_add(c),
            BinaryOp::Sub => x.wrapping_sub(c),
            BinaryOp::Mul => x.wrapping_mul(c),
            BinaryOp::Div if c == 0 => return None,
            BinaryOp::Div => x.wrapping_div(c),
            BinaryOp::And => x & c,
            BinaryOp::Or => x | c,
            BinaryOp::Shl => shift_left(x, c),
            BinaryOp::Shr => shift_right(x, c),
        };
        Some(value)
    }
}

/// Left shift with the count taken as unsigned; 32 or more clears the word.
fn shift_left(x: i32, count: i32) -> i32 {
    let count = count as u32;
    if count >= 32 { 0 } else { x << count }
}

/// Arithmetic right shift with the count taken as unsigned; 32 or more
/// leaves only the sign.
fn shift_right(x: i32, count: i32) -> i32 {
    let count = count as u32;
    if count >= 32 { x >> 31 } else { x >> count }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("ip", &self.ip)
            .field("cycles", &self.cycles)
            .field("mem", &self.mem)
            .finish()
    }
}

/// Errors that can occur during execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("machine not running: {0:?}")]
    NotRunning(MachineState),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("line consumer hung up")]
    ChannelClosed,
}
