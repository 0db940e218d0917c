//! Disassembler for word machine memory.
//!
//! Output uses the assembler's syntax, so a listing of code can be fed back
//! through [`assemble`](crate::asm::assemble).

use crate::vm::decode::{decode, Opcode};
use crate::vm::memory::Memory;

/// Disassemble the instruction at `addr`.
///
/// Returns the text and the number of words it spans. Operand words past the
/// end of memory show as `?`.
pub fn disassemble_at(mem: &Memory, addr: usize) -> (String, usize) {
    let word = match mem.get(addr) {
        Some(word) => word,
        None => return ("???".to_string(), 1),
    };
    let instr = decode(word);

    // Only the word `HLT` assembles to is shown as HLT. Any other halting
    // word is data as far as a listing is concerned.
    if let Opcode::Halt(raw) = instr.opcode {
        let text = if raw == 0 && instr.offset == 1 {
            "HLT".to_string()
        } else {
            format!("DAT {}", word)
        };
        return (text, 1);
    }

    let count = instr.opcode.operand_count();
    let operands: Vec<String> = (1..=count)
        .map(|slot| match mem.get(addr + slot) {
            Some(value) => value.to_string(),
            None => "?".to_string(),
        })
        .collect();

    let mut text = format!("{} {}", instr.opcode.mnemonic().to_uppercase(), operands.join(", "));
    if instr.offset != (count + 1) as i32 {
        text.push_str(&format!(" @{}", instr.offset));
    }
    (text, count + 1)
}

/// Disassemble a single instruction to text.
pub fn disassemble_instruction(mem: &Memory, addr: usize) -> String {
    disassemble_at(mem, addr).0
}

/// Listing of `count` consecutive instructions from `start`, laid out by
/// instruction length rather than by control flow. Addresses and raw words
/// go in trailing comments.
pub fn disassemble(mem: &Memory, start: usize, count: usize) -> String {
    let mut output = String::new();
    output.push_str("; Word machine disassembly\n");
    output.push_str("; ------------------------\n\n");

    let mut addr = start;
    for _ in 0..count {
        if addr >= mem.len() {
            break;
        }
        let (line, len) = disassemble_at(mem, addr);
        let word = mem.get(addr).unwrap_or(0);
        if addr + len > mem.len() {
            // operands run off the end; list what is there as data
            for (tail, word) in mem.dump(addr, len) {
                output.push_str(&format!("    {:<32} ; {:08}: {:#010x}\n", format!("DAT {}", word), tail, word));
            }
            break;
        }
        output.push_str(&format!("    {:<32} ; {:08}: {:#010x}\n", line, addr, word));
        addr += len;
    }

    output
}
