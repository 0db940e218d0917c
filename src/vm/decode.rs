//! Instruction word layout.
//!
//! Each instruction is one word: the high 16 bits hold the opcode and the low
//! 16 bits hold a signed offset that is added to the instruction pointer once
//! the instruction completes. Operands live in the following words.

use serde::Serialize;

/// Operation selected by the high half of an instruction word.
///
/// Opcode space starts at 1. Every other value, 0 included, halts the
/// machine; there is no dedicated halt instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    /// `[ip+a] := [ip+b] + c`
    Add,
    /// `[ip+a] := [ip+b] - c`
    Sub,
    /// `[ip+a] := [ip+b] * c`
    Mul,
    /// `[ip+a] := [ip+b] / c`, or 0 when `c` is 0
    Div,
    /// `[ip+a] := [ip+b] & c`
    And,
    /// `[ip+a] := [ip+b] | c`
    Or,
    /// `[ip+a] := [ip+b] << c`
    Shl,
    /// `[ip+a] := [ip+b] >> c`
    Shr,
    /// `[ip+a] := !b`
    ///
    /// Unlike the binary family the source is the literal operand `b`, not
    /// the cell at `ip+b`. Programs depend on this.
    Not,
    /// `if b < c { ip += a }`, with `b` and `c` compared as literal values.
    Jl,
    /// Print the low byte of `a`; `a == 10` ends the line.
    Prn,
    /// Any opcode outside the table. Carries the raw value.
    Halt(i32),
}

impl Opcode {
    const ADD: i32 = 1;
    const SUB: i32 = 2;
    const MUL: i32 = 3;
    const DIV: i32 = 4;
    const AND: i32 = 5;
    const OR: i32 = 6;
    const SHL: i32 = 7;
    const SHR: i32 = 8;
    const NOT: i32 = 9;
    const JL: i32 = 10;
    const PRN: i32 = 11;

    /// Every named operation, in opcode order.
    pub const ALL: [Opcode; 11] = [
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::And,
        Opcode::Or,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Not,
        Opcode::Jl,
        Opcode::Prn,
    ];

    /// Map a raw opcode value to an operation.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            Self::ADD => Opcode::Add,
            Self::SUB => Opcode::Sub,
            Self::MUL => Opcode::Mul,
            Self::DIV => Opcode::Div,
            Self::AND => Opcode::And,
            Self::OR => Opcode::Or,
            Self::SHL => Opcode::Shl,
            Self::SHR => Opcode::Shr,
            Self::NOT => Opcode::Not,
            Self::JL => Opcode::Jl,
            Self::PRN => Opcode::Prn,
            other => Opcode::Halt(other),
        }
    }

    /// Raw opcode value.
    pub fn raw(self) -> i32 {
        match self {
            Opcode::Add => Self::ADD,
            Opcode::Sub => Self::SUB,
            Opcode::Mul => Self::MUL,
            Opcode::Div => Self::DIV,
            Opcode::And => Self::AND,
            Opcode::Or => Self::OR,
            Opcode::Shl => Self::SHL,
            Opcode::Shr => Self::SHR,
            Opcode::Not => Self::NOT,
            Opcode::Jl => Self::JL,
            Opcode::Prn => Self::PRN,
            Opcode::Halt(raw) => raw,
        }
    }

    /// Number of operand words following the instruction word.
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::Not => 2,
            Opcode::Prn => 1,
            Opcode::Halt(_) => 0,
            _ => 3,
        }
    }

    /// Lower-case assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Not => "not",
            Opcode::Jl => "jl",
            Opcode::Prn => "prn",
            Opcode::Halt(_) => "hlt",
        }
    }

    /// Look up an operation by mnemonic (case-insensitive).
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name == "hlt" || name == "halt" {
            return Some(Opcode::Halt(0));
        }
        Self::ALL.iter().copied().find(|op| op.mnemonic() == name)
    }
}

/// A decoded instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Sign-extended low half; the ip advance when no jump is taken.
    pub offset: i32,
}

/// High 16 bits, arithmetic shift.
#[inline]
pub fn opcode_of(word: i32) -> i32 {
    word >> 16
}

/// Low 16 bits, sign-extended.
#[inline]
pub fn offset_of(word: i32) -> i32 {
    i32::from(word as i16)
}

/// Decode an instruction word.
#[inline]
pub fn decode(word: i32) -> Instruction {
    Instruction {
        opcode: Opcode::from_raw(opcode_of(word)),
        offset: offset_of(word),
    }
}

/// Build a word from a raw opcode and an offset.
///
/// Only the low 16 bits of `offset` are kept.
#[inline]
pub fn compose(opcode: i32, offset: i32) -> i32 {
    (opcode << 16) | i32::from(offset as u16)
}

/// Encode an instruction back to a word.
pub fn encode(instr: &Instruction) -> i32 {
    compose(instr.opcode.raw(), instr.offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_zero_is_halt() {
        assert_eq!(decode(0), Instruction { opcode: Opcode::Halt(0), offset: 0 });
    }

    #[test]
    fn test_negative_offset() {
        let word = compose(10, -4);
        assert_eq!(word, 0x000A_FFFC);
        assert_eq!(decode(word), Instruction { opcode: Opcode::Jl, offset: -4 });
    }

    #[test]
    fn test_negative_word_halts() {
        let instr = decode(-1);
        assert_eq!(instr.opcode, Opcode::Halt(-1));
        assert_eq!(instr.offset, -1);
    }

    #[test]
    fn test_opcode_table() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.raw(), i as i32 + 1);
            assert_eq!(Opcode::from_raw(op.raw()), *op);
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(*op));
        }
        assert_eq!(Opcode::from_raw(12), Opcode::Halt(12));
        assert_eq!(Opcode::from_mnemonic("HLT"), Some(Opcode::Halt(0)));
        assert_eq!(Opcode::from_mnemonic("mov"), None);
    }

    proptest! {
        #[test]
        fn test_compose_decode_roundtrip(opcode in 0i32..=32767, offset in -32768i32..=32767) {
            let word = compose(opcode, offset);
            prop_assert_eq!(opcode_of(word), opcode);
            prop_assert_eq!(offset_of(word), offset);
        }

        #[test]
        fn test_encode_instruction_roundtrip(index in 0usize..11, offset in -32768i32..=32767) {
            let instr = Instruction { opcode: Opcode::ALL[index], offset };
            prop_assert_eq!(decode(encode(&instr)), instr);
        }
    }
}
