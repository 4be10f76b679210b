//! Opcode table.
//!
//! Every instruction is a one-byte opcode followed by a fixed operand layout.
//! Decoding and execution are fused in the executor; this module only maps
//! opcode bytes to tags and describes the operand layout of each, which the
//! executor, the program builder and the disassembler share.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Instruction opcodes. The byte values are part of the machine code format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// Move literal to register
    MovLitReg = 0x10,
    /// Move register to register
    MovRegReg = 0x11,
    /// Move register to memory
    MovRegMem = 0x12,
    /// Move memory to register
    MovMemReg = 0x13,
    /// ACC := reg[a] + reg[b], operands are raw register indices
    AddRegReg = 0x14,
    /// Jump to address if literal != ACC
    JmpNotEq = 0x15,
    /// Push literal
    PushLit = 0x17,
    /// Push register
    PushReg = 0x18,
    /// Pop into register
    Pop = 0x1a,
    /// Call subroutine at literal address
    CalLit = 0x5e,
    /// Call subroutine at address held in a register
    CalReg = 0x5f,
    /// Return from subroutine
    Ret = 0x60,
    /// Halt execution
    Hlt = 0xff,
}

/// Kind of operand following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// 16-bit literal
    Literal,
    /// 16-bit memory address
    Address,
    /// Register selector byte, reduced modulo the register count
    Register,
    /// Raw register index byte, used as-is
    RegisterIndex,
}

impl Operand {
    /// Encoded width in bytes.
    pub const fn width(self) -> usize {
        match self {
            Operand::Literal | Operand::Address => 2,
            Operand::Register | Operand::RegisterIndex => 1,
        }
    }
}

impl Opcode {
    /// Every opcode, in byte order.
    pub const ALL: [Opcode; 13] = [
        Opcode::MovLitReg,
        Opcode::MovRegReg,
        Opcode::MovRegMem,
        Opcode::MovMemReg,
        Opcode::AddRegReg,
        Opcode::JmpNotEq,
        Opcode::PushLit,
        Opcode::PushReg,
        Opcode::Pop,
        Opcode::CalLit,
        Opcode::CalReg,
        Opcode::Ret,
        Opcode::Hlt,
    ];

    /// Decode an opcode byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let op = match byte {
            0x10 => Opcode::MovLitReg,
            0x11 => Opcode::MovRegReg,
            0x12 => Opcode::MovRegMem,
            0x13 => Opcode::MovMemReg,
            0x14 => Opcode::AddRegReg,
            0x15 => Opcode::JmpNotEq,
            0x17 => Opcode::PushLit,
            0x18 => Opcode::PushReg,
            0x1a => Opcode::Pop,
            0x5e => Opcode::CalLit,
            0x5f => Opcode::CalReg,
            0x60 => Opcode::Ret,
            0xff => Opcode::Hlt,
            _ => return None,
        };
        Some(op)
    }

    /// The opcode byte.
    #[inline]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::MovLitReg | Opcode::MovRegReg | Opcode::MovRegMem | Opcode::MovMemReg => "mov",
            Opcode::AddRegReg => "add",
            Opcode::JmpNotEq => "jne",
            Opcode::PushLit | Opcode::PushReg => "psh",
            Opcode::Pop => "pop",
            Opcode::CalLit | Opcode::CalReg => "cal",
            Opcode::Ret => "ret",
            Opcode::Hlt => "hlt",
        }
    }

    /// Operand layout, in encoding order.
    pub fn operands(self) -> &'static [Operand] {
        use Operand::*;
        match self {
            Opcode::MovLitReg => &[Literal, Register],
            Opcode::MovRegReg => &[Register, Register],
            Opcode::MovRegMem => &[Register, Address],
            Opcode::MovMemReg => &[Address, Register],
            Opcode::AddRegReg => &[RegisterIndex, RegisterIndex],
            Opcode::JmpNotEq => &[Literal, Address],
            Opcode::PushLit => &[Literal],
            Opcode::PushReg | Opcode::Pop => &[Register],
            Opcode::CalLit => &[Address],
            Opcode::CalReg => &[Register],
            Opcode::Ret | Opcode::Hlt => &[],
        }
    }

    /// Total encoded length including the opcode byte.
    pub fn encoded_len(self) -> usize {
        1 + self.operands().iter().map(|op| op.width()).sum::<usize>()
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::from_byte(byte).ok_or(DecodeError::IllegalOpcode(byte))
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op.byte()
    }
}

/// Errors that can occur during opcode decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("illegal opcode {0:#04x}")]
    IllegalOpcode(u8),
}
