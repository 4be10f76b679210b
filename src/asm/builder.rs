//! Program builder.
//!
//! Emits machine code byte-for-byte from typed instruction calls, so tests
//! and demos never hand-assemble opcode bytes.
//!
//! ```
//! use vm16::{ProgramBuilder, Register};
//!
//! let mut asm = ProgramBuilder::new();
//! asm.mov_lit_reg(0x1234, Register::R1)
//!     .push_reg(Register::R1)
//!     .hlt();
//! asm.org(0x3000).ret();
//!
//! let program = asm.build();
//! assert_eq!(program.segments().len(), 2);
//! assert_eq!(program.segments()[0].bytes, [0x10, 0x12, 0x34, 0x02, 0x18, 0x02, 0xff]);
//! ```

use crate::cpu::decode::Opcode;
use crate::cpu::registers::Register;

/// A run of bytes to be placed at a fixed address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub origin: u16,
    pub bytes: Vec<u8>,
}

/// Machine code ready for loading.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    segments: Vec<Segment>,
}

impl Program {
    /// A program with a single segment.
    pub fn from_bytes(origin: u16, bytes: Vec<u8>) -> Self {
        Self {
            segments: vec![Segment { origin, bytes }],
        }
    }

    /// The non-empty segments, in emission order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Total number of bytes across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.bytes.len()).sum()
    }

    /// Check if the program has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Incrementally emits instructions.
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    segments: Vec<Segment>,
}

impl ProgramBuilder {
    /// Start emitting at address 0.
    pub fn new() -> Self {
        Self {
            segments: vec![Segment::default()],
        }
    }

    /// Continue emitting at `origin`.
    pub fn org(&mut self, origin: u16) -> &mut Self {
        self.segments.push(Segment {
            origin,
            bytes: Vec::new(),
        });
        self
    }

    /// Address the next byte will be emitted at.
    pub fn here(&self) -> u16 {
        self.segments
            .last()
            .map_or(0, |s| s.origin.wrapping_add(s.bytes.len() as u16))
    }

    /// Emit a raw byte.
    pub fn byte(&mut self, value: u8) -> &mut Self {
        self.current().bytes.push(value);
        self
    }

    /// Emit a raw big-endian word.
    pub fn word(&mut self, value: u16) -> &mut Self {
        self.current().bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn op(&mut self, op: Opcode) -> &mut Self {
        self.byte(op.byte())
    }

    fn reg(&mut self, reg: Register) -> &mut Self {
        self.byte(reg.index() as u8)
    }

    /// `mov literal, reg`
    pub fn mov_lit_reg(&mut self, literal: u16, to: Register) -> &mut Self {
        self.op(Opcode::MovLitReg).word(literal).reg(to)
    }

    /// `mov from, to`
    pub fn mov_reg_reg(&mut self, from: Register, to: Register) -> &mut Self {
        self.op(Opcode::MovRegReg).reg(from).reg(to)
    }

    /// `mov from, &address`
    pub fn mov_reg_mem(&mut self, from: Register, address: u16) -> &mut Self {
        self.op(Opcode::MovRegMem).reg(from).word(address)
    }

    /// `mov &address, to`
    pub fn mov_mem_reg(&mut self, address: u16, to: Register) -> &mut Self {
        self.op(Opcode::MovMemReg).word(address).reg(to)
    }

    /// `add a, b`
    pub fn add_reg_reg(&mut self, a: Register, b: Register) -> &mut Self {
        self.op(Opcode::AddRegReg).reg(a).reg(b)
    }

    /// `jne literal, &address`
    pub fn jmp_not_eq(&mut self, literal: u16, address: u16) -> &mut Self {
        self.op(Opcode::JmpNotEq).word(literal).word(address)
    }

    /// `psh literal`
    pub fn push_lit(&mut self, literal: u16) -> &mut Self {
        self.op(Opcode::PushLit).word(literal)
    }

    /// `psh reg`
    pub fn push_reg(&mut self, reg: Register) -> &mut Self {
        self.op(Opcode::PushReg).reg(reg)
    }

    /// `pop reg`
    pub fn pop(&mut self, to: Register) -> &mut Self {
        self.op(Opcode::Pop).reg(to)
    }

    /// `cal &address`
    pub fn cal_lit(&mut self, address: u16) -> &mut Self {
        self.op(Opcode::CalLit).word(address)
    }

    /// `cal reg`
    pub fn cal_reg(&mut self, reg: Register) -> &mut Self {
        self.op(Opcode::CalReg).reg(reg)
    }

    /// `ret`
    pub fn ret(&mut self) -> &mut Self {
        self.op(Opcode::Ret)
    }

    /// `hlt`
    pub fn hlt(&mut self) -> &mut Self {
        self.op(Opcode::Hlt)
    }

    /// Collect the emitted segments, dropping empty ones.
    pub fn build(&self) -> Program {
        Program {
            segments: self
                .segments
                .iter()
                .filter(|s| !s.bytes.is_empty())
                .cloned()
                .collect(),
        }
    }

    fn current(&mut self) -> &mut Segment {
        if self.segments.is_empty() {
            self.segments.push(Segment::default());
        }
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
