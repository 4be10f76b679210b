//! Program construction and inspection tools.
//!
//! This module provides:
//! - A program builder (typed instructions → machine code bytes)
//! - A disassembler (machine code → readable text)

pub mod builder;
pub mod disasm;

pub use builder::{Program, ProgramBuilder, Segment};
pub use disasm::{disassemble, disassemble_at, disassemble_instruction};
