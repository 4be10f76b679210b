//! CPU emulation for the 16-bit stack machine.
//!
//! This module implements the complete machine:
//! - byte-addressable memory with big-endian words
//! - 12 registers: IP, ACC, R1-R8, SP, FP
//! - 13-instruction set with call/return frames on a downward-growing stack

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod stack;
pub mod inspect;

pub use memory::{Memory, MemoryError};
pub use registers::{BankSizeMismatch, Register, RegisterFile, UnknownRegister};
pub use decode::{Opcode, Operand, DecodeError};
pub use execute::{Cpu, CpuError, CpuState, Step};
pub use inspect::CpuSnapshot;
