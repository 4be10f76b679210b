//! # vm16
//!
//! An emulator of a minimal 16-bit stored-program computer.
//!
//! The machine has a byte-addressable memory, twelve 16-bit registers and a
//! fetch-decode-execute loop over a small fixed-width instruction set. Calls
//! save the caller's registers in a frame on a downward-growing stack, and
//! returns unwind it, so subroutines nest to any depth memory allows.
//!
//! ```
//! use vm16::{Cpu, ProgramBuilder, Register};
//!
//! let mut asm = ProgramBuilder::new();
//! asm.mov_lit_reg(0x1234, Register::R1)
//!     .mov_lit_reg(0xabcd, Register::R2)
//!     .add_reg_reg(Register::R1, Register::R2)
//!     .hlt();
//!
//! let mut cpu = Cpu::default();
//! cpu.load_program(&asm.build()).unwrap();
//! cpu.run_until_halt().unwrap();
//!
//! assert_eq!(cpu.peek_register(Register::Acc), 0xbe01);
//! ```

pub mod cpu;
pub mod asm;
pub mod config;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, CpuSnapshot, Step, Memory, MemoryError, Register, RegisterFile, UnknownRegister, Opcode};
pub use asm::{Program, ProgramBuilder, disassemble};
pub use config::{MachineConfig, OpcodePolicy, ConfigError};
