//! CPU registers.
//!
//! Twelve 16-bit registers, in this fixed order:
//! - IP: instruction pointer
//! - ACC: accumulator
//! - R1-R8: general purpose
//! - SP: stack pointer
//! - FP: frame pointer
//!
//! The order matters. A register selector operand picks a register by its
//! position here, and `ADD_REG_REG` addresses the bank by raw index.

use crate::cpu::memory::{Memory, MemoryError};
use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A register name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Register {
    Ip,
    Acc,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    Sp,
    Fp,
}

impl Register {
    /// Number of registers in the file.
    pub const COUNT: usize = 12;

    /// All registers in declaration order.
    pub const ALL: [Register; Self::COUNT] = [
        Register::Ip,
        Register::Acc,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
        Register::Sp,
        Register::Fp,
    ];

    /// The general purpose registers, in the order `call` saves them.
    pub const GENERAL: [Register; 8] = [
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
    ];

    /// Position in the register file.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Byte offset in the register bank.
    #[inline]
    pub const fn offset(self) -> usize {
        self.index() * 2
    }

    /// Pick a register from a selector byte.
    ///
    /// The byte is reduced modulo the register count, so every value selects
    /// some register.
    #[inline]
    pub fn from_selector(selector: u8) -> Self {
        Self::ALL[selector as usize % Self::COUNT]
    }

    /// Look up a register by position.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Lower-case register name as used in dumps and disassembly.
    pub fn name(self) -> &'static str {
        match self {
            Register::Ip => "ip",
            Register::Acc => "acc",
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::R3 => "r3",
            Register::R4 => "r4",
            Register::R5 => "r5",
            Register::R6 => "r6",
            Register::R7 => "r7",
            Register::R8 => "r8",
            Register::Sp => "sp",
            Register::Fp => "fp",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = UnknownRegister;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|reg| reg.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownRegister(s.to_string()))
    }
}

/// A register name outside the fixed register set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("register {0:?} does not exist")]
pub struct UnknownRegister(pub String);

/// The register file, stored in its own small memory bank.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Memory", into = "Memory")]
pub struct RegisterFile {
    bank: Memory,
}

/// A register bank whose size does not match the register set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("register bank holds {0} bytes, expected 24")]
pub struct BankSizeMismatch(pub usize);

impl TryFrom<Memory> for RegisterFile {
    type Error = BankSizeMismatch;

    fn try_from(bank: Memory) -> Result<Self, Self::Error> {
        if bank.len() != Register::COUNT * 2 {
            return Err(BankSizeMismatch(bank.len()));
        }
        Ok(Self { bank })
    }
}

impl From<RegisterFile> for Memory {
    fn from(regs: RegisterFile) -> Self {
        regs.bank
    }
}

impl RegisterFile {
    /// Create a register file with every register zeroed.
    pub fn new() -> Self {
        Self {
            bank: Memory::new(Register::COUNT * 2),
        }
    }

    /// Read a register.
    #[inline]
    pub fn get(&self, reg: Register) -> u16 {
        match self.bank.read_word(reg.offset()) {
            Ok(value) => value,
            Err(_) => unreachable!("register bank holds every register"),
        }
    }

    /// Write a register.
    #[inline]
    pub fn set(&mut self, reg: Register, value: u16) {
        if self.bank.write_word(reg.offset(), value).is_err() {
            unreachable!("register bank holds every register");
        }
    }

    /// Read the bank by raw register index, without selector wrap-around.
    ///
    /// Indices past the last register fall outside the bank.
    pub fn read_index(&self, index: u8) -> Result<u16, MemoryError> {
        self.bank.read_word(index as usize * 2)
    }

    /// Zero every register.
    pub fn reset(&mut self) {
        self.bank.clear();
    }

    /// Iterate over `(register, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Register, u16)> + '_ {
        Register::ALL.into_iter().map(move |reg| (reg, self.get(reg)))
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (reg, value) in self.iter() {
            map.entry(&reg.name(), &format_args!("{:#06x}", value));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_offsets() {
        assert_eq!(Register::Ip.offset(), 0);
        assert_eq!(Register::Acc.offset(), 2);
        assert_eq!(Register::R1.offset(), 4);
        assert_eq!(Register::Fp.offset(), 22);

        for (i, reg) in Register::ALL.iter().enumerate() {
            assert_eq!(reg.index(), i);
            assert_eq!(Register::from_index(i), Some(*reg));
        }
        assert_eq!(Register::from_index(Register::COUNT), None);
    }

    #[test]
    fn test_selector_wraps() {
        assert_eq!(Register::from_selector(0), Register::Ip);
        assert_eq!(Register::from_selector(2), Register::R1);
        assert_eq!(Register::from_selector(12), Register::Ip);
        assert_eq!(Register::from_selector(14), Register::R1);
        // 255 % 12 == 3
        assert_eq!(Register::from_selector(255), Register::R2);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("acc".parse::<Register>(), Ok(Register::Acc));
        assert_eq!("R8".parse::<Register>(), Ok(Register::R8));
        assert_eq!(" fp ".parse::<Register>(), Ok(Register::Fp));
        assert_eq!(
            "r9".parse::<Register>(),
            Err(UnknownRegister("r9".to_string()))
        );

        for reg in Register::ALL {
            assert_eq!(reg.to_string().parse::<Register>(), Ok(reg));
        }
    }

    #[test]
    fn test_register_file_isolated_slots() {
        let mut regs = RegisterFile::new();
        regs.set(Register::R1, 0xbeef);
        regs.set(Register::R2, 0x1234);

        assert_eq!(regs.get(Register::R1), 0xbeef);
        assert_eq!(regs.get(Register::R2), 0x1234);
        assert_eq!(regs.get(Register::Acc), 0);
    }

    #[test]
    fn test_read_index() {
        let mut regs = RegisterFile::new();
        regs.set(Register::R3, 0x0042);

        assert_eq!(regs.read_index(Register::R3.index() as u8), Ok(0x0042));
        assert!(regs.read_index(11).is_ok());
        assert!(regs.read_index(12).is_err());
        assert!(regs.read_index(255).is_err());
    }

    #[test]
    fn test_bank_size_checked_on_load() {
        let mut regs = RegisterFile::new();
        regs.set(Register::Acc, 0x0102);

        let json = serde_json::to_string(&regs).unwrap();
        let back: RegisterFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(Register::Acc), 0x0102);

        let short = serde_json::to_string(&Memory::new(4)).unwrap();
        assert!(serde_json::from_str::<RegisterFile>(&short).is_err());
        assert_eq!(
            RegisterFile::try_from(Memory::new(30)),
            Err(BankSizeMismatch(30))
        );
    }

    #[test]
    fn test_reset() {
        let mut regs = RegisterFile::new();
        regs.set(Register::Sp, 0xfffe);
        regs.reset();

        assert!(regs.iter().all(|(_, value)| value == 0));
    }
}
