//! Read-only views of CPU state for debuggers and front ends.

use crate::cpu::execute::{Cpu, CpuState};
use crate::cpu::memory::MemoryError;
use crate::cpu::registers::Register;
use serde::{Serialize, Deserialize};

/// Bytes shown by [`Cpu::view_memory_at`].
pub const VIEW_BYTES: usize = 8;

/// Serializable summary of the CPU, without memory contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub state: CpuState,
    pub cycles: u64,
    pub frame_bytes: u16,
    pub registers: Vec<(Register, u16)>,
}

impl Cpu {
    /// Read a register without side effects.
    pub fn peek_register(&self, reg: Register) -> u16 {
        self.regs.get(reg)
    }

    /// Read the memory word at `address` without side effects.
    pub fn peek_memory(&self, address: u16) -> Result<u16, MemoryError> {
        self.mem.read_word(address as usize)
    }

    /// Render `address` and the 8 bytes starting there.
    ///
    /// ```text
    /// 0x0100: 0xbe 0x01 0x00 0x00 0x00 0x00 0x00 0x00
    /// ```
    pub fn view_memory_at(&self, address: u16) -> Result<String, MemoryError> {
        let bytes = self.mem.slice(address as usize, VIEW_BYTES)?;
        Ok(format_bytes(address, bytes))
    }

    /// Render the stack from SP up to the end of memory.
    pub fn view_stack(&self) -> Result<String, MemoryError> {
        let sp = self.sp();
        let len = self.mem.len().checked_sub(sp as usize).ok_or(MemoryError::OutOfBounds {
            offset: sp as usize,
            size: 0,
            len: self.mem.len(),
        })?;
        let bytes = self.mem.slice(sp as usize, len)?;
        Ok(format_bytes(sp, bytes))
    }

    /// One `name: 0xNNNN` line per register.
    pub fn register_dump(&self) -> String {
        self.regs
            .iter()
            .map(|(reg, value)| format!("{}: {:#06x}", reg, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Capture registers and execution counters.
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            state: self.state,
            cycles: self.cycles,
            frame_bytes: self.frame_bytes,
            registers: self.regs.iter().collect(),
        }
    }
}

fn format_bytes(address: u16, bytes: &[u8]) -> String {
    let mut out = format!("{:#06x}:", address);
    for byte in bytes {
        out.push_str(&format!(" {:#04x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;

    #[test]
    fn test_view_memory_at() {
        let mut cpu = Cpu::default();
        cpu.load_image(0x0f01, &[0x04, 0x05, 0xa3, 0xfe, 0x13, 0x0d, 0x44, 0x0f]).unwrap();

        assert_eq!(
            cpu.view_memory_at(0x0f01).unwrap(),
            "0x0f01: 0x04 0x05 0xa3 0xfe 0x13 0x0d 0x44 0x0f"
        );
        assert_eq!(
            cpu.view_memory_at(0x0000).unwrap(),
            "0x0000: 0x00 0x00 0x00 0x00 0x00 0x00 0x00 0x00"
        );
    }

    #[test]
    fn test_view_memory_near_end() {
        let cpu = Cpu::new(&MachineConfig::default().with_memory_size(16)).unwrap();

        assert!(cpu.view_memory_at(8).is_ok());
        assert!(cpu.view_memory_at(9).is_err());
    }

    #[test]
    fn test_view_stack() {
        let mut cpu = Cpu::default();
        assert_eq!(cpu.view_stack().unwrap(), "0xfffe: 0x00 0x00");

        cpu.push(0x1234).unwrap();
        assert_eq!(cpu.view_stack().unwrap(), "0xfffc: 0x00 0x00 0x12 0x34");
    }

    #[test]
    fn test_register_dump() {
        let mut cpu = Cpu::default();
        cpu.set_register(Register::Acc, 0xbe01);
        let dump = cpu.register_dump();
        let lines = dump.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), Register::COUNT);
        assert_eq!(lines[0], "ip: 0x0000");
        assert_eq!(lines[1], "acc: 0xbe01");
        assert_eq!(lines[10], "sp: 0xfffe");
        assert_eq!(lines[11], "fp: 0xfffe");
    }

    #[test]
    fn test_snapshot_json() {
        let mut cpu = Cpu::default();
        cpu.set_register(Register::R1, 7);
        let snapshot = cpu.snapshot();

        assert_eq!(snapshot.registers[2], (Register::R1, 7));

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains(r#"["r1",7]"#));
        assert!(json.contains(r#""state":"Running""#));

        let back: CpuSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
