//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! Decode is fused with execute: each opcode fetches its own operands from
//! memory at IP as it runs.

use crate::config::{ConfigError, MachineConfig, OpcodePolicy};
use crate::cpu::decode::Opcode;
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::{Register, RegisterFile, UnknownRegister};
use crate::asm::Program;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HLT instruction).
    Halted,
    /// A step failed; the CPU refuses to continue until reset.
    Faulted,
}

/// Result of a single successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An instruction was executed.
    Executed(Opcode),
    /// An unrecognized opcode byte was skipped under the permissive policy.
    Skipped(u8),
}

/// The CPU.
#[derive(Clone)]
pub struct Cpu {
    /// CPU registers.
    pub regs: RegisterFile,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Steps completed since construction or reset.
    pub cycles: u64,
    /// Handling of unrecognized opcodes.
    policy: OpcodePolicy,
    /// Bytes pushed since the last call/return boundary.
    pub(crate) frame_bytes: u16,
    /// Last executed instruction (for debugging).
    last_opcode: Option<Opcode>,
}

impl Cpu {
    /// Create a CPU with the given configuration.
    pub fn new(config: &MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(Memory::new(config.memory_size), config.opcode_policy))
    }

    /// Create a CPU around an existing memory image.
    pub fn with_memory(mem: Memory, policy: OpcodePolicy) -> Result<Self, ConfigError> {
        MachineConfig::default()
            .with_memory_size(mem.len())
            .validate()?;
        Ok(Self::from_parts(mem, policy))
    }

    // Callers have validated the memory size.
    fn from_parts(mem: Memory, policy: OpcodePolicy) -> Self {
        let mut cpu = Self {
            regs: RegisterFile::new(),
            mem,
            state: CpuState::Running,
            cycles: 0,
            policy,
            frame_bytes: 0,
            last_opcode: None,
        };
        cpu.init_stack();
        cpu
    }

    /// The stack starts one word below the end of memory and grows down.
    fn init_stack(&mut self) {
        let top = (self.mem.len() - 2) as u16;
        self.regs.set(Register::Sp, top);
        self.regs.set(Register::Fp, top);
        self.frame_bytes = 0;
    }

    /// Reset the CPU to initial state, clearing memory.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.init_stack();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_opcode = None;
    }

    /// Copy raw machine code into memory at `origin`.
    pub fn load_image(&mut self, origin: u16, bytes: &[u8]) -> Result<(), MemoryError> {
        self.mem.load(origin as usize, bytes)
    }

    /// Load every segment of a built program.
    pub fn load_program(&mut self, program: &Program) -> Result<(), MemoryError> {
        for segment in program.segments() {
            self.load_image(segment.origin, &segment.bytes)?;
        }
        Ok(())
    }

    /// The configured opcode policy.
    pub fn policy(&self) -> OpcodePolicy {
        self.policy
    }

    /// Change how unrecognized opcodes are handled.
    pub fn set_policy(&mut self, policy: OpcodePolicy) {
        self.policy = policy;
    }

    /// Bytes pushed since the last call/return boundary.
    pub fn frame_bytes(&self) -> u16 {
        self.frame_bytes
    }

    // ==================== Registers ====================

    /// Read a register.
    #[inline]
    pub fn get_register(&self, reg: Register) -> u16 {
        self.regs.get(reg)
    }

    /// Write a register.
    #[inline]
    pub fn set_register(&mut self, reg: Register, value: u16) {
        self.regs.set(reg, value);
    }

    /// Read a register by its textual name.
    pub fn get_register_by_name(&self, name: &str) -> Result<u16, UnknownRegister> {
        Ok(self.regs.get(name.parse()?))
    }

    /// Write a register by its textual name.
    pub fn set_register_by_name(&mut self, name: &str, value: u16) -> Result<(), UnknownRegister> {
        self.regs.set(name.parse()?, value);
        Ok(())
    }

    /// Current instruction pointer.
    pub fn ip(&self) -> u16 {
        self.regs.get(Register::Ip)
    }

    /// Current stack pointer.
    pub fn sp(&self) -> u16 {
        self.regs.get(Register::Sp)
    }

    /// Current frame pointer.
    pub fn fp(&self) -> u16 {
        self.regs.get(Register::Fp)
    }

    // ==================== Fetch ====================

    /// Read the byte at IP and advance IP by one.
    pub fn fetch_byte(&mut self) -> Result<u8, CpuError> {
        let ip = self.ip();
        let byte = self.mem.read_byte(ip as usize)?;
        self.regs.set(Register::Ip, ip.wrapping_add(1));
        Ok(byte)
    }

    /// Read the word at IP and advance IP by two.
    pub fn fetch_word(&mut self) -> Result<u16, CpuError> {
        let ip = self.ip();
        let word = self.mem.read_word(ip as usize)?;
        self.regs.set(Register::Ip, ip.wrapping_add(2));
        Ok(word)
    }

    /// Fetch a register selector byte. Any byte selects a register.
    pub fn fetch_register_operand(&mut self) -> Result<Register, CpuError> {
        Ok(Register::from_selector(self.fetch_byte()?))
    }

    // ==================== Execution ====================

    /// Execute a single instruction.
    ///
    /// On error the register file and frame bookkeeping are restored to
    /// their state before the step, so IP points back at the failing opcode,
    /// and the CPU moves to [`CpuState::Faulted`].
    pub fn step(&mut self) -> Result<Step, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let saved_regs = self.regs.clone();
        let saved_frame_bytes = self.frame_bytes;

        match self.fetch_and_execute() {
            Ok(step) => {
                self.cycles += 1;
                if let Step::Executed(op) = step {
                    self.last_opcode = Some(op);
                }
                Ok(step)
            }
            Err(e) => {
                self.regs = saved_regs;
                self.frame_bytes = saved_frame_bytes;
                self.state = CpuState::Faulted;
                Err(e)
            }
        }
    }

    fn fetch_and_execute(&mut self) -> Result<Step, CpuError> {
        let address = self.ip();
        let byte = self.fetch_byte()?;

        match Opcode::from_byte(byte) {
            Some(op) => {
                self.execute(op)?;
                Ok(Step::Executed(op))
            }
            None => match self.policy {
                OpcodePolicy::Permissive => Ok(Step::Skipped(byte)),
                OpcodePolicy::Strict => Err(CpuError::IllegalInstruction {
                    opcode: byte,
                    address,
                }),
            },
        }
    }

    /// Run for at most `max_steps` steps, stopping early on halt.
    ///
    /// Returns the number of steps executed.
    pub fn run_for(&mut self, max_steps: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_steps);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run until halt or error.
    ///
    /// A program that never executes HLT loops forever under the permissive
    /// policy; use [`Cpu::run_for`] when that is possible.
    pub fn run_until_halt(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute an opcode whose operands follow at IP.
    ///
    /// Register sources are read only after all operands have been fetched.
    pub fn execute(&mut self, op: Opcode) -> Result<(), CpuError> {
        match op {
            Opcode::MovLitReg => {
                let literal = self.fetch_word()?;
                let reg = self.fetch_register_operand()?;
                self.regs.set(reg, literal);
            }

            Opcode::MovRegReg => {
                let from = self.fetch_register_operand()?;
                let to = self.fetch_register_operand()?;
                let value = self.regs.get(from);
                self.regs.set(to, value);
            }

            Opcode::MovRegMem => {
                let from = self.fetch_register_operand()?;
                let address = self.fetch_word()?;
                let value = self.regs.get(from);
                self.mem.write_word(address as usize, value)?;
            }

            Opcode::MovMemReg => {
                let address = self.fetch_word()?;
                let to = self.fetch_register_operand()?;
                let value = self.mem.read_word(address as usize)?;
                self.regs.set(to, value);
            }

            Opcode::AddRegReg => {
                // Raw bank indices, not wrapped selectors
                let a = self.fetch_byte()?;
                let b = self.fetch_byte()?;
                let lhs = self.regs.read_index(a)?;
                let rhs = self.regs.read_index(b)?;
                self.regs.set(Register::Acc, lhs.wrapping_add(rhs));
            }

            Opcode::JmpNotEq => {
                let literal = self.fetch_word()?;
                let address = self.fetch_word()?;
                if literal != self.regs.get(Register::Acc) {
                    self.regs.set(Register::Ip, address);
                }
            }

            Opcode::PushLit => {
                let literal = self.fetch_word()?;
                self.push(literal)?;
            }

            Opcode::PushReg => {
                let reg = self.fetch_register_operand()?;
                self.push(self.regs.get(reg))?;
            }

            Opcode::Pop => {
                let reg = self.fetch_register_operand()?;
                let value = self.pop()?;
                self.regs.set(reg, value);
            }

            Opcode::CalLit => {
                let address = self.fetch_word()?;
                self.call(address)?;
            }

            Opcode::CalReg => {
                let reg = self.fetch_register_operand()?;
                let address = self.regs.get(reg);
                self.call(address)?;
            }

            Opcode::Ret => {
                self.ret()?;
            }

            Opcode::Hlt => {
                self.state = CpuState::Halted;
            }
        }

        Ok(())
    }

    /// Get the last executed instruction.
    pub fn last_opcode(&self) -> Option<Opcode> {
        self.last_opcode
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::from_parts(Memory::new(crate::config::DEFAULT_MEMORY_SIZE), OpcodePolicy::default())
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("frame_bytes", &self.frame_bytes)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    UnknownRegister(#[from] UnknownRegister),

    #[error("illegal instruction {opcode:#04x} at {address:#06x}")]
    IllegalInstruction { opcode: u8, address: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ProgramBuilder;

    fn cpu_with(program: &ProgramBuilder) -> Cpu {
        let mut cpu = Cpu::default();
        cpu.load_program(&program.build()).unwrap();
        cpu
    }

    #[test]
    fn test_initial_state() {
        let cpu = Cpu::new(&MachineConfig::default().with_memory_size(16)).unwrap();

        assert_eq!(cpu.sp(), 14);
        assert_eq!(cpu.fp(), 14);
        assert_eq!(cpu.ip(), 0);
        assert_eq!(cpu.get_register(Register::Acc), 0);
        assert_eq!(cpu.frame_bytes(), 0);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_rejects_bad_memory_size() {
        assert!(Cpu::new(&MachineConfig::default().with_memory_size(1)).is_err());
        assert!(Cpu::with_memory(Memory::new(0x10001), OpcodePolicy::Strict).is_err());
        assert!(Cpu::with_memory(Memory::new(2), OpcodePolicy::Strict).is_ok());
    }

    #[test]
    fn test_fetch_advances_ip() {
        let mut cpu = Cpu::default();
        cpu.load_image(0, &[0xab, 0x12, 0x34]).unwrap();

        assert_eq!(cpu.fetch_byte().unwrap(), 0xab);
        assert_eq!(cpu.ip(), 1);
        assert_eq!(cpu.fetch_word().unwrap(), 0x1234);
        assert_eq!(cpu.ip(), 3);
    }

    #[test]
    fn test_register_by_name() {
        let mut cpu = Cpu::default();
        cpu.set_register_by_name("r5", 0x5555).unwrap();

        assert_eq!(cpu.get_register(Register::R5), 0x5555);
        assert_eq!(cpu.get_register_by_name("R5").unwrap(), 0x5555);
        assert_eq!(
            cpu.get_register_by_name("pc"),
            Err(UnknownRegister("pc".to_string()))
        );
        assert!(cpu.set_register_by_name("r0", 1).is_err());
    }

    #[test]
    fn test_mov_reg_reg_and_mem() {
        let mut program = ProgramBuilder::new();
        program
            .mov_lit_reg(0x0bad, Register::R3)
            .mov_reg_reg(Register::R3, Register::R7)
            .mov_reg_mem(Register::R7, 0x0200)
            .mov_mem_reg(0x0200, Register::R1)
            .hlt();
        let mut cpu = cpu_with(&program);

        assert_eq!(cpu.run_until_halt().unwrap(), 5);
        assert_eq!(cpu.get_register(Register::R7), 0x0bad);
        assert_eq!(cpu.get_register(Register::R1), 0x0bad);
        assert_eq!(cpu.peek_memory(0x0200).unwrap(), 0x0bad);
    }

    #[test]
    fn test_selector_wraps_past_register_count() {
        // 14 % 12 selects R1
        let mut cpu = Cpu::default();
        cpu.load_image(0, &[Opcode::MovLitReg.byte(), 0x12, 0x34, 14]).unwrap();
        cpu.step().unwrap();

        assert_eq!(cpu.get_register(Register::R1), 0x1234);
    }

    #[test]
    fn test_mov_from_ip_reads_after_fetch() {
        let mut program = ProgramBuilder::new();
        program.mov_reg_reg(Register::Ip, Register::R1);
        let mut cpu = cpu_with(&program);
        cpu.step().unwrap();

        assert_eq!(cpu.get_register(Register::R1), 3);
    }

    #[test]
    fn test_add_wraps() {
        let mut program = ProgramBuilder::new();
        program
            .mov_lit_reg(0xffff, Register::R1)
            .mov_lit_reg(0x0002, Register::R2)
            .add_reg_reg(Register::R1, Register::R2);
        let mut cpu = cpu_with(&program);
        cpu.run_for(3).unwrap();

        assert_eq!(cpu.get_register(Register::Acc), 0x0001);
    }

    #[test]
    fn test_add_raw_index_out_of_bank() {
        let mut cpu = Cpu::default();
        cpu.load_image(0, &[Opcode::AddRegReg.byte(), 2, 14]).unwrap();

        let err = cpu.step().unwrap_err();
        assert!(matches!(err, CpuError::Memory(MemoryError::OutOfBounds { offset: 28, .. })));
        assert_eq!(cpu.state, CpuState::Faulted);
    }

    #[test]
    fn test_jmp_not_eq_falls_through_on_equal() {
        let mut program = ProgramBuilder::new();
        program.jmp_not_eq(0x0000, 0x4000).hlt();
        let mut cpu = cpu_with(&program);

        cpu.step().unwrap();
        assert_eq!(cpu.ip(), 5);

        cpu.set_register(Register::Acc, 7);
        cpu.set_register(Register::Ip, 0);
        cpu.step().unwrap();
        assert_eq!(cpu.ip(), 0x4000);
    }

    #[test]
    fn test_strict_policy_faults_and_rolls_back() {
        let mut program = ProgramBuilder::new();
        program.mov_lit_reg(0x0001, Register::R1).byte(0x00);
        let mut cpu = cpu_with(&program);

        cpu.step().unwrap();
        let err = cpu.step().unwrap_err();

        assert_eq!(err, CpuError::IllegalInstruction { opcode: 0x00, address: 4 });
        assert_eq!(cpu.ip(), 4);
        assert_eq!(cpu.cycles, 1);
        assert_eq!(cpu.state, CpuState::Faulted);
        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Faulted)));
    }

    #[test]
    fn test_permissive_policy_skips() {
        let mut cpu = Cpu::new(&MachineConfig::permissive()).unwrap();
        cpu.load_image(0, &[0x00, 0x42, Opcode::Hlt.byte()]).unwrap();

        assert_eq!(cpu.step().unwrap(), Step::Skipped(0x00));
        assert_eq!(cpu.step().unwrap(), Step::Skipped(0x42));
        assert_eq!(cpu.step().unwrap(), Step::Executed(Opcode::Hlt));
        assert!(cpu.is_halted());
        assert_eq!(cpu.cycles, 3);
        assert_eq!(cpu.last_opcode(), Some(Opcode::Hlt));
    }

    #[test]
    fn test_fault_rolls_back_partial_operands() {
        // Operand fetch succeeds, then the memory write goes out of range
        let mut cpu = Cpu::new(&MachineConfig::default().with_memory_size(64)).unwrap();
        let mut program = ProgramBuilder::new();
        program.mov_reg_mem(Register::R1, 0x0100);
        cpu.load_program(&program.build()).unwrap();

        assert!(matches!(cpu.step(), Err(CpuError::Memory(_))));
        assert_eq!(cpu.ip(), 0);
    }

    #[test]
    fn test_fetch_past_end_of_memory() {
        let mut cpu = Cpu::new(&MachineConfig::permissive().with_memory_size(4)).unwrap();
        cpu.set_register(Register::Ip, 3);

        assert!(cpu.step().is_ok());
        assert!(matches!(cpu.step(), Err(CpuError::Memory(_))));
    }

    #[test]
    fn test_run_for_stops_on_halt() {
        let mut program = ProgramBuilder::new();
        program.push_lit(1).hlt().push_lit(2);
        let mut cpu = cpu_with(&program);

        assert_eq!(cpu.run_for(10).unwrap(), 2);
        assert!(cpu.is_halted());
        assert_eq!(cpu.run_for(10), Ok(0));
    }

    #[test]
    fn test_run_for_huge_limit_after_steps() {
        let mut program = ProgramBuilder::new();
        program.push_lit(1).push_lit(2).hlt();
        let mut cpu = cpu_with(&program);
        cpu.step().unwrap();

        assert_eq!(cpu.run_for(u64::MAX).unwrap(), 2);
        assert!(cpu.is_halted());
        assert_eq!(cpu.cycles, 3);
    }

    #[test]
    fn test_set_policy() {
        let mut cpu = Cpu::default();
        cpu.load_image(0, &[0x00, 0x00]).unwrap();
        assert_eq!(cpu.policy(), OpcodePolicy::Strict);

        cpu.set_policy(OpcodePolicy::Permissive);
        assert_eq!(cpu.policy(), OpcodePolicy::Permissive);
        assert_eq!(cpu.step().unwrap(), Step::Skipped(0x00));

        cpu.set_policy(OpcodePolicy::Strict);
        assert_eq!(
            cpu.step(),
            Err(CpuError::IllegalInstruction { opcode: 0x00, address: 1 })
        );
    }

    #[test]
    fn test_reset() {
        let mut program = ProgramBuilder::new();
        program.push_lit(0x1111).hlt();
        let mut cpu = cpu_with(&program);
        cpu.run_until_halt().unwrap();

        cpu.reset();

        assert!(cpu.is_running());
        assert_eq!(cpu.cycles, 0);
        assert_eq!(cpu.sp(), 0xfffe);
        assert_eq!(cpu.frame_bytes(), 0);
        assert_eq!(cpu.mem.read_byte(0).unwrap(), 0);
    }
}
