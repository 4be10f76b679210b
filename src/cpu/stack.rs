//! Stack and subroutine linkage.
//!
//! The stack starts at the top of memory and grows toward lower addresses:
//! a push writes at SP and then moves SP down one word, a pop moves SP up
//! one word and reads there. SP therefore always points at the next free
//! slot.
//!
//! A call saves the caller's state as a frame:
//!
//! ```text
//!   higher addresses
//!   | argN .. arg1    |  pushed by the caller
//!   | arg count       |  pushed by the caller
//!   | R1 .. R8        |  8 words
//!   | return address  |
//!   | frame size      |  <- FP + 2
//!   | (next free)     |  <- FP == SP after the call
//!   lower addresses
//! ```
//!
//! The frame size is the running count of bytes pushed since the previous
//! call/return boundary, taken after the state words went on and including
//! the frame-size word itself. Return uses it to recover the caller's FP.

use crate::cpu::execute::{Cpu, CpuError};
use crate::cpu::memory::MemoryError;
use crate::cpu::registers::Register;

/// Words a call pushes on top of the caller's arguments.
pub const FRAME_WORDS: u16 = 10;

impl Cpu {
    /// Push a word onto the stack.
    pub fn push(&mut self, value: u16) -> Result<(), CpuError> {
        let sp = self.regs.get(Register::Sp);
        self.mem.write_word(sp as usize, value)?;
        self.regs.set(Register::Sp, sp.wrapping_sub(2));
        self.frame_bytes = self.frame_bytes.wrapping_add(2);
        Ok(())
    }

    /// Pop a word off the stack.
    pub fn pop(&mut self) -> Result<u16, CpuError> {
        let sp = self.regs.get(Register::Sp).wrapping_add(2);
        self.frame_bytes = self.frame_bytes.wrapping_sub(2);
        self.regs.set(Register::Sp, sp);
        Ok(self.mem.read_word(sp as usize)?)
    }

    /// Check that `words` consecutive pushes from the current SP all land
    /// in memory, following SP wrap-around the same way `push` does.
    fn check_stack_room(&self, words: u16) -> Result<(), MemoryError> {
        let sp = self.regs.get(Register::Sp);
        let len = self.mem.len();
        for i in 0..words {
            let slot = sp.wrapping_sub(i * 2) as usize;
            if slot + 2 > len {
                return Err(MemoryError::OutOfBounds {
                    offset: slot,
                    size: 2,
                    len,
                });
            }
        }
        Ok(())
    }

    /// Save the caller's state and jump to `target`.
    ///
    /// Nothing is written unless the whole frame fits.
    pub(crate) fn call(&mut self, target: u16) -> Result<(), CpuError> {
        self.check_stack_room(FRAME_WORDS)?;

        for reg in Register::GENERAL {
            self.push(self.regs.get(reg))?;
        }
        self.push(self.regs.get(Register::Ip))?;
        // +2 accounts for this push, which the counter has not seen yet
        self.push(self.frame_bytes.wrapping_add(2))?;

        self.regs.set(Register::Fp, self.regs.get(Register::Sp));
        self.frame_bytes = 0;
        self.regs.set(Register::Ip, target);
        Ok(())
    }

    /// Tear down the current frame and resume the caller.
    ///
    /// Also drops the caller's argument list, whose length is the word
    /// just below the saved registers.
    pub(crate) fn ret(&mut self) -> Result<(), CpuError> {
        let frame_base = self.regs.get(Register::Fp);
        self.regs.set(Register::Sp, frame_base);

        let frame_size = self.pop()?;
        self.frame_bytes = frame_size;

        let return_address = self.pop()?;
        self.regs.set(Register::Ip, return_address);

        for reg in Register::GENERAL.iter().rev() {
            let value = self.pop()?;
            self.regs.set(*reg, value);
        }

        let arg_count = self.pop()?;
        for _ in 0..arg_count {
            self.pop()?;
        }

        self.regs.set(Register::Fp, frame_base.wrapping_add(frame_size));
        Ok(())
    }
}
