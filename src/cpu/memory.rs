//! Byte-addressable memory.
//!
//! A flat buffer of bytes with big-endian 16-bit word access. The same type
//! backs both main memory and the register bank.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// A fixed-size contiguous byte store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Create a zeroed memory of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Size of the memory in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the memory has no bytes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read a single byte.
    #[inline]
    pub fn read_byte(&self, offset: usize) -> Result<u8, MemoryError> {
        self.check(offset, 1)?;
        Ok(self.bytes[offset])
    }

    /// Write a single byte.
    #[inline]
    pub fn write_byte(&mut self, offset: usize, value: u8) -> Result<(), MemoryError> {
        self.check(offset, 1)?;
        self.bytes[offset] = value;
        Ok(())
    }

    /// Read a big-endian word. The byte at `offset` is the high byte.
    #[inline]
    pub fn read_word(&self, offset: usize) -> Result<u16, MemoryError> {
        self.check(offset, 2)?;
        Ok(u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]]))
    }

    /// Write a big-endian word.
    #[inline]
    pub fn write_word(&mut self, offset: usize, value: u16) -> Result<(), MemoryError> {
        self.check(offset, 2)?;
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Copy a block of bytes into memory starting at `offset`.
    ///
    /// Nothing is written if the block does not fit.
    pub fn load(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        self.check(offset, data.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8], MemoryError> {
        self.check(offset, len)?;
        Ok(&self.bytes[offset..offset + len])
    }

    /// The whole buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Zero every byte.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    fn check(&self, offset: usize, size: usize) -> Result<(), MemoryError> {
        match offset.checked_add(size) {
            Some(end) if end <= self.bytes.len() => Ok(()),
            _ => Err(MemoryError::OutOfBounds {
                offset,
                size,
                len: self.bytes.len(),
            }),
        }
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero bytes, a 64K dump is useless in debug output
        let non_zero = self.bytes.iter().filter(|b| **b != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_bytes", &non_zero)
            .field("total_bytes", &self.bytes.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Access touches bytes past the end of the buffer.
    #[error("access of {size} byte(s) at offset {offset:#06x} is outside memory of {len} bytes")]
    OutOfBounds { offset: usize, size: usize, len: usize },
}
