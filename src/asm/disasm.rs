//! Disassembler.
//!
//! Converts machine code back to readable assembly:
//!
//! ```text
//! mov 0x1234, r1
//! mov acc, &0100
//! add r1, r2
//! jne 0x0003, &0000
//! cal &3000
//! ```
//!
//! Bytes that are not an opcode, or an instruction cut off by the end of the
//! input, come out as `db 0xNN`.

use crate::cpu::decode::{Opcode, Operand};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::Register;

/// Disassemble the instruction at the start of `bytes`.
///
/// Returns the text and the number of bytes consumed, which is at least 1
/// for non-empty input.
pub fn disassemble_instruction(bytes: &[u8]) -> (String, usize) {
    let Some(&first) = bytes.first() else {
        return (String::new(), 0);
    };

    let op = match Opcode::from_byte(first) {
        Some(op) if op.encoded_len() <= bytes.len() => op,
        _ => return (format!("db {:#04x}", first), 1),
    };

    let mut offset = 1;
    let mut operands = Vec::with_capacity(op.operands().len());
    for operand in op.operands() {
        operands.push(format_operand(*operand, &bytes[offset..]));
        offset += operand.width();
    }

    let text = if operands.is_empty() {
        op.mnemonic().to_string()
    } else {
        format!("{} {}", op.mnemonic(), operands.join(", "))
    };
    (text, offset)
}

/// Disassemble the instruction at `address` in memory.
pub fn disassemble_at(mem: &Memory, address: u16) -> Result<(String, usize), MemoryError> {
    let start = address as usize;
    let rest = mem.slice(start, mem.len().saturating_sub(start))?;
    if rest.is_empty() {
        return Err(MemoryError::OutOfBounds {
            offset: start,
            size: 1,
            len: mem.len(),
        });
    }
    Ok(disassemble_instruction(rest))
}

/// Disassemble a block of machine code loaded at `origin`.
pub fn disassemble(bytes: &[u8], origin: u16) -> String {
    let mut output = String::new();
    output.push_str("; vm16 disassembly\n");
    output.push_str("; -----------------\n\n");

    let mut offset = 0;
    while offset < bytes.len() {
        let (text, len) = disassemble_instruction(&bytes[offset..]);
        let address = origin.wrapping_add(offset as u16);
        let raw = bytes[offset..offset + len]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        output.push_str(&format!("{:#06x}: {:<24} ; {}\n", address, text, raw));
        offset += len;
    }

    output
}

/// Format one operand from the start of `bytes`.
fn format_operand(operand: Operand, bytes: &[u8]) -> String {
    match operand {
        Operand::Literal => format!("{:#06x}", word(bytes)),
        Operand::Address => format!("&{:04x}", word(bytes)),
        Operand::Register => Register::from_selector(bytes[0]).to_string(),
        Operand::RegisterIndex => match Register::from_index(bytes[0] as usize) {
            Some(reg) => reg.to_string(),
            None => format!("#{}", bytes[0]),
        },
    }
}

fn word(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}
