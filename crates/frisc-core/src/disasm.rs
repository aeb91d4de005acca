//! Instruction disassembly for debugging and trace output.
//!
//! Operands follow assembler order (`ADD src1, src2, dest`). Immediates are
//! printed in hex and `JR` offsets are resolved to absolute targets.

use core::fmt::{self, Write as _};

use crate::decoder::{decode, DecodedInstruction, MemoryOperand, MoveSource, MoveTarget, Operand};
use crate::execute::INSTRUCTION_BYTES;
use crate::memory::Bus;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single disassembled instruction row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisassemblyRow {
    /// Address of the instruction word.
    pub addr: u32,
    /// Raw instruction word.
    pub word: u32,
    /// Mnemonic including any condition suffix (e.g. `JP_Z`).
    pub mnemonic: String,
    /// Formatted operands.
    pub operands: String,
    /// Whether the word failed to decode.
    pub is_illegal: bool,
}

impl fmt::Display for DisassemblyRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}  {:08X}  {}", self.addr, self.word, self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands)?;
        }
        Ok(())
    }
}

/// Disassembles the word fetched from `addr`.
#[must_use]
pub fn disassemble(addr: u32, word: u32) -> DisassemblyRow {
    match decode(word) {
        Ok(instr) => DisassemblyRow {
            addr,
            word,
            mnemonic: mnemonic(instr),
            operands: operands(instr, addr),
            is_illegal: false,
        },
        Err(_) => DisassemblyRow {
            addr,
            word,
            mnemonic: ".word".to_owned(),
            operands: format!("{word:#010x} ; ILLEGAL"),
            is_illegal: true,
        },
    }
}

/// Disassembles `before` words before `center_pc`, the word at `center_pc`
/// and `after` words following it.
///
/// Addresses the bus cannot read are skipped.
#[must_use]
pub fn disassemble_window(
    bus: &Bus,
    center_pc: u32,
    before: u32,
    after: u32,
) -> Vec<DisassemblyRow> {
    let center = center_pc & !(INSTRUCTION_BYTES - 1);
    let first = center.saturating_sub(before.saturating_mul(INSTRUCTION_BYTES));
    let last = center.saturating_add(after.saturating_mul(INSTRUCTION_BYTES));

    (first..=last)
        .step_by(INSTRUCTION_BYTES as usize)
        .filter_map(|addr| bus.read_word(addr).ok().map(|word| disassemble(addr, word)))
        .collect()
}

fn mnemonic(instr: DecodedInstruction) -> String {
    let base = match instr {
        DecodedInstruction::Ret { kind, .. } => kind.mnemonic(),
        other => other.opcode().mnemonic(),
    };
    let suffix = instr.condition().map_or("", |cond| cond.suffix());
    format!("{base}{suffix}")
}

fn immediate(value: i32) -> String {
    if value < 0 {
        format!("-{:#X}", value.unsigned_abs())
    } else {
        format!("{value:#X}")
    }
}

fn operand(src: Operand) -> String {
    match src {
        Operand::Register(reg) => reg.to_string(),
        Operand::Immediate(value) => immediate(value),
    }
}

fn memory_operand(addr: MemoryOperand) -> String {
    match addr.base {
        None => format!("({})", immediate(addr.offset)),
        Some(reg) if addr.offset == 0 => format!("({reg})"),
        Some(reg) if addr.offset < 0 => format!("({reg}{})", immediate(addr.offset)),
        Some(reg) => format!("({reg}+{})", immediate(addr.offset)),
    }
}

fn jump_target(target: Operand) -> String {
    match target {
        Operand::Register(reg) => format!("({reg})"),
        Operand::Immediate(value) => immediate(value),
    }
}

#[allow(clippy::cast_sign_loss)]
fn operands(instr: DecodedInstruction, addr: u32) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = match instr {
        DecodedInstruction::Move { src, dest } => {
            let src = match src {
                MoveSource::Register(reg) => reg.to_string(),
                MoveSource::Immediate(value) => immediate(value),
                MoveSource::StatusRegister => "SR".to_owned(),
            };
            let dest = match dest {
                MoveTarget::Register(reg) => reg.to_string(),
                MoveTarget::StatusRegister => "SR".to_owned(),
            };
            write!(out, "{src}, {dest}")
        }
        DecodedInstruction::Alu {
            dest, src1, src2, ..
        } => write!(out, "{src1}, {}, {dest}", operand(src2)),
        DecodedInstruction::Cmp { src1, src2 } => write!(out, "{src1}, {}", operand(src2)),
        DecodedInstruction::Load { reg, addr, .. }
        | DecodedInstruction::Store { reg, addr, .. } => {
            write!(out, "{reg}, {}", memory_operand(addr))
        }
        DecodedInstruction::Push { reg } | DecodedInstruction::Pop { reg } => write!(out, "{reg}"),
        DecodedInstruction::Jp { target, .. } | DecodedInstruction::Call { target, .. } => {
            write!(out, "{}", jump_target(target))
        }
        DecodedInstruction::Jr { offset, .. } => {
            write!(out, "{:#X}", addr.wrapping_add(offset as u32) & !3)
        }
        DecodedInstruction::Ret { .. } | DecodedInstruction::Halt { .. } => Ok(()),
    };
    out
}
