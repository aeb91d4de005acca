//! Instruction decoder for the FRISC instruction set.
//!
//! Decoding is a pure, total function over 32-bit words: every word either
//! maps to exactly one [`DecodedInstruction`] or to a [`DecodeError`].
//! [`DecodedInstruction::encode`] produces the canonical word for a decoded
//! instruction, with every field the opcode ignores left at zero.

use crate::encoding::{
    condition_field, opcode_field, Condition, Opcode, CONDITION_SHIFT, OPCODE_SHIFT,
};
use crate::memory::AccessWidth;
use crate::state::GeneralRegister;
use crate::DecodeError;

/// Immediate-vs-register selector bit.
const IMMEDIATE_BIT: u32 = 1 << 26;
/// `MOVE` source-is-`SR` bit.
const MOVE_SOURCE_SR_BIT: u32 = 1 << 21;
/// `MOVE` destination-is-`SR` bit.
const MOVE_TARGET_SR_BIT: u32 = 1 << 20;
/// Destination or transfer register field `[25:23]`.
const DEST_SHIFT: u32 = 23;
/// First source or base register field `[22:20]`.
const SRC1_SHIFT: u32 = 20;
/// Second source register field `[19:17]`.
const SRC2_SHIFT: u32 = 17;
/// 20-bit immediate field `[19:0]`.
const IMMEDIATE_MASK: u32 = 0x000F_FFFF;
/// Smallest value a 20-bit immediate holds after sign extension.
pub const IMMEDIATE_MIN: i32 = -(1 << 19);
/// Largest value a 20-bit immediate holds after sign extension.
pub const IMMEDIATE_MAX: i32 = (1 << 19) - 1;

/// Register-or-immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// General register.
    Register(GeneralRegister),
    /// Sign-extended 20-bit immediate.
    Immediate(i32),
}

/// `MOVE` source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveSource {
    /// General register.
    Register(GeneralRegister),
    /// Sign-extended 20-bit immediate.
    Immediate(i32),
    /// Low 8 bits of `SR`.
    StatusRegister,
}

/// `MOVE` destination operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveTarget {
    /// General register, full 32-bit transfer.
    Register(GeneralRegister),
    /// `SR`, low 8 bits only.
    StatusRegister,
}

/// Load/store effective-address operand: `base + offset`, base `0` if absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryOperand {
    /// Optional base register.
    pub base: Option<GeneralRegister>,
    /// Sign-extended 20-bit offset.
    pub offset: i32,
}

/// `RET` variant selected by bits `[1:0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnKind {
    /// Plain return.
    #[default]
    Plain,
    /// `RETI`: also sets `GIE`.
    Interrupt,
    /// `RETN`: also sets the interrupt-enable flip-flop.
    NonMaskable,
}

impl ReturnKind {
    /// Returns the mnemonic for this return variant.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Plain => "RET",
            Self::Interrupt => "RETI",
            Self::NonMaskable => "RETN",
        }
    }

    const fn from_low_bits(word: u32) -> Self {
        match word & 0b11 {
            0b01 => Self::Interrupt,
            0b11 => Self::NonMaskable,
            _ => Self::Plain,
        }
    }

    const fn low_bits(self) -> u32 {
        match self {
            Self::Plain => 0b00,
            Self::Interrupt => 0b01,
            Self::NonMaskable => 0b11,
        }
    }
}

/// Three-operand ALU operations (`dest = src1 op src2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AluOp {
    Or,
    And,
    Xor,
    Add,
    Adc,
    Sub,
    Sbc,
    Rotl,
    Rotr,
    Shl,
    Shr,
    Ashr,
}

impl AluOp {
    /// Returns the opcode that encodes this operation.
    #[must_use]
    pub const fn opcode(self) -> Opcode {
        match self {
            Self::Or => Opcode::Or,
            Self::And => Opcode::And,
            Self::Xor => Opcode::Xor,
            Self::Add => Opcode::Add,
            Self::Adc => Opcode::Adc,
            Self::Sub => Opcode::Sub,
            Self::Sbc => Opcode::Sbc,
            Self::Rotl => Opcode::Rotl,
            Self::Rotr => Opcode::Rotr,
            Self::Shl => Opcode::Shl,
            Self::Shr => Opcode::Shr,
            Self::Ashr => Opcode::Ashr,
        }
    }

    const fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Or => Some(Self::Or),
            Opcode::And => Some(Self::And),
            Opcode::Xor => Some(Self::Xor),
            Opcode::Add => Some(Self::Add),
            Opcode::Adc => Some(Self::Adc),
            Opcode::Sub => Some(Self::Sub),
            Opcode::Sbc => Some(Self::Sbc),
            Opcode::Rotl => Some(Self::Rotl),
            Opcode::Rotr => Some(Self::Rotr),
            Opcode::Shl => Some(Self::Shl),
            Opcode::Shr => Some(Self::Shr),
            Opcode::Ashr => Some(Self::Ashr),
            _ => None,
        }
    }
}

/// A fully decoded instruction with its exact operand set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodedInstruction {
    /// Register, immediate or `SR` transfer.
    Move {
        /// Source operand.
        src: MoveSource,
        /// Destination operand.
        dest: MoveTarget,
    },
    /// Arithmetic, logic, shift or rotate.
    Alu {
        /// Operation.
        op: AluOp,
        /// Destination register.
        dest: GeneralRegister,
        /// First source register.
        src1: GeneralRegister,
        /// Second source operand.
        src2: Operand,
    },
    /// Flag-only subtraction.
    Cmp {
        /// Minuend register.
        src1: GeneralRegister,
        /// Subtrahend operand.
        src2: Operand,
    },
    /// Memory to register.
    Load {
        /// Access width.
        width: AccessWidth,
        /// Destination register.
        reg: GeneralRegister,
        /// Effective address operand.
        addr: MemoryOperand,
    },
    /// Register to memory.
    Store {
        /// Access width.
        width: AccessWidth,
        /// Source register.
        reg: GeneralRegister,
        /// Effective address operand.
        addr: MemoryOperand,
    },
    /// Pre-decrement `R7` and store.
    Push {
        /// Source register.
        reg: GeneralRegister,
    },
    /// Load and post-increment `R7`.
    Pop {
        /// Destination register.
        reg: GeneralRegister,
    },
    /// Absolute jump.
    Jp {
        /// Condition.
        cond: Condition,
        /// Target address operand.
        target: Operand,
    },
    /// Absolute call.
    Call {
        /// Condition.
        cond: Condition,
        /// Target address operand.
        target: Operand,
    },
    /// PC-relative jump.
    Jr {
        /// Condition.
        cond: Condition,
        /// Signed byte offset from this instruction.
        offset: i32,
    },
    /// Return, optionally restoring interrupt state.
    Ret {
        /// Condition.
        cond: Condition,
        /// Return variant.
        kind: ReturnKind,
    },
    /// Stop the run loop.
    Halt {
        /// Condition.
        cond: Condition,
    },
}

#[allow(clippy::cast_possible_wrap)]
const fn sign_extend_20(word: u32) -> i32 {
    (((word & IMMEDIATE_MASK) << 12) as i32) >> 12
}

#[allow(clippy::cast_sign_loss)]
const fn immediate_bits(value: i32) -> u32 {
    (value as u32) & IMMEDIATE_MASK
}

const fn condition_bits(cond: Condition) -> u32 {
    (cond.bits() as u32) << CONDITION_SHIFT
}

const fn reg_at(word: u32, shift: u32) -> GeneralRegister {
    GeneralRegister::from_u3(word >> shift)
}

const fn operand(word: u32) -> Operand {
    if word & IMMEDIATE_BIT == 0 {
        Operand::Register(reg_at(word, SRC2_SHIFT))
    } else {
        Operand::Immediate(sign_extend_20(word))
    }
}

const fn encode_operand(src: Operand) -> u32 {
    match src {
        Operand::Register(reg) => reg.bits() << SRC2_SHIFT,
        Operand::Immediate(value) => IMMEDIATE_BIT | immediate_bits(value),
    }
}

const fn memory_operand(word: u32) -> MemoryOperand {
    MemoryOperand {
        base: if word & IMMEDIATE_BIT == 0 {
            None
        } else {
            Some(reg_at(word, SRC1_SHIFT))
        },
        offset: sign_extend_20(word),
    }
}

const fn encode_memory_operand(addr: MemoryOperand) -> u32 {
    let base = match addr.base {
        Some(reg) => IMMEDIATE_BIT | (reg.bits() << SRC1_SHIFT),
        None => 0,
    };
    base | immediate_bits(addr.offset)
}

const fn condition(word: u32) -> Result<Condition, DecodeError> {
    let code = condition_field(word);
    match Condition::from_u4(code) {
        Some(cond) => Ok(cond),
        None => Err(DecodeError::UndefinedCondition { word, code }),
    }
}

/// Decodes one instruction word.
///
/// # Errors
///
/// Returns [`DecodeError::UnknownOpcode`] for unassigned opcodes and
/// [`DecodeError::UndefinedCondition`] for control-flow words whose condition
/// field is `1111`.
pub const fn decode(word: u32) -> Result<DecodedInstruction, DecodeError> {
    let Some(opcode) = Opcode::from_u5(opcode_field(word)) else {
        return Err(DecodeError::UnknownOpcode { word });
    };

    if let Some(op) = AluOp::from_opcode(opcode) {
        return Ok(DecodedInstruction::Alu {
            op,
            dest: reg_at(word, DEST_SHIFT),
            src1: reg_at(word, SRC1_SHIFT),
            src2: operand(word),
        });
    }

    let decoded = match opcode {
        Opcode::Move => {
            let src = if word & MOVE_SOURCE_SR_BIT != 0 {
                MoveSource::StatusRegister
            } else if word & IMMEDIATE_BIT != 0 {
                MoveSource::Immediate(sign_extend_20(word))
            } else {
                MoveSource::Register(reg_at(word, SRC2_SHIFT))
            };
            let dest = if word & MOVE_TARGET_SR_BIT != 0 {
                MoveTarget::StatusRegister
            } else {
                MoveTarget::Register(reg_at(word, DEST_SHIFT))
            };
            DecodedInstruction::Move { src, dest }
        }
        Opcode::Cmp => DecodedInstruction::Cmp {
            src1: reg_at(word, SRC1_SHIFT),
            src2: operand(word),
        },
        Opcode::Loadb | Opcode::Loadh | Opcode::Load => DecodedInstruction::Load {
            width: match opcode {
                Opcode::Loadb => AccessWidth::Byte,
                Opcode::Loadh => AccessWidth::Half,
                _ => AccessWidth::Word,
            },
            reg: reg_at(word, DEST_SHIFT),
            addr: memory_operand(word),
        },
        Opcode::Storeb | Opcode::Storeh | Opcode::Store => DecodedInstruction::Store {
            width: match opcode {
                Opcode::Storeb => AccessWidth::Byte,
                Opcode::Storeh => AccessWidth::Half,
                _ => AccessWidth::Word,
            },
            reg: reg_at(word, DEST_SHIFT),
            addr: memory_operand(word),
        },
        Opcode::Push => DecodedInstruction::Push {
            reg: reg_at(word, DEST_SHIFT),
        },
        Opcode::Pop => DecodedInstruction::Pop {
            reg: reg_at(word, DEST_SHIFT),
        },
        Opcode::Jp | Opcode::Call | Opcode::Jr | Opcode::Ret | Opcode::Halt => {
            let cond = match condition(word) {
                Ok(cond) => cond,
                Err(err) => return Err(err),
            };
            match opcode {
                Opcode::Jp => DecodedInstruction::Jp {
                    cond,
                    target: operand(word),
                },
                Opcode::Call => DecodedInstruction::Call {
                    cond,
                    target: operand(word),
                },
                Opcode::Jr => DecodedInstruction::Jr {
                    cond,
                    offset: sign_extend_20(word),
                },
                Opcode::Ret => DecodedInstruction::Ret {
                    cond,
                    kind: ReturnKind::from_low_bits(word),
                },
                _ => DecodedInstruction::Halt { cond },
            }
        }
        // ALU opcodes returned above.
        _ => return Err(DecodeError::UnknownOpcode { word }),
    };

    Ok(decoded)
}

impl DecodedInstruction {
    /// Returns the opcode of this instruction.
    #[must_use]
    pub const fn opcode(self) -> Opcode {
        match self {
            Self::Move { .. } => Opcode::Move,
            Self::Alu { op, .. } => op.opcode(),
            Self::Cmp { .. } => Opcode::Cmp,
            Self::Load { width, .. } => match width {
                AccessWidth::Byte => Opcode::Loadb,
                AccessWidth::Half => Opcode::Loadh,
                AccessWidth::Word => Opcode::Load,
            },
            Self::Store { width, .. } => match width {
                AccessWidth::Byte => Opcode::Storeb,
                AccessWidth::Half => Opcode::Storeh,
                AccessWidth::Word => Opcode::Store,
            },
            Self::Push { .. } => Opcode::Push,
            Self::Pop { .. } => Opcode::Pop,
            Self::Jp { .. } => Opcode::Jp,
            Self::Call { .. } => Opcode::Call,
            Self::Jr { .. } => Opcode::Jr,
            Self::Ret { .. } => Opcode::Ret,
            Self::Halt { .. } => Opcode::Halt,
        }
    }

    /// Returns the condition of a control-flow instruction.
    #[must_use]
    pub const fn condition(self) -> Option<Condition> {
        match self {
            Self::Jp { cond, .. }
            | Self::Call { cond, .. }
            | Self::Jr { cond, .. }
            | Self::Ret { cond, .. }
            | Self::Halt { cond } => Some(cond),
            _ => None,
        }
    }

    /// Produces the canonical instruction word.
    ///
    /// Immediates outside the 20-bit signed range are truncated to their low
    /// 20 bits.
    #[must_use]
    pub const fn encode(self) -> u32 {
        let fields = match self {
            Self::Move { src, dest } => {
                let src_bits = match src {
                    MoveSource::Register(reg) => reg.bits() << SRC2_SHIFT,
                    MoveSource::Immediate(value) => IMMEDIATE_BIT | immediate_bits(value),
                    MoveSource::StatusRegister => MOVE_SOURCE_SR_BIT,
                };
                let dest_bits = match dest {
                    MoveTarget::Register(reg) => reg.bits() << DEST_SHIFT,
                    MoveTarget::StatusRegister => MOVE_TARGET_SR_BIT,
                };
                src_bits | dest_bits
            }
            Self::Alu {
                dest, src1, src2, ..
            } => (dest.bits() << DEST_SHIFT) | (src1.bits() << SRC1_SHIFT) | encode_operand(src2),
            Self::Cmp { src1, src2 } => (src1.bits() << SRC1_SHIFT) | encode_operand(src2),
            Self::Load { reg, addr, .. } | Self::Store { reg, addr, .. } => {
                (reg.bits() << DEST_SHIFT) | encode_memory_operand(addr)
            }
            Self::Push { reg } | Self::Pop { reg } => reg.bits() << DEST_SHIFT,
            Self::Jp { cond, target } | Self::Call { cond, target } => {
                condition_bits(cond) | encode_operand(target)
            }
            Self::Jr { cond, offset } => {
                condition_bits(cond) | immediate_bits(offset)
            }
            Self::Ret { cond, kind } => condition_bits(cond) | kind.low_bits(),
            Self::Halt { cond } => condition_bits(cond),
        };

        ((self.opcode().bits() as u32) << OPCODE_SHIFT) | fields
    }
}

#[cfg(test)]
mod tests {
    use super::{
        decode, AluOp, DecodedInstruction, MemoryOperand, MoveSource, MoveTarget, Operand,
        ReturnKind, IMMEDIATE_MAX, IMMEDIATE_MIN,
    };
    use crate::encoding::Condition;
    use crate::memory::AccessWidth;
    use crate::state::GeneralRegister;
    use crate::DecodeError;

    #[test]
    fn add_immediate_decodes_sign_extended_operand() {
        // ADD R0, -1, R2
        let word = 0x2400_0000 | (2 << 23) | 0x000F_FFFF;
        assert_eq!(
            decode(word),
            Ok(DecodedInstruction::Alu {
                op: AluOp::Add,
                dest: GeneralRegister::R2,
                src1: GeneralRegister::R0,
                src2: Operand::Immediate(-1),
            })
        );
    }

    #[test]
    fn alu_register_form_reads_second_source_field() {
        // SUB R1, R4, R6
        let word = (0b00110 << 27) | (6 << 23) | (1 << 20) | (4 << 17);
        assert_eq!(
            decode(word),
            Ok(DecodedInstruction::Alu {
                op: AluOp::Sub,
                dest: GeneralRegister::R6,
                src1: GeneralRegister::R1,
                src2: Operand::Register(GeneralRegister::R4),
            })
        );
    }

    #[test]
    fn move_forms_decode_status_register_aliases() {
        let sr_to_reg = (1 << 21) | (3 << 23);
        assert_eq!(
            decode(sr_to_reg),
            Ok(DecodedInstruction::Move {
                src: MoveSource::StatusRegister,
                dest: MoveTarget::Register(GeneralRegister::R3),
            })
        );

        // SR source wins over the immediate selector.
        let sr_with_imm_bit = (1 << 26) | (1 << 21) | (1 << 20) | 0x55;
        assert_eq!(
            decode(sr_with_imm_bit),
            Ok(DecodedInstruction::Move {
                src: MoveSource::StatusRegister,
                dest: MoveTarget::StatusRegister,
            })
        );

        let imm_to_sr = (1 << 26) | (1 << 20) | 0x80;
        assert_eq!(
            decode(imm_to_sr),
            Ok(DecodedInstruction::Move {
                src: MoveSource::Immediate(0x80),
                dest: MoveTarget::StatusRegister,
            })
        );
    }

    #[test]
    fn load_store_addressing_modes() {
        // LOAD R1, (0x100)
        let absolute = (0b10110 << 27) | (1 << 23) | 0x100;
        assert_eq!(
            decode(absolute),
            Ok(DecodedInstruction::Load {
                width: AccessWidth::Word,
                reg: GeneralRegister::R1,
                addr: MemoryOperand {
                    base: None,
                    offset: 0x100,
                },
            })
        );

        // STOREB R2, (R5-4)
        let based = (0b10011 << 27) | (1 << 26) | (2 << 23) | (5 << 20) | 0x000F_FFFC;
        assert_eq!(
            decode(based),
            Ok(DecodedInstruction::Store {
                width: AccessWidth::Byte,
                reg: GeneralRegister::R2,
                addr: MemoryOperand {
                    base: Some(GeneralRegister::R5),
                    offset: -4,
                },
            })
        );
    }

    #[test]
    fn ret_variants_follow_low_bits() {
        let base = 0b11011 << 27;
        let kinds = [
            (0b00, ReturnKind::Plain),
            (0b01, ReturnKind::Interrupt),
            (0b10, ReturnKind::Plain),
            (0b11, ReturnKind::NonMaskable),
        ];
        for (bits, kind) in kinds {
            assert_eq!(
                decode(base | bits),
                Ok(DecodedInstruction::Ret {
                    cond: Condition::Always,
                    kind,
                })
            );
        }
    }

    #[test]
    fn control_flow_rejects_undefined_condition() {
        for opcode in [0b11000_u32, 0b11001, 0b11010, 0b11011, 0b11111] {
            let word = (opcode << 27) | (0xF << 22);
            assert_eq!(
                decode(word),
                Err(DecodeError::UndefinedCondition { word, code: 0xF })
            );
        }
    }

    #[test]
    fn non_control_opcodes_ignore_condition_bits() {
        // Bits [25:22] overlap the destination field for ALU ops.
        let word = (0b00100 << 27) | (0xF << 22);
        assert!(decode(word).is_ok());
    }

    #[test]
    fn reserved_opcode_is_rejected() {
        for opcode in [0b01110_u32, 0b01111, 0b11100, 0b11101, 0b11110] {
            let word = (opcode << 27) | 0x1234;
            assert_eq!(decode(word), Err(DecodeError::UnknownOpcode { word }));
        }
    }

    #[test]
    fn jr_offset_is_sign_extended() {
        let word = (0b11010 << 27) | (7 << 22) | 0x000F_FFF8;
        assert_eq!(
            decode(word),
            Ok(DecodedInstruction::Jr {
                cond: Condition::Zero,
                offset: -8,
            })
        );
    }

    #[test]
    fn canonical_encode_round_trips_extremes() {
        let samples = [
            DecodedInstruction::Move {
                src: MoveSource::Immediate(IMMEDIATE_MIN),
                dest: MoveTarget::Register(GeneralRegister::R7),
            },
            DecodedInstruction::Cmp {
                src1: GeneralRegister::R7,
                src2: Operand::Immediate(IMMEDIATE_MAX),
            },
            DecodedInstruction::Call {
                cond: Condition::SignedGreater,
                target: Operand::Register(GeneralRegister::R3),
            },
            DecodedInstruction::Halt {
                cond: Condition::NotZero,
            },
            DecodedInstruction::Pop {
                reg: GeneralRegister::R4,
            },
        ];
        for instr in samples {
            assert_eq!(decode(instr.encode()), Ok(instr), "{instr:?}");
        }
    }

    #[test]
    fn opcode_and_condition_accessors() {
        let instr = DecodedInstruction::Load {
            width: AccessWidth::Half,
            reg: GeneralRegister::R0,
            addr: MemoryOperand {
                base: None,
                offset: 0,
            },
        };
        assert_eq!(instr.opcode().mnemonic(), "LOADH");
        assert_eq!(instr.condition(), None);
        assert_eq!(
            DecodedInstruction::Halt {
                cond: Condition::Carry
            }
            .condition(),
            Some(Condition::Carry)
        );
    }
}
