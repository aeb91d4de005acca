//! Instruction execution over the register file and the bus.
//!
//! Every instruction follows the same commit order:
//! 1. Read source operands and evaluate the condition
//! 2. Compute the result or effective address
//! 3. Perform bus reads and writes
//! 4. Write the destination register and `SR`
//! 5. Advance `PC`
//!
//! A bus error aborts the instruction before step 4, so a faulting
//! instruction leaves registers unchanged.

mod alu;
mod flags;

pub use alu::{add_three, ashr, rotl, rotr, shift_amount, shl, shr, subtract, AddResult};
pub use flags::{Flags, FlagsUpdate};

use crate::decoder::{
    AluOp, DecodedInstruction, MemoryOperand, MoveSource, MoveTarget, Operand, ReturnKind,
};
use crate::encoding::Condition;
use crate::memory::{AccessWidth, Bus};
use crate::state::{GeneralRegister, RegisterFile, SR_GIE, SR_MOVE_MASK};
use crate::BusError;

/// Size of one instruction word in bytes.
pub const INSTRUCTION_BYTES: u32 = 4;

/// Outcome of executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Instruction retired; the run continues.
    Continue,
    /// A `HALT` whose condition held retired.
    Halt,
}

/// Register and flag changes computed by one instruction, applied only after
/// every bus access succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Commit {
    dest: Option<(GeneralRegister, u32)>,
    sp: Option<u32>,
    sr: Option<u32>,
    flags: FlagsUpdate,
    next_pc: u32,
    set_gie: bool,
    set_interrupt_enable: bool,
    outcome: ExecuteOutcome,
}

impl Commit {
    const fn sequential(pc: u32) -> Self {
        Self {
            dest: None,
            sp: None,
            sr: None,
            flags: FlagsUpdate::None,
            next_pc: pc.wrapping_add(INSTRUCTION_BYTES),
            set_gie: false,
            set_interrupt_enable: false,
            outcome: ExecuteOutcome::Continue,
        }
    }

    const fn write(mut self, reg: GeneralRegister, value: u32) -> Self {
        self.dest = Some((reg, value));
        self
    }

    const fn flags(mut self, flags: FlagsUpdate) -> Self {
        self.flags = flags;
        self
    }

    const fn jump(mut self, target: u32) -> Self {
        self.next_pc = target;
        self
    }

    const fn apply(self, regs: &mut RegisterFile) {
        if let Some(sp) = self.sp {
            regs.set_sp(sp);
        }
        if let Some((reg, value)) = self.dest {
            regs.set_gpr(reg, value);
        }
        if let Some(sr) = self.sr {
            regs.set_sr(sr);
        }
        regs.set_sr(self.flags.apply(regs.sr()));
        if self.set_gie {
            regs.set_sr_bit(SR_GIE, true);
        }
        if self.set_interrupt_enable {
            regs.set_interrupt_enable(true);
        }
        regs.set_pc(self.next_pc);
    }
}

#[allow(clippy::cast_sign_loss)]
const fn immediate(value: i32) -> u32 {
    value as u32
}

const fn operand_value(regs: &RegisterFile, operand: Operand) -> u32 {
    match operand {
        Operand::Register(reg) => regs.gpr(reg),
        Operand::Immediate(value) => immediate(value),
    }
}

/// Computes a load/store address: base (or zero) plus the signed offset,
/// forced to the natural alignment of `width`.
#[must_use]
pub const fn effective_address(
    regs: &RegisterFile,
    addr: MemoryOperand,
    width: AccessWidth,
) -> u32 {
    let base = match addr.base {
        Some(reg) => regs.gpr(reg),
        None => 0,
    };
    width.align(base.wrapping_add(immediate(addr.offset)))
}

const fn word_aligned(addr: u32) -> u32 {
    AccessWidth::Word.align(addr)
}

/// Pushes `value` onto the stack and returns the new stack pointer without
/// committing it.
pub(crate) fn push_word(regs: &RegisterFile, bus: &mut Bus, value: u32) -> Result<u32, BusError> {
    let sp = regs.sp().wrapping_sub(4);
    bus.write_word(word_aligned(sp), value)?;
    Ok(sp)
}

fn pop_word(regs: &RegisterFile, bus: &Bus) -> Result<(u32, u32), BusError> {
    let value = bus.read_word(word_aligned(regs.sp()))?;
    Ok((value, regs.sp().wrapping_add(4)))
}

fn alu(op: AluOp, a: u32, b: u32, sr: u32) -> (u32, Flags) {
    let carry_in = Flags::from_sr(sr).c;
    let logic = |value: u32| (value, Flags::for_result(value, false, false));
    let shifted = |(value, carry): (u32, bool)| (value, Flags::for_result(value, carry, false));
    match op {
        AluOp::Or => logic(a | b),
        AluOp::And => logic(a & b),
        AluOp::Xor => logic(a ^ b),
        AluOp::Add => {
            let sum = add_three(a, b, false);
            (sum.value, sum.flags())
        }
        AluOp::Adc => {
            let sum = add_three(a, b, carry_in);
            (sum.value, sum.flags())
        }
        AluOp::Sub => {
            let diff = subtract(a, b, false);
            (diff.value, diff.flags())
        }
        AluOp::Sbc => {
            let diff = subtract(a, b, carry_in);
            (diff.value, diff.flags())
        }
        AluOp::Rotl => shifted(rotl(a, b)),
        AluOp::Rotr => shifted(rotr(a, b)),
        AluOp::Shl => shifted(shl(a, b)),
        AluOp::Shr => shifted(shr(a, b)),
        AluOp::Ashr => shifted(ashr(a, b)),
    }
}

const fn holds(cond: Condition, regs: &RegisterFile) -> bool {
    cond.evaluate(Flags::from_sr(regs.sr()))
}

/// Executes one decoded instruction fetched from `regs.pc()`.
///
/// # Errors
///
/// Returns a [`BusError`] when a memory access of the instruction is
/// unmapped. Registers are left as they were before the instruction.
pub fn execute(
    instr: DecodedInstruction,
    regs: &mut RegisterFile,
    bus: &mut Bus,
) -> Result<ExecuteOutcome, BusError> {
    let pc = regs.pc();
    let commit = Commit::sequential(pc);

    let commit = match instr {
        DecodedInstruction::Move { src, dest } => {
            let value = match src {
                MoveSource::Register(reg) => regs.gpr(reg),
                MoveSource::Immediate(value) => immediate(value),
                MoveSource::StatusRegister => regs.sr() & SR_MOVE_MASK,
            };
            match dest {
                MoveTarget::Register(reg) => commit
                    .write(reg, value)
                    .flags(FlagsUpdate::NegativeZero(value)),
                MoveTarget::StatusRegister => Commit {
                    sr: Some(value & SR_MOVE_MASK),
                    ..commit
                },
            }
        }
        DecodedInstruction::Alu {
            op,
            dest,
            src1,
            src2,
        } => {
            let (value, flags) = alu(op, regs.gpr(src1), operand_value(regs, src2), regs.sr());
            commit.write(dest, value).flags(FlagsUpdate::All(flags))
        }
        DecodedInstruction::Cmp { src1, src2 } => {
            let diff = subtract(regs.gpr(src1), operand_value(regs, src2), false);
            commit.flags(FlagsUpdate::All(diff.flags()))
        }
        DecodedInstruction::Load { width, reg, addr } => {
            let value = bus.read(effective_address(regs, addr, width), width)?;
            commit.write(reg, value)
        }
        DecodedInstruction::Store { width, reg, addr } => {
            bus.write(effective_address(regs, addr, width), width, regs.gpr(reg))?;
            commit
        }
        DecodedInstruction::Push { reg } => {
            // R7 is decremented before the store.
            let value = match reg {
                GeneralRegister::R7 => regs.sp().wrapping_sub(4),
                _ => regs.gpr(reg),
            };
            Commit {
                sp: Some(push_word(regs, bus, value)?),
                ..commit
            }
        }
        DecodedInstruction::Pop { reg } => {
            let (value, sp) = pop_word(regs, bus)?;
            let value = match reg {
                GeneralRegister::R7 => value.wrapping_add(4),
                _ => value,
            };
            Commit {
                sp: Some(sp),
                ..commit
            }
            .write(reg, value)
        }
        DecodedInstruction::Jp { cond, target } if holds(cond, regs) => {
            commit.jump(word_aligned(operand_value(regs, target)))
        }
        DecodedInstruction::Call { cond, target } if holds(cond, regs) => {
            let target = word_aligned(operand_value(regs, target));
            let sp = push_word(regs, bus, word_aligned(pc))?;
            Commit {
                sp: Some(sp),
                ..commit
            }
            .jump(target)
        }
        DecodedInstruction::Jr { cond, offset } if holds(cond, regs) => {
            commit.jump(word_aligned(pc.wrapping_add(immediate(offset))))
        }
        DecodedInstruction::Ret { cond, kind } if holds(cond, regs) => {
            let (value, sp) = pop_word(regs, bus)?;
            Commit {
                sp: Some(sp),
                set_gie: kind == ReturnKind::Interrupt,
                set_interrupt_enable: kind == ReturnKind::NonMaskable,
                ..commit
            }
            .jump(word_aligned(value).wrapping_add(INSTRUCTION_BYTES))
        }
        DecodedInstruction::Halt { cond } if holds(cond, regs) => Commit {
            outcome: ExecuteOutcome::Halt,
            ..commit
        },
        DecodedInstruction::Jp { .. }
        | DecodedInstruction::Call { .. }
        | DecodedInstruction::Jr { .. }
        | DecodedInstruction::Ret { .. }
        | DecodedInstruction::Halt { .. } => commit,
    };

    let outcome = commit.outcome;
    commit.apply(regs);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{execute, ExecuteOutcome};
    use crate::decoder::{
        AluOp, DecodedInstruction, MemoryOperand, MoveSource, MoveTarget, Operand, ReturnKind,
    };
    use crate::encoding::Condition;
    use crate::memory::{AccessWidth, Bus, Memory};
    use crate::state::{GeneralRegister, RegisterFile, SR_C, SR_GIE, SR_N, SR_V, SR_Z};
    use crate::BusError;

    fn setup() -> (RegisterFile, Bus) {
        (RegisterFile::default(), Bus::new(Memory::new(0x2000)))
    }

    fn run(instr: DecodedInstruction, regs: &mut RegisterFile, bus: &mut Bus) -> ExecuteOutcome {
        execute(instr, regs, bus).unwrap()
    }

    #[test]
    fn add_immediate_sets_overflow_and_negative() {
        let (mut regs, mut bus) = setup();
        regs.set_gpr(GeneralRegister::R0, 0x7FFF_FFFF);
        run(
            DecodedInstruction::Alu {
                op: AluOp::Add,
                dest: GeneralRegister::R0,
                src1: GeneralRegister::R0,
                src2: Operand::Immediate(5),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R0), 0x8000_0004);
        assert_eq!(regs.sr(), SR_N | SR_V);
        assert_eq!(regs.pc(), 4);
    }

    #[test]
    fn adc_and_sbc_consume_carry() {
        let (mut regs, mut bus) = setup();
        regs.set_sr(SR_C);
        regs.set_gpr(GeneralRegister::R1, 10);
        run(
            DecodedInstruction::Alu {
                op: AluOp::Adc,
                dest: GeneralRegister::R2,
                src1: GeneralRegister::R1,
                src2: Operand::Immediate(1),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R2), 12);
        assert_eq!(regs.sr(), 0);

        regs.set_sr(SR_C);
        run(
            DecodedInstruction::Alu {
                op: AluOp::Sbc,
                dest: GeneralRegister::R3,
                src1: GeneralRegister::R1,
                src2: Operand::Immediate(10),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R3), 0xFFFF_FFFF);
        assert_eq!(regs.sr(), SR_N | SR_C);
    }

    #[test]
    fn logic_ops_clear_carry_and_overflow() {
        let (mut regs, mut bus) = setup();
        regs.set_sr(SR_C | SR_V);
        regs.set_gpr(GeneralRegister::R1, 0xF0);
        run(
            DecodedInstruction::Alu {
                op: AluOp::And,
                dest: GeneralRegister::R1,
                src1: GeneralRegister::R1,
                src2: Operand::Immediate(0x0F),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R1), 0);
        assert_eq!(regs.sr(), SR_Z);
    }

    #[test]
    fn cmp_sets_flags_without_storing() {
        let (mut regs, mut bus) = setup();
        regs.set_gpr(GeneralRegister::R0, 3);
        run(
            DecodedInstruction::Cmp {
                src1: GeneralRegister::R0,
                src2: Operand::Immediate(3),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R0), 3);
        assert_eq!(regs.sr(), SR_Z);
    }

    #[test]
    fn move_forms() {
        let (mut regs, mut bus) = setup();
        regs.set_sr(SR_C | 0x700);
        run(
            DecodedInstruction::Move {
                src: MoveSource::Immediate(-1),
                dest: MoveTarget::Register(GeneralRegister::R4),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R4), 0xFFFF_FFFF);
        assert_eq!(regs.sr(), SR_C | SR_N | 0x700, "C kept, N from value");

        run(
            DecodedInstruction::Move {
                src: MoveSource::StatusRegister,
                dest: MoveTarget::Register(GeneralRegister::R5),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R5), SR_C | SR_N);

        run(
            DecodedInstruction::Move {
                src: MoveSource::Register(GeneralRegister::R4),
                dest: MoveTarget::StatusRegister,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.sr(), 0xFF);
    }

    #[test]
    fn load_and_store_force_alignment() {
        let (mut regs, mut bus) = setup();
        regs.set_gpr(GeneralRegister::R1, 0x100);
        regs.set_gpr(GeneralRegister::R2, 0xAABB_CCDD);
        run(
            DecodedInstruction::Store {
                width: AccessWidth::Word,
                reg: GeneralRegister::R2,
                addr: MemoryOperand {
                    base: Some(GeneralRegister::R1),
                    offset: 3,
                },
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(bus.read_word(0x100), Ok(0xAABB_CCDD));

        run(
            DecodedInstruction::Load {
                width: AccessWidth::Half,
                reg: GeneralRegister::R3,
                addr: MemoryOperand {
                    base: None,
                    offset: 0x103,
                },
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R3), 0xAABB);

        run(
            DecodedInstruction::Load {
                width: AccessWidth::Byte,
                reg: GeneralRegister::R3,
                addr: MemoryOperand {
                    base: Some(GeneralRegister::R1),
                    offset: 1,
                },
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R3), 0xCC);
    }

    #[test]
    fn negative_offset_wraps_below_base() {
        let (mut regs, mut bus) = setup();
        regs.set_gpr(GeneralRegister::R1, 0x104);
        bus.write_word(0x100, 7).unwrap();
        run(
            DecodedInstruction::Load {
                width: AccessWidth::Word,
                reg: GeneralRegister::R0,
                addr: MemoryOperand {
                    base: Some(GeneralRegister::R1),
                    offset: -4,
                },
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.gpr(GeneralRegister::R0), 7);
    }

    #[test]
    fn push_then_pop_restores_stack() {
        let (mut regs, mut bus) = setup();
        regs.set_sp(0x1000);
        regs.set_gpr(GeneralRegister::R0, 0x2A);
        run(
            DecodedInstruction::Push {
                reg: GeneralRegister::R0,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.sp(), 0x0FFC);
        run(
            DecodedInstruction::Pop {
                reg: GeneralRegister::R1,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.sp(), 0x1000);
        assert_eq!(regs.gpr(GeneralRegister::R1), 0x2A);
        assert_eq!(bus.read_word(0x0FFC), Ok(0x2A));
    }

    #[test]
    fn push_r7_stores_the_decremented_stack_pointer() {
        let (mut regs, mut bus) = setup();
        regs.set_sp(0x1000);
        run(
            DecodedInstruction::Push {
                reg: GeneralRegister::R7,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.sp(), 0x0FFC);
        assert_eq!(bus.read_word(0x0FFC), Ok(0x0FFC));
    }

    #[test]
    fn pop_r7_post_increments_the_loaded_value() {
        let (mut regs, mut bus) = setup();
        regs.set_sp(0x1000);
        bus.write_word(0x1000, 0x500).unwrap();
        run(
            DecodedInstruction::Pop {
                reg: GeneralRegister::R7,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.sp(), 0x504);
    }

    #[test]
    fn untaken_branch_only_advances_pc() {
        let (mut regs, mut bus) = setup();
        regs.set_pc(0x40);
        run(
            DecodedInstruction::Jp {
                cond: Condition::Zero,
                target: Operand::Immediate(0x200),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.pc(), 0x44);
    }

    #[test]
    fn jumps_align_targets() {
        let (mut regs, mut bus) = setup();
        regs.set_pc(0x40);
        run(
            DecodedInstruction::Jp {
                cond: Condition::Always,
                target: Operand::Immediate(0x203),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.pc(), 0x200);

        run(
            DecodedInstruction::Jr {
                cond: Condition::Always,
                offset: -0x100,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.pc(), 0x100);
    }

    #[test]
    fn call_and_ret_resume_after_call_site() {
        let (mut regs, mut bus) = setup();
        regs.set_sp(0x1000);
        regs.set_pc(0x20);
        run(
            DecodedInstruction::Call {
                cond: Condition::Always,
                target: Operand::Immediate(0x300),
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.pc(), 0x300);
        assert_eq!(regs.sp(), 0x0FFC);
        assert_eq!(bus.read_word(0x0FFC), Ok(0x20));

        run(
            DecodedInstruction::Ret {
                cond: Condition::Always,
                kind: ReturnKind::Plain,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(regs.pc(), 0x24);
        assert_eq!(regs.sp(), 0x1000);
    }

    #[test]
    fn return_variants_restore_interrupt_state() {
        let (mut regs, mut bus) = setup();
        regs.set_sp(0x1000);
        regs.set_interrupt_enable(false);
        bus.write_word(0x1000, 0x80).unwrap();
        bus.write_word(0x1004, 0x90).unwrap();

        run(
            DecodedInstruction::Ret {
                cond: Condition::Always,
                kind: ReturnKind::Interrupt,
            },
            &mut regs,
            &mut bus,
        );
        assert!(regs.sr_bit(SR_GIE));
        assert!(!regs.interrupt_enable());
        assert_eq!(regs.pc(), 0x84);

        run(
            DecodedInstruction::Ret {
                cond: Condition::Always,
                kind: ReturnKind::NonMaskable,
            },
            &mut regs,
            &mut bus,
        );
        assert!(regs.interrupt_enable());
        assert_eq!(regs.pc(), 0x94);
    }

    #[test]
    fn halt_reports_only_when_condition_holds() {
        let (mut regs, mut bus) = setup();
        let outcome = run(
            DecodedInstruction::Halt {
                cond: Condition::Negative,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(outcome, ExecuteOutcome::Continue);
        let outcome = run(
            DecodedInstruction::Halt {
                cond: Condition::Always,
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(outcome, ExecuteOutcome::Halt);
        assert_eq!(regs.pc(), 8);
    }

    #[test]
    fn unmapped_access_leaves_registers_untouched() {
        let (mut regs, mut bus) = setup();
        regs.set_sp(0x10);
        regs.set_gpr(GeneralRegister::R1, 0x4000);
        let before = regs.clone();

        let err = execute(
            DecodedInstruction::Load {
                width: AccessWidth::Word,
                reg: GeneralRegister::R0,
                addr: MemoryOperand {
                    base: Some(GeneralRegister::R1),
                    offset: 0,
                },
            },
            &mut regs,
            &mut bus,
        );
        assert_eq!(err, Err(BusError::Unmapped { addr: 0x4000 }));
        assert_eq!(regs, before);

        regs.set_sp(0x4000);
        let before = regs.clone();
        let err = execute(
            DecodedInstruction::Call {
                cond: Condition::Always,
                target: Operand::Immediate(0x100),
            },
            &mut regs,
            &mut bus,
        );
        assert!(err.is_err());
        assert_eq!(regs, before);
    }
}
