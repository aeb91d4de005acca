//! End-to-end machine scenarios: arithmetic, stack discipline, control flow,
//! precise faults, image loading and configuration errors.

use frisc_core::state::{SR_C, SR_N, SR_V, SR_Z};
use frisc_core::{
    AccessWidth, AluOp, BusError, Condition, ConfigError, DecodeError, DecodedInstruction, Device,
    Fault, FaultClass, GeneralRegister, GenericUnit, InterruptLevel, IntervalTimer, LoadError,
    Machine, MachineConfig, MemoryOperand, MoveSource, MoveTarget, Operand, ReturnKind, RunState,
    RunStop, StepOutcome, UnitConfig,
};
use log as _;
use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use GeneralRegister::{R0, R1, R2, R3, R7};

fn image(words: &[(u32, u32)]) -> Vec<u8> {
    let len = words.iter().map(|&(addr, _)| addr as usize + 4).max().unwrap_or(0);
    let mut bytes = vec![0; len];
    for &(addr, word) in words {
        let at = addr as usize;
        bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

fn sequential(program: &[DecodedInstruction]) -> Vec<(u32, u32)> {
    (0..)
        .step_by(4)
        .zip(program.iter().map(|instr| instr.encode()))
        .collect()
}

fn machine_with(words: &[(u32, u32)]) -> Machine {
    let mut machine = Machine::new(MachineConfig {
        memory_size: 0x2000,
        ..MachineConfig::default()
    })
    .expect("config should be valid");
    machine.load_bytes(&image(words)).expect("program should fit");
    machine
}

const fn halt() -> DecodedInstruction {
    DecodedInstruction::Halt {
        cond: Condition::Always,
    }
}

const fn mov(value: i32, dest: GeneralRegister) -> DecodedInstruction {
    DecodedInstruction::Move {
        src: MoveSource::Immediate(value),
        dest: MoveTarget::Register(dest),
    }
}

const fn absolute(offset: i32) -> MemoryOperand {
    MemoryOperand { base: None, offset }
}

#[test]
fn add_immediate_overflow_sets_negative_and_overflow() {
    let mut machine = machine_with(&sequential(&[DecodedInstruction::Alu {
        op: AluOp::Add,
        dest: R0,
        src1: R0,
        src2: Operand::Immediate(5),
    }]));
    machine.registers_mut().set_gpr(R0, 0x7FFF_FFFF);

    assert_eq!(machine.step(), StepOutcome::Continue);

    let regs = machine.registers();
    assert_eq!(regs.gpr(R0), 0x8000_0004);
    assert!(regs.sr_bit(SR_N));
    assert!(regs.sr_bit(SR_V));
    assert!(!regs.sr_bit(SR_C));
    assert!(!regs.sr_bit(SR_Z));
    assert_eq!(regs.pc(), 4);
}

#[test]
fn push_then_pop_round_trips_through_the_stack() {
    let mut machine = machine_with(&sequential(&[
        DecodedInstruction::Push { reg: R0 },
        DecodedInstruction::Pop { reg: R1 },
    ]));
    machine.registers_mut().set_sp(0x1000);
    machine.registers_mut().set_gpr(R0, 0x2A);

    assert_eq!(machine.step(), StepOutcome::Continue);
    assert_eq!(machine.registers().sp(), 0x0FFC);
    assert_eq!(machine.step(), StepOutcome::Continue);

    assert_eq!(machine.registers().sp(), 0x1000);
    assert_eq!(machine.registers().gpr(R1), 0x2A);
    assert_eq!(machine.read_word(0x0FFC), Ok(0x2A));
}

#[test]
fn call_and_return_resume_after_the_call() {
    let mut machine = machine_with(&[
        (
            0x00,
            DecodedInstruction::Call {
                cond: Condition::Always,
                target: Operand::Immediate(0x10),
            }
            .encode(),
        ),
        (0x04, halt().encode()),
        (0x10, mov(7, R3).encode()),
        (
            0x14,
            DecodedInstruction::Ret {
                cond: Condition::Always,
                kind: ReturnKind::Plain,
            }
            .encode(),
        ),
    ]);
    machine.registers_mut().set_sp(0x1000);

    let outcome = machine.run();

    assert_eq!(outcome.stop, RunStop::Halted);
    assert_eq!(outcome.steps, 4);
    assert_eq!(machine.registers().gpr(R3), 7);
    assert_eq!(machine.registers().sp(), 0x1000);
    assert_eq!(machine.registers().pc(), 0x08);
    assert_eq!(machine.run_state(), RunState::Halted);
}

#[test]
fn countdown_loop_retires_expected_instruction_count() {
    let mut machine = machine_with(&sequential(&[
        DecodedInstruction::Alu {
            op: AluOp::Sub,
            dest: R0,
            src1: R0,
            src2: Operand::Immediate(1),
        },
        DecodedInstruction::Jr {
            cond: Condition::NotZero,
            offset: -4,
        },
        halt(),
    ]));
    machine.registers_mut().set_gpr(R0, 3);

    let outcome = machine.run();

    assert_eq!(outcome.stop, RunStop::Halted);
    assert_eq!(outcome.steps, 7);
    assert_eq!(machine.registers().gpr(R0), 0);
    assert_eq!(machine.stats().instructions, 7);
}

#[rstest]
#[case(1, 2, Condition::UnsignedLessEqual, true)]
#[case(2, 1, Condition::UnsignedGreater, true)]
#[case(2, 2, Condition::UnsignedGreater, false)]
#[case(2, 2, Condition::UnsignedLessEqual, true)]
#[case(0xFFFF_FFFF, 1, Condition::SignedLess, true)]
#[case(0xFFFF_FFFF, 1, Condition::UnsignedGreater, true)]
#[case(0x8000_0000, 1, Condition::SignedGreaterEqual, false)]
#[case(0x8000_0000, 1, Condition::Overflow, true)]
#[case(5, 5, Condition::Zero, true)]
#[case(7, 0, Condition::Carry, false)]
#[case(0, 1, Condition::Carry, true)]
fn compare_then_conditional_jump(
    #[case] a: u32,
    #[case] b: u32,
    #[case] cond: Condition,
    #[case] taken: bool,
) {
    let mut machine = machine_with(&[
        (
            0x00,
            DecodedInstruction::Cmp {
                src1: R0,
                src2: Operand::Register(R1),
            }
            .encode(),
        ),
        (
            0x04,
            DecodedInstruction::Jp {
                cond,
                target: Operand::Immediate(0x10),
            }
            .encode(),
        ),
        (0x08, mov(1, R2).encode()),
        (0x0C, halt().encode()),
        (0x10, mov(2, R2).encode()),
        (0x14, halt().encode()),
    ]);
    machine.registers_mut().set_gpr(R0, a);
    machine.registers_mut().set_gpr(R1, b);

    assert_eq!(machine.run().stop, RunStop::Halted);
    assert_eq!(machine.registers().gpr(R2), if taken { 2 } else { 1 });
}

#[test]
fn sized_accesses_are_aligned_and_little_endian() {
    let mut machine = machine_with(&sequential(&[
        DecodedInstruction::Store {
            width: AccessWidth::Word,
            reg: R0,
            addr: absolute(0x100),
        },
        DecodedInstruction::Load {
            width: AccessWidth::Byte,
            reg: R1,
            addr: absolute(0x101),
        },
        DecodedInstruction::Load {
            width: AccessWidth::Half,
            reg: R2,
            addr: absolute(0x103),
        },
        DecodedInstruction::Store {
            width: AccessWidth::Byte,
            reg: R0,
            addr: absolute(0x203),
        },
        halt(),
    ]));
    machine.registers_mut().set_gpr(R0, 0x1122_3344);

    assert_eq!(machine.run().stop, RunStop::Halted);
    assert_eq!(machine.registers().gpr(R1), 0x33);
    assert_eq!(machine.registers().gpr(R2), 0x1122);
    assert_eq!(machine.read_word(0x200), Ok(0x4400_0000));
}

#[test]
fn move_to_status_register_keeps_low_byte_only() {
    let mut machine = machine_with(&sequential(&[
        DecodedInstruction::Move {
            src: MoveSource::Immediate(0x7FF),
            dest: MoveTarget::StatusRegister,
        },
        DecodedInstruction::Move {
            src: MoveSource::StatusRegister,
            dest: MoveTarget::Register(R1),
        },
        halt(),
    ]));

    assert_eq!(machine.run().stop, RunStop::Halted);
    assert_eq!(machine.registers().gpr(R1), 0xFF);
    assert_eq!(machine.registers().sr() & 0x700, 0);
}

#[test]
fn unmapped_store_faults_without_retiring() {
    let mut machine = machine_with(&sequential(&[
        mov(9, R0),
        DecodedInstruction::Store {
            width: AccessWidth::Word,
            reg: R0,
            addr: absolute(0x4000),
        },
        mov(1, R1),
    ]));

    let outcome = machine.run();

    let expected = Fault::Bus(BusError::Unmapped { addr: 0x4000 });
    assert_eq!(outcome.stop, RunStop::Faulted(expected));
    assert_eq!(outcome.steps, 1);
    assert_eq!(expected.class(), FaultClass::Bus);
    assert_eq!(machine.registers().pc(), 4, "pc stays on the faulting store");
    assert_eq!(machine.registers().gpr(R1), 0);
    assert_eq!(machine.run_state(), RunState::Faulted(expected));
    assert_eq!(machine.step(), StepOutcome::Faulted(expected));
}

#[test]
fn undefined_condition_is_a_decode_fault() {
    let word = halt().encode() | (0b1111 << 22);
    let mut machine = machine_with(&[(0, word)]);

    assert_eq!(
        machine.step(),
        StepOutcome::Faulted(Fault::Decode(DecodeError::UndefinedCondition {
            word,
            code: 0b1111,
        }))
    );
    assert_eq!(machine.stats().instructions, 0);
}

#[test]
fn reset_restores_power_on_state_but_keeps_memory() {
    let mut machine = machine_with(&sequential(&[mov(3, R0), mov(0x800, R7), halt()]));
    assert_eq!(machine.run().stop, RunStop::Halted);

    machine.reset();

    let regs = machine.registers();
    assert_eq!(regs.gpr(R0), 0);
    assert_eq!(regs.sp(), 0);
    assert_eq!(regs.pc(), 0);
    assert_eq!(regs.sr(), 0);
    assert!(regs.interrupt_enable());
    assert_eq!(machine.run_state(), RunState::Ready);
    assert_eq!(machine.stats().instructions, 0);
    assert_eq!(machine.now_ns(), 0);
    assert_eq!(machine.read_word(0), Ok(mov(3, R0).encode()));

    assert_eq!(machine.run().stop, RunStop::Halted, "same program runs again");
}

#[test]
fn loading_an_oversized_image_leaves_memory_untouched() {
    let mut machine = machine_with(&sequential(&[halt()]));

    assert_eq!(
        machine.load_bytes(&vec![0xAA; 0x2001]),
        Err(LoadError::ImageTooLarge {
            len: 0x2001,
            capacity: 0x2000,
        })
    );
    assert_eq!(machine.read_word(0), Ok(halt().encode()));
}

#[test]
fn loading_zeroes_memory_past_the_image() {
    let mut machine = machine_with(&[(0x100, 0xDEAD_BEEF)]);

    machine
        .load_bit_strings(&["00000001", "10", " 11111111 "])
        .expect("valid bit strings");

    assert_eq!(machine.read_word(0), Ok(0x00FF_0201));
    assert_eq!(machine.read_word(0x100), Ok(0));
}

#[rstest]
#[case(&["0101", "012"], 1)]
#[case(&["", "1"], 0)]
#[case(&["1", "0", "111111111"], 2)]
fn invalid_bit_strings_are_rejected(#[case] entries: &[&str], #[case] index: usize) {
    let mut machine = machine_with(&[]);
    assert_eq!(
        machine.load_bit_strings(entries),
        Err(LoadError::InvalidBitString { index })
    );
}

#[test]
fn byte_string_loads_latin1_characters() {
    let mut machine = machine_with(&[]);

    machine.load_byte_string("A\u{ff}\0\u{1}").expect("latin-1 text");
    assert_eq!(machine.read_word(0), Ok(0x0100_FF41));

    assert_eq!(
        machine.load_byte_string("ok\u{100}"),
        Err(LoadError::NonByteCharacter { index: 2 })
    );
}

#[rstest]
#[case(0)]
#[case(6)]
fn invalid_memory_sizes_are_rejected(#[case] size: usize) {
    let config = MachineConfig {
        memory_size: size,
        ..MachineConfig::default()
    };
    assert_eq!(
        Machine::new(config).err(),
        Some(ConfigError::InvalidMemorySize { size })
    );
}

#[test]
fn overlapping_units_are_rejected_and_registry_unchanged() {
    let mut machine = machine_with(&[]);
    machine
        .attach(
            UnitConfig::new("timer", 0xF000),
            Device::Timer(IntervalTimer::default()),
        )
        .expect("first unit attaches");

    assert_eq!(
        machine.attach(
            UnitConfig::new("gen", 0xF00C),
            Device::Generic(GenericUnit::new(1)),
        ),
        Err(ConfigError::Overlap {
            id: "gen".to_owned(),
            existing: "timer".to_owned(),
        })
    );
    assert_eq!(machine.unit_ids(), vec!["timer"]);

    machine
        .attach(
            UnitConfig::new("gen", 0xF010),
            Device::Generic(GenericUnit::new(1)),
        )
        .expect("adjacent window attaches");
    assert_eq!(machine.unit_ids(), vec!["timer", "gen"]);
}

#[test]
fn registry_rejects_duplicates_misalignment_and_second_nmi_source() {
    let mut machine = machine_with(&[]);
    let nmi = |id: &str, base| {
        (
            UnitConfig::new(id, base).with_interrupt_level(InterruptLevel::NonMaskable),
            Device::Generic(GenericUnit::new(1)),
        )
    };

    let (config, device) = nmi("a", 0xF000);
    machine.attach(config, device).expect("first nmi source");

    let (config, device) = nmi("a", 0xF100);
    assert_eq!(
        machine.attach(config, device),
        Err(ConfigError::DuplicateId { id: "a".to_owned() })
    );

    let (config, device) = nmi("b", 0xF100);
    assert_eq!(
        machine.attach(config, device),
        Err(ConfigError::NonMaskableLineTaken {
            id: "b".to_owned(),
            existing: "a".to_owned(),
        })
    );

    assert_eq!(
        machine.attach(
            UnitConfig::new("c", 0xF202),
            Device::Generic(GenericUnit::new(1)),
        ),
        Err(ConfigError::Misaligned {
            id: "c".to_owned(),
            base: 0xF202,
        })
    );

    assert_eq!(
        machine.detach("missing").err(),
        Some(ConfigError::UnknownUnit {
            id: "missing".to_owned(),
        })
    );
    assert_eq!(machine.detach("a").map(|unit| unit.base()), Ok(0xF000));
    assert!(machine.unit_ids().is_empty());
}
