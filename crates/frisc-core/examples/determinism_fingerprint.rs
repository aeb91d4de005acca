//! Runs a timer-interrupt counting program and prints a fingerprint of the
//! final machine state. Two hosts agree when the fingerprints match.

use frisc_core::{
    AccessWidth, AluOp, Condition, DecodedInstruction, Device, GeneralRegister, InterruptLevel,
    IntervalTimer, Machine, MachineConfig, MemoryOperand, MoveSource, MoveTarget, Operand,
    ReturnKind, RunStop, UnitConfig,
};
use log as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use GeneralRegister::{R0, R1, R2, R7};

const TIMER_BASE: u32 = 0xFFFF_0000;
const HANDLER: u32 = 0x100;
const NMI_HANDLER: u32 = 0x200;
const INTERRUPTS_TO_COUNT: i32 = 4;

const fn mov(value: i32, dest: GeneralRegister) -> DecodedInstruction {
    DecodedInstruction::Move {
        src: MoveSource::Immediate(value),
        dest: MoveTarget::Register(dest),
    }
}

const fn store(reg: GeneralRegister, base: GeneralRegister, offset: i32) -> DecodedInstruction {
    DecodedInstruction::Store {
        width: AccessWidth::Word,
        reg,
        addr: MemoryOperand {
            base: Some(base),
            offset,
        },
    }
}

#[allow(clippy::cast_possible_wrap)]
fn program() -> Vec<(u32, u32)> {
    let main = [
        mov(TIMER_BASE as i32, R1),
        mov(5, R0),
        store(R0, R1, 0x0),
        mov(0b11, R0),
        store(R0, R1, 0x4),
        DecodedInstruction::Move {
            src: MoveSource::Immediate(0x90),
            dest: MoveTarget::StatusRegister,
        },
        DecodedInstruction::Cmp {
            src1: R2,
            src2: Operand::Immediate(INTERRUPTS_TO_COUNT),
        },
        DecodedInstruction::Jr {
            cond: Condition::NotZero,
            offset: -4,
        },
        DecodedInstruction::Halt {
            cond: Condition::Always,
        },
    ];
    let handler = [
        DecodedInstruction::Alu {
            op: AluOp::Add,
            dest: R2,
            src1: R2,
            src2: Operand::Immediate(1),
        },
        store(R0, R1, 0x8),
        store(R0, R1, 0xC),
        DecodedInstruction::Ret {
            cond: Condition::Always,
            kind: ReturnKind::Interrupt,
        },
    ];

    let mut words = vec![
        (0x000, mov(0x1000, R7).encode()),
        (
            0x004,
            DecodedInstruction::Jp {
                cond: Condition::Always,
                target: Operand::Immediate(0x40),
            }
            .encode(),
        ),
        (0x008, HANDLER),
        (0x00C, NMI_HANDLER),
        (
            NMI_HANDLER,
            DecodedInstruction::Ret {
                cond: Condition::Always,
                kind: ReturnKind::NonMaskable,
            }
            .encode(),
        ),
    ];
    words.extend((0x40..).step_by(4).zip(main.iter().map(|instr| instr.encode())));
    words.extend((HANDLER..).step_by(4).zip(handler.iter().map(|instr| instr.encode())));
    words
}

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn fingerprint() -> String {
    let mut machine = Machine::new(MachineConfig {
        memory_size: 0x1000,
        max_run_steps: Some(100_000),
        ..MachineConfig::default()
    })
    .expect("config should be valid");

    let mut image = vec![0_u8; 0x400];
    for (addr, word) in program() {
        let at = addr as usize;
        image[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }
    machine.load_bytes(&image).expect("image should fit");
    machine
        .attach(
            UnitConfig::new("timer", TIMER_BASE)
                .with_interrupt_level(InterruptLevel::Level0)
                .with_frequency(100_000),
            Device::Timer(IntervalTimer::default()),
        )
        .expect("timer should attach");

    let outcome = machine.run();
    assert_eq!(outcome.stop, RunStop::Halted, "program should halt");

    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    hash_bytes(&mut hash, &outcome.steps.to_le_bytes());
    for reg in GeneralRegister::ALL {
        hash_bytes(&mut hash, &machine.registers().gpr(reg).to_le_bytes());
    }
    hash_bytes(&mut hash, &machine.registers().pc().to_le_bytes());
    hash_bytes(&mut hash, &machine.registers().sr().to_le_bytes());
    hash_bytes(&mut hash, &machine.now_ns().to_le_bytes());

    let stats = machine.stats();
    hash_bytes(&mut hash, &stats.instructions.to_le_bytes());
    hash_bytes(&mut hash, &stats.maskable_interrupts.to_le_bytes());
    hash_bytes(&mut hash, &stats.non_maskable_interrupts.to_le_bytes());
    hash_bytes(&mut hash, machine.bus().memory().as_bytes());

    format!("{hash:016x}")
}

fn main() {
    println!("{}", fingerprint());
}
