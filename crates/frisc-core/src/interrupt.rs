//! End-of-cycle interrupt sampling and acceptance.

use log::debug;

use crate::execute::{push_word, INSTRUCTION_BYTES};
use crate::memory::Bus;
use crate::peripherals::InterruptLevel;
use crate::state::{
    RegisterFile, SR_EINT0, SR_EINT1, SR_EINT2, SR_GIE, SR_INT0, SR_INT1, SR_INT2,
};
use crate::BusError;

/// Address of the word holding the maskable interrupt handler address.
pub const MASKABLE_VECTOR: u32 = 0x0008;
/// Address of the word holding the non-maskable interrupt handler address.
pub const NON_MASKABLE_VECTOR: u32 = 0x000C;

const MASKABLE_LINES: [(InterruptLevel, u32, u32); 3] = [
    (InterruptLevel::Level0, SR_INT0, SR_EINT0),
    (InterruptLevel::Level1, SR_INT1, SR_EINT1),
    (InterruptLevel::Level2, SR_INT2, SR_EINT2),
];

/// Interrupt sequence started at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptAcceptance {
    /// No interrupt was accepted.
    None,
    /// Maskable sequence: `GIE` cleared, vector at [`MASKABLE_VECTOR`].
    Maskable,
    /// Non-maskable sequence: flip-flop cleared, vector at
    /// [`NON_MASKABLE_VECTOR`].
    NonMaskable,
}

/// Copies the level 0..2 line states into the `SR` pending bits.
pub fn sample_pending(regs: &mut RegisterFile, bus: &Bus) {
    for (level, pending, _) in MASKABLE_LINES {
        regs.set_sr_bit(pending, bus.interrupt_line(level));
    }
}

/// Returns whether any maskable level is both pending and enabled in `SR`.
#[must_use]
pub fn maskable_request(regs: &RegisterFile) -> bool {
    MASKABLE_LINES
        .iter()
        .any(|&(_, pending, enable)| regs.sr_bit(pending) && regs.sr_bit(enable))
}

/// Samples interrupt lines after an instruction retired and accepts at most
/// one interrupt.
///
/// `regs.pc()` must already point past the retired instruction. The pushed
/// return address is `pc - 4`, so the return sequence of the handler resumes
/// at `pc`.
///
/// # Errors
///
/// Returns a [`BusError`] when the stack push or the vector read is unmapped;
/// registers are then left as sampled.
pub fn poll_interrupts(
    regs: &mut RegisterFile,
    bus: &mut Bus,
) -> Result<InterruptAcceptance, BusError> {
    sample_pending(regs, bus);

    if !regs.interrupt_enable() {
        return Ok(InterruptAcceptance::None);
    }

    if bus.interrupt_line(InterruptLevel::NonMaskable) {
        let handler = enter(regs, bus, NON_MASKABLE_VECTOR)?;
        bus.acknowledge_non_maskable();
        regs.set_interrupt_enable(false);
        debug!("non-maskable interrupt accepted, handler {handler:#010x}");
        return Ok(InterruptAcceptance::NonMaskable);
    }

    if !regs.sr_bit(SR_GIE) || !maskable_request(regs) {
        return Ok(InterruptAcceptance::None);
    }

    let handler = enter(regs, bus, MASKABLE_VECTOR)?;
    regs.set_sr_bit(SR_GIE, false);
    debug!("maskable interrupt accepted, handler {handler:#010x}");
    Ok(InterruptAcceptance::Maskable)
}

fn enter(regs: &mut RegisterFile, bus: &mut Bus, vector: u32) -> Result<u32, BusError> {
    let handler = bus.read_word(vector)?;
    let sp = push_word(regs, bus, regs.pc().wrapping_sub(INSTRUCTION_BYTES))?;
    regs.set_sp(sp);
    regs.set_pc(handler);
    Ok(handler)
}
