use super::{DeviceAction, Peripheral};

/// Number of register slots in the timer window.
pub const TIMER_SLOTS: u32 = 4;

const CONTROL_INTERRUPT_ENABLE: u32 = 1 << 0;
const CONTROL_COUNT_ENABLE: u32 = 1 << 1;
const COUNT_MASK: u32 = 0xFFFF;
const COUNT_CYCLE: u64 = 0x1_0000;

/// 16-bit down-counting interval timer.
///
/// | slot | read          | write                                   |
/// |------|---------------|-----------------------------------------|
/// | 0    | current count | load reload and count, clear end latch  |
/// | 1    | ready status  | control (bit 0 interrupt, bit 1 count)  |
/// | 2    | 0             | clear ready and interrupt               |
/// | 3    | 0             | acknowledge end (clear end latch)       |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct IntervalTimer {
    reload: u32,
    count: u32,
    interrupt_enabled: bool,
    count_enabled: bool,
    ready: bool,
    interrupt: bool,
    end_signaled: bool,
}

impl IntervalTimer {
    /// Returns the reload value.
    #[must_use]
    pub const fn reload(&self) -> u32 {
        self.reload
    }

    /// Returns the current countdown value.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Returns the ready status.
    #[must_use]
    pub const fn ready(&self) -> bool {
        self.ready
    }

    /// Returns whether counting is enabled.
    #[must_use]
    pub const fn counting(&self) -> bool {
        self.count_enabled
    }

    const fn reach_zero(&mut self) {
        self.count = self.reload;
        if !self.end_signaled {
            self.ready = true;
            self.end_signaled = true;
            if self.interrupt_enabled {
                self.interrupt = true;
            }
        }
    }
}

impl Peripheral for IntervalTimer {
    fn slot_count(&self) -> u32 {
        TIMER_SLOTS
    }

    fn read_slot(&self, slot: u32) -> u32 {
        match slot {
            0 => self.count,
            1 => u32::from(self.ready),
            _ => 0,
        }
    }

    fn write_slot(&mut self, slot: u32, value: u32) -> DeviceAction {
        match slot {
            0 => {
                self.reload = value & COUNT_MASK;
                self.count = value & COUNT_MASK;
                self.end_signaled = false;
            }
            1 => {
                self.interrupt_enabled = value & CONTROL_INTERRUPT_ENABLE != 0;
                self.count_enabled = value & CONTROL_COUNT_ENABLE != 0;
            }
            2 => {
                self.ready = false;
                self.interrupt = false;
            }
            3 => self.end_signaled = false,
            _ => {}
        }
        DeviceAction::None
    }

    fn tick(&mut self) -> DeviceAction {
        if !self.count_enabled {
            return DeviceAction::None;
        }
        self.count = self.count.wrapping_sub(1) & COUNT_MASK;
        if self.count == 0 {
            self.reach_zero();
        }
        DeviceAction::None
    }

    #[allow(clippy::cast_possible_truncation)]
    fn skip_ticks(&mut self, ticks: u64) -> bool {
        if !self.count_enabled || ticks == 0 {
            return true;
        }
        // A zero count wraps through 0xFFFF before it reaches zero again.
        let to_zero = match self.count {
            0 => COUNT_CYCLE,
            count => u64::from(count),
        };
        if ticks < to_zero {
            self.count = self.count.wrapping_sub(ticks as u32) & COUNT_MASK;
            return true;
        }
        self.reach_zero();
        let period = match self.reload {
            0 => COUNT_CYCLE,
            reload => u64::from(reload),
        };
        let rest = ((ticks - to_zero) % period) as u32;
        self.count = self.reload.wrapping_sub(rest) & COUNT_MASK;
        true
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn interrupt_signal(&self) -> bool {
        self.interrupt
    }

    fn set_interrupt_signal(&mut self, raised: bool) {
        self.interrupt = raised;
    }
}
