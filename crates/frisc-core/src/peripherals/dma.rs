use super::{DeviceAction, Peripheral, TransferLimit};

/// Number of register slots in the DMA window.
pub const DMA_SLOTS: u32 = 6;

const CONTROL_INTERRUPT_ENABLE: u32 = 1 << 0;
const CONTROL_CYCLE_STEALING: u32 = 1 << 1;
const CONTROL_SOURCE_FIXED: u32 = 1 << 2;
const CONTROL_DESTINATION_FIXED: u32 = 1 << 3;

/// Word-granular block-transfer controller.
///
/// | slot | read         | write                         |
/// |------|--------------|-------------------------------|
/// | 0    | source       | source                        |
/// | 1    | destination  | destination                   |
/// | 2    | counter      | counter (words)               |
/// | 3    | ready status | control                       |
/// | 4    | 0            | start                         |
/// | 5    | 0            | clear ready and interrupt     |
///
/// Control bits: 0 interrupt enable, 1 cycle-stealing (halting otherwise),
/// 2 source fixed, 3 destination fixed.
///
/// The controller never touches memory itself: it reports pending transfers
/// and the bus moves each word through its own read/write path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct DmaController {
    source: u32,
    destination: u32,
    counter: u32,
    interrupt_enabled: bool,
    cycle_stealing: bool,
    source_fixed: bool,
    destination_fixed: bool,
    active: bool,
    ready: bool,
    interrupt: bool,
}

impl DmaController {
    /// Returns the next `(source, destination)` word transfer, if a block is
    /// in progress with words remaining.
    #[must_use]
    pub const fn pending_transfer(&self) -> Option<(u32, u32)> {
        if self.active && self.counter > 0 {
            Some((self.source, self.destination))
        } else {
            None
        }
    }

    /// Records one completed word transfer.
    pub const fn commit_transfer(&mut self) {
        if !self.source_fixed {
            self.source = self.source.wrapping_add(4);
        }
        if !self.destination_fixed {
            self.destination = self.destination.wrapping_add(4);
        }
        self.counter = self.counter.saturating_sub(1);
    }

    /// Ends an active block whose counter reached zero, raising ready.
    ///
    /// Returns whether the block finished on this call.
    pub const fn finish_if_done(&mut self) -> bool {
        if !self.active || self.counter > 0 {
            return false;
        }
        self.active = false;
        self.ready = true;
        if self.interrupt_enabled {
            self.interrupt = true;
        }
        true
    }

    /// Stops the current block without signalling completion.
    pub const fn abort(&mut self) {
        self.active = false;
    }

    /// Returns whether a block is in progress.
    #[must_use]
    pub const fn active(&self) -> bool {
        self.active
    }

    /// Returns the ready status.
    #[must_use]
    pub const fn ready(&self) -> bool {
        self.ready
    }

    /// Returns the remaining word count.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// Returns the current source address.
    #[must_use]
    pub const fn source(&self) -> u32 {
        self.source
    }

    /// Returns the current destination address.
    #[must_use]
    pub const fn destination(&self) -> u32 {
        self.destination
    }
}

impl Peripheral for DmaController {
    fn slot_count(&self) -> u32 {
        DMA_SLOTS
    }

    fn read_slot(&self, slot: u32) -> u32 {
        match slot {
            0 => self.source,
            1 => self.destination,
            2 => self.counter,
            3 => u32::from(self.ready),
            _ => 0,
        }
    }

    fn write_slot(&mut self, slot: u32, value: u32) -> DeviceAction {
        match slot {
            0 => self.source = value,
            1 => self.destination = value,
            2 => self.counter = value,
            3 => {
                self.interrupt_enabled = value & CONTROL_INTERRUPT_ENABLE != 0;
                self.cycle_stealing = value & CONTROL_CYCLE_STEALING != 0;
                self.source_fixed = value & CONTROL_SOURCE_FIXED != 0;
                self.destination_fixed = value & CONTROL_DESTINATION_FIXED != 0;
            }
            // A start while a block is running is ignored.
            4 if !self.active => {
                self.active = true;
                return DeviceAction::Transfer(if self.cycle_stealing {
                    TransferLimit::One
                } else {
                    TransferLimit::UntilDone
                });
            }
            5 => {
                self.ready = false;
                self.interrupt = false;
            }
            _ => {}
        }
        DeviceAction::None
    }

    fn tick(&mut self) -> DeviceAction {
        if self.active && self.cycle_stealing {
            DeviceAction::Transfer(TransferLimit::One)
        } else {
            DeviceAction::None
        }
    }

    fn skip_ticks(&mut self, ticks: u64) -> bool {
        !(self.active && self.cycle_stealing) || ticks == 0
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
