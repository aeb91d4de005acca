use std::collections::VecDeque;

use super::{DeviceAction, Peripheral};

/// Number of register slots in the parallel port window.
pub const PARALLEL_SLOTS: u32 = 4;

const CONTROL_INPUT: u32 = 1 << 0;
const CONTROL_INTERRUPT_ENABLE: u32 = 1 << 1;
const CONTROL_CONDITIONAL: u32 = 1 << 2;
const CONTROL_MASK_FOLLOWS: u32 = 1 << 3;
const CONTROL_ACTIVE_HIGH: u32 = 1 << 4;
const CONTROL_AND_POLICY: u32 = 1 << 5;

/// Transfer direction selected by the control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PortDirection {
    /// Bytes arrive from the host input queue.
    Input,
    /// Bytes written by the CPU go to the output log.
    Output,
}

/// 8-bit parallel port with immediate and conditional transfer modes.
///
/// | slot | read         | write                                      |
/// |------|--------------|--------------------------------------------|
/// | 0    | ready status | control, or the mask when one is pending   |
/// | 1    | data byte    | data byte                                  |
/// | 2    | 0            | clear ready and interrupt                  |
/// | 3    | 0            | acknowledge end (clear end latch)          |
///
/// Control bits: 0 input mode, 1 interrupt enable, 2 conditional mode. In
/// conditional input mode: 3 next slot-0 write is the mask, 4 active level
/// high, 5 AND reduction against the mask (OR otherwise).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct ParallelIo {
    direction: Option<PortDirection>,
    interrupt_enabled: bool,
    conditional: bool,
    mask_follows: bool,
    active_high: bool,
    and_policy: bool,
    mask: u8,
    data: u8,
    ready: bool,
    interrupt: bool,
    end_signaled: bool,
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl ParallelIo {
    /// Queues bytes for the port to latch on later ticks.
    pub fn feed_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Returns the bytes written in output mode, oldest first.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Drains the output log.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Returns the configured direction, `None` before the first control write.
    #[must_use]
    pub const fn direction(&self) -> Option<PortDirection> {
        self.direction
    }

    /// Returns the ready status.
    #[must_use]
    pub const fn ready(&self) -> bool {
        self.ready
    }

    /// Returns the data register.
    #[must_use]
    pub const fn data(&self) -> u8 {
        self.data
    }

    /// Returns the conditional-input mask.
    #[must_use]
    pub const fn mask(&self) -> u8 {
        self.mask
    }

    /// Returns how many input bytes are still queued.
    #[must_use]
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    const fn signal_end(&mut self) {
        self.ready = true;
        self.end_signaled = true;
        if self.interrupt_enabled {
            self.interrupt = true;
        }
    }

    const fn matches_mask(&self, byte: u8) -> bool {
        let level = if self.active_high { byte } else { !byte };
        if self.and_policy {
            level & self.mask == self.mask
        } else {
            level & self.mask != 0
        }
    }

    fn write_control(&mut self, value: u32) {
        self.direction = Some(if value & CONTROL_INPUT != 0 {
            PortDirection::Input
        } else {
            PortDirection::Output
        });
        self.interrupt_enabled = value & CONTROL_INTERRUPT_ENABLE != 0;
        self.conditional = value & CONTROL_CONDITIONAL != 0;
        if self.direction == Some(PortDirection::Input) && self.conditional {
            self.mask_follows = value & CONTROL_MASK_FOLLOWS != 0;
            self.active_high = value & CONTROL_ACTIVE_HIGH != 0;
            self.and_policy = value & CONTROL_AND_POLICY != 0;
        }
    }
}

impl Peripheral for ParallelIo {
    fn slot_count(&self) -> u32 {
        PARALLEL_SLOTS
    }

    fn read_slot(&self, slot: u32) -> u32 {
        match slot {
            0 => u32::from(self.ready),
            1 => u32::from(self.data),
            _ => 0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_slot(&mut self, slot: u32, value: u32) -> DeviceAction {
        match slot {
            0 if self.mask_follows => {
                self.mask_follows = false;
                self.mask = value as u8;
            }
            0 => self.write_control(value),
            1 => {
                self.data = value as u8;
                if self.direction == Some(PortDirection::Output) {
                    self.output.push(self.data);
                }
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
        if self.end_signaled {
            return DeviceAction::None;
        }
        match (self.direction, self.conditional) {
            (Some(PortDirection::Input), conditional) => {
                if let Some(byte) = self.input.pop_front() {
                    self.data = byte;
                    if !conditional || self.matches_mask(byte) {
                        self.signal_end();
                    }
                }
            }
            (Some(PortDirection::Output), false) => self.signal_end(),
            (Some(PortDirection::Output), true) | (None, _) => {}
        }
        DeviceAction::None
    }

    fn skip_ticks(&mut self, ticks: u64) -> bool {
        let idle = match self.direction {
            _ if self.end_signaled => true,
            Some(PortDirection::Input) => self.input.is_empty(),
            Some(PortDirection::Output) => self.conditional,
            None => true,
        };
        idle || ticks == 0
    }

    fn reset(&mut self) {
        let input = std::mem::take(&mut self.input);
        *self = Self {
            input,
            ..Self::default()
        };
    }

    fn interrupt_signal(&self) -> bool {
        self.interrupt
    }

    fn set_interrupt_signal(&mut self, raised: bool) {
        self.interrupt = raised;
    }
}
