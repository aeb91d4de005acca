//! Memory-mapped I/O units and their shared register-window contract.
//!
//! Every unit exposes a window of 32-bit register slots starting at a
//! word-aligned base. Byte and half-word accesses select the slot
//! `(addr - base) / 4` and shift by `(addr % 4) * 8`: reads return the shifted
//! slot value masked to the access width, writes deliver the shifted value to
//! the slot.

/// DMA controller.
pub mod dma;
/// Passive byte window for harness injection.
pub mod generic;
/// Parallel input/output port.
pub mod parallel;
/// Interval timer.
pub mod timer;

pub use dma::{DmaController, DMA_SLOTS};
pub use generic::GenericUnit;
pub use parallel::{ParallelIo, PortDirection, PARALLEL_SLOTS};
pub use timer::{IntervalTimer, TIMER_SLOTS};

use core::fmt;

use crate::clock::{DeviceClock, MAX_DEVICE_FREQUENCY_HZ};
use crate::memory::AccessWidth;
use crate::ConfigError;

/// Default device clock frequency.
pub const DEFAULT_DEVICE_FREQUENCY_HZ: u32 = 1_000;

/// Interrupt line a unit drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptLevel {
    /// Maskable level 0, lowest priority.
    Level0,
    /// Maskable level 1.
    Level1,
    /// Maskable level 2, highest maskable priority.
    Level2,
    /// Non-maskable level 3; at most one source.
    NonMaskable,
}

impl InterruptLevel {
    /// Converts a numeric level (`0..=3`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInterruptLevel`] for levels above 3.
    pub const fn from_u8(level: u8) -> Result<Self, ConfigError> {
        match level {
            0 => Ok(Self::Level0),
            1 => Ok(Self::Level1),
            2 => Ok(Self::Level2),
            3 => Ok(Self::NonMaskable),
            _ => Err(ConfigError::InvalidInterruptLevel { level }),
        }
    }

    /// Returns the numeric level.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Level0 => 0,
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::NonMaskable => 3,
        }
    }
}

/// Placement and clocking of one I/O unit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct UnitConfig {
    /// Unique id within the bus registry.
    pub id: String,
    /// Word-aligned window base address.
    pub base: u32,
    /// Interrupt line, or `None` for a unit that never interrupts.
    pub interrupt_level: Option<InterruptLevel>,
    /// Device clock frequency (`1..=10_000_000` Hz).
    pub frequency_hz: u32,
}

impl UnitConfig {
    /// Creates a non-interrupting unit config at `base`.
    #[must_use]
    pub fn new(id: impl Into<String>, base: u32) -> Self {
        Self {
            id: id.into(),
            base,
            interrupt_level: None,
            frequency_hz: DEFAULT_DEVICE_FREQUENCY_HZ,
        }
    }

    /// Sets the interrupt line.
    #[must_use]
    pub const fn with_interrupt_level(mut self, level: InterruptLevel) -> Self {
        self.interrupt_level = Some(level);
        self
    }

    /// Sets the device clock frequency.
    #[must_use]
    pub const fn with_frequency(mut self, frequency_hz: u32) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }
}

/// Follow-up work a device asks the bus to perform after an access or tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceAction {
    /// Nothing to do.
    #[default]
    None,
    /// Run DMA word transfers through the bus.
    Transfer(TransferLimit),
}

/// How many DMA transfers one service pass may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferLimit {
    /// A single word.
    One,
    /// Until the counter reaches zero.
    UntilDone,
}

/// Register-window device contract.
pub trait Peripheral: fmt::Debug {
    /// Number of 32-bit register slots in the window.
    fn slot_count(&self) -> u32;

    /// Reads a full register slot.
    fn read_slot(&self, slot: u32) -> u32;

    /// Writes a full register slot.
    fn write_slot(&mut self, slot: u32, value: u32) -> DeviceAction;

    /// Advances the device by one tick of its own clock.
    fn tick(&mut self) -> DeviceAction {
        DeviceAction::None
    }

    /// Applies `ticks` ticks at once when none of them needs bus work.
    ///
    /// Returns `false` when the next tick must go through [`Self::tick`].
    fn skip_ticks(&mut self, ticks: u64) -> bool {
        ticks == 0
    }

    /// Restores power-on state.
    fn reset(&mut self);

    /// Returns the current interrupt signal.
    fn interrupt_signal(&self) -> bool;

    /// Forces the interrupt signal (host injection or acknowledge).
    fn set_interrupt_signal(&mut self, raised: bool);

    /// Reads `width` bytes at window byte `offset`.
    fn read(&self, offset: u32, width: AccessWidth) -> u32 {
        let shift = (offset % 4) * 8;
        (self.read_slot(offset / 4) >> shift) & width.mask()
    }

    /// Writes `width` bytes at window byte `offset`.
    fn write(&mut self, offset: u32, width: AccessWidth, value: u32) -> DeviceAction {
        let shift = (offset % 4) * 8;
        self.write_slot(offset / 4, (value & width.mask()) << shift)
    }
}

/// Concrete device attached to a unit.
#[derive(Debug)]
pub enum Device {
    /// Interval timer.
    Timer(IntervalTimer),
    /// Parallel I/O port.
    Parallel(ParallelIo),
    /// DMA controller.
    Dma(DmaController),
    /// Passive byte window.
    Generic(GenericUnit),
    /// Host-provided device.
    Custom(Box<dyn Peripheral + Send>),
}

macro_rules! with_device {
    ($device:expr, $inner:ident => $body:expr) => {
        match $device {
            Device::Timer($inner) => $body,
            Device::Parallel($inner) => $body,
            Device::Dma($inner) => $body,
            Device::Generic($inner) => $body,
            Device::Custom($inner) => $body,
        }
    };
}

impl Device {
    /// Returns the timer, if this is one.
    #[must_use]
    pub const fn as_timer(&self) -> Option<&IntervalTimer> {
        match self {
            Self::Timer(timer) => Some(timer),
            _ => None,
        }
    }

    /// Returns the parallel port, if this is one.
    #[must_use]
    pub const fn as_parallel(&self) -> Option<&ParallelIo> {
        match self {
            Self::Parallel(port) => Some(port),
            _ => None,
        }
    }

    /// Returns the parallel port mutably, if this is one.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn as_parallel_mut(&mut self) -> Option<&mut ParallelIo> {
        match self {
            Self::Parallel(port) => Some(port),
            _ => None,
        }
    }

    /// Returns the DMA controller, if this is one.
    #[must_use]
    pub const fn as_dma(&self) -> Option<&DmaController> {
        match self {
            Self::Dma(dma) => Some(dma),
            _ => None,
        }
    }

    /// Returns the DMA controller mutably, if this is one.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn as_dma_mut(&mut self) -> Option<&mut DmaController> {
        match self {
            Self::Dma(dma) => Some(dma),
            _ => None,
        }
    }

    /// Returns the generic window, if this is one.
    #[must_use]
    pub const fn as_generic(&self) -> Option<&GenericUnit> {
        match self {
            Self::Generic(unit) => Some(unit),
            _ => None,
        }
    }

    /// Returns the generic window mutably, if this is one.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn as_generic_mut(&mut self) -> Option<&mut GenericUnit> {
        match self {
            Self::Generic(unit) => Some(unit),
            _ => None,
        }
    }

    /// Returns whether the device does work on its own clock.
    #[must_use]
    pub const fn is_clocked(&self) -> bool {
        !matches!(self, Self::Generic(_))
    }
}

impl Peripheral for Device {
    fn slot_count(&self) -> u32 {
        with_device!(self, inner => inner.slot_count())
    }

    fn read_slot(&self, slot: u32) -> u32 {
        with_device!(self, inner => inner.read_slot(slot))
    }

    fn write_slot(&mut self, slot: u32, value: u32) -> DeviceAction {
        with_device!(self, inner => inner.write_slot(slot, value))
    }

    fn tick(&mut self) -> DeviceAction {
        with_device!(self, inner => inner.tick())
    }

    fn skip_ticks(&mut self, ticks: u64) -> bool {
        with_device!(self, inner => inner.skip_ticks(ticks))
    }

    fn reset(&mut self) {
        with_device!(self, inner => inner.reset());
    }

    fn interrupt_signal(&self) -> bool {
        with_device!(self, inner => inner.interrupt_signal())
    }

    fn set_interrupt_signal(&mut self, raised: bool) {
        with_device!(self, inner => inner.set_interrupt_signal(raised));
    }

    fn read(&self, offset: u32, width: AccessWidth) -> u32 {
        with_device!(self, inner => inner.read(offset, width))
    }

    fn write(&mut self, offset: u32, width: AccessWidth, value: u32) -> DeviceAction {
        with_device!(self, inner => inner.write(offset, width, value))
    }
}

/// A device placed on the bus: identity, window, interrupt line and clock.
#[derive(Debug)]
pub struct IoUnit {
    id: String,
    base: u32,
    slots: u32,
    level: Option<InterruptLevel>,
    clock: DeviceClock,
    device: Device,
}

impl IoUnit {
    /// Validates `config` against `device` and builds a unit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the base is not word aligned, the window is
    /// empty or runs past `u32::MAX`, or a clocked device has a frequency
    /// outside `1..=10_000_000` Hz.
    pub fn new(config: UnitConfig, device: Device) -> Result<Self, ConfigError> {
        let UnitConfig {
            id,
            base,
            interrupt_level,
            frequency_hz,
        } = config;
        let slots = device.slot_count();

        if base % 4 != 0 {
            return Err(ConfigError::Misaligned { id, base });
        }
        if slots == 0 {
            return Err(ConfigError::EmptyWindow { id });
        }
        if slots
            .checked_mul(4)
            .and_then(|len| base.checked_add(len - 1))
            .is_none()
        {
            return Err(ConfigError::WindowOutOfRange { id, base, slots });
        }
        if device.is_clocked() && !(1..=MAX_DEVICE_FREQUENCY_HZ).contains(&frequency_hz) {
            return Err(ConfigError::InvalidFrequency { id, frequency_hz });
        }

        Ok(Self {
            id,
            base,
            slots,
            level: interrupt_level,
            clock: DeviceClock::new(frequency_hz.max(1), 0),
            device,
        })
    }

    /// Returns the unit id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the window base address.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Returns the last byte address of the window.
    #[must_use]
    pub const fn last_byte(&self) -> u32 {
        self.base + (self.slots * 4 - 1)
    }

    /// Returns whether `addr` falls inside the window.
    #[must_use]
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr <= self.last_byte()
    }

    /// Returns whether this window intersects `other`.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.base <= other.last_byte() && other.base <= self.last_byte()
    }

    /// Returns the interrupt line.
    #[must_use]
    pub const fn interrupt_level(&self) -> Option<InterruptLevel> {
        self.level
    }

    /// Returns the device clock.
    #[must_use]
    pub const fn clock(&self) -> &DeviceClock {
        &self.clock
    }

    pub(crate) const fn clock_mut(&mut self) -> &mut DeviceClock {
        &mut self.clock
    }

    /// Returns the device.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Returns the device mutably.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }
}
