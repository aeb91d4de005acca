use log::{debug, warn};

use super::{AccessWidth, Memory};
use crate::clock::VirtualClock;
use crate::peripherals::{
    DeviceAction, DmaController, InterruptLevel, IoUnit, Peripheral, TransferLimit,
};
use crate::{BusError, ConfigError};

/// One observed bus write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryWrite {
    /// Target address.
    pub addr: u32,
    /// Value, masked to the access width.
    pub value: u32,
    /// Access width.
    pub width: AccessWidth,
}

/// Single path to memory and every attached unit.
///
/// Each access goes to the unit whose window contains the address, or to
/// flat memory otherwise. DMA transfers run through the same path.
#[derive(Debug)]
pub struct Bus {
    memory: Memory,
    units: Vec<IoUnit>,
    clock: VirtualClock,
    observe_writes: bool,
    writes: Vec<MemoryWrite>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(Memory::default())
    }
}

impl Bus {
    /// Creates a bus over `memory` with no units attached.
    #[must_use]
    pub const fn new(memory: Memory) -> Self {
        Self {
            memory,
            units: Vec::new(),
            clock: VirtualClock::new(),
            observe_writes: false,
            writes: Vec::new(),
        }
    }

    /// Returns flat memory.
    #[must_use]
    pub const fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Returns flat memory mutably, bypassing unit dispatch.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Returns the virtual clock.
    #[must_use]
    pub const fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    fn unit_index_at(&self, addr: u32) -> Option<usize> {
        self.units.iter().position(|unit| unit.contains(addr))
    }

    fn unit_index(&self, id: &str) -> Result<usize, ConfigError> {
        self.units
            .iter()
            .position(|unit| unit.id() == id)
            .ok_or_else(|| ConfigError::UnknownUnit { id: id.to_owned() })
    }

    /// Reads `width` bytes at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] when `addr` is outside memory and every
    /// unit window.
    pub fn read(&self, addr: u32, width: AccessWidth) -> Result<u32, BusError> {
        if let Some(index) = self.unit_index_at(addr) {
            let unit = &self.units[index];
            return Ok(unit.device().read(addr - unit.base(), width) & width.mask());
        }
        self.memory
            .read(addr, width)
            .ok_or(BusError::Unmapped { addr })
    }

    /// Writes the low `width` bytes of `value` at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] when `addr` is outside memory and every
    /// unit window.
    pub fn write(&mut self, addr: u32, width: AccessWidth, value: u32) -> Result<(), BusError> {
        if let Some((index, action)) = self.dispatch_write(addr, width, value)? {
            self.service(index, action);
        }
        Ok(())
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// See [`Bus::read`].
    pub fn read_byte(&self, addr: u32) -> Result<u8, BusError> {
        self.read(addr, AccessWidth::Byte)
            .map(|value| value.to_le_bytes()[0])
    }

    /// Reads one little-endian half-word.
    ///
    /// # Errors
    ///
    /// See [`Bus::read`].
    pub fn read_half(&self, addr: u32) -> Result<u16, BusError> {
        self.read(addr, AccessWidth::Half).map(|value| {
            let [lo, hi, _, _] = value.to_le_bytes();
            u16::from_le_bytes([lo, hi])
        })
    }

    /// Reads one little-endian word.
    ///
    /// # Errors
    ///
    /// See [`Bus::read`].
    pub fn read_word(&self, addr: u32) -> Result<u32, BusError> {
        self.read(addr, AccessWidth::Word)
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// See [`Bus::write`].
    pub fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), BusError> {
        self.write(addr, AccessWidth::Byte, u32::from(value))
    }

    /// Writes one little-endian half-word.
    ///
    /// # Errors
    ///
    /// See [`Bus::write`].
    pub fn write_half(&mut self, addr: u32, value: u16) -> Result<(), BusError> {
        self.write(addr, AccessWidth::Half, u32::from(value))
    }

    /// Writes one little-endian word.
    ///
    /// # Errors
    ///
    /// See [`Bus::write`].
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        self.write(addr, AccessWidth::Word, value)
    }

    fn dispatch_write(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u32,
    ) -> Result<Option<(usize, DeviceAction)>, BusError> {
        let value = value & width.mask();
        let target = match self.unit_index_at(addr) {
            Some(index) => {
                let unit = &mut self.units[index];
                let offset = addr - unit.base();
                Some((index, unit.device_mut().write(offset, width, value)))
            }
            None => {
                self.memory
                    .write(addr, width, value)
                    .ok_or(BusError::Unmapped { addr })?;
                None
            }
        };
        if self.observe_writes {
            self.writes.push(MemoryWrite { addr, value, width });
        }
        Ok(target)
    }

    fn dma_mut(&mut self, index: usize) -> Option<&mut DmaController> {
        self.units
            .get_mut(index)
            .and_then(|unit| unit.device_mut().as_dma_mut())
    }

    fn service(&mut self, index: usize, action: DeviceAction) {
        let DeviceAction::Transfer(limit) = action else {
            return;
        };

        let mut moved = 0_u64;
        while let Some((src, dst)) = self.dma_mut(index).and_then(|dma| dma.pending_transfer()) {
            let word = match self.read(src, AccessWidth::Word) {
                Ok(word) => word,
                Err(err) => {
                    self.abort_dma(index, err);
                    return;
                }
            };
            match self.dispatch_write(dst, AccessWidth::Word, word) {
                Ok(Some((_, DeviceAction::Transfer(_)))) => {
                    debug!("dma write to {dst:#010x} requested a nested transfer; ignored");
                }
                Ok(_) => {}
                Err(err) => {
                    self.abort_dma(index, err);
                    return;
                }
            }
            if let Some(dma) = self.dma_mut(index) {
                dma.commit_transfer();
            }
            moved += 1;
            if limit == TransferLimit::One {
                break;
            }
        }

        let finished = self.dma_mut(index).is_some_and(DmaController::finish_if_done);
        if finished || limit == TransferLimit::UntilDone {
            debug!(
                "dma `{}` moved {moved} word(s), block complete: {finished}",
                self.units[index].id()
            );
        }
    }

    fn abort_dma(&mut self, index: usize, err: BusError) {
        warn!(
            "dma `{}` aborted block transfer: {err}",
            self.units[index].id()
        );
        if let Some(dma) = self.dma_mut(index) {
            dma.abort();
        }
    }

    /// Registers `unit`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Overlap`], [`ConfigError::DuplicateId`] or
    /// [`ConfigError::NonMaskableLineTaken`]; the registry is unchanged on
    /// error.
    pub fn attach(&mut self, mut unit: IoUnit) -> Result<(), ConfigError> {
        if let Some(existing) = self.units.iter().find(|other| other.overlaps(&unit)) {
            return Err(ConfigError::Overlap {
                id: unit.id().to_owned(),
                existing: existing.id().to_owned(),
            });
        }
        if self.units.iter().any(|other| other.id() == unit.id()) {
            return Err(ConfigError::DuplicateId {
                id: unit.id().to_owned(),
            });
        }
        if unit.interrupt_level() == Some(InterruptLevel::NonMaskable) {
            if let Some(existing) = self.non_maskable_unit() {
                return Err(ConfigError::NonMaskableLineTaken {
                    id: unit.id().to_owned(),
                    existing: existing.id().to_owned(),
                });
            }
        }

        unit.clock_mut().restart(self.clock.now_ns());
        debug!(
            "attached unit `{}` at {:#010x}..={:#010x} level {:?}",
            unit.id(),
            unit.base(),
            unit.last_byte(),
            unit.interrupt_level().map(InterruptLevel::as_u8)
        );
        self.units.push(unit);
        Ok(())
    }

    /// Removes and returns the unit with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`] when no such unit is attached.
    pub fn detach(&mut self, id: &str) -> Result<IoUnit, ConfigError> {
        let index = self.unit_index(id)?;
        let unit = self.units.remove(index);
        debug!("detached unit `{id}`");
        Ok(unit)
    }

    /// Returns the unit with `id`.
    #[must_use]
    pub fn unit(&self, id: &str) -> Option<&IoUnit> {
        self.units.iter().find(|unit| unit.id() == id)
    }

    /// Returns the unit with `id` mutably.
    #[must_use]
    pub fn unit_mut(&mut self, id: &str) -> Option<&mut IoUnit> {
        self.units.iter_mut().find(|unit| unit.id() == id)
    }

    /// Returns attached unit ids in attach order.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<&str> {
        self.units.iter().map(IoUnit::id).collect()
    }

    /// Returns the unit on the non-maskable line, if any.
    #[must_use]
    pub fn non_maskable_unit(&self) -> Option<&IoUnit> {
        self.units
            .iter()
            .find(|unit| unit.interrupt_level() == Some(InterruptLevel::NonMaskable))
    }

    /// Returns the OR of every unit signal on `level`.
    #[must_use]
    pub fn interrupt_line(&self, level: InterruptLevel) -> bool {
        self.units.iter().any(|unit| {
            unit.interrupt_level() == Some(level) && unit.device().interrupt_signal()
        })
    }

    /// Sends the acknowledge to the non-maskable source, clearing its signal.
    pub fn acknowledge_non_maskable(&mut self) {
        if let Some(unit) = self
            .units
            .iter_mut()
            .find(|unit| unit.interrupt_level() == Some(InterruptLevel::NonMaskable))
        {
            unit.device_mut().set_interrupt_signal(false);
        }
    }

    /// Forces the interrupt signal of unit `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`] when no such unit is attached.
    pub fn set_interrupt_signal(&mut self, id: &str, raised: bool) -> Result<(), ConfigError> {
        let index = self.unit_index(id)?;
        self.units[index].device_mut().set_interrupt_signal(raised);
        Ok(())
    }

    /// Advances virtual time by `nanos` and delivers every due device tick.
    pub fn advance_time(&mut self, nanos: u64) {
        let now = self.clock.advance(nanos);
        self.deliver_due_ticks(now);
    }

    /// Advances virtual time by `cycles` CPU cycles at `frequency_hz`.
    pub fn advance_cycles(&mut self, cycles: u64, frequency_hz: u32) {
        let now = self.clock.advance_cycles(cycles, frequency_hz);
        self.deliver_due_ticks(now);
    }

    fn deliver_due_ticks(&mut self, now: u64) {
        for index in 0..self.units.len() {
            if !self.units[index].device().is_clocked() {
                continue;
            }
            let due = self.units[index].clock_mut().due_ticks(now);
            self.deliver_ticks(index, due);
        }
    }

    fn deliver_ticks(&mut self, index: usize, ticks: u64) {
        let mut remaining = ticks;
        while remaining > 0 && !self.units[index].device_mut().skip_ticks(remaining) {
            let action = self.units[index].device_mut().tick();
            self.service(index, action);
            remaining -= 1;
        }
    }

    /// Delivers `ticks` ticks to unit `id` outside the virtual clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`] when no such unit is attached.
    pub fn tick_unit(&mut self, id: &str, ticks: u64) -> Result<(), ConfigError> {
        let index = self.unit_index(id)?;
        self.deliver_ticks(index, ticks);
        Ok(())
    }

    /// Resets every unit, the virtual clock and pending write records.
    pub fn reset_units(&mut self) {
        self.clock.reset();
        for unit in &mut self.units {
            unit.device_mut().reset();
            unit.clock_mut().restart(0);
        }
        self.writes.clear();
    }

    /// Turns write recording on or off.
    pub fn observe_writes(&mut self, enabled: bool) {
        self.observe_writes = enabled;
        if !enabled {
            self.writes.clear();
        }
    }

    /// Drains recorded writes in bus order.
    pub fn take_writes(&mut self) -> Vec<MemoryWrite> {
        std::mem::take(&mut self.writes)
    }
}
