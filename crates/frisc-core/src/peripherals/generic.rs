use super::{DeviceAction, Peripheral};
use crate::memory::AccessWidth;

/// Passive little-endian byte window with no autonomous behavior.
///
/// The host injects device data with [`GenericUnit::set_byte`] and raises or
/// clears the interrupt signal directly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct GenericUnit {
    bytes: Vec<u8>,
    interrupt: bool,
}

impl GenericUnit {
    /// Creates a zeroed window of `slots` 32-bit slots.
    #[must_use]
    pub fn new(slots: u32) -> Self {
        Self {
            bytes: vec![0; slots as usize * 4],
            interrupt: false,
        }
    }

    /// Returns the window contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Sets one byte; `None` when `offset` is outside the window.
    pub fn set_byte(&mut self, offset: u32, value: u8) -> Option<()> {
        let byte = self.bytes.get_mut(usize::try_from(offset).ok()?)?;
        *byte = value;
        Some(())
    }

    /// Returns one byte; `None` when `offset` is outside the window.
    #[must_use]
    pub fn byte(&self, offset: u32) -> Option<u8> {
        self.bytes.get(usize::try_from(offset).ok()?).copied()
    }
}

impl Peripheral for GenericUnit {
    #[allow(clippy::cast_possible_truncation)]
    fn slot_count(&self) -> u32 {
        (self.bytes.len() / 4) as u32
    }

    fn read_slot(&self, slot: u32) -> u32 {
        self.read(slot * 4, AccessWidth::Word)
    }

    fn write_slot(&mut self, slot: u32, value: u32) -> DeviceAction {
        self.write(slot * 4, AccessWidth::Word, value)
    }

    fn reset(&mut self) {
        self.bytes.fill(0);
        self.interrupt = false;
    }

    fn interrupt_signal(&self) -> bool {
        self.interrupt
    }

    fn set_interrupt_signal(&mut self, raised: bool) {
        self.interrupt = raised;
    }

    // Bytes past the end of the window read as zero.
    fn read(&self, offset: u32, width: AccessWidth) -> u32 {
        (0..width.bytes())
            .rev()
            .fold(0, |acc, i| {
                (acc << 8) | u32::from(self.byte(offset.wrapping_add(i)).unwrap_or(0))
            })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write(&mut self, offset: u32, width: AccessWidth, value: u32) -> DeviceAction {
        // Bytes past the end of the window are dropped.
        for i in 0..width.bytes() {
            if self.set_byte(offset.wrapping_add(i), (value >> (i * 8)) as u8).is_none() {
                break;
            }
        }
        DeviceAction::None
    }
}
