//! Flat memory store, access widths and image loading.

/// Address decoding between flat memory and attached I/O units.
pub mod bus;

pub use bus::{Bus, MemoryWrite};

use crate::LoadError;

/// Conventional memory size in bytes (256 KiB).
pub const DEFAULT_MEMORY_BYTES: usize = 256 * 1024;

/// Byte, half-word or word access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessWidth {
    /// 8-bit access.
    Byte,
    /// 16-bit access.
    Half,
    /// 32-bit access.
    Word,
}

impl AccessWidth {
    /// Returns the access size in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
        }
    }

    /// Returns the value mask for this width.
    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Half => 0xFFFF,
            Self::Word => 0xFFFF_FFFF,
        }
    }

    /// Forces `addr` to the natural alignment of this width.
    #[must_use]
    pub const fn align(self, addr: u32) -> u32 {
        addr & !(self.bytes() - 1)
    }
}

/// Flat little-endian byte store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    bytes: Box<[u8]>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_BYTES)
    }
}

impl Memory {
    /// Allocates a zeroed store of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size].into_boxed_slice(),
        }
    }

    /// Returns the capacity in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.bytes.len()
    }

    fn range(&self, addr: u32, width: AccessWidth) -> Option<core::ops::Range<usize>> {
        let start = usize::try_from(addr).ok()?;
        let end = start.checked_add(width.bytes() as usize)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    /// Returns whether the full access lies inside the store.
    #[must_use]
    pub fn contains(&self, addr: u32, width: AccessWidth) -> bool {
        self.range(addr, width).is_some()
    }

    /// Reads a little-endian value, or `None` past the end of the store.
    #[must_use]
    pub fn read(&self, addr: u32, width: AccessWidth) -> Option<u32> {
        let range = self.range(addr, width)?;
        Some(
            self.bytes[range]
                .iter()
                .rev()
                .fold(0_u32, |acc, byte| (acc << 8) | u32::from(*byte)),
        )
    }

    /// Writes the low bytes of `value` little-endian; `None` past the end.
    pub fn write(&mut self, addr: u32, width: AccessWidth, value: u32) -> Option<()> {
        let range = self.range(addr, width)?;
        let bytes = value.to_le_bytes();
        let len = range.len();
        self.bytes[range].copy_from_slice(&bytes[..len]);
        Some(())
    }

    /// Zeroes the whole store.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Zeroes the store and copies `image` to address 0.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::ImageTooLarge`] without touching the store when the
    /// image does not fit.
    pub fn load(&mut self, image: &[u8]) -> Result<(), LoadError> {
        if image.len() > self.bytes.len() {
            return Err(LoadError::ImageTooLarge {
                len: image.len(),
                capacity: self.bytes.len(),
            });
        }
        self.clear();
        self.bytes[..image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Returns the raw contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Converts a string into an image, one byte per character.
///
/// # Errors
///
/// Returns [`LoadError::NonByteCharacter`] for characters above `U+00FF`.
pub fn image_from_byte_string(text: &str) -> Result<Vec<u8>, LoadError> {
    text.chars()
        .enumerate()
        .map(|(index, ch)| u8::try_from(ch).map_err(|_| LoadError::NonByteCharacter { index }))
        .collect()
}

/// Converts binary literals (`"00100101"`) into an image, one byte each.
///
/// # Errors
///
/// Returns [`LoadError::InvalidBitString`] for entries that are empty, longer
/// than eight digits, or contain anything but `0` and `1`.
pub fn image_from_bit_strings<S: AsRef<str>>(entries: &[S]) -> Result<Vec<u8>, LoadError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let digits = entry.as_ref().trim();
            if digits.is_empty()
                || digits.len() > 8
                || !digits.bytes().all(|b| b == b'0' || b == b'1')
            {
                return Err(LoadError::InvalidBitString { index });
            }
            u8::from_str_radix(digits, 2).map_err(|_| LoadError::InvalidBitString { index })
        })
        .collect()
}
