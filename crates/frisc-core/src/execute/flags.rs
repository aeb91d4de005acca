//! Condition-flag snapshot and `SR` update behaviors.

use crate::state::{SR_C, SR_FLAGS_MASK, SR_N, SR_V, SR_Z};

/// Decoded `NCVZ` condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Flags {
    /// Negative.
    pub n: bool,
    /// Carry, or borrow after subtraction.
    pub c: bool,
    /// Signed overflow.
    pub v: bool,
    /// Zero.
    pub z: bool,
}

impl Flags {
    /// Extracts the condition flags from an `SR` value.
    #[must_use]
    pub const fn from_sr(sr: u32) -> Self {
        Self {
            n: sr & SR_N != 0,
            c: sr & SR_C != 0,
            v: sr & SR_V != 0,
            z: sr & SR_Z != 0,
        }
    }

    /// Packs the flags into their `SR` bit positions.
    #[must_use]
    pub const fn to_sr_bits(self) -> u32 {
        let mut bits = 0;
        if self.n {
            bits |= SR_N;
        }
        if self.c {
            bits |= SR_C;
        }
        if self.v {
            bits |= SR_V;
        }
        if self.z {
            bits |= SR_Z;
        }
        bits
    }

    /// Builds flags for `result` with explicit carry and overflow.
    #[must_use]
    pub const fn for_result(result: u32, carry: bool, overflow: bool) -> Self {
        Self {
            n: result >> 31 != 0,
            c: carry,
            v: overflow,
            z: result == 0,
        }
    }
}

/// Describes how `SR` condition flags change after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsUpdate {
    /// No change.
    #[default]
    None,
    /// Replace all four condition flags.
    All(Flags),
    /// Update `N` and `Z` from a result, keeping `C` and `V`.
    NegativeZero(u32),
}

impl FlagsUpdate {
    /// Applies the update to an `SR` value and returns the new value.
    #[must_use]
    pub const fn apply(self, sr: u32) -> u32 {
        match self {
            Self::None => sr,
            Self::All(flags) => (sr & !SR_FLAGS_MASK) | flags.to_sr_bits(),
            Self::NegativeZero(result) => {
                let mut next = sr & !(SR_N | SR_Z);
                if result >> 31 != 0 {
                    next |= SR_N;
                }
                if result == 0 {
                    next |= SR_Z;
                }
                next
            }
        }
    }
}
