use thiserror::Error;

/// Fault classes used for run-stop reporting and host policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Decoder rejected an instruction word.
    Decode,
    /// An access hit neither memory nor an attached unit.
    Bus,
}

/// Decoder rejection for a fetched 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DecodeError {
    /// Opcode field `[31:27]` names no instruction.
    #[error("unknown opcode in instruction word {word:#010x}")]
    UnknownOpcode {
        /// Raw instruction word.
        word: u32,
    },
    /// Condition field `[25:22]` holds the undefined code `1111`.
    #[error("undefined condition code {code:#06b} in instruction word {word:#010x}")]
    UndefinedCondition {
        /// Raw instruction word.
        word: u32,
        /// Offending 4-bit condition code.
        code: u8,
    },
}

impl DecodeError {
    /// Returns the raw instruction word that failed to decode.
    #[must_use]
    pub const fn word(self) -> u32 {
        match self {
            Self::UnknownOpcode { word } | Self::UndefinedCondition { word, .. } => word,
        }
    }
}

/// Bus access failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BusError {
    /// Address lies outside memory and outside every attached unit window.
    #[error("access to unmapped address {addr:#010x}")]
    Unmapped {
        /// Offending byte address.
        addr: u32,
    },
}

/// Run-level fault latched by the machine when a step cannot complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Fault {
    /// Fetched word did not decode.
    #[error("decode fault: {0}")]
    Decode(#[from] DecodeError),
    /// Fetch, data, stack or vector access failed on the bus.
    #[error("bus fault: {0}")]
    Bus(#[from] BusError),
}

impl Fault {
    /// Returns the taxonomy class for this fault.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::Decode(_) => FaultClass::Decode,
            Self::Bus(_) => FaultClass::Bus,
        }
    }
}

/// Unit construction and registry validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Unit window base is not a multiple of 4.
    #[error("unit `{id}` base {base:#010x} is not word aligned")]
    Misaligned {
        /// Unit id.
        id: String,
        /// Requested base address.
        base: u32,
    },
    /// Unit window has no slots.
    #[error("unit `{id}` maps no registers")]
    EmptyWindow {
        /// Unit id.
        id: String,
    },
    /// Unit window runs past the end of the 32-bit address space.
    #[error("unit `{id}` window at {base:#010x} with {slots} slots exceeds the address space")]
    WindowOutOfRange {
        /// Unit id.
        id: String,
        /// Requested base address.
        base: u32,
        /// Requested slot count.
        slots: u32,
    },
    /// Unit window intersects an already attached unit.
    #[error("unit `{id}` overlaps already attached unit `{existing}`")]
    Overlap {
        /// Rejected unit id.
        id: String,
        /// Id of the attached unit it collides with.
        existing: String,
    },
    /// A unit with this id is already attached.
    #[error("unit id `{id}` is already attached")]
    DuplicateId {
        /// Duplicate id.
        id: String,
    },
    /// The non-maskable line already has a source.
    #[error("non-maskable line is already taken by unit `{existing}`")]
    NonMaskableLineTaken {
        /// Rejected unit id.
        id: String,
        /// Unit currently holding the line.
        existing: String,
    },
    /// Interrupt level outside `0..=3`.
    #[error("interrupt level {level} is not in 0..=3")]
    InvalidInterruptLevel {
        /// Requested level.
        level: u8,
    },
    /// Device clock frequency outside the supported range.
    #[error("unit `{id}` frequency {frequency_hz} Hz is outside 1..=10000000")]
    InvalidFrequency {
        /// Unit id.
        id: String,
        /// Requested frequency.
        frequency_hz: u32,
    },
    /// No attached unit has this id.
    #[error("no unit with id `{id}` is attached")]
    UnknownUnit {
        /// Requested id.
        id: String,
    },
    /// Unit does not accept direct byte injection.
    #[error("unit `{id}` does not accept this kind of host data")]
    NotInjectable {
        /// Unit id.
        id: String,
    },
    /// Byte offset lies outside the unit window.
    #[error("offset {offset} is outside the window of unit `{id}`")]
    OffsetOutOfRange {
        /// Unit id.
        id: String,
        /// Requested byte offset.
        offset: u32,
    },
    /// Machine memory size is zero or not a multiple of 4.
    #[error("memory size {size} must be a non-zero multiple of 4")]
    InvalidMemorySize {
        /// Requested size in bytes.
        size: usize,
    },
    /// CPU clock frequency is zero.
    #[error("cpu frequency must be non-zero")]
    InvalidCpuFrequency,
}

/// Memory image load failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Image does not fit into memory; nothing was written.
    #[error("image of {len} bytes exceeds memory capacity of {capacity} bytes")]
    ImageTooLarge {
        /// Image length in bytes.
        len: usize,
        /// Memory capacity in bytes.
        capacity: usize,
    },
    /// A bit-string entry is not a binary literal of one to eight digits.
    #[error("bit-string entry {index} is not a binary byte literal")]
    InvalidBitString {
        /// Index of the offending entry.
        index: usize,
    },
    /// A byte-string character lies outside `U+0000..=U+00FF`.
    #[error("character {index} of the byte string does not fit in a byte")]
    NonByteCharacter {
        /// Character index of the offending entry.
        index: usize,
    },
}
