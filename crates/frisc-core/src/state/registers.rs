use core::fmt;

/// Number of architecturally visible general-purpose registers (`R0..R7`).
pub const GENERAL_REGISTER_COUNT: usize = 8;
/// `SR` bit for negative result.
pub const SR_N: u32 = 1 << 0;
/// `SR` bit for carry/borrow.
pub const SR_C: u32 = 1 << 1;
/// `SR` bit for signed overflow.
pub const SR_V: u32 = 1 << 2;
/// `SR` bit for zero result.
pub const SR_Z: u32 = 1 << 3;
/// `SR` enable bit for interrupt level 0.
pub const SR_EINT0: u32 = 1 << 4;
/// `SR` enable bit for interrupt level 1.
pub const SR_EINT1: u32 = 1 << 5;
/// `SR` enable bit for interrupt level 2.
pub const SR_EINT2: u32 = 1 << 6;
/// `SR` global interrupt enable.
pub const SR_GIE: u32 = 1 << 7;
/// `SR` pending bit for interrupt level 0.
pub const SR_INT0: u32 = 1 << 8;
/// `SR` pending bit for interrupt level 1.
pub const SR_INT1: u32 = 1 << 9;
/// `SR` pending bit for interrupt level 2.
pub const SR_INT2: u32 = 1 << 10;
/// Mask of the `NCVZ` condition flags.
pub const SR_FLAGS_MASK: u32 = SR_N | SR_C | SR_V | SR_Z;
/// Mask of the bits a `MOVE` to or from `SR` transfers.
pub const SR_MOVE_MASK: u32 = 0xFF;
/// Mask of all architecturally defined `SR` bits.
pub const SR_ACTIVE_MASK: u32 = 0x7FF;

/// Architecturally visible general-purpose register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum GeneralRegister {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
}

impl GeneralRegister {
    /// Ordered list of all architectural general-purpose registers.
    pub const ALL: [Self; GENERAL_REGISTER_COUNT] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
    ];

    /// Stack pointer by convention.
    pub const SP: Self = Self::R7;

    /// Returns the array index for this register (`0..=7`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the 3-bit encoding of this register.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Decodes the low three bits of `bits` into a register.
    #[must_use]
    pub const fn from_u3(bits: u32) -> Self {
        match bits & 0b111 {
            0 => Self::R0,
            1 => Self::R1,
            2 => Self::R2,
            3 => Self::R3,
            4 => Self::R4,
            5 => Self::R5,
            6 => Self::R6,
            _ => Self::R7,
        }
    }
}

impl fmt::Display for GeneralRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.index())
    }
}

/// Register file: eight general registers, `PC`, `SR` and the internal
/// interrupt-enable flip-flop.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    gpr: [u32; GENERAL_REGISTER_COUNT],
    pc: u32,
    sr: u32,
    interrupt_enable: bool,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            gpr: [0; GENERAL_REGISTER_COUNT],
            pc: 0,
            sr: 0,
            interrupt_enable: true,
        }
    }
}

impl RegisterFile {
    /// Reads a general-purpose register.
    #[must_use]
    pub const fn gpr(&self, reg: GeneralRegister) -> u32 {
        self.gpr[reg.index()]
    }

    /// Writes a general-purpose register.
    pub const fn set_gpr(&mut self, reg: GeneralRegister, value: u32) {
        self.gpr[reg.index()] = value;
    }

    /// Reads the stack pointer (`R7`).
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.gpr(GeneralRegister::SP)
    }

    /// Writes the stack pointer (`R7`).
    pub const fn set_sp(&mut self, value: u32) {
        self.set_gpr(GeneralRegister::SP, value);
    }

    /// Reads the `PC` register.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.pc
    }

    /// Writes the `PC` register.
    pub const fn set_pc(&mut self, value: u32) {
        self.pc = value;
    }

    /// Reads the `SR` register.
    #[must_use]
    pub const fn sr(&self) -> u32 {
        self.sr
    }

    /// Writes `SR`, dropping undefined bits.
    pub const fn set_sr(&mut self, value: u32) {
        self.sr = value & SR_ACTIVE_MASK;
    }

    /// Returns whether every bit of `mask` is set in `SR`.
    #[must_use]
    pub const fn sr_bit(&self, mask: u32) -> bool {
        self.sr & mask == mask
    }

    /// Sets or clears the `SR` bits in `mask`.
    pub const fn set_sr_bit(&mut self, mask: u32, value: bool) {
        if value {
            self.set_sr(self.sr | mask);
        } else {
            self.set_sr(self.sr & !mask);
        }
    }

    /// Reads the internal interrupt-enable flip-flop.
    #[must_use]
    pub const fn interrupt_enable(&self) -> bool {
        self.interrupt_enable
    }

    /// Writes the internal interrupt-enable flip-flop.
    pub const fn set_interrupt_enable(&mut self, value: bool) {
        self.interrupt_enable = value;
    }

    /// Restores power-on state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
