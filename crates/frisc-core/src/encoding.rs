use crate::execute::Flags;

/// Bit position of the 5-bit opcode field (`[31:27]`).
pub const OPCODE_SHIFT: u32 = 27;
/// Bit position of the 4-bit condition field (`[25:22]`).
pub const CONDITION_SHIFT: u32 = 22;

/// Assigned 5-bit opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    Move = 0b00000,
    Or = 0b00001,
    And = 0b00010,
    Xor = 0b00011,
    Add = 0b00100,
    Adc = 0b00101,
    Sub = 0b00110,
    Sbc = 0b00111,
    Rotl = 0b01000,
    Rotr = 0b01001,
    Shl = 0b01010,
    Shr = 0b01011,
    Ashr = 0b01100,
    Cmp = 0b01101,
    Pop = 0b10000,
    Push = 0b10001,
    Loadb = 0b10010,
    Storeb = 0b10011,
    Loadh = 0b10100,
    Storeh = 0b10101,
    Load = 0b10110,
    Store = 0b10111,
    Jp = 0b11000,
    Call = 0b11001,
    Jr = 0b11010,
    Ret = 0b11011,
    Halt = 0b11111,
}

/// Single source-of-truth opcode table.
///
/// Any 5-bit value not present here is an unknown opcode.
pub const OPCODE_TABLE: &[(u8, Opcode, &str)] = &[
    (0b00000, Opcode::Move, "MOVE"),
    (0b00001, Opcode::Or, "OR"),
    (0b00010, Opcode::And, "AND"),
    (0b00011, Opcode::Xor, "XOR"),
    (0b00100, Opcode::Add, "ADD"),
    (0b00101, Opcode::Adc, "ADC"),
    (0b00110, Opcode::Sub, "SUB"),
    (0b00111, Opcode::Sbc, "SBC"),
    (0b01000, Opcode::Rotl, "ROTL"),
    (0b01001, Opcode::Rotr, "ROTR"),
    (0b01010, Opcode::Shl, "SHL"),
    (0b01011, Opcode::Shr, "SHR"),
    (0b01100, Opcode::Ashr, "ASHR"),
    (0b01101, Opcode::Cmp, "CMP"),
    (0b10000, Opcode::Pop, "POP"),
    (0b10001, Opcode::Push, "PUSH"),
    (0b10010, Opcode::Loadb, "LOADB"),
    (0b10011, Opcode::Storeb, "STOREB"),
    (0b10100, Opcode::Loadh, "LOADH"),
    (0b10101, Opcode::Storeh, "STOREH"),
    (0b10110, Opcode::Load, "LOAD"),
    (0b10111, Opcode::Store, "STORE"),
    (0b11000, Opcode::Jp, "JP"),
    (0b11001, Opcode::Call, "CALL"),
    (0b11010, Opcode::Jr, "JR"),
    (0b11011, Opcode::Ret, "RET"),
    (0b11111, Opcode::Halt, "HALT"),
];

impl Opcode {
    /// Converts a 5-bit opcode value into an assigned opcode.
    #[must_use]
    pub const fn from_u5(bits: u8) -> Option<Self> {
        match bits {
            0b00000 => Some(Self::Move),
            0b00001 => Some(Self::Or),
            0b00010 => Some(Self::And),
            0b00011 => Some(Self::Xor),
            0b00100 => Some(Self::Add),
            0b00101 => Some(Self::Adc),
            0b00110 => Some(Self::Sub),
            0b00111 => Some(Self::Sbc),
            0b01000 => Some(Self::Rotl),
            0b01001 => Some(Self::Rotr),
            0b01010 => Some(Self::Shl),
            0b01011 => Some(Self::Shr),
            0b01100 => Some(Self::Ashr),
            0b01101 => Some(Self::Cmp),
            0b10000 => Some(Self::Pop),
            0b10001 => Some(Self::Push),
            0b10010 => Some(Self::Loadb),
            0b10011 => Some(Self::Storeb),
            0b10100 => Some(Self::Loadh),
            0b10101 => Some(Self::Storeh),
            0b10110 => Some(Self::Load),
            0b10111 => Some(Self::Store),
            0b11000 => Some(Self::Jp),
            0b11001 => Some(Self::Call),
            0b11010 => Some(Self::Jr),
            0b11011 => Some(Self::Ret),
            0b11111 => Some(Self::Halt),
            _ => None,
        }
    }

    /// Returns the 5-bit encoding of this opcode.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Returns the assembler mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Move => "MOVE",
            Self::Or => "OR",
            Self::And => "AND",
            Self::Xor => "XOR",
            Self::Add => "ADD",
            Self::Adc => "ADC",
            Self::Sub => "SUB",
            Self::Sbc => "SBC",
            Self::Rotl => "ROTL",
            Self::Rotr => "ROTR",
            Self::Shl => "SHL",
            Self::Shr => "SHR",
            Self::Ashr => "ASHR",
            Self::Cmp => "CMP",
            Self::Pop => "POP",
            Self::Push => "PUSH",
            Self::Loadb => "LOADB",
            Self::Storeb => "STOREB",
            Self::Loadh => "LOADH",
            Self::Storeh => "STOREH",
            Self::Load => "LOAD",
            Self::Store => "STORE",
            Self::Jp => "JP",
            Self::Call => "CALL",
            Self::Jr => "JR",
            Self::Ret => "RET",
            Self::Halt => "HALT",
        }
    }
}

/// Extracts the raw 5-bit opcode field from an instruction word.
#[must_use]
pub const fn opcode_field(word: u32) -> u8 {
    (word >> OPCODE_SHIFT) as u8
}

/// Extracts the raw 4-bit condition field from an instruction word.
#[must_use]
pub const fn condition_field(word: u32) -> u8 {
    ((word >> CONDITION_SHIFT) & 0xF) as u8
}

/// Branch, return and halt condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Condition {
    /// Unconditional.
    #[default]
    Always = 0b0000,
    /// `N = 1`.
    Negative = 0b0001,
    /// `N = 0`.
    NotNegative = 0b0010,
    /// `C = 1`.
    Carry = 0b0011,
    /// `C = 0`.
    NotCarry = 0b0100,
    /// `V = 1`.
    Overflow = 0b0101,
    /// `V = 0`.
    NotOverflow = 0b0110,
    /// `Z = 1`.
    Zero = 0b0111,
    /// `Z = 0`.
    NotZero = 0b1000,
    /// Unsigned lower or equal: `C = 1` or `Z = 1`.
    UnsignedLessEqual = 0b1001,
    /// Unsigned greater: `C = 0` and `Z = 0`.
    UnsignedGreater = 0b1010,
    /// Signed less: `N != V`.
    SignedLess = 0b1011,
    /// Signed less or equal: `N != V` or `Z = 1`.
    SignedLessEqual = 0b1100,
    /// Signed greater or equal: `N = V`.
    SignedGreaterEqual = 0b1101,
    /// Signed greater: `N = V` and `Z = 0`.
    SignedGreater = 0b1110,
}

impl Condition {
    /// Every defined condition in encoding order.
    pub const ALL: [Self; 15] = [
        Self::Always,
        Self::Negative,
        Self::NotNegative,
        Self::Carry,
        Self::NotCarry,
        Self::Overflow,
        Self::NotOverflow,
        Self::Zero,
        Self::NotZero,
        Self::UnsignedLessEqual,
        Self::UnsignedGreater,
        Self::SignedLess,
        Self::SignedLessEqual,
        Self::SignedGreaterEqual,
        Self::SignedGreater,
    ];

    /// Converts a 4-bit condition field; `1111` is undefined.
    #[must_use]
    pub const fn from_u4(bits: u8) -> Option<Self> {
        match bits {
            0b0000 => Some(Self::Always),
            0b0001 => Some(Self::Negative),
            0b0010 => Some(Self::NotNegative),
            0b0011 => Some(Self::Carry),
            0b0100 => Some(Self::NotCarry),
            0b0101 => Some(Self::Overflow),
            0b0110 => Some(Self::NotOverflow),
            0b0111 => Some(Self::Zero),
            0b1000 => Some(Self::NotZero),
            0b1001 => Some(Self::UnsignedLessEqual),
            0b1010 => Some(Self::UnsignedGreater),
            0b1011 => Some(Self::SignedLess),
            0b1100 => Some(Self::SignedLessEqual),
            0b1101 => Some(Self::SignedGreaterEqual),
            0b1110 => Some(Self::SignedGreater),
            _ => None,
        }
    }

    /// Returns the 4-bit encoding of this condition.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Returns the mnemonic suffix (`""` for unconditional).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Always => "",
            Self::Negative => "_N",
            Self::NotNegative => "_NN",
            Self::Carry => "_C",
            Self::NotCarry => "_NC",
            Self::Overflow => "_V",
            Self::NotOverflow => "_NV",
            Self::Zero => "_Z",
            Self::NotZero => "_NZ",
            Self::UnsignedLessEqual => "_ULE",
            Self::UnsignedGreater => "_UGT",
            Self::SignedLess => "_SLT",
            Self::SignedLessEqual => "_SLE",
            Self::SignedGreaterEqual => "_SGE",
            Self::SignedGreater => "_SGT",
        }
    }

    /// Evaluates this condition against the current flags.
    #[must_use]
    pub const fn evaluate(self, flags: Flags) -> bool {
        let Flags { n, c, v, z } = flags;
        match self {
            Self::Always => true,
            Self::Negative => n,
            Self::NotNegative => !n,
            Self::Carry => c,
            Self::NotCarry => !c,
            Self::Overflow => v,
            Self::NotOverflow => !v,
            Self::Zero => z,
            Self::NotZero => !z,
            Self::UnsignedLessEqual => c || z,
            Self::UnsignedGreater => !c && !z,
            Self::SignedLess => n != v,
            Self::SignedLessEqual => (n != v) || z,
            Self::SignedGreaterEqual => n == v,
            Self::SignedGreater => n == v && !z,
        }
    }
}
