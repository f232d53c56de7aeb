use core::fmt;

/// One-byte register name as it appears in operand position.
///
/// Ids `0xFE` and `0xFF` are reserved for the program counter and the stack
/// pointer; every other id selects a general-purpose register, wrapping
/// modulo the register-file size at access time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegId(u8);

impl RegId {
    /// The program counter register.
    pub const COUNTER: RegId = RegId(0xFE);

    /// The stack pointer register.
    pub const STACK: RegId = RegId(0xFF);

    /// Highest id usable for a general-purpose register.
    pub const MAX_GENERAL: u8 = 0xFD;

    /// Construct from the raw operand byte.
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// The raw operand byte.
    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// Whether this id names one of the two reserved registers.
    pub const fn is_reserved(self) -> bool {
        self.0 >= 0xFE
    }
}

impl From<u8> for RegId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl From<RegId> for u8 {
    fn from(id: RegId) -> u8 {
        id.0
    }
}

impl fmt::Display for RegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RegId::COUNTER => write!(f, "$pc"),
            RegId::STACK => write!(f, "$sp"),
            RegId(id) => write!(f, "r{id}"),
        }
    }
}
