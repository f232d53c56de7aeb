use core::fmt;

/// Operand byte width, encoded on the wire as a two-bit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Width {
    /// One byte.
    B1 = 1,
    /// Two bytes.
    B2 = 2,
    /// Four bytes.
    B4 = 4,
    /// Eight bytes.
    B8 = 8,
}

impl Width {
    /// Number of bytes an operand of this width occupies.
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Number of bits an operand of this width occupies.
    pub const fn bits(self) -> u32 {
        (self as u32) * 8
    }

    /// Two-bit wire index, `00` → 1 byte up to `11` → 8 bytes.
    pub const fn index(self) -> u8 {
        match self {
            Width::B1 => 0b00,
            Width::B2 => 0b01,
            Width::B4 => 0b10,
            Width::B8 => 0b11,
        }
    }

    /// Decode a two-bit wire index; callers mask down to two bits.
    pub const fn from_index(index: u8) -> Self {
        match index & 0b11 {
            0b00 => Width::B1,
            0b01 => Width::B2,
            0b10 => Width::B4,
            _ => Width::B8,
        }
    }

    /// The smallest width whose unsigned range contains `value`.
    pub fn fitting_unsigned(value: u64) -> Self {
        if value <= u8::MAX as u64 {
            Width::B1
        } else if value <= u16::MAX as u64 {
            Width::B2
        } else if value <= u32::MAX as u64 {
            Width::B4
        } else {
            Width::B8
        }
    }
}

impl TryFrom<u8> for Width {
    type Error = u8;

    fn try_from(bytes: u8) -> Result<Self, u8> {
        match bytes {
            1 => Ok(Width::B1),
            2 => Ok(Width::B2),
            4 => Ok(Width::B4),
            8 => Ok(Width::B8),
            other => Err(other),
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.bytes())
    }
}
