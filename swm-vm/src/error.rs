//! Machine outcomes and construction-time failures.

use swm_asm::Width;

/// Outcome of a program run.
///
/// Discriminants are pinned so external harnesses can assert on raw codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i64)]
pub enum RetCode {
    /// Execution fell through the end of the program.
    Success = 0,
    /// Execution reached an explicit HALT.
    Halted = 1,
    /// An opcode byte matched no listed bit pattern.
    UnknownCommand = -2,
    /// The machine was asked to run without a program.
    NoProgram = -4,
    /// The program ended inside an instruction's operand bytes.
    UnexpectedEnd = -8,
    /// A jump target landed outside the program.
    JumpOutOfRange = -16,
    /// Division or remainder with a zero divisor.
    DivideByZero = -32,
    /// A memory region requested at program entry could not be allocated.
    OutOfMemory = -64,
}

impl RetCode {
    /// The raw return code.
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Whether the run completed without error.
    pub const fn is_ok(self) -> bool {
        matches!(self, RetCode::Success | RetCode::Halted)
    }
}

/// Rejected machine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// A register of `width` cannot address every byte of the heap region.
    #[error("a register width of {width} cannot address a memory of {bytes} bytes")]
    MemorySizeInvalid {
        /// Configured maximum register width.
        width: Width,
        /// Requested heap capacity in bytes.
        bytes: usize,
    },
    /// More general-purpose registers than one-byte ids can name.
    #[error("{count} general registers requested, at most 253 are addressable")]
    TooManyRegisters {
        /// Requested register count.
        count: usize,
    },
    /// A register file needs at least one general register.
    #[error("a register file needs at least one general register")]
    NoRegisters,
}

/// Failure of a free-list operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// The span lies outside the memory buffer.
    #[error("span {begin}..{end} is outside a memory of {size} bytes")]
    OutOfRange {
        /// Span begin, inclusive.
        begin: usize,
        /// Span end, exclusive.
        end: usize,
        /// Buffer size in bytes.
        size: usize,
    },
    /// The span intersects a span that is already free.
    #[error("span {begin}..{end} intersects an already free span")]
    DoubleFree {
        /// Span begin, inclusive.
        begin: usize,
        /// Span end, exclusive.
        end: usize,
    },
    /// No free span can satisfy the request.
    #[error("no free span of {requested} bytes available")]
    OutOfMemory {
        /// Requested allocation size in bytes.
        requested: usize,
    },
}
