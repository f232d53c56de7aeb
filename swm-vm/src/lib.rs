//! Register virtual machine with free-list managed linear memory.
//!
//! The machine executes the byte stream defined by [`swm_asm`] against a
//! fixed file of general-purpose registers and a linear memory partitioned
//! into a stack region and a heap region at program entry.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod config;
mod error;
mod interpreter;
mod memory;
mod program;
mod register;

pub use config::{Capacity, MemUnit, VmConfig};
pub use error::{MemoryError, RetCode, VmError};
pub use interpreter::Vm;
pub use memory::{MemChunk, VmMemory};
pub use program::Program;
pub use register::RegisterFile;
