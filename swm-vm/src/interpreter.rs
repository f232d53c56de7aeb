//! The fetch-decode-execute loop.

use core::fmt::Write as _;

use swm_asm::{
    BinaryAlu, Condition, ConstAlu, DecodeError, JumpTarget, Op, RegId, UnaryAlu, Value,
    Width,
};
use tracing::{debug, trace};

use crate::{
    Capacity, MemChunk, MemUnit, Program, RegisterFile, RetCode, VmConfig, VmError,
    VmMemory,
};

/// The virtual machine: a register file plus a linear memory from which the
/// program's stack and heap regions are carved at entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vm {
    config: VmConfig,
    memory: VmMemory,
    registers: RegisterFile,
}

/// The two program-owned registers, live only while a program runs.
///
/// General-purpose reads and writes dispatch through here so that the
/// reserved ids alias the counter and stack pointer.
struct Frame<'a> {
    pc: Value,
    sp: Value,
    width: Width,
    file: &'a mut RegisterFile,
}

impl Frame<'_> {
    fn get(&self, id: RegId) -> Value {
        match id {
            RegId::COUNTER => self.pc,
            RegId::STACK => self.sp,
            other => self.file.get(other.to_u8()),
        }
    }

    fn set(&mut self, id: RegId, number: i64) {
        match id {
            RegId::COUNTER => self.pc = Value::new(number, self.width),
            RegId::STACK => self.sp = Value::new(number, self.width),
            other => self.file.set(other.to_u8(), number),
        }
    }
}

impl Vm {
    /// Build a machine from a validated configuration.
    ///
    /// The backing memory spans the configured stack capacity plus the heap
    /// capacity, so both regions can be carved out at program entry.
    pub fn new(config: VmConfig) -> Result<Self, VmError> {
        config.validate()?;
        let total = config.stack_capacity.bytes() + config.heap_capacity.bytes();
        Ok(Self {
            memory: VmMemory::new(Capacity::of(total, MemUnit::Byte)),
            registers: RegisterFile::new(config.register_count, config.max_width),
            config,
        })
    }

    /// The machine's configuration.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Read a general-purpose register, wrapping modulo the register count.
    pub fn register(&self, id: u8) -> Value {
        self.registers.get(id)
    }

    /// The machine's linear memory.
    pub fn memory(&self) -> &VmMemory {
        &self.memory
    }

    /// Run a program to completion and report its outcome.
    ///
    /// The stack region is allocated at the configured capacity, the heap
    /// region at the program's declared requirement; both are freed again
    /// when the run ends, leaving their contents in place for inspection.
    pub fn run(&mut self, program: &Program) -> RetCode {
        if program.is_empty() {
            return RetCode::NoProgram;
        }

        let stack = match self.memory.alloc(self.config.stack_capacity.bytes()) {
            Ok(chunk) => chunk,
            Err(_) => return RetCode::OutOfMemory,
        };
        let heap = match self.memory.alloc(program.heap_size()) {
            Ok(chunk) => chunk,
            Err(_) => {
                let _ = self.memory.free_chunk(stack);
                return RetCode::OutOfMemory;
            }
        };

        debug!(
            program_size = program.bytes().len(),
            stack_size = stack.len(),
            heap_size = heap.len(),
            "running program"
        );

        let code = self.exec(program.bytes(), stack, heap);

        let _ = self.memory.free_chunk(heap);
        let _ = self.memory.free_chunk(stack);

        code
    }

    fn exec(&mut self, bytes: &[u8], stack: MemChunk, heap: MemChunk) -> RetCode {
        let Self {
            config,
            memory,
            registers,
        } = self;
        let width = config.max_width;

        let mut frame = Frame {
            pc: Value::new(0, width),
            sp: Value::new(0, width),
            width,
            file: registers,
        };

        loop {
            let at = frame.pc.unsigned() as usize;
            if at >= bytes.len() {
                return RetCode::Success;
            }

            let (op, size) = match Op::decode(&bytes[at..]) {
                Ok(decoded) => decoded,
                Err(DecodeError::UnknownCommand(_)) => return RetCode::UnknownCommand,
                Err(DecodeError::UnexpectedEnd) => return RetCode::UnexpectedEnd,
            };
            trace!(at, ?op, "execute");

            // The counter names the next instruction while this one runs;
            // instructions that write it thereby redirect execution.
            frame.set(RegId::COUNTER, (at + size) as i64);

            match op {
                Op::Nop => {}
                Op::Halt => return RetCode::Halted,
                Op::LoadConst { dst, value } => frame.set(dst, value.signed()),
                Op::CopyReg { src, dst } => {
                    let value = frame.get(src);
                    frame.set(dst, value.signed());
                }
                Op::LoadReg { dst, addr, width } => {
                    let region = region_for(addr, stack, heap);
                    let pos = frame.get(addr).unsigned() as usize;
                    let value = region_read(memory.bytes(), region, pos, width);
                    frame.set(dst, value.signed());
                }
                Op::StoreReg { src, addr, width } => {
                    let region = region_for(addr, stack, heap);
                    let pos = frame.get(addr).unsigned() as usize;
                    let value = narrowed(frame.get(src), width);
                    region_write(memory.bytes_mut(), region, pos, value);
                }
                Op::LoadMem { dst, addr, width } => {
                    let pos = addr.unsigned() as usize;
                    let value = region_read(memory.bytes(), heap, pos, width);
                    frame.set(dst, value.signed());
                }
                Op::StoreMem { src, addr, width } => {
                    let pos = addr.unsigned() as usize;
                    let value = narrowed(frame.get(src), width);
                    region_write(memory.bytes_mut(), heap, pos, value);
                }
                Op::Binary { op, a, b, out } => {
                    let lhs = frame.get(a).signed();
                    let rhs = frame.get(b).signed();
                    match binary_alu(op, lhs, rhs) {
                        Some(result) => frame.set(out, result),
                        None => return RetCode::DivideByZero,
                    }
                }
                Op::Unary { op, reg } => {
                    let result = unary_alu(op, frame.get(reg).signed());
                    frame.set(reg, result);
                }
                Op::UnaryMove { op, src, dst } => {
                    let result = unary_alu(op, frame.get(src).signed());
                    frame.set(dst, result);
                }
                Op::BinaryConst { op, src, dst, value } => {
                    let reg = frame.get(src).signed();
                    match const_alu(op, reg, value.signed()) {
                        Some(result) => frame.set(dst, result),
                        None => return RetCode::DivideByZero,
                    }
                }
                Op::Jump { target } => match jump_dest(at, bytes.len(), target) {
                    Some(dest) => frame.set(RegId::COUNTER, dest as i64),
                    None => return RetCode::JumpOutOfRange,
                },
                Op::JumpIf { cond, a, b, target } => {
                    let lhs = frame.get(a).signed();
                    let rhs = frame.get(b).signed();
                    let taken = match cond {
                        Condition::Less => lhs < rhs,
                        Condition::Equal => lhs == rhs,
                        Condition::NotEqual => lhs != rhs,
                    };
                    if taken {
                        match jump_dest(at, bytes.len(), target) {
                            Some(dest) => frame.set(RegId::COUNTER, dest as i64),
                            None => return RetCode::JumpOutOfRange,
                        }
                    }
                }
            }
        }
    }

    /// Human-readable snapshot of the register file.
    pub fn dump_registers(&self) -> String {
        let mut out = String::from("registers:\n");
        for id in 0..self.registers.count() {
            let value = self.registers.get(id as u8);
            let _ = writeln!(out, "{id:>3}: [{}]", value.signed());
        }
        out
    }

    /// Human-readable hex dump of the whole memory buffer.
    pub fn dump_memory(&self) -> String {
        let mut out = String::from("memory:\n");
        for (row, bytes) in self.memory.bytes().chunks(16).enumerate() {
            let _ = write!(out, "{:>6x}:", row * 16);
            for byte in bytes {
                let _ = write!(out, " {byte:02x}");
            }
            out.push('\n');
        }
        out
    }
}

fn region_for(addr: RegId, stack: MemChunk, heap: MemChunk) -> MemChunk {
    if addr == RegId::STACK {
        stack
    } else {
        heap
    }
}

/// Reinterpret `value` at `width` when narrower than the register, keeping
/// the register's own width otherwise.
fn narrowed(value: Value, width: Width) -> Value {
    if width < value.width() {
        value.with_width(width)
    } else {
        value
    }
}

/// Read `width` big-endian bytes at `pos` inside `region`; bytes beyond the
/// region read as zero.
fn region_read(data: &[u8], region: MemChunk, pos: usize, width: Width) -> Value {
    let count = width.bytes();
    let mut be = [0u8; 8];
    for i in 0..count {
        if let Some(offset) = pos.checked_add(i).filter(|&o| o < region.len()) {
            be[8 - count + i] = data[region.begin + offset];
        }
    }
    Value::new(i64::from_be_bytes(be), width)
}

/// Write the big-endian bytes of `value` at `pos` inside `region`; bytes
/// beyond the region are dropped.
fn region_write(data: &mut [u8], region: MemChunk, pos: usize, value: Value) {
    let count = value.width().bytes();
    let be = value.signed().to_be_bytes();
    for i in 0..count {
        if let Some(offset) = pos.checked_add(i).filter(|&o| o < region.len()) {
            data[region.begin + offset] = be[8 - count + i];
        }
    }
}

/// All arithmetic is 64-bit signed and wraps; a zero divisor yields `None`.
fn binary_alu(op: BinaryAlu, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        BinaryAlu::Add => Some(lhs.wrapping_add(rhs)),
        BinaryAlu::Sub => Some(lhs.wrapping_sub(rhs)),
        BinaryAlu::Mul => Some(lhs.wrapping_mul(rhs)),
        BinaryAlu::Div => (rhs != 0).then(|| lhs.wrapping_div(rhs)),
        BinaryAlu::Mod => (rhs != 0).then(|| lhs.wrapping_rem(rhs)),
    }
}

fn unary_alu(op: UnaryAlu, value: i64) -> i64 {
    match op {
        UnaryAlu::Inv => value.wrapping_neg(),
        UnaryAlu::Inc => value.wrapping_add(1),
        UnaryAlu::Dec => value.wrapping_sub(1),
    }
}

fn const_alu(op: ConstAlu, reg: i64, constant: i64) -> Option<i64> {
    match op {
        ConstAlu::Add => Some(reg.wrapping_add(constant)),
        ConstAlu::SubRhs => Some(reg.wrapping_sub(constant)),
        ConstAlu::SubLhs => Some(constant.wrapping_sub(reg)),
        ConstAlu::Mul => Some(reg.wrapping_mul(constant)),
        ConstAlu::DivRhs => (constant != 0).then(|| reg.wrapping_div(constant)),
        ConstAlu::DivLhs => (reg != 0).then(|| constant.wrapping_div(reg)),
        ConstAlu::ModRhs => (constant != 0).then(|| reg.wrapping_rem(constant)),
        ConstAlu::ModLhs => (reg != 0).then(|| constant.wrapping_rem(reg)),
    }
}

/// Resolve a jump. Relative offsets are signed and based at the byte offset
/// of the jump opcode; absolute targets are unsigned. Either way the
/// destination must fall inside the program.
fn jump_dest(at: usize, program_len: usize, target: JumpTarget) -> Option<usize> {
    let dest = if target.relative {
        let dest = at as i64 + target.value.signed();
        if dest < 0 {
            return None;
        }
        dest as u64
    } else {
        target.value.unsigned()
    };

    (dest < program_len as u64).then_some(dest as usize)
}
