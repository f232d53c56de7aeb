#![allow(dead_code)]

use swm_asm::{Op, RegId, Value, Width};
use swm_vm::{Capacity, MemUnit, Program, Vm, VmConfig};

/// Concatenate the wire form of a sequence of instructions.
pub fn assemble(ops: &[Op]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for op in ops {
        op.encode_into(&mut bytes);
    }
    bytes
}

pub fn program(ops: &[Op], heap_size: usize) -> Program {
    Program::new(assemble(ops), heap_size)
}

pub fn vm(
    width: Width,
    registers: usize,
    heap: Capacity,
    stack: Capacity,
) -> Vm {
    Vm::new(VmConfig {
        max_width: width,
        register_count: registers,
        heap_capacity: heap,
        stack_capacity: stack,
    })
    .expect("test configuration must validate")
}

/// Eight wide registers, a 1 KiB heap, a 128-byte stack.
pub fn small_vm() -> Vm {
    vm(
        Width::B8,
        8,
        Capacity::of(1, MemUnit::Kb),
        Capacity::of(128, MemUnit::Byte),
    )
}

/// The heap region is carved right after the stack region, so its contents
/// sit at the stack-capacity offset of the raw buffer.
pub fn heap_bytes<'a>(vm: &'a Vm, len: usize) -> &'a [u8] {
    let base = vm.config().stack_capacity.bytes();
    &vm.memory().bytes()[base..base + len]
}

pub fn reg(id: u8) -> RegId {
    RegId::new(id)
}

pub fn val(number: i64, width: Width) -> Value {
    Value::new(number, width)
}

pub fn ldconst(dst: u8, number: i64, width: Width) -> Op {
    Op::LoadConst {
        dst: reg(dst),
        value: val(number, width),
    }
}
