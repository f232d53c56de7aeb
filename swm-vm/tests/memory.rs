mod common;

use common::*;
use swm_asm::{Op, RegId, Width};
use swm_vm::{Capacity, MemUnit, RetCode, VmMemory};

#[test]
fn heap_round_trip_is_big_endian() {
    let mut vm = small_vm();
    let code = vm.run(&program(
        &[
            ldconst(0, 0x0102030405060708, Width::B8),
            ldconst(1, 0, Width::B1),
            Op::StoreReg {
                src: reg(0),
                addr: reg(1),
                width: Width::B8,
            },
            ldconst(2, 0, Width::B1),
            Op::LoadReg {
                dst: reg(3),
                addr: reg(2),
                width: Width::B8,
            },
            Op::Halt,
        ],
        8,
    ));

    assert_eq!(code, RetCode::Halted);
    assert_eq!(vm.register(3).signed(), 0x0102030405060708);
    assert_eq!(
        heap_bytes(&vm, 8),
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
    );
}

#[test]
fn constant_addressed_moves_always_hit_the_heap() {
    let mut vm = small_vm();
    let code = vm.run(&program(
        &[
            ldconst(0, -77, Width::B1),
            Op::StoreMem {
                src: reg(0),
                addr: val(300, Width::B2),
                width: Width::B2,
            },
            Op::LoadMem {
                dst: reg(1),
                addr: val(300, Width::B2),
                width: Width::B2,
            },
            Op::Halt,
        ],
        512,
    ));

    assert_eq!(code, RetCode::Halted);
    assert_eq!(vm.register(1).signed(), -77);
    assert_eq!(heap_bytes(&vm, 302)[300..], [0xFF, 0xB3]);
}

#[test]
fn stack_pointer_addressing_selects_the_stack_region() {
    let mut vm = small_vm();
    let code = vm.run(&program(
        &[
            ldconst(0, 0x55, Width::B1),
            // The stack pointer starts at zero; store through it.
            Op::StoreReg {
                src: reg(0),
                addr: RegId::STACK,
                width: Width::B1,
            },
            Op::LoadReg {
                dst: reg(1),
                addr: RegId::STACK,
                width: Width::B1,
            },
            Op::Halt,
        ],
        64,
    ));

    assert_eq!(code, RetCode::Halted);
    assert_eq!(vm.register(1).signed(), 0x55);
    // The write landed in the stack region, not in the heap region.
    assert_eq!(vm.memory().bytes()[0], 0x55);
    assert_eq!(heap_bytes(&vm, 1)[0], 0);
}

#[test]
fn out_of_region_reads_are_zero_and_writes_are_dropped() {
    let mut vm = small_vm();
    let code = vm.run(&program(
        &[
            ldconst(0, -1, Width::B8),
            ldconst(1, 1020, Width::B2),
            // Writing eight bytes at heap offset 1020 clips after four.
            Op::StoreReg {
                src: reg(0),
                addr: reg(1),
                width: Width::B8,
            },
            ldconst(2, 2000, Width::B2),
            Op::LoadReg {
                dst: reg(3),
                addr: reg(2),
                width: Width::B8,
            },
            Op::Halt,
        ],
        1024,
    ));

    assert_eq!(code, RetCode::Halted);
    // Fully out-of-region load reads zeros.
    assert_eq!(vm.register(3).signed(), 0);
    // The clipped store kept the in-region prefix.
    assert_eq!(heap_bytes(&vm, 1024)[1020..], [0xFF, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn stores_clamp_to_the_register_width() {
    // A four-byte register asked to store eight bytes writes four.
    let mut vm = vm(
        Width::B4,
        4,
        Capacity::of(256, MemUnit::Byte),
        Capacity::of(32, MemUnit::Byte),
    );
    let code = vm.run(&program(
        &[
            ldconst(0, 0x0A0B0C0D, Width::B4),
            ldconst(1, 0, Width::B1),
            Op::StoreReg {
                src: reg(0),
                addr: reg(1),
                width: Width::B8,
            },
            Op::Halt,
        ],
        16,
    ));

    assert_eq!(code, RetCode::Halted);
    assert_eq!(heap_bytes(&vm, 8), [0x0A, 0x0B, 0x0C, 0x0D, 0, 0, 0, 0]);
}

/// The fragmentation scenario: a best-fit allocator places fresh requests
/// inside a previously punched hole.
#[test]
fn fragmentation_reuses_the_freed_hole_best_fit() {
    let mut mem = VmMemory::new(Capacity::of(960, MemUnit::Byte));

    let _a = mem.alloc(128).unwrap(); //   0..128
    let b = mem.alloc(512).unwrap(); // 128..640
    let _c = mem.alloc(64).unwrap(); // 640..704
    let _d = mem.alloc(256).unwrap(); // 704..960

    mem.free_chunk(b).unwrap();

    let e = mem.alloc(128).unwrap();
    assert_eq!((e.begin, e.end), (128, 256));

    // What remains of the hole is a single 384-byte span.
    assert_eq!(mem.free_spans().collect::<Vec<_>>(), vec![(256, 640)]);

    // A following small request lands inside that span.
    let f = mem.alloc(32).unwrap();
    assert_eq!((f.begin, f.end), (256, 288));
}

#[test]
fn program_without_memory_reports_out_of_memory() {
    let mut vm = vm(
        Width::B8,
        4,
        Capacity::of(64, MemUnit::Byte),
        Capacity::of(16, MemUnit::Byte),
    );
    // Asks for more heap than the machine owns.
    let code = vm.run(&program(&[Op::Halt], 512));
    assert_eq!(code, RetCode::OutOfMemory);
}
