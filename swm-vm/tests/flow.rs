mod common;

use common::*;
use swm_asm::{Condition, JumpTarget, Op, RegId, Width};
use swm_vm::{Capacity, MemUnit, Program, RetCode, Vm, VmConfig};

fn rel(offset: i64, width: Width) -> JumpTarget {
    JumpTarget {
        relative: true,
        value: val(offset, width),
    }
}

fn abs(target: i64, width: Width) -> JumpTarget {
    JumpTarget {
        relative: false,
        value: val(target, width),
    }
}

/// The interleaved-accumulator loop, hand-coded: two running sums take turns
/// receiving `a + b`, each result is stored at an advancing 8-byte stride,
/// and a counter drives one thousand iterations.
///
/// Byte offsets, for the jump arithmetic (relative jumps resolve against the
/// offset of the jump opcode):
///
/// ```text
///  0: r0 = 1          25: if r4 != r5 jump +16 (→ 41)
///  3: r1 = 2          29: r0 = r0 + r1
///  6: r7 = 1000       33: heap[r3] = r0 (8B)
/// 10: r6 = 0          36: r4 = 1
/// 13: r5 = 0          39: jump +12 (→ 51)
/// 16: r4 = 0          41: r1 = r0 + r1
/// 19: r3 = 0          45: heap[r3] = r1 (8B)
/// 22: r2 = 8          48: r4 = 0
///                     51: r3 = r3 + r2
///                     55: r6 += 1
///                     57: if r6 < r7 jump −32 (→ 25)
/// ```
fn interleaved_fibonacci() -> Vec<Op> {
    use swm_asm::BinaryAlu::Add;

    vec![
        ldconst(0, 1, Width::B1),
        ldconst(1, 2, Width::B1),
        ldconst(7, 1000, Width::B2),
        ldconst(6, 0, Width::B1),
        ldconst(5, 0, Width::B1),
        ldconst(4, 0, Width::B1),
        ldconst(3, 0, Width::B1),
        ldconst(2, 8, Width::B1),
        Op::JumpIf {
            cond: Condition::NotEqual,
            a: reg(4),
            b: reg(5),
            target: rel(16, Width::B1),
        },
        Op::Binary { op: Add, a: reg(0), b: reg(1), out: reg(0) },
        Op::StoreReg { src: reg(0), addr: reg(3), width: Width::B8 },
        ldconst(4, 1, Width::B1),
        Op::Jump { target: rel(12, Width::B1) },
        Op::Binary { op: Add, a: reg(0), b: reg(1), out: reg(1) },
        Op::StoreReg { src: reg(1), addr: reg(3), width: Width::B8 },
        ldconst(4, 0, Width::B1),
        Op::Binary { op: Add, a: reg(3), b: reg(2), out: reg(3) },
        Op::Unary { op: swm_asm::UnaryAlu::Inc, reg: reg(6) },
        Op::JumpIf {
            cond: Condition::Less,
            a: reg(6),
            b: reg(7),
            target: rel(-32, Width::B1),
        },
    ]
}

#[test]
fn thousand_iteration_loop_fills_the_heap() {
    let mut vm = vm(
        Width::B8,
        8,
        Capacity::of(8, MemUnit::Kb),
        Capacity::of(1, MemUnit::Kb),
    );
    let fixture = program(&interleaved_fibonacci(), 8000);
    assert_eq!(fixture.bytes().len(), 61);

    let code = vm.run(&fixture);
    assert_eq!(code, RetCode::Success);

    // The heap starts with the sequence at 8-byte big-endian strides.
    let heap = heap_bytes(&vm, 8000);
    let mut slots = heap.chunks(8).map(|s| {
        i64::from_be_bytes(s.try_into().expect("8-byte stride"))
    });
    for expected in [3, 5, 8, 13, 21, 34, 55, 89] {
        assert_eq!(slots.next(), Some(expected));
    }

    assert_eq!(vm.register(6).signed(), 1000); // loop counter ran out
    assert_eq!(vm.register(2).signed(), 8); // stride
    assert_eq!(vm.register(3).signed(), 8000); // next store offset
}

#[test]
fn relative_jump_underflow_is_out_of_range() {
    let mut vm = small_vm();
    let code = vm.run(&program(
        &[Op::Jump { target: rel(-1, Width::B1) }],
        0,
    ));
    assert_eq!(code, RetCode::JumpOutOfRange);
}

#[test]
fn relative_jump_past_the_end_is_out_of_range() {
    let mut vm = small_vm();
    let code = vm.run(&program(
        &[Op::Nop, Op::Jump { target: rel(100, Width::B1) }],
        0,
    ));
    assert_eq!(code, RetCode::JumpOutOfRange);
}

#[test]
fn absolute_jump_must_land_inside_the_program() {
    let mut vm = small_vm();
    let ops = [
        Op::Jump { target: abs(4, Width::B2) },
        Op::Halt,
        Op::Nop,
    ];
    // 0: jump over the HALT at 3 onto the NOP at 4, then fall through.
    assert_eq!(vm.run(&program(&ops, 0)), RetCode::Success);

    let code = vm.run(&program(&[Op::Jump { target: abs(64, Width::B1) }], 0));
    assert_eq!(code, RetCode::JumpOutOfRange);
}

#[test]
fn conditional_jumps_compare_signed_values() {
    let mut vm = small_vm();
    // r0 = -2, r1 = 1; signed compare must take the branch over the HALT.
    let code = vm.run(&program(
        &[
            ldconst(0, -2, Width::B1),
            ldconst(1, 1, Width::B1),
            Op::JumpIf {
                cond: Condition::Less,
                a: reg(0),
                b: reg(1),
                target: abs(11, Width::B1),
            },
            Op::Halt,
            ldconst(2, 7, Width::B1),
        ],
        0,
    ));

    assert_eq!(code, RetCode::Success);
    assert_eq!(vm.register(2).signed(), 7);
}

#[test]
fn writing_the_counter_redirects_execution() {
    let mut vm = small_vm();
    // 0: r254 (the counter) = 7 → skips the HALT at 4; 5,6: NOPs; then the
    // LDCONST at 7 runs and the program falls through.
    let code = vm.run(&program(
        &[
            Op::LoadConst {
                dst: RegId::COUNTER,
                value: val(7, Width::B2),
            },
            Op::Halt,
            Op::Nop,
            Op::Nop,
            ldconst(0, 9, Width::B1),
        ],
        0,
    ));

    assert_eq!(code, RetCode::Success);
    assert_eq!(vm.register(0).signed(), 9);
}

#[test]
fn empty_program_is_rejected() {
    let mut vm = small_vm();
    assert_eq!(vm.run(&Program::default()), RetCode::NoProgram);
}

#[test]
fn truncated_instruction_reports_unexpected_end() {
    let mut vm = small_vm();
    // LDCONST announcing an 8-byte constant, with only two bytes present.
    let code = vm.run(&Program::new(vec![0b1110_0011, 0, 1, 2], 0));
    assert_eq!(code, RetCode::UnexpectedEnd);
}

#[test]
fn unknown_opcode_stops_the_machine() {
    let mut vm = small_vm();
    let code = vm.run(&Program::new(vec![0b1000_0000], 0));
    assert_eq!(code, RetCode::UnknownCommand);
}

#[test]
fn halting_no_op_program_succeeds() {
    let mut vm = small_vm();
    assert_eq!(vm.run(&program(&[Op::Nop, Op::Nop], 0)), RetCode::Success);
    assert_eq!(vm.run(&program(&[Op::Nop, Op::Halt], 0)), RetCode::Halted);
}

#[test]
fn identical_runs_are_deterministic() {
    let build = || {
        Vm::new(VmConfig {
            max_width: Width::B8,
            register_count: 8,
            heap_capacity: Capacity::of(8, MemUnit::Kb),
            stack_capacity: Capacity::of(1, MemUnit::Kb),
        })
        .expect("valid config")
    };
    let fixture = program(&interleaved_fibonacci(), 8000);

    let mut first = build();
    let mut second = build();
    assert_eq!(first.run(&fixture), second.run(&fixture));
    assert_eq!(first, second);
    assert_eq!(first.dump_registers(), second.dump_registers());
    assert_eq!(first.memory().bytes(), second.memory().bytes());
}
