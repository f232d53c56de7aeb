//! Final bytecode emission with label patching.

use swm_asm::{JumpTarget, Op, RegId, Value};
use swm_vm::Program;
use tracing::debug;

use crate::{
    cmd::{Cmd, CmdList, JUMP_TARGET_WIDTH},
    labels::LabelMap,
    CompileError,
};

/// Walk the command list once, appending each command's wire form and
/// resolving labels as their definitions stream past. Any label still
/// pending after the walk was never defined.
pub(crate) fn assemble(
    cmds: &CmdList,
    labels: &mut LabelMap,
    heap_size: usize,
) -> Result<Program, CompileError> {
    let total: usize = cmds.iter().map(|(_, cmd)| cmd.size()).sum();
    let mut bytes = Vec::with_capacity(total);

    for (_, cmd) in cmds.iter() {
        match cmd {
            Cmd::Label(name) => labels.define(name, bytes.len(), &mut bytes)?,
            Cmd::Jump { label } => {
                let target_at = bytes.len() + 1;
                Op::Jump {
                    target: placeholder(),
                }
                .encode_into(&mut bytes);
                labels.request(label, target_at, JUMP_TARGET_WIDTH, &mut bytes);
            }
            Cmd::JumpIf { cond, a, b, label } => {
                let target_at = bytes.len() + 3;
                Op::JumpIf {
                    cond: *cond,
                    a: RegId::new(*a),
                    b: RegId::new(*b),
                    target: placeholder(),
                }
                .encode_into(&mut bytes);
                labels.request(label, target_at, JUMP_TARGET_WIDTH, &mut bytes);
            }
            other => op_for(other).encode_into(&mut bytes),
        }
    }

    debug_assert_eq!(bytes.len(), total);

    if let Some(label) = labels.first_pending() {
        return Err(CompileError::UnresolvedLabel(label.to_string()));
    }

    debug!(size = bytes.len(), heap_size, "assembled program");
    Ok(Program::new(bytes, heap_size))
}

/// Absolute target filled in by the label map.
fn placeholder() -> JumpTarget {
    JumpTarget {
        relative: false,
        value: Value::new(0, JUMP_TARGET_WIDTH),
    }
}

fn op_for(cmd: &Cmd) -> Op {
    match cmd {
        Cmd::Nop => Op::Nop,
        Cmd::Halt => Op::Halt,
        Cmd::LoadConst { dst, value } => Op::LoadConst {
            dst: RegId::new(*dst),
            value: *value,
        },
        Cmd::CopyReg { src, dst } => Op::CopyReg {
            src: RegId::new(*src),
            dst: RegId::new(*dst),
        },
        Cmd::LoadReg { dst, addr, width } => Op::LoadReg {
            dst: RegId::new(*dst),
            addr: RegId::new(*addr),
            width: *width,
        },
        Cmd::StoreReg { src, addr, width } => Op::StoreReg {
            src: RegId::new(*src),
            addr: RegId::new(*addr),
            width: *width,
        },
        Cmd::LoadMem { dst, addr, width } => Op::LoadMem {
            dst: RegId::new(*dst),
            addr: *addr,
            width: *width,
        },
        Cmd::StoreMem { src, addr, width } => Op::StoreMem {
            src: RegId::new(*src),
            addr: *addr,
            width: *width,
        },
        Cmd::Binary { op, a, b, out } => Op::Binary {
            op: *op,
            a: RegId::new(*a),
            b: RegId::new(*b),
            out: RegId::new(*out),
        },
        Cmd::Unary { op, reg } => Op::Unary {
            op: *op,
            reg: RegId::new(*reg),
        },
        Cmd::UnaryMove { op, src, dst } => Op::UnaryMove {
            op: *op,
            src: RegId::new(*src),
            dst: RegId::new(*dst),
        },
        Cmd::Jump { .. } | Cmd::JumpIf { .. } | Cmd::Label(_) => {
            unreachable!("label commands are handled by the emission loop")
        }
    }
}
