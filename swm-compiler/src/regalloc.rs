//! Linear-scan register assignment over per-variable lifetime lists.
//!
//! Variables are placed in first-use order. Each physical register keeps a
//! sorted list of the closed `[first, last]` position intervals already
//! assigned to it; a variable takes the first register with a gap wide
//! enough for its own interval. Variables backed by a heap slot get spill
//! code inserted around their lifetime: a load before the first use (unless
//! the lifetime starts at a definition) and a store after the last.

use swm_asm::{Value, Width};
use tracing::debug;

use crate::{
    cmd::{Cmd, CmdList},
    memmap::MemMap,
    scope::Scope,
    CompileError, CompilerSettings,
};

pub(crate) fn allocate(
    cmds: &mut CmdList,
    scope: &Scope,
    mem: &MemMap,
    settings: &CompilerSettings,
) -> Result<(), CompileError> {
    let mut assigned: Vec<Vec<(usize, usize)>> =
        vec![Vec::new(); settings.max_registers as usize];

    for head in scope.heads() {
        let nodes: Vec<_> = scope.chain(head).collect();
        let first = nodes[0].hint;
        let last = nodes[nodes.len() - 1].hint;
        let var = nodes[0].var;

        let mut chosen = None;
        for (reg, intervals) in assigned.iter_mut().enumerate() {
            if settings.reserved_registers.contains(&(reg as u8)) {
                continue;
            }
            let pos = intervals.partition_point(|&(begin, _)| begin < first);
            let clear_before = pos == 0 || intervals[pos - 1].1 < first;
            let clear_after = pos == intervals.len() || last < intervals[pos].0;
            if clear_before && clear_after {
                intervals.insert(pos, (first, last));
                chosen = Some(reg as u8);
                break;
            }
        }
        let reg = chosen.ok_or(CompileError::OutOfRegisters)?;
        debug!(%var, reg, first, last, "placed lifetime");

        if mem.contains(var) && !nodes[0].defined {
            let spot = mem.get(var)?;
            cmds.insert_before(
                nodes[0].cmd,
                Cmd::LoadMem {
                    dst: reg,
                    addr: spill_addr(spot.offset)?,
                    width: spot.width,
                },
            );
        }

        for node in &nodes {
            if let Some((cmd, field)) = node.slot {
                let slot = cmds
                    .get_mut(cmd)
                    .slot_mut(field)
                    .expect("registered operand field exists on its command");
                *slot = reg;
            }
        }

        if mem.contains(var) {
            let spot = mem.get(var)?;
            cmds.insert_after(
                nodes[nodes.len() - 1].cmd,
                Cmd::StoreMem {
                    src: reg,
                    addr: spill_addr(spot.offset)?,
                    width: spot.width,
                },
            );
        }
    }

    Ok(())
}

/// Heap offsets ride in the one-bit-width constant-address field, so they
/// must fit two bytes.
fn spill_addr(offset: usize) -> Result<Value, CompileError> {
    match Width::fitting_unsigned(offset as u64) {
        width @ (Width::B1 | Width::B2) => Ok(Value::new(offset as i64, width)),
        _ => Err(CompileError::MemorySizeInvalid {
            width: Width::B2,
            bytes: offset,
        }),
    }
}
