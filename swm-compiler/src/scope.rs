//! Lifetime bookkeeping for the register allocator.
//!
//! Every operand slot the lowerer emits is recorded here as a node in the
//! owning variable's lifetime list, a doubly-linked chain sorted by command
//! position. The nodes live in one arena and link by index, so inserting
//! next to a cached neighbor stays O(1) and teardown is trivial.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::{
    cmd::{CmdId, OperandField},
    ir::VarId,
};

/// Handle of one lifetime node in the scope's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct RaId(usize);

/// One register request: a command position referencing a variable, and the
/// operand slot to patch once a physical register is chosen.
#[derive(Debug)]
pub(crate) struct RaNode {
    pub var: VarId,
    pub hint: usize,
    /// Slot to patch; `None` for lifetime-extension entries that patch
    /// nothing (loop back-edge re-registrations).
    pub slot: Option<(CmdId, OperandField)>,
    /// The command this request belongs to; spill code is inserted around it.
    pub cmd: CmdId,
    /// Whether the variable is defined in place here, making a spill load
    /// before this position unnecessary.
    pub defined: bool,
    prev: Option<RaId>,
    next: Option<RaId>,
}

/// Per-variable lifetime lists, the loop-live set stack, and the current
/// break/continue jump targets.
#[derive(Debug, Default)]
pub struct Scope {
    nodes: Vec<RaNode>,
    /// Last-inserted node per variable; insertion walks from here.
    last_pos: HashMap<VarId, RaId>,
    /// List heads ordered by first-use position.
    heads: BTreeSet<(usize, RaId)>,
    loop_stack: Vec<BTreeSet<VarId>>,
    pub(crate) break_label: Option<String>,
    pub(crate) continue_label: Option<String>,
}

impl Scope {
    /// An empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a register request for `var` at position `hint`.
    pub(crate) fn add_entry(
        &mut self,
        slot: Option<(CmdId, OperandField)>,
        hint: usize,
        var: VarId,
        cmd: CmdId,
    ) {
        let id = RaId(self.nodes.len());
        debug!(%var, hint, "register request");

        match self.last_pos.get(&var).copied() {
            None => {
                self.nodes.push(RaNode {
                    var,
                    hint,
                    slot,
                    cmd,
                    defined: false,
                    prev: None,
                    next: None,
                });
                self.heads.insert((hint, id));
            }
            Some(start) => {
                let (prev, next) = self.find_neighbors(start, hint);
                self.nodes.push(RaNode {
                    var,
                    hint,
                    slot,
                    cmd,
                    defined: false,
                    prev,
                    next,
                });
                if let Some(p) = prev {
                    self.nodes[p.0].next = Some(id);
                }
                if let Some(n) = next {
                    self.nodes[n.0].prev = Some(id);
                }
                if prev.is_none() {
                    // This node displaced the old head of the list.
                    if let Some(old_head) = next {
                        self.heads.remove(&(self.nodes[old_head.0].hint, old_head));
                    }
                    self.heads.insert((hint, id));
                }
            }
        }

        self.last_pos.insert(var, id);

        if let Some(live) = self.loop_stack.last_mut() {
            live.insert(var);
        }
    }

    /// Walk from the cached position to the pair of nodes `hint` sorts
    /// between.
    fn find_neighbors(&self, start: RaId, hint: usize) -> (Option<RaId>, Option<RaId>) {
        if hint < self.nodes[start.0].hint {
            let mut next = start;
            let mut prev = self.nodes[start.0].prev;
            while let Some(p) = prev {
                if hint >= self.nodes[p.0].hint {
                    break;
                }
                next = p;
                prev = self.nodes[p.0].prev;
            }
            (prev, Some(next))
        } else {
            let mut prev = start;
            let mut next = self.nodes[start.0].next;
            while let Some(n) = next {
                if hint <= self.nodes[n.0].hint {
                    break;
                }
                prev = n;
                next = self.nodes[n.0].next;
            }
            (Some(prev), next)
        }
    }

    /// Mark `var` as defined in place, suppressing its initial spill load.
    ///
    /// Only applies when the most recent request is also the variable's
    /// first: a definition that merely reassigns, or follows earlier uses,
    /// still needs the load.
    pub(crate) fn mark_defined(&mut self, var: VarId) {
        if let Some(&last) = self.last_pos.get(&var) {
            if self.nodes[last.0].prev.is_none() {
                self.nodes[last.0].defined = true;
            }
        }
    }

    /// Open a loop: start collecting the variables its body touches.
    pub(crate) fn push_loop(&mut self) {
        self.loop_stack.push(BTreeSet::new());
    }

    /// Close a loop: re-register every collected variable at the loop's end
    /// so its lifetime covers the back edge, then drop the set.
    pub(crate) fn pop_loop(&mut self, hint: usize, cmd: CmdId) {
        if let Some(live) = self.loop_stack.last().cloned() {
            for var in live {
                self.add_entry(None, hint, var, cmd);
            }
            self.loop_stack.pop();
        }
    }

    /// Lifetime list heads in first-use order.
    pub(crate) fn heads(&self) -> impl Iterator<Item = RaId> + '_ {
        self.heads.iter().map(|&(_, id)| id)
    }

    /// The node behind `id`.
    pub(crate) fn node(&self, id: RaId) -> &RaNode {
        &self.nodes[id.0]
    }

    /// Walk a lifetime list from its head.
    pub(crate) fn chain(&self, head: RaId) -> impl Iterator<Item = &RaNode> + '_ {
        std::iter::successors(Some(&self.nodes[head.0]), move |node| {
            node.next.map(|n| &self.nodes[n.0])
        })
    }
}
