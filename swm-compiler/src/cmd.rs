//! The ordered command list produced by lowering.
//!
//! Commands are abstract instructions whose register operands are one-byte
//! slots left at zero by the lowerer and filled in by the register
//! allocator, addressed as `(command id, operand field)` pairs. The list is
//! an arena-backed doubly-linked list: ids stay valid across insertions, and
//! inserting before or after a known command is O(1).

use swm_asm::{BinaryAlu, Condition, UnaryAlu, Value, Width};

/// Stable handle of one command in a [`CmdList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CmdId(usize);

/// Selects one register-operand slot of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandField {
    /// First operand slot.
    A,
    /// Second operand slot.
    B,
    /// Third operand slot.
    C,
}

/// One abstract command.
///
/// Register operands are raw bytes; label-targeted jumps keep their label
/// until assembly. A `Label` emits no bytes of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// No operation.
    Nop,
    /// Stop the program.
    Halt,
    /// Load an embedded constant into a register.
    LoadConst {
        /// Destination register slot.
        dst: u8,
        /// The constant.
        value: Value,
    },
    /// Copy one register into another.
    CopyReg {
        /// Source register slot.
        src: u8,
        /// Destination register slot.
        dst: u8,
    },
    /// Load from memory at a register-held address.
    LoadReg {
        /// Destination register slot.
        dst: u8,
        /// Address register slot.
        addr: u8,
        /// Bytes moved.
        width: Width,
    },
    /// Store to memory at a register-held address.
    StoreReg {
        /// Source register slot.
        src: u8,
        /// Address register slot.
        addr: u8,
        /// Bytes moved.
        width: Width,
    },
    /// Load from the heap at a constant address (spill load).
    LoadMem {
        /// Destination register.
        dst: u8,
        /// Heap address constant.
        addr: Value,
        /// Bytes moved.
        width: Width,
    },
    /// Store to the heap at a constant address (spill store).
    StoreMem {
        /// Source register.
        src: u8,
        /// Heap address constant.
        addr: Value,
        /// Bytes moved.
        width: Width,
    },
    /// Two-operand ALU command.
    Binary {
        /// Operator.
        op: BinaryAlu,
        /// Left operand slot.
        a: u8,
        /// Right operand slot.
        b: u8,
        /// Output slot.
        out: u8,
    },
    /// In-place unary ALU command.
    Unary {
        /// Operator.
        op: UnaryAlu,
        /// Operand slot.
        reg: u8,
    },
    /// Unary ALU command writing to a separate register.
    UnaryMove {
        /// Operator.
        op: UnaryAlu,
        /// Source slot.
        src: u8,
        /// Destination slot.
        dst: u8,
    },
    /// Unconditional jump to a label.
    Jump {
        /// Target label.
        label: String,
    },
    /// Conditional jump to a label.
    JumpIf {
        /// Comparison.
        cond: Condition,
        /// Left comparison slot.
        a: u8,
        /// Right comparison slot.
        b: u8,
        /// Target label.
        label: String,
    },
    /// A zero-size label definition.
    Label(String),
}

/// Width of the absolute target embedded in label-based jumps.
pub const JUMP_TARGET_WIDTH: Width = Width::B2;

impl Cmd {
    /// Encoded size of this command in bytes.
    pub fn size(&self) -> usize {
        match self {
            Cmd::Label(_) => 0,
            Cmd::Nop | Cmd::Halt => 1,
            Cmd::Unary { .. } => 2,
            Cmd::CopyReg { .. } | Cmd::LoadReg { .. } | Cmd::StoreReg { .. } => 3,
            Cmd::UnaryMove { .. } => 3,
            Cmd::LoadConst { value, .. } => 2 + value.width().bytes(),
            Cmd::LoadMem { addr, .. } | Cmd::StoreMem { addr, .. } => 2 + addr.width().bytes(),
            Cmd::Binary { .. } => 4,
            Cmd::Jump { .. } => 1 + JUMP_TARGET_WIDTH.bytes(),
            Cmd::JumpIf { .. } => 3 + JUMP_TARGET_WIDTH.bytes(),
        }
    }

    /// Mutable access to one register-operand slot, if the command has it.
    pub fn slot_mut(&mut self, field: OperandField) -> Option<&mut u8> {
        use OperandField::{A, B, C};
        match (self, field) {
            (Cmd::LoadConst { dst, .. }, A) => Some(dst),
            (Cmd::CopyReg { src, .. }, A) => Some(src),
            (Cmd::CopyReg { dst, .. }, B) => Some(dst),
            (Cmd::Binary { a, .. }, A) => Some(a),
            (Cmd::Binary { b, .. }, B) => Some(b),
            (Cmd::Binary { out, .. }, C) => Some(out),
            (Cmd::Unary { reg, .. }, A) => Some(reg),
            (Cmd::UnaryMove { src, .. }, A) => Some(src),
            (Cmd::UnaryMove { dst, .. }, B) => Some(dst),
            (Cmd::JumpIf { a, .. }, A) => Some(a),
            (Cmd::JumpIf { b, .. }, B) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Node {
    cmd: Cmd,
    prev: Option<CmdId>,
    next: Option<CmdId>,
}

/// Arena-backed doubly-linked list of commands.
#[derive(Debug, Default)]
pub struct CmdList {
    nodes: Vec<Node>,
    head: Option<CmdId>,
    tail: Option<CmdId>,
}

impl CmdList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commands in the list.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the list holds no commands.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a command, returning its stable id.
    pub fn push_back(&mut self, cmd: Cmd) -> CmdId {
        let id = self.alloc(cmd, self.tail, None);
        match self.tail {
            Some(tail) => self.nodes[tail.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    /// Insert a command immediately before `at`.
    pub fn insert_before(&mut self, at: CmdId, cmd: Cmd) -> CmdId {
        let prev = self.nodes[at.0].prev;
        let id = self.alloc(cmd, prev, Some(at));
        match prev {
            Some(prev) => self.nodes[prev.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.nodes[at.0].prev = Some(id);
        id
    }

    /// Insert a command immediately after `at`.
    pub fn insert_after(&mut self, at: CmdId, cmd: Cmd) -> CmdId {
        let next = self.nodes[at.0].next;
        let id = self.alloc(cmd, Some(at), next);
        match next {
            Some(next) => self.nodes[next.0].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.nodes[at.0].next = Some(id);
        id
    }

    /// The command behind `id`.
    pub fn get(&self, id: CmdId) -> &Cmd {
        &self.nodes[id.0].cmd
    }

    /// Mutable access to the command behind `id`.
    pub fn get_mut(&mut self, id: CmdId) -> &mut Cmd {
        &mut self.nodes[id.0].cmd
    }

    /// Walk the list in order. Ids handed out earlier stay valid while the
    /// iterator lives, but the iterator itself borrows the list.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            at: self.head,
        }
    }

    fn alloc(&mut self, cmd: Cmd, prev: Option<CmdId>, next: Option<CmdId>) -> CmdId {
        let id = CmdId(self.nodes.len());
        self.nodes.push(Node { cmd, prev, next });
        id
    }
}

/// In-order iterator over a [`CmdList`].
#[derive(Debug)]
pub struct Iter<'a> {
    list: &'a CmdList,
    at: Option<CmdId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (CmdId, &'a Cmd);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.at?;
        let node = &self.list.nodes[id.0];
        self.at = node.next;
        Some((id, &node.cmd))
    }
}
