use core::fmt;

use crate::{RegId, Value, Width};

// Opcode families live in the two high bits; `0b10` is unassigned.
const FAMILY_MASK: u8 = 0b1100_0000;
const FAMILY_JUMP: u8 = 0b0100_0000;
const FAMILY_MOVE: u8 = 0b1100_0000;

const MOVE_KIND_MASK: u8 = 0b0011_0000;
const MOVE_TO_REG: u8 = 0b0000_0000;
const MOVE_TO_MEM: u8 = 0b0001_0000;
const MOVE_CONST_GROUP: u8 = 0b0010_0000;
const MOVE_CONST_ADDR: u8 = 0b0000_1000;
const MOVE_ADDR_WIDTH: u8 = 0b0000_0100;

const ALU_REG_GROUP: u8 = 0b0001_0000;
const ALU_CONST_GROUP: u8 = 0b0010_0000;
const ALU_MOVE_BIT: u8 = 0b0000_1000;

const JUMP_RELATIVE: u8 = 0b0000_0100;

const OP_NOP: u8 = 0b0000_0000;
const OP_HALT: u8 = 0b1111_1111;
const OP_CPREG: u8 = 0b1110_0100;
const OP_LDCONST: u8 = 0b1110_0000;

/// Two-operand ALU operator, register × register → register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BinaryAlu {
    /// Signed addition.
    Add = 0,
    /// Signed subtraction.
    Sub = 1,
    /// Signed multiplication.
    Mul = 2,
    /// Signed division.
    Div = 3,
    /// Signed remainder.
    Mod = 4,
}

/// Single-operand ALU operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum UnaryAlu {
    /// Two's-complement negation.
    Inv = 5,
    /// Add one.
    Inc = 6,
    /// Subtract one.
    Dec = 7,
}

/// ALU operator taking one register and one embedded constant.
///
/// Subtraction, division, and remainder are not commutative, so each carries
/// a direction: `..Rhs` places the constant on the right-hand side, `..Lhs`
/// on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ConstAlu {
    /// `reg + const`
    Add = 0,
    /// `reg − const`
    SubRhs = 1,
    /// `const − reg`
    SubLhs = 2,
    /// `reg × const`
    Mul = 3,
    /// `reg ÷ const`
    DivRhs = 4,
    /// `const ÷ reg`
    DivLhs = 5,
    /// `reg mod const`
    ModRhs = 6,
    /// `const mod reg`
    ModLhs = 7,
}

/// Comparison selecting a conditional jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Condition {
    /// Jump when `a < b` (signed).
    Less = 1,
    /// Jump when `a == b`.
    Equal = 2,
    /// Jump when `a != b`.
    NotEqual = 3,
}

/// Width-tagged jump destination.
///
/// A relative target is a signed offset from the byte offset of the jump
/// opcode itself; an absolute target is an unsigned program offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JumpTarget {
    /// Whether the target is an offset from the jump instruction.
    pub relative: bool,
    /// The target or offset, at its wire width.
    pub value: Value,
}

/// One abstract machine instruction.
///
/// Constant-addressed moves (`LoadMem`/`StoreMem`) embed the heap address as
/// a constant of width [`Width::B1`] or [`Width::B2`]; wider address
/// constants are not representable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    /// Do nothing.
    Nop,
    /// Stop the program, yielding the `Halted` code.
    Halt,
    /// Load `width` bytes from memory at the address held in `addr`.
    LoadReg {
        /// Destination register.
        dst: RegId,
        /// Register holding the memory address.
        addr: RegId,
        /// Number of bytes moved.
        width: Width,
    },
    /// Store `width` bytes of `src` to memory at the address held in `addr`.
    StoreReg {
        /// Source register.
        src: RegId,
        /// Register holding the memory address.
        addr: RegId,
        /// Number of bytes moved.
        width: Width,
    },
    /// Load `width` bytes from the heap at an embedded constant address.
    LoadMem {
        /// Destination register.
        dst: RegId,
        /// Embedded address constant (width B1 or B2).
        addr: Value,
        /// Number of bytes moved.
        width: Width,
    },
    /// Store `width` bytes of `src` to the heap at an embedded constant address.
    StoreMem {
        /// Source register.
        src: RegId,
        /// Embedded address constant (width B1 or B2).
        addr: Value,
        /// Number of bytes moved.
        width: Width,
    },
    /// Load an embedded constant into a register.
    LoadConst {
        /// Destination register.
        dst: RegId,
        /// The constant, at its wire width.
        value: Value,
    },
    /// Copy one register into another.
    CopyReg {
        /// Source register.
        src: RegId,
        /// Destination register.
        dst: RegId,
    },
    /// Two-operand ALU operation.
    Binary {
        /// Operator.
        op: BinaryAlu,
        /// Left operand register.
        a: RegId,
        /// Right operand register.
        b: RegId,
        /// Output register.
        out: RegId,
    },
    /// In-place single-operand ALU operation.
    Unary {
        /// Operator.
        op: UnaryAlu,
        /// Register mutated in place.
        reg: RegId,
    },
    /// Single-operand ALU operation writing to a separate register.
    UnaryMove {
        /// Operator.
        op: UnaryAlu,
        /// Source register.
        src: RegId,
        /// Destination register.
        dst: RegId,
    },
    /// ALU operation between a register and an embedded constant.
    BinaryConst {
        /// Operator and direction.
        op: ConstAlu,
        /// Input register.
        src: RegId,
        /// Output register.
        dst: RegId,
        /// Embedded constant, at its wire width.
        value: Value,
    },
    /// Unconditional jump.
    Jump {
        /// Destination.
        target: JumpTarget,
    },
    /// Conditional jump comparing two registers.
    JumpIf {
        /// Comparison deciding whether to jump.
        cond: Condition,
        /// Left comparison register.
        a: RegId,
        /// Right comparison register.
        b: RegId,
        /// Destination.
        target: JumpTarget,
    },
}

/// Failure while decoding one instruction from the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeError {
    /// The opcode byte does not match any listed bit pattern.
    UnknownCommand(u8),
    /// The stream ended inside the instruction's operand bytes.
    UnexpectedEnd,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand(byte) => write!(f, "unknown command byte {byte:#04x}"),
            Self::UnexpectedEnd => write!(f, "unexpected end of program"),
        }
    }
}

impl std::error::Error for DecodeError {}

fn addr_width_bit(addr: Value) -> u8 {
    // Address constants are confined to the one-bit `k` field.
    assert!(
        addr.width() <= Width::B2,
        "constant address width {} is not encodable",
        addr.width()
    );
    if addr.width() == Width::B2 {
        MOVE_ADDR_WIDTH
    } else {
        0
    }
}

fn jump_opcode(cond_code: u8, target: JumpTarget) -> u8 {
    let mut op = FAMILY_JUMP | (cond_code << 3) | target.value.width().index();
    if target.relative {
        op |= JUMP_RELATIVE;
    }
    op
}

impl Op {
    /// Encoded size of this instruction in bytes.
    pub fn size(&self) -> usize {
        match self {
            Op::Nop | Op::Halt => 1,
            Op::Unary { .. } => 2,
            Op::LoadReg { .. } | Op::StoreReg { .. } => 3,
            Op::CopyReg { .. } | Op::UnaryMove { .. } => 3,
            Op::LoadMem { addr, .. } | Op::StoreMem { addr, .. } => 2 + addr.width().bytes(),
            Op::LoadConst { value, .. } => 2 + value.width().bytes(),
            Op::Binary { .. } => 4,
            Op::BinaryConst { value, .. } => 3 + value.width().bytes(),
            Op::Jump { target } => 1 + target.value.width().bytes(),
            Op::JumpIf { target, .. } => 3 + target.value.width().bytes(),
        }
    }

    /// Append the wire form of this instruction to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match *self {
            Op::Nop => out.push(OP_NOP),
            Op::Halt => out.push(OP_HALT),
            Op::LoadReg { dst, addr, width } => {
                out.push(FAMILY_MOVE | MOVE_TO_REG | width.index());
                out.push(dst.to_u8());
                out.push(addr.to_u8());
            }
            Op::StoreReg { src, addr, width } => {
                out.push(FAMILY_MOVE | MOVE_TO_MEM | width.index());
                out.push(src.to_u8());
                out.push(addr.to_u8());
            }
            Op::LoadMem { dst, addr, width } => {
                out.push(
                    FAMILY_MOVE | MOVE_TO_REG | MOVE_CONST_ADDR | addr_width_bit(addr) | width.index(),
                );
                out.push(dst.to_u8());
                addr.push_be(out);
            }
            Op::StoreMem { src, addr, width } => {
                out.push(
                    FAMILY_MOVE | MOVE_TO_MEM | MOVE_CONST_ADDR | addr_width_bit(addr) | width.index(),
                );
                out.push(src.to_u8());
                addr.push_be(out);
            }
            Op::LoadConst { dst, value } => {
                out.push(OP_LDCONST | value.width().index());
                out.push(dst.to_u8());
                value.push_be(out);
            }
            Op::CopyReg { src, dst } => {
                out.push(OP_CPREG);
                out.push(src.to_u8());
                out.push(dst.to_u8());
            }
            Op::Binary { op, a, b, out: dst } => {
                out.push(ALU_REG_GROUP | op as u8);
                out.push(a.to_u8());
                out.push(b.to_u8());
                out.push(dst.to_u8());
            }
            Op::Unary { op, reg } => {
                out.push(ALU_REG_GROUP | op as u8);
                out.push(reg.to_u8());
            }
            Op::UnaryMove { op, src, dst } => {
                out.push(ALU_REG_GROUP | ALU_MOVE_BIT | op as u8);
                out.push(src.to_u8());
                out.push(dst.to_u8());
            }
            Op::BinaryConst { op, src, dst, value } => {
                out.push(ALU_CONST_GROUP | ((op as u8) << 2) | value.width().index());
                out.push(src.to_u8());
                out.push(dst.to_u8());
                value.push_be(out);
            }
            Op::Jump { target } => {
                out.push(jump_opcode(0, target));
                target.value.push_be(out);
            }
            Op::JumpIf { cond, a, b, target } => {
                out.push(jump_opcode(cond as u8, target));
                out.push(a.to_u8());
                out.push(b.to_u8());
                target.value.push_be(out);
            }
        }
    }

    /// Wire form of this instruction as a fresh byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        self.encode_into(&mut out);
        out
    }

    /// Decode one instruction from the front of `bytes`.
    ///
    /// On success returns the instruction and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Op, usize), DecodeError> {
        let mut cursor = Cursor::new(bytes);
        let opcode = cursor.byte()?;

        let op = match opcode {
            OP_NOP => Op::Nop,
            OP_HALT => Op::Halt,
            _ => match opcode & FAMILY_MASK {
                FAMILY_MOVE => decode_move(opcode, &mut cursor)?,
                FAMILY_JUMP => decode_jump(opcode, &mut cursor)?,
                0b0000_0000 => decode_alu(opcode, &mut cursor)?,
                _ => return Err(DecodeError::UnknownCommand(opcode)),
            },
        };

        Ok((op, cursor.consumed()))
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.at)
            .ok_or(DecodeError::UnexpectedEnd)?;
        self.at += 1;
        Ok(byte)
    }

    fn reg(&mut self) -> Result<RegId, DecodeError> {
        self.byte().map(RegId::new)
    }

    fn value(&mut self, width: Width) -> Result<Value, DecodeError> {
        let value = Value::read_be(&self.bytes[self.at..], width)
            .ok_or(DecodeError::UnexpectedEnd)?;
        self.at += width.bytes();
        Ok(value)
    }

    fn consumed(&self) -> usize {
        self.at
    }
}

fn decode_move(opcode: u8, cursor: &mut Cursor<'_>) -> Result<Op, DecodeError> {
    let width = Width::from_index(opcode);

    let kind = opcode & MOVE_KIND_MASK;
    match kind {
        MOVE_TO_REG | MOVE_TO_MEM => {
            let to_mem = kind == MOVE_TO_MEM;
            let data = cursor.reg()?;

            if opcode & MOVE_CONST_ADDR != 0 {
                let addr_width = if opcode & MOVE_ADDR_WIDTH != 0 {
                    Width::B2
                } else {
                    Width::B1
                };
                let addr = cursor.value(addr_width)?;
                Ok(if to_mem {
                    Op::StoreMem { src: data, addr, width }
                } else {
                    Op::LoadMem { dst: data, addr, width }
                })
            } else if opcode & MOVE_ADDR_WIDTH != 0 {
                Err(DecodeError::UnknownCommand(opcode))
            } else {
                let addr = cursor.reg()?;
                Ok(if to_mem {
                    Op::StoreReg { src: data, addr, width }
                } else {
                    Op::LoadReg { dst: data, addr, width }
                })
            }
        }
        MOVE_CONST_GROUP => {
            if opcode & 0b0000_1100 == 0 {
                let dst = cursor.reg()?;
                let value = cursor.value(width)?;
                Ok(Op::LoadConst { dst, value })
            } else if opcode == OP_CPREG {
                let src = cursor.reg()?;
                let dst = cursor.reg()?;
                Ok(Op::CopyReg { src, dst })
            } else {
                Err(DecodeError::UnknownCommand(opcode))
            }
        }
        _ => Err(DecodeError::UnknownCommand(opcode)),
    }
}

fn decode_alu(opcode: u8, cursor: &mut Cursor<'_>) -> Result<Op, DecodeError> {
    if opcode & ALU_CONST_GROUP != 0 {
        let op = match (opcode >> 2) & 0b111 {
            0 => ConstAlu::Add,
            1 => ConstAlu::SubRhs,
            2 => ConstAlu::SubLhs,
            3 => ConstAlu::Mul,
            4 => ConstAlu::DivRhs,
            5 => ConstAlu::DivLhs,
            6 => ConstAlu::ModRhs,
            _ => ConstAlu::ModLhs,
        };
        let src = cursor.reg()?;
        let dst = cursor.reg()?;
        let value = cursor.value(Width::from_index(opcode))?;
        return Ok(Op::BinaryConst { op, src, dst, value });
    }

    if opcode & ALU_REG_GROUP == 0 {
        return Err(DecodeError::UnknownCommand(opcode));
    }

    match opcode & 0b1111 {
        0 => decode_binary(BinaryAlu::Add, cursor),
        1 => decode_binary(BinaryAlu::Sub, cursor),
        2 => decode_binary(BinaryAlu::Mul, cursor),
        3 => decode_binary(BinaryAlu::Div, cursor),
        4 => decode_binary(BinaryAlu::Mod, cursor),
        5 => Ok(Op::Unary { op: UnaryAlu::Inv, reg: cursor.reg()? }),
        6 => Ok(Op::Unary { op: UnaryAlu::Inc, reg: cursor.reg()? }),
        7 => Ok(Op::Unary { op: UnaryAlu::Dec, reg: cursor.reg()? }),
        13 => decode_unary_move(UnaryAlu::Inv, cursor),
        14 => decode_unary_move(UnaryAlu::Inc, cursor),
        15 => decode_unary_move(UnaryAlu::Dec, cursor),
        _ => Err(DecodeError::UnknownCommand(opcode)),
    }
}

fn decode_binary(op: BinaryAlu, cursor: &mut Cursor<'_>) -> Result<Op, DecodeError> {
    let a = cursor.reg()?;
    let b = cursor.reg()?;
    let out = cursor.reg()?;
    Ok(Op::Binary { op, a, b, out })
}

fn decode_unary_move(op: UnaryAlu, cursor: &mut Cursor<'_>) -> Result<Op, DecodeError> {
    let src = cursor.reg()?;
    let dst = cursor.reg()?;
    Ok(Op::UnaryMove { op, src, dst })
}

fn decode_jump(opcode: u8, cursor: &mut Cursor<'_>) -> Result<Op, DecodeError> {
    let relative = opcode & JUMP_RELATIVE != 0;
    let width = Width::from_index(opcode);

    let cond = match (opcode >> 3) & 0b111 {
        0 => None,
        1 => Some(Condition::Less),
        2 => Some(Condition::Equal),
        3 => Some(Condition::NotEqual),
        _ => return Err(DecodeError::UnknownCommand(opcode)),
    };

    match cond {
        None => {
            let value = cursor.value(width)?;
            Ok(Op::Jump {
                target: JumpTarget { relative, value },
            })
        }
        Some(cond) => {
            let a = cursor.reg()?;
            let b = cursor.reg()?;
            let value = cursor.value(width)?;
            Ok(Op::JumpIf {
                cond,
                a,
                b,
                target: JumpTarget { relative, value },
            })
        }
    }
}
