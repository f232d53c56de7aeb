//! The statement and expression tree handed to the compiler.
//!
//! Variables carry no names here; they are identity tokens minted by an
//! [`IdFactory`] and resolved to registers and heap slots downstream.

use core::fmt;

/// Identity token of a variable or expression result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0)
    }
}

/// Mints monotonically increasing [`VarId`] tokens.
#[derive(Debug, Default)]
pub struct IdFactory {
    next: usize,
}

impl IdFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id, never returned before.
    pub fn fresh(&mut self) -> VarId {
        let id = VarId(self.next);
        self.next += 1;
        id
    }
}

/// Two-operand arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `lhs + rhs`
    Add,
    /// `lhs − rhs`
    Sub,
    /// `lhs × rhs`
    Mul,
    /// `lhs ÷ rhs`
    Div,
    /// `lhs mod rhs`
    Mod,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        };
        f.write_str(symbol)
    }
}

/// Single-operand arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Identity; legal only in prefix position.
    Plus,
    /// Negation; legal only in prefix position.
    Minus,
    /// Increment by one.
    Incr,
    /// Decrement by one.
    Decr,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Incr => "++",
            UnaryOp::Decr => "--",
        };
        f.write_str(symbol)
    }
}

/// Structured control transfer out of the current construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowControl {
    /// Leave the innermost loop.
    Break,
    /// Restart the innermost loop body.
    Continue,
    /// Leave the current function (reserved; functions are future work).
    Return,
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            FlowControl::Break => "break",
            FlowControl::Continue => "continue",
            FlowControl::Return => "return",
        };
        f.write_str(word)
    }
}

/// An expression; evaluates to a value identified by a [`VarId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// The current value of a variable.
    Variable(VarId),
    /// A literal constant.
    Constant(i64),
    /// A two-operand arithmetic expression.
    ///
    /// Operands evaluate right to left; this is observable when both sides
    /// touch the same variable through `++`/`--`.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A single-operand arithmetic expression.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        expr: Box<Expr>,
        /// Whether the operator is in postfix position.
        post: bool,
    },
}

impl Expr {
    /// A variable reference.
    pub fn var(id: VarId) -> Self {
        Expr::Variable(id)
    }

    /// A literal constant.
    pub fn constant(value: i64) -> Self {
        Expr::Constant(value)
    }

    /// A binary expression.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// A prefix unary expression.
    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
            post: false,
        }
    }

    /// A postfix unary expression.
    pub fn unary_post(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
            post: true,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Variable(id) => write!(f, "{id}"),
            Expr::Constant(value) => write!(f, "{value}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expr::Unary { op, expr, post: true } => write!(f, "{expr}{op}"),
            Expr::Unary { op, expr, post: false } => write!(f, "{op}{expr}"),
        }
    }
}

/// One arm of a [`Stmt::Conditional`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalArm {
    /// Taken when this evaluates to a strictly positive value.
    pub cond: Expr,
    /// Statements of the arm.
    pub body: Vec<Stmt>,
}

/// A statement; appends instructions but yields no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// Evaluate an expression into a variable.
    Assign {
        /// Target variable.
        var: VarId,
        /// Right-hand side.
        expr: Expr,
        /// Whether this assignment declares the variable, reserving a heap
        /// slot on its first occurrence.
        define: bool,
    },
    /// Evaluate an expression and discard the result.
    Expr(Expr),
    /// `break`, `continue`, or `return`.
    FlowControl(FlowControl),
    /// A loop in the shape `loop (init; cond; step) { body }`.
    ///
    /// The body repeats while `cond` is strictly positive; a missing `cond`
    /// loops forever (until a `break`).
    Loop {
        /// Runs once before the loop.
        init: Option<Box<Stmt>>,
        /// Checked before every iteration.
        cond: Option<Expr>,
        /// Runs after every iteration.
        step: Option<Box<Stmt>>,
        /// Loop body.
        body: Vec<Stmt>,
    },
    /// A conditional chain with an optional trailing else block.
    Conditional {
        /// If/else-if arms, checked in order; at least one is required.
        arms: Vec<ConditionalArm>,
        /// Statements run when no arm matches.
        else_body: Vec<Stmt>,
    },
}

impl Stmt {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            Stmt::Assign { var, expr, define } => {
                let init = if *define { "init " } else { "" };
                write!(f, "{pad}{init}{var} = {expr}")
            }
            Stmt::Expr(expr) => write!(f, "{pad}{expr}"),
            Stmt::FlowControl(control) => write!(f, "{pad}{control}"),
            Stmt::Loop { init, cond, step, body } => {
                write!(f, "{pad}loop ( ")?;
                if let Some(init) = init {
                    write!(f, "{init}")?;
                }
                write!(f, " ; ")?;
                if let Some(cond) = cond {
                    write!(f, "{cond}")?;
                }
                write!(f, " ; ")?;
                if let Some(step) = step {
                    write!(f, "{step}")?;
                }
                write!(f, " )")?;
                for stmt in body {
                    writeln!(f)?;
                    stmt.fmt_indented(f, indent + 1)?;
                }
                Ok(())
            }
            Stmt::Conditional { arms, else_body } => {
                for (index, arm) in arms.iter().enumerate() {
                    writeln!(f, "{pad}conditional {index} ( {} )", arm.cond)?;
                    for stmt in &arm.body {
                        stmt.fmt_indented(f, indent + 1)?;
                        writeln!(f)?;
                    }
                }
                write!(f, "{pad}conditional else")?;
                for stmt in else_body {
                    writeln!(f)?;
                    stmt.fmt_indented(f, indent + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
