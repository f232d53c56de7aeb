//! Compile-time failures.

use swm_asm::Width;

use crate::ir::{FlowControl, UnaryOp, VarId};

/// An error raised while lowering, allocating registers, or assembling.
///
/// All of these abort the compilation; none of them can be observed by a
/// running program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// A variable was looked up before anything created it.
    #[error("variable {0} has not been created yet")]
    VariableNotFound(VarId),
    /// A width too narrow to address the compiled heap.
    #[error("a width of {width} cannot address a heap of {bytes} bytes")]
    MemorySizeInvalid {
        /// The widest usable address width.
        width: Width,
        /// The heap size that failed to fit.
        bytes: usize,
    },
    /// `break`/`continue` outside a loop, or `return` outside a function.
    #[error("flow control '{0}' is not valid for the current scope")]
    ScopeControl(FlowControl),
    /// The allocator could not place a variable lifetime in any register.
    #[error("ran out of registers while placing variable lifetimes")]
    OutOfRegisters,
    /// A unary operator used in a position it does not support.
    #[error("operation '{op}' is not supported as a {} operation", if *.post { "post" } else { "pre" })]
    InvalidOperation {
        /// The offending operator.
        op: UnaryOp,
        /// Whether it was written in postfix position.
        post: bool,
    },
    /// A statement that requires an expression carried none.
    #[error("no expression set for the statement of type '{0}'")]
    MissingExpression(&'static str),
    /// A jump target label that was never defined.
    #[error("label '{0}' was never defined")]
    UnresolvedLabel(String),
    /// A label defined twice in the same map.
    #[error("label '{0}' is already defined")]
    DuplicateLabel(String),
}
