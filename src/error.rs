//! Error types for tree construction, mutation, and matching.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by the node model, the builder, and the matcher.
///
/// All of these are synchronous rejections of malformed input; the core
/// performs no I/O and has no transient failure modes, so nothing here is
/// retried.
#[derive(Debug, Error)]
pub enum Error {
    /// An opcode is missing the `_` category separator.
    #[error("invalid opcode `{0}`: must contain a category separator")]
    InvalidOpcode(String),

    /// A structural invariant does not hold (duplicate ids, dangling or
    /// cyclic parent/child linkage).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Attaching an expression to an input whose slot is already filled.
    #[error("input `{0}` already has an expression")]
    AlreadyOccupied(String),

    /// Detaching a node that is not the current occupant of the slot.
    #[error("node `{child}` is not the expression of input `{input}`")]
    NotAChild {
        /// Id of the input whose slot was addressed.
        input: String,
        /// Id of the node that was supposed to occupy it.
        child: String,
    },
}
