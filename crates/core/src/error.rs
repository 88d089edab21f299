//! Core error definitions.

use thiserror::Error;

/// Errors raised while generating polyominoes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Rank must be zero or positive
    #[error("invalid rank {0}: rank must not be negative")]
    InvalidRank(i32),
}

/// Validation errors raised by matrix operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// A cell falls outside the matrix including its buffer zone
    #[error("cell ({x},{y}) is out of bounds")]
    OutOfBounds { x: i32, y: i32 },

    /// A cell is already occupied by a solid block
    #[error("cell ({x},{y}) is already occupied")]
    Collision { x: i32, y: i32 },

    /// The operation needs an active piece
    #[error("no active piece")]
    NoActivePiece,

    /// The active piece does not fit anywhere at or below its row
    #[error("piece cannot be locked at ({x},{y})")]
    LockFailed { x: i32, y: i32 },
}
