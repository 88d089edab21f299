//! Core game logic - pure, deterministic, and testable
//!
//! This crate contains the game rules and state machine of the playing field.
//! It has no dependencies on networking, terminals or I/O.
//!
//! # Module Structure
//!
//! - [`mino`]: polyomino shapes and their canonical form
//! - [`generator`]: enumeration of every distinct mino of a rank
//! - [`bag`]: fair, seeded randomizer over a template set
//! - [`piece`]: a live mino with rotation and SRS wall kicks
//! - [`matrix`]: the playing field (collision, locking, line clears, garbage)
//! - [`scoring`]: points, garbage and gravity per cleared rows
//! - [`snapshot`]: read-only matrix views for other players
//! - [`rng`]: deterministic generator shared by the bag and garbage holes
//!
//! # Example
//!
//! ```
//! use netris_core::{Bag, Generator, Matrix};
//! use netris_core::types::GameAction;
//!
//! let minos = Generator::new().generate(4).unwrap();
//! let mut matrix = Matrix::with_bag(10, 20, 20, Bag::new(7, minos));
//! assert!(matrix.start());
//!
//! matrix.apply_action(GameAction::MoveLeft);
//! matrix.apply_action(GameAction::HardDrop);
//! assert_eq!(matrix.occupied(), 4);
//! ```

pub mod bag;
pub mod error;
pub mod generator;
pub mod matrix;
pub mod mino;
pub mod piece;
pub mod rng;
pub mod scoring;
pub mod snapshot;

pub use netris_types as types;

pub use bag::Bag;
pub use error::{GenerationError, MatrixError};
pub use generator::{generate, Generator};
pub use matrix::{LockOutcome, Matrix, MatrixEvent, Phase, SharedMatrix};
pub use mino::Mino;
pub use piece::{KickTable, Piece};
pub use rng::SimpleRng;
pub use scoring::{drop_interval_ms, garbage_for_lines, level_for_lines, score_for_lines};
pub use snapshot::{ActiveSnapshot, MatrixSnapshot};
