//! Netris (workspace facade crate).
//!
//! Re-exports the game rules, the networking layer and the shared types so
//! binaries and tests can use `netris::{core, net, types}`.

pub use netris_core as core;
pub use netris_net as net;
pub use netris_types as types;
