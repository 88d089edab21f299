//! Networking: wire protocol, connections, games and the server
//!
//! # Module Structure
//!
//! - [`protocol`]: command envelope and payloads
//! - [`connection`]: read/write pumps, keepalive, dialing
//! - [`transport`]: TCP and local socket listeners
//! - [`game`]: one session's players and command fan-out
//! - [`server`]: lobby, matchmaking and relaying
//! - [`client`]: the player side of a session
//! - [`bot`]: a headless client that plays by itself

pub mod bot;
pub mod client;
pub mod connection;
pub mod error;
pub mod game;
pub mod protocol;
pub mod server;
pub mod transport;

pub use netris_types as types;

pub use bot::{run_bot, BotConfig, BotSummary};
pub use client::{ClientSession, Controls};
pub use connection::{connect, Connection, ConnectionConfig, DialConfig, Endpoint, Inbound};
pub use error::{ConnectionError, ProtocolError, SessionError};
pub use game::{Delivery, Game, GameSettings};
pub use protocol::{decode, encode, Command, CommandKind};
pub use server::{run_server, serve_until, Ready, Server, ServerConfig, SHUTDOWN_REASON};
pub use transport::{Listener, NewPlayer, Transport};
