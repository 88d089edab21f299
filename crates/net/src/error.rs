use std::time::Duration;

use netris_core::GenerationError;
use thiserror::Error;

use crate::protocol::CommandKind;

/// Malformed or unencodable wire data
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: CommandKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: CommandKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown command kind {0}")]
    UnknownCommand(i64),

    #[error("invalid block code {0}")]
    InvalidBlock(u8),
}

/// Transport failures; each one ends only the affected connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr} after {attempts} attempts: {source}")]
    DialExhausted {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Client session failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("join handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}
