//! Transport hosting
//!
//! A [`Listener`] accepts raw streams and turns each into a [`Connection`]
//! handed to the server as a [`NewPlayer`]. The TCP variant serves remote
//! clients; the local socket variant is the endpoint a terminal-hosted
//! client process connects to.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::connection::{wait_shutdown, Connection, ConnectionConfig, Endpoint, Inbound};

/// Remove a socket file left behind by a previous run
///
/// Anything else at `path` is left alone and reported as `AlreadyExists`.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !metadata.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        ));
    }
    debug!(path = %path.display(), "removing stale socket");
    std::fs::remove_file(path)
}

/// A freshly accepted connection, not yet part of any game
#[derive(Debug)]
pub struct NewPlayer {
    pub connection: Connection,
    pub inbound: mpsc::Receiver<Inbound>,
}

/// Concrete socket kinds
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

/// Accepts players on one transport until shut down
#[derive(Debug)]
pub struct Listener {
    transport: Transport,
    config: ConnectionConfig,
    shutdown: watch::Sender<bool>,
}

impl Listener {
    /// Bind `endpoint`; a stale socket file left by a previous run is removed
    pub async fn bind(endpoint: &Endpoint, config: ConnectionConfig) -> io::Result<Self> {
        let transport = match endpoint {
            Endpoint::Tcp(addr) => Transport::Tcp(TcpListener::bind(addr.as_str()).await?),
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                remove_stale_socket(path)?;
                Transport::Unix {
                    listener: tokio::net::UnixListener::bind(path)?,
                    path: path.clone(),
                }
            }
            #[cfg(not(unix))]
            Endpoint::Unix(path) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("local sockets are unavailable: {}", path.display()),
                ))
            }
        };
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            transport,
            config,
            shutdown,
        })
    }

    /// Bound TCP address, if this is a TCP listener
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.transport {
            Transport::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Transport::Unix { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match &self.transport {
            Transport::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => format!("tcp:{}", addr),
                Err(_) => "tcp:?".to_string(),
            },
            #[cfg(unix)]
            Transport::Unix { path, .. } => format!("unix:{}", path.display()),
        }
    }

    /// Accept until [`Listener::shutdown`] or until `players` closes
    pub async fn host(&self, players: mpsc::Sender<NewPlayer>) {
        let mut shutdown = self.shutdown.subscribe();
        info!(listener = %self.describe(), "accepting players");

        loop {
            let accepted = tokio::select! {
                _ = wait_shutdown(&mut shutdown) => break,
                accepted = self.accept() => accepted,
            };
            let player = match accepted {
                Ok(player) => player,
                Err(e) => {
                    warn!(listener = %self.describe(), error = %e, "accept failed");
                    continue;
                }
            };
            debug!(peer = %player.connection.peer(), "accepted");
            if players.send(player).await.is_err() {
                break;
            }
        }
    }

    async fn accept(&self) -> io::Result<NewPlayer> {
        let (connection, inbound) = match &self.transport {
            Transport::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                Connection::spawn(stream, addr.to_string(), self.config)
            }
            #[cfg(unix)]
            Transport::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Connection::spawn(stream, format!("unix:{}", path.display()), self.config)
            }
        };
        Ok(NewPlayer {
            connection,
            inbound,
        })
    }

    /// Stop accepting; a local socket file is removed
    pub fn shutdown(&self, reason: &str) {
        if self.shutdown.send_replace(true) {
            return;
        }
        info!(listener = %self.describe(), reason, "listener shut down");
        #[cfg(unix)]
        if let Transport::Unix { path, .. } = &self.transport {
            let _ = std::fs::remove_file(path);
        }
    }
}
