//! Connection module - framed transport with keepalive and deadlines
//!
//! A connection owns three tasks:
//!
//! - read pump: decodes lines, answers pings inline, stamps every other
//!   command with the owning player id and forwards it inbound
//! - write pump: drains the outbound queue under a write deadline
//! - keepalive: queues a ping every interval, dropped when the queue is full
//!
//! Any failure terminates only this connection. Consumers notice through the
//! inbound queue closing and through sends failing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, ProtocolError};
use crate::protocol::{decode, encode, Command, PingPayload, PongPayload};
use crate::types::{
    PlayerId, DEFAULT_QUEUE_CAPACITY, DIAL_ATTEMPTS, DIAL_RETRY_DELAY_MS, KEEPALIVE_INTERVAL_MS,
    READ_TIMEOUT_MS, WRITE_TIMEOUT_MS,
};

/// Per-connection tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub queue_capacity: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_timeout: Duration::from_millis(READ_TIMEOUT_MS),
            write_timeout: Duration::from_millis(WRITE_TIMEOUT_MS),
            keepalive_interval: Duration::from_millis(KEEPALIVE_INTERVAL_MS),
        }
    }
}

/// Retry policy for outgoing connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialConfig {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            attempts: DIAL_ATTEMPTS,
            delay: Duration::from_millis(DIAL_RETRY_DELAY_MS),
        }
    }
}

/// Where to reach a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`
    Tcp(String),
    /// Local socket path
    Unix(PathBuf),
}

impl Endpoint {
    /// `unix:/path` or anything containing a `/` is a socket path;
    /// everything else is a TCP address
    pub fn parse(s: &str) -> Self {
        if let Some(path) = s.strip_prefix("unix:") {
            Endpoint::Unix(PathBuf::from(path))
        } else if s.contains('/') {
            Endpoint::Unix(PathBuf::from(s))
        } else {
            Endpoint::Tcp(s.trim_start_matches("tcp:").to_string())
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A command received from a peer, stamped with the peer's player id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub player: PlayerId,
    pub command: Command,
}

#[derive(Debug)]
struct Shared {
    peer: String,
    player: AtomicU64,
    terminated: AtomicBool,
    last_active: Mutex<Instant>,
    shutdown: watch::Sender<bool>,
    /// Set once the write pump has flushed and shut the writer down
    drained: watch::Sender<bool>,
}

impl Shared {
    fn activity(&self) -> MutexGuard<'_, Instant> {
        self.last_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self.activity() = Instant::now();
    }

    /// Mark terminated and wake every pump; returns false if already done
    fn terminate(&self) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shutdown.send_replace(true);
        true
    }
}

pub(crate) async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|&stop| stop).await;
}

/// Handle to a live connection; clones share the same socket
#[derive(Debug, Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Command>,
}

impl Connection {
    /// Start the pumps over `stream`
    ///
    /// Returns the handle and the queue of inbound commands. The queue closes
    /// once the connection terminates.
    pub fn spawn<S>(
        stream: S,
        peer: impl Into<String>,
        config: ConnectionConfig,
    ) -> (Self, mpsc::Receiver<Inbound>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let capacity = config.queue_capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel::<Command>(capacity);
        let (in_tx, in_rx) = mpsc::channel::<Inbound>(capacity);
        let (shutdown, _) = watch::channel(false);
        let (drained, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            peer: peer.into(),
            player: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            last_active: Mutex::new(Instant::now()),
            shutdown,
            drained,
        });

        let (reader, writer) = tokio::io::split(stream);

        tokio::spawn(read_pump(
            reader,
            Arc::clone(&shared),
            out_tx.clone(),
            in_tx,
            config.read_timeout,
        ));
        tokio::spawn(write_pump(
            writer,
            Arc::clone(&shared),
            out_rx,
            config.write_timeout,
        ));
        tokio::spawn(keepalive(
            Arc::clone(&shared),
            out_tx.clone(),
            config.keepalive_interval,
        ));

        debug!(peer = %shared.peer, "connection started");
        (
            Self {
                shared,
                outbound: out_tx,
            },
            in_rx,
        )
    }

    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    pub fn player(&self) -> PlayerId {
        self.shared.player.load(Ordering::SeqCst)
    }

    /// Set the id stamped onto inbound commands
    ///
    /// While the id is 0 (client side, or before a join) commands pass
    /// through unchanged.
    pub fn set_player(&self, player: PlayerId) {
        self.shared.player.store(player, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    /// Time of the last successful read or write
    pub fn last_active(&self) -> Instant {
        *self.shared.activity()
    }

    /// Queue a command, waiting for room
    pub async fn send(&self, command: Command) -> Result<(), ConnectionError> {
        if self.is_terminated() {
            return Err(ConnectionError::Closed);
        }
        self.outbound
            .send(command)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Queue a command only if there is room right now
    pub fn try_send(&self, command: Command) -> Result<bool, ConnectionError> {
        match self.outbound.try_send(command) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => Err(ConnectionError::Closed),
        }
    }

    /// Terminate the connection and wait for queued commands to be written
    ///
    /// Safe to call any number of times from any clone; every caller
    /// returns only after the drain.
    pub async fn close(&self) {
        let mut drained = self.shared.drained.subscribe();
        if self.shared.terminate() {
            debug!(peer = %self.shared.peer, "closing connection");
        }
        let _ = drained.wait_for(|&done| done).await;
    }
}

async fn read_pump<R>(
    reader: R,
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Command>,
    inbound: mpsc::Sender<Inbound>,
    read_timeout: Duration,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut shutdown = shared.shutdown.subscribe();
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = wait_shutdown(&mut shutdown) => break,
            r = tokio::time::timeout(read_timeout, reader.read_line(&mut line)) => r,
        };
        match read {
            Err(_) => {
                warn!(peer = %shared.peer, "{}", ConnectionError::ReadTimeout(read_timeout));
                break;
            }
            Ok(Err(e)) => {
                debug!(peer = %shared.peer, error = %e, "read failed");
                break;
            }
            Ok(Ok(0)) => {
                debug!(peer = %shared.peer, "peer closed the connection");
                break;
            }
            Ok(Ok(_)) => shared.touch(),
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match decode(trimmed) {
            Ok(Command::Ping(PingPayload { token })) => {
                if outbound.send(Command::Pong(PongPayload { token })).await.is_err() {
                    break;
                }
            }
            Ok(mut command) => {
                let player = shared.player.load(Ordering::SeqCst);
                if player != 0 {
                    command.stamp(player);
                }
                let delivered = tokio::select! {
                    _ = wait_shutdown(&mut shutdown) => false,
                    r = inbound.send(Inbound { player, command }) => r.is_ok(),
                };
                if !delivered {
                    break;
                }
            }
            Err(ProtocolError::UnknownCommand(code)) => {
                warn!(peer = %shared.peer, code, "discarding unknown command");
            }
            Err(e) => {
                warn!(peer = %shared.peer, error = %e, "protocol error, closing");
                break;
            }
        }
    }

    shared.terminate();
}

async fn write_command<W>(
    writer: &mut W,
    command: &Command,
    write_timeout: Duration,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = encode(command)?;
    line.push('\n');
    tokio::time::timeout(write_timeout, async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ConnectionError::WriteTimeout(write_timeout))??;
    Ok(())
}

async fn write_pump<W>(
    mut writer: W,
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<Command>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut shutdown = shared.shutdown.subscribe();
    let mut healthy = true;

    loop {
        let command = tokio::select! {
            biased;
            c = rx.recv() => match c {
                Some(c) => c,
                None => break,
            },
            _ = wait_shutdown(&mut shutdown) => break,
        };
        if let Err(e) = write_command(&mut writer, &command, write_timeout).await {
            warn!(peer = %shared.peer, error = %e, "write failed, closing");
            healthy = false;
            break;
        }
        shared.touch();
    }

    shared.terminate();

    // Refuse new sends, then flush whatever producers already queued.
    rx.close();
    while healthy {
        let Ok(command) = rx.try_recv() else {
            break;
        };
        if write_command(&mut writer, &command, write_timeout).await.is_err() {
            break;
        }
    }
    let _ = tokio::time::timeout(write_timeout, writer.shutdown()).await;
    shared.drained.send_replace(true);
    debug!(peer = %shared.peer, "connection closed");
}

async fn keepalive(shared: Arc<Shared>, outbound: mpsc::Sender<Command>, interval: Duration) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    let mut counter: u64 = 0;

    loop {
        tokio::select! {
            _ = wait_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }
        if shared.terminated.load(Ordering::SeqCst) {
            break;
        }
        counter += 1;
        let ping = Command::Ping(PingPayload {
            token: counter.to_string(),
        });
        if let Err(TrySendError::Closed(_)) = outbound.try_send(ping) {
            break;
        }
    }
}

async fn dial_tcp(addr: &str, dial: &DialConfig) -> Result<TcpStream, ConnectionError> {
    let attempts = dial.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < attempts => {
                warn!(addr, attempt, error = %e, "dial failed, retrying");
                tokio::time::sleep(dial.delay).await;
            }
            Err(source) => {
                return Err(ConnectionError::DialExhausted {
                    addr: addr.to_string(),
                    attempts,
                    source,
                })
            }
        }
    }
}

#[cfg(unix)]
async fn dial_unix(
    path: &std::path::Path,
    dial: &DialConfig,
) -> Result<tokio::net::UnixStream, ConnectionError> {
    let attempts = dial.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match tokio::net::UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < attempts => {
                warn!(path = %path.display(), attempt, error = %e, "dial failed, retrying");
                tokio::time::sleep(dial.delay).await;
            }
            Err(source) => {
                return Err(ConnectionError::DialExhausted {
                    addr: path.display().to_string(),
                    attempts,
                    source,
                })
            }
        }
    }
}

/// Connect to `endpoint`, retrying per `dial`, and start the pumps
pub async fn connect(
    endpoint: &Endpoint,
    dial: &DialConfig,
    config: ConnectionConfig,
) -> Result<(Connection, mpsc::Receiver<Inbound>), ConnectionError> {
    let spawned = match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = dial_tcp(addr, dial).await?;
            let _ = stream.set_nodelay(true);
            Connection::spawn(stream, endpoint.to_string(), config)
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = dial_unix(path, dial).await?;
            Connection::spawn(stream, endpoint.to_string(), config)
        }
        #[cfg(not(unix))]
        Endpoint::Unix(path) => {
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("local sockets are unavailable: {}", path.display()),
            )))
        }
    };
    info!(%endpoint, "connected");
    Ok(spawned)
}
