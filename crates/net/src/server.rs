//! Game server
//!
//! Accepts players on every configured listener, runs the lobby until a
//! player sends `JoinGame`, seats them in a game and relays their commands.
//! Uses tokio for async networking.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionConfig, Endpoint, Inbound};
use crate::game::{Delivery, Game, GameSettings};
use crate::protocol::{
    Command, DisconnectPayload, JoinGamePayload, ListGamesPayload, StatsPayload,
};
use crate::transport::{Listener, NewPlayer};
use crate::types::{
    GameId, PlayerId, DEFAULT_BUFFER, DEFAULT_HEIGHT, DEFAULT_MAX_PLAYERS, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RANK, DEFAULT_WIDTH,
};

/// Largest rank a client may request for a new game
pub const MAX_RANK: i32 = 7;

/// Disconnect reason sent to players when the server stops
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// How long shutdown waits for room in one player's queue
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `host:port`, or None to skip TCP
    pub listen_tcp: Option<String>,
    /// Local socket path, or None to skip it
    pub listen_socket: Option<PathBuf>,
    /// Fixed seed for every game; random per game when None
    pub seed: Option<u64>,
    pub rank: i32,
    pub width: i32,
    pub height: i32,
    pub buffer: i32,
    pub max_players: usize,
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_tcp: Some("127.0.0.1:1984".to_string()),
            listen_socket: None,
            seed: None,
            rank: DEFAULT_RANK,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            buffer: DEFAULT_BUFFER,
            max_players: DEFAULT_MAX_PLAYERS,
            connection: ConnectionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();

        let listen_tcp = match env::var("NETRIS_LISTEN_TCP") {
            Ok(s) if s.trim().is_empty() => None,
            Ok(s) => Some(s.trim().to_string()),
            Err(_) => defaults.listen_tcp,
        };

        let listen_socket = env::var("NETRIS_LISTEN_SOCKET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let seed = env::var("NETRIS_SEED").ok().and_then(|s| s.parse().ok());

        let rank = env::var("NETRIS_RANK")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RANK);

        let max_players = env::var("NETRIS_MAX_PLAYERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_PLAYERS);

        let queue_capacity = env::var("NETRIS_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);

        Self {
            listen_tcp,
            listen_socket,
            seed,
            rank,
            max_players,
            connection: ConnectionConfig {
                queue_capacity,
                ..defaults.connection
            },
            ..defaults
        }
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        let mut out = Vec::new();
        if let Some(addr) = &self.listen_tcp {
            out.push(Endpoint::Tcp(addr.clone()));
        }
        if let Some(path) = &self.listen_socket {
            out.push(Endpoint::Unix(path.clone()));
        }
        out
    }
}

/// Handed to the caller of [`run_server`] once every listener is bound
#[derive(Debug)]
pub struct Ready {
    /// Bound TCP address, if TCP is enabled
    pub tcp: Option<SocketAddr>,
    pub server: Arc<Server>,
}

/// Shared server state
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    base_seed: u64,
    games: Mutex<BTreeMap<GameId, Game>>,
    connections: RwLock<HashMap<PlayerId, Connection>>,
    listeners: Mutex<Vec<Arc<Listener>>>,
    next_player: AtomicU64,
}

impl Server {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let base_seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Arc::new(Self {
            config,
            base_seed,
            games: Mutex::new(BTreeMap::new()),
            connections: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_player: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind every configured endpoint
    pub async fn bind(&self) -> anyhow::Result<Vec<Arc<Listener>>> {
        let mut bound = Vec::new();
        for endpoint in self.config.endpoints() {
            let listener = Listener::bind(&endpoint, self.config.connection)
                .await
                .with_context(|| format!("failed to listen on {}", endpoint))?;
            info!(listener = %listener.describe(), "listening");
            bound.push(Arc::new(listener));
        }
        self.listeners.lock().await.extend(bound.iter().cloned());
        Ok(bound)
    }

    /// Serve every player arriving on `players` until the queue closes
    pub async fn run(self: Arc<Self>, mut players: mpsc::Receiver<NewPlayer>) {
        while let Some(player) = players.recv().await {
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.serve_player(player).await;
            });
        }
        debug!("player queue closed");
    }

    /// Stop every listener and disconnect every player
    pub async fn shutdown(&self, reason: &str) {
        for listener in self.listeners.lock().await.iter() {
            listener.shutdown(reason);
        }
        let connections: Vec<Connection> =
            self.connections.read().await.values().cloned().collect();
        for connection in connections {
            let disconnect = Command::Disconnect(DisconnectPayload {
                message: reason.to_string(),
            });
            match tokio::time::timeout(DISCONNECT_GRACE, connection.send(disconnect)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(player = connection.player(), error = %e, "disconnect dropped"),
                Err(_) => warn!(player = connection.player(), "disconnect not queued in time"),
            }
            connection.close().await;
        }
        info!(reason, "server shut down");
    }

    pub async fn game_count(&self) -> usize {
        self.games.lock().await.len()
    }

    pub async fn player_count(&self) -> usize {
        self.connections.read().await.len()
    }

    fn seed_for(&self, id: GameId) -> u64 {
        match self.config.seed {
            Some(seed) => seed,
            None => self
                .base_seed
                .wrapping_add((id as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)),
        }
    }

    /// Pick the game for a join request, creating one when needed
    ///
    /// A requested game is honoured while it is open (room left, no winner
    /// yet); otherwise the lowest open game is used. New games take the smallest unused id.
    fn assign(&self, games: &mut BTreeMap<GameId, Game>, request: &JoinGamePayload) -> GameId {
        if request.new_game.is_none() {
            if let Some(id) = request.game {
                if games.get(&id).is_some_and(Game::is_open) {
                    return id;
                }
            }
            if let Some((&id, _)) = games.iter().find(|(_, g)| g.is_open()) {
                return id;
            }
        }

        let id = (0..=GameId::MAX)
            .find(|id| !games.contains_key(id))
            .unwrap_or(GameId::MAX);
        let mut settings = GameSettings {
            name: String::new(),
            seed: self.seed_for(id),
            rank: self.config.rank,
            width: self.config.width,
            height: self.config.height,
            buffer: self.config.buffer,
            max_players: self.config.max_players,
        };
        if let Some(new_game) = &request.new_game {
            settings.name = new_game.name.clone();
            if let Some(rank) = new_game.rank {
                settings.rank = rank.clamp(1, MAX_RANK);
            }
            if let Some(max) = new_game.max_players {
                settings.max_players = max.clamp(1, self.config.max_players.max(1));
            }
        }
        info!(game = id, seed = settings.seed, rank = settings.rank, "game created");
        games.insert(id, Game::new(id, settings));
        id
    }

    async fn deliver(&self, deliveries: Vec<Delivery>) {
        if deliveries.is_empty() {
            return;
        }
        let targets: Vec<(Connection, Command)> = {
            let connections = self.connections.read().await;
            deliveries
                .into_iter()
                .filter_map(|d| connections.get(&d.to).map(|c| (c.clone(), d.command)))
                .collect()
        };
        for (connection, command) in targets {
            if let Err(e) = connection.send(command).await {
                debug!(player = connection.player(), error = %e, "delivery dropped");
            }
        }
    }

    async fn answer_lobby(&self, connection: &Connection, request: &Command) {
        let reply = match request {
            Command::ListGames(_) => Command::ListGames(ListGamesPayload {
                games: self.games.lock().await.values().map(Game::listing).collect(),
            }),
            Command::Stats(_) => Command::Stats(StatsPayload {
                players: self.player_count().await,
                games: self.game_count().await,
            }),
            _ => return,
        };
        let _ = connection.send(reply).await;
    }

    /// Lobby: answer queries until the player asks to join
    async fn lobby(
        &self,
        connection: &Connection,
        inbound: &mut mpsc::Receiver<Inbound>,
    ) -> Option<JoinGamePayload> {
        while let Some(Inbound { command, .. }) = inbound.recv().await {
            match command {
                Command::JoinGame(join) => return Some(join),
                Command::ListGames(_) | Command::Stats(_) => {
                    self.answer_lobby(connection, &command).await
                }
                Command::Disconnect(_) | Command::QuitGame(_) => return None,
                other => debug!(peer = %connection.peer(), kind = %other.kind(), "ignored before join"),
            }
        }
        None
    }

    async fn serve_player(self: Arc<Self>, new: NewPlayer) {
        let NewPlayer {
            connection,
            mut inbound,
        } = new;

        let Some(join) = self.lobby(&connection, &mut inbound).await else {
            debug!(peer = %connection.peer(), "left before joining");
            connection.close().await;
            return;
        };

        let player = self.next_player.fetch_add(1, Ordering::SeqCst);
        connection.set_player(player);
        self.connections
            .write()
            .await
            .insert(player, connection.clone());

        let (game, deliveries) = {
            let mut games = self.games.lock().await;
            let id = self.assign(&mut games, &join);
            let deliveries = games
                .get_mut(&id)
                .map(|g| g.add_player(player, &join.name))
                .unwrap_or_default();
            (id, deliveries)
        };
        info!(player, game, peer = %connection.peer(), "joined");
        self.deliver(deliveries).await;

        while let Some(Inbound { command, .. }) = inbound.recv().await {
            match command {
                Command::ListGames(_) | Command::Stats(_) => {
                    self.answer_lobby(&connection, &command).await
                }
                Command::Disconnect(_) | Command::QuitGame(_) => break,
                Command::Pong(_) => {}
                command => {
                    let deliveries = {
                        let mut games = self.games.lock().await;
                        games
                            .get_mut(&game)
                            .map(|g| g.handle(player, command))
                            .unwrap_or_default()
                    };
                    self.deliver(deliveries).await;
                }
            }
        }

        self.leave(player, game).await;
        connection.close().await;
    }

    async fn leave(&self, player: PlayerId, game: GameId) {
        let deliveries = {
            let mut games = self.games.lock().await;
            let deliveries = games
                .get_mut(&game)
                .map(|g| g.remove_player(player))
                .unwrap_or_default();
            if games.get(&game).is_some_and(Game::is_empty) {
                games.remove(&game);
                info!(game, "game closed");
            }
            deliveries
        };
        self.connections.write().await.remove(&player);
        info!(player, game, "disconnected");
        self.deliver(deliveries).await;
    }
}

/// Start the server
pub async fn run_server(
    config: ServerConfig,
    ready_tx: Option<oneshot::Sender<Ready>>,
) -> anyhow::Result<()> {
    let capacity = config.connection.queue_capacity.max(1);
    let server = Server::new(config);
    let listeners = server.bind().await?;
    if listeners.is_empty() {
        anyhow::bail!("no listeners configured");
    }

    let (players_tx, players_rx) = mpsc::channel::<NewPlayer>(capacity);
    for listener in &listeners {
        let listener = Arc::clone(listener);
        let players_tx = players_tx.clone();
        tokio::spawn(async move {
            listener.host(players_tx).await;
        });
    }
    drop(players_tx);

    if let Some(tx) = ready_tx {
        let tcp = listeners.iter().find_map(|l| l.local_addr());
        if tx
            .send(Ready {
                tcp,
                server: Arc::clone(&server),
            })
            .is_err()
        {
            warn!("ready receiver dropped");
        }
    }

    server.run(players_rx).await;
    Ok(())
}

/// Run the server until `signal` resolves, then shut it down
///
/// Shutdown stops every listener and disconnects every seated player with
/// [`SHUTDOWN_REASON`]. `ready_tx` is forwarded as in [`run_server`].
pub async fn serve_until<F>(
    config: ServerConfig,
    ready_tx: Option<oneshot::Sender<Ready>>,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let (inner_tx, inner_rx) = oneshot::channel::<Ready>();
    let serving = run_server(config, Some(inner_tx));
    tokio::pin!(serving);

    let ready = tokio::select! {
        result = &mut serving => return result,
        ready = inner_rx => ready,
    };
    let Ok(ready) = ready else {
        return (&mut serving).await;
    };
    let server = Arc::clone(&ready.server);
    if let Some(tx) = ready_tx {
        if tx.send(ready).is_err() {
            warn!("ready receiver dropped");
        }
    }

    tokio::select! {
        result = &mut serving => result,
        _ = signal => {
            server.shutdown(SHUTDOWN_REASON).await;
            Ok(())
        }
    }
}
