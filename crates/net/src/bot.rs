//! Headless bot: joins a game and hard drops every piece
//!
//! Useful as a sparring partner and as an end-to-end smoke test of the
//! client session.

use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::client::ClientSession;
use crate::connection::{connect, ConnectionConfig, DialConfig, Endpoint};
use crate::protocol::{Command, JoinGamePayload};
use crate::types::{GameAction, GameId, PlayerId};

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub endpoint: Endpoint,
    pub name: String,
    pub game: Option<GameId>,
    /// Pause between hard drops
    pub think: Duration,
    pub dial: DialConfig,
    pub connection: ConnectionConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Tcp("127.0.0.1:1984".to_string()),
            name: "bot".to_string(),
            game: None,
            think: Duration::from_millis(500),
            dial: DialConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

/// How a bot's game ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSummary {
    pub player: PlayerId,
    pub game: GameId,
    pub score: u32,
    pub lines: u32,
    pub winner: Option<PlayerId>,
}

/// Play until the local matrix tops out, a winner is announced or the server
/// goes away
pub async fn run_bot(config: BotConfig) -> anyhow::Result<BotSummary> {
    let (connection, inbound) = connect(&config.endpoint, &config.dial, config.connection)
        .await
        .with_context(|| format!("bot could not reach {}", config.endpoint))?;

    let request = JoinGamePayload {
        name: config.name.clone(),
        game: config.game,
        ..JoinGamePayload::default()
    };
    let mut session =
        ClientSession::join(connection, inbound, request, config.connection.read_timeout).await?;
    let controls = session.controls();
    controls.start().await?;
    let gravity = session.spawn_gravity();

    let mut ticker = tokio::time::interval(config.think.max(Duration::from_millis(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                controls.apply(GameAction::HardDrop).await?;
            }
            command = session.next() => match command {
                None | Some(Command::Disconnect(_)) => break,
                Some(_) => {}
            },
        }
        if controls.is_game_over() || session.winner().is_some() {
            break;
        }
    }
    gravity.abort();

    let (score, lines) = {
        let m = session.matrix().read();
        (m.score(), m.lines())
    };
    let summary = BotSummary {
        player: session.player(),
        game: session.game(),
        score,
        lines,
        winner: session.winner(),
    };
    info!(?summary, "bot finished");
    session.quit().await;
    Ok(summary)
}
