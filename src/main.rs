//! Netris command line.
//!
//! `netris server` hosts games; `netris bot` joins one and plays headless.
//! Server defaults come from `NETRIS_*` environment variables and flags
//! override them. Ctrl-C disconnects every player before exiting.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netris::net::{run_bot, serve_until, BotConfig, Endpoint, ServerConfig};

#[derive(Parser)]
#[command(name = "netris", version, about = "Networked multiplayer falling-block game")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host games
    Server {
        /// TCP address to listen on
        #[arg(long)]
        listen: Option<String>,
        /// Local socket path to listen on
        #[arg(long)]
        socket: Option<PathBuf>,
        /// Disable the TCP listener
        #[arg(long)]
        no_tcp: bool,
        /// Fixed seed for every game
        #[arg(long)]
        seed: Option<u64>,
        /// Cells per piece
        #[arg(long)]
        rank: Option<i32>,
        #[arg(long)]
        max_players: Option<usize>,
    },
    /// Join a game and play by hard dropping every piece
    Bot {
        /// `host:port` or a local socket path
        #[arg(long, default_value = "127.0.0.1:1984")]
        connect: String,
        #[arg(long, default_value = "bot")]
        name: String,
        #[arg(long)]
        game: Option<u32>,
        #[arg(long, default_value_t = 500)]
        think_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netris=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            listen,
            socket,
            no_tcp,
            seed,
            rank,
            max_players,
        } => {
            let mut config = ServerConfig::from_env();
            if let Some(listen) = listen {
                config.listen_tcp = Some(listen);
            }
            if no_tcp {
                config.listen_tcp = None;
            }
            if socket.is_some() {
                config.listen_socket = socket;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(rank) = rank {
                config.rank = rank;
            }
            if let Some(max_players) = max_players {
                config.max_players = max_players;
            }

            serve_until(config, None, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
                info!("interrupted");
            })
            .await?;
        }
        Commands::Bot {
            connect,
            name,
            game,
            think_ms,
        } => {
            let summary = run_bot(BotConfig {
                endpoint: Endpoint::parse(&connect),
                name,
                game,
                think: Duration::from_millis(think_ms),
                ..BotConfig::default()
            })
            .await?;
            println!(
                "player {} in game {}: score {}, lines {}",
                summary.player, summary.game, summary.score, summary.lines
            );
        }
    }

    Ok(())
}
