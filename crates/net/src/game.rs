//! Game module - one session's players and command fan-out
//!
//! A [`Game`] never touches sockets. Every mutation returns the
//! [`Delivery`] list the server must send, which keeps the rules testable
//! without a runtime.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use netris_core::{MatrixSnapshot, SimpleRng};

use crate::protocol::{
    Command, GameListing, GameOverPayload, JoinGamePayload, MessagePayload, ReceiveGarbagePayload,
    RosterEntry, RosterPayload, StartGamePayload, UpdateMatrixPayload,
};
use crate::types::{
    GameId, PlayerId, DEFAULT_BUFFER, DEFAULT_HEIGHT, DEFAULT_MAX_PLAYERS, DEFAULT_RANK,
    DEFAULT_WIDTH,
};

const MAX_NAME_LEN: usize = 16;

/// Rules a game is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    pub name: String,
    pub seed: u64,
    pub rank: i32,
    pub width: i32,
    pub height: i32,
    pub buffer: i32,
    pub max_players: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            seed: 0,
            rank: DEFAULT_RANK,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            buffer: DEFAULT_BUFFER,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

/// A command addressed to one player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: PlayerId,
    pub command: Command,
}

#[derive(Debug, Clone)]
struct Player {
    name: String,
    alive: bool,
}

/// Trim and bound a requested name; empty names become `Player<id>`
pub fn sanitize_name(name: &str, player: PlayerId) -> String {
    let name: String = name
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    let name = name.trim();
    if name.is_empty() {
        format!("Player{}", player)
    } else {
        name.to_string()
    }
}

#[derive(Debug)]
pub struct Game {
    id: GameId,
    settings: GameSettings,
    players: BTreeMap<PlayerId, Player>,
    matrices: BTreeMap<PlayerId, MatrixSnapshot>,
    rng: SimpleRng,
    started: bool,
    winner: Option<PlayerId>,
}

impl Game {
    pub fn new(id: GameId, mut settings: GameSettings) -> Self {
        if settings.name.trim().is_empty() {
            settings.name = format!("Game {}", id);
        }
        settings.max_players = settings.max_players.max(1);
        Self {
            id,
            rng: SimpleRng::new(settings.seed),
            settings,
            players: BTreeMap::new(),
            matrices: BTreeMap::new(),
            started: false,
            winner: None,
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn seed(&self) -> u64 {
        self.settings.seed
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.settings.max_players
    }

    /// Whether new players may be seated; a decided game takes no one
    pub fn is_open(&self) -> bool {
        !self.is_full() && self.winner.is_none()
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    /// Last matrix reported by `player`
    pub fn matrix(&self, player: PlayerId) -> Option<&MatrixSnapshot> {
        self.matrices.get(&player)
    }

    pub fn listing(&self) -> GameListing {
        GameListing {
            id: self.id,
            name: self.settings.name.clone(),
            players: self.players.len(),
            max_players: self.settings.max_players,
        }
    }

    pub fn roster(&self) -> RosterPayload {
        RosterPayload {
            game: self.id,
            players: self
                .players
                .iter()
                .map(|(&id, p)| RosterEntry {
                    player: id,
                    name: p.name.clone(),
                    alive: p.alive,
                })
                .collect(),
        }
    }

    fn broadcast(&self, command: Command) -> Vec<Delivery> {
        self.players
            .keys()
            .map(|&to| Delivery {
                to,
                command: command.clone(),
            })
            .collect()
    }

    fn broadcast_except(&self, from: PlayerId, command: Command) -> Vec<Delivery> {
        self.players
            .keys()
            .filter(|&&to| to != from)
            .map(|&to| Delivery {
                to,
                command: command.clone(),
            })
            .collect()
    }

    /// Seat a player and produce the join handshake
    ///
    /// The joining player gets the acknowledgement, the roster, the start
    /// parameters and the matrices of everyone already playing. The others
    /// get the new roster.
    pub fn add_player(&mut self, player: PlayerId, name: &str) -> Vec<Delivery> {
        let name = sanitize_name(name, player);
        info!(game = self.id, player, %name, "player joined");

        let already_started = self.started;
        self.started = true;
        self.players.insert(
            player,
            Player {
                name: name.clone(),
                alive: true,
            },
        );

        let mut out = vec![Delivery {
            to: player,
            command: Command::JoinGame(JoinGamePayload {
                player,
                name,
                game: Some(self.id),
                new_game: None,
            }),
        }];
        out.extend(self.broadcast(Command::UpdateRoster(self.roster())));
        out.push(Delivery {
            to: player,
            command: Command::StartGame(StartGamePayload {
                seed: self.settings.seed,
                rank: self.settings.rank,
                width: self.settings.width,
                height: self.settings.height,
                buffer: self.settings.buffer,
                started: already_started,
            }),
        });
        out.extend(self.matrices.iter().map(|(&from, snapshot)| Delivery {
            to: player,
            command: Command::UpdateMatrix(UpdateMatrixPayload {
                player: from,
                matrix: snapshot.into(),
            }),
        }));
        out
    }

    /// Drop a player; the remaining players get the new roster and, if one
    /// survivor is left, the winner
    pub fn remove_player(&mut self, player: PlayerId) -> Vec<Delivery> {
        let Some(leaving) = self.players.get_mut(&player) else {
            return Vec::new();
        };
        let was_alive = std::mem::replace(&mut leaving.alive, false);

        // Settle the winner while the leaver still counts towards the table.
        let winner = if was_alive {
            self.check_winner(player)
        } else {
            Vec::new()
        };

        if let Some(removed) = self.players.remove(&player) {
            info!(game = self.id, player, name = %removed.name, "player left");
        }
        self.matrices.remove(&player);

        let mut out = self.broadcast(Command::UpdateRoster(self.roster()));
        out.extend(winner.into_iter().filter(|d| d.to != player));
        out
    }

    fn alive(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|(_, p)| p.alive)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Announce the last survivor once, after `loser` went out
    fn check_winner(&mut self, loser: PlayerId) -> Vec<Delivery> {
        if self.winner.is_some() {
            return Vec::new();
        }
        let alive = self.alive();
        if alive.len() != 1 || self.players.len() < 2 {
            return Vec::new();
        }
        let winner = alive[0];
        self.winner = Some(winner);
        info!(game = self.id, winner, "game won");
        self.broadcast(Command::GameOver(GameOverPayload {
            player: loser,
            winner: Some(winner),
        }))
    }

    /// Dispatch a command from a seated player
    pub fn handle(&mut self, from: PlayerId, command: Command) -> Vec<Delivery> {
        if !self.players.contains_key(&from) {
            warn!(game = self.id, player = from, "command from unseated player");
            return Vec::new();
        }

        match command {
            Command::Nickname(payload) => {
                let name = sanitize_name(&payload.name, from);
                if let Some(player) = self.players.get_mut(&from) {
                    debug!(game = self.id, player = from, %name, "renamed");
                    player.name = name;
                }
                self.broadcast(Command::UpdateRoster(self.roster()))
            }
            Command::Message(payload) => {
                let message = payload.message.trim().to_string();
                if message.is_empty() {
                    return Vec::new();
                }
                self.broadcast(Command::Message(MessagePayload {
                    player: from,
                    message,
                }))
            }
            Command::UpdateMatrix(payload) => match MatrixSnapshot::try_from(payload.matrix) {
                Ok(snapshot) => {
                    let forward = Command::UpdateMatrix(UpdateMatrixPayload {
                        player: from,
                        matrix: (&snapshot).into(),
                    });
                    self.matrices.insert(from, snapshot);
                    self.broadcast_except(from, forward)
                }
                Err(e) => {
                    warn!(game = self.id, player = from, error = %e, "dropping bad matrix");
                    Vec::new()
                }
            },
            Command::SendGarbage(payload) => {
                let stack = (self.settings.height + self.settings.buffer).max(0) as u32;
                let rows = payload.rows.min(stack);
                if rows == 0 {
                    return Vec::new();
                }
                let targets: Vec<PlayerId> =
                    self.alive().into_iter().filter(|&id| id != from).collect();
                if targets.is_empty() {
                    return Vec::new();
                }
                let to = targets[self.rng.next_range(targets.len() as u32) as usize];
                debug!(game = self.id, from, to, rows, "garbage");
                vec![Delivery {
                    to,
                    command: Command::ReceiveGarbage(ReceiveGarbagePayload {
                        player: from,
                        rows,
                    }),
                }]
            }
            Command::GameOver(_) => {
                let Some(player) = self.players.get_mut(&from) else {
                    return Vec::new();
                };
                if !player.alive {
                    return Vec::new();
                }
                player.alive = false;
                info!(game = self.id, player = from, "game over");

                let mut out = self.broadcast(Command::GameOver(GameOverPayload {
                    player: from,
                    winner: None,
                }));
                out.extend(self.broadcast(Command::UpdateRoster(self.roster())));
                out.extend(self.check_winner(from));
                out
            }
            Command::QuitGame(_) => self.remove_player(from),
            Command::Disconnect(_)
            | Command::Ping(_)
            | Command::Pong(_)
            | Command::JoinGame(_)
            | Command::UpdateRoster(_)
            | Command::StartGame(_)
            | Command::ReceiveGarbage(_)
            | Command::Stats(_)
            | Command::ListGames(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{NicknamePayload, SendGarbagePayload};

    fn game() -> Game {
        Game::new(
            0,
            GameSettings {
                seed: 42,
                ..GameSettings::default()
            },
        )
    }

    fn to(deliveries: &[Delivery], player: PlayerId) -> Vec<&Command> {
        deliveries
            .iter()
            .filter(|d| d.to == player)
            .map(|d| &d.command)
            .collect()
    }

    #[test]
    fn test_join_handshake_order() {
        let mut g = game();
        let out = g.add_player(1, "alice");
        let kinds: Vec<_> = to(&out, 1).iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                crate::protocol::CommandKind::JoinGame,
                crate::protocol::CommandKind::UpdateRoster,
                crate::protocol::CommandKind::StartGame,
            ]
        );
        match to(&out, 1)[2] {
            Command::StartGame(start) => {
                assert_eq!(start.seed, 42);
                assert!(!start.started);
            }
            other => panic!("unexpected {:?}", other),
        }

        let out = g.add_player(2, "bob");
        assert_eq!(to(&out, 1).len(), 1);
        assert!(matches!(to(&out, 2)[2], Command::StartGame(s) if s.started));
    }

    #[test]
    fn test_names_are_sanitized() {
        assert_eq!(sanitize_name("  ", 3), "Player3");
        assert_eq!(sanitize_name("a\u{7}b", 1), "ab");
        assert_eq!(sanitize_name("abcdefghijklmnopqrstuvwxyz", 1).len(), 16);
    }

    #[test]
    fn test_garbage_goes_to_a_living_opponent() {
        let mut g = game();
        g.add_player(1, "a");
        g.add_player(2, "b");
        g.add_player(3, "c");
        g.handle(3, Command::GameOver(GameOverPayload::default()));

        for _ in 0..10 {
            let out = g.handle(
                1,
                Command::SendGarbage(SendGarbagePayload { player: 1, rows: 2 }),
            );
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].to, 2);
        }
    }

    #[test]
    fn test_garbage_rows_are_capped_at_the_stack() {
        let mut g = game();
        g.add_player(1, "a");
        g.add_player(2, "b");

        let out = g.handle(
            1,
            Command::SendGarbage(SendGarbagePayload {
                player: 1,
                rows: u32::MAX,
            }),
        );
        let stack = (g.settings().height + g.settings().buffer) as u32;
        assert_eq!(
            to(&out, 2),
            vec![&Command::ReceiveGarbage(ReceiveGarbagePayload {
                player: 1,
                rows: stack,
            })]
        );
    }

    #[test]
    fn test_last_survivor_wins() {
        let mut g = game();
        g.add_player(1, "a");
        g.add_player(2, "b");
        let out = g.handle(2, Command::GameOver(GameOverPayload::default()));
        assert_eq!(g.winner(), Some(1));
        assert!(out.iter().any(|d| matches!(
            &d.command,
            Command::GameOver(GameOverPayload { winner: Some(1), .. })
        )));

        // Reporting twice changes nothing.
        assert!(g
            .handle(2, Command::GameOver(GameOverPayload::default()))
            .is_empty());
    }

    #[test]
    fn test_nickname_rebroadcasts_roster() {
        let mut g = game();
        g.add_player(1, "a");
        g.add_player(2, "b");
        let out = g.handle(
            2,
            Command::Nickname(NicknamePayload {
                player: 2,
                name: "zed".to_string(),
            }),
        );
        assert_eq!(out.len(), 2);
        assert!(g.roster().players.iter().any(|p| p.name == "zed"));
    }

    #[test]
    fn test_capacity() {
        let mut g = Game::new(
            4,
            GameSettings {
                max_players: 2,
                ..GameSettings::default()
            },
        );
        assert_eq!(g.listing().name, "Game 4");
        g.add_player(1, "a");
        assert!(!g.is_full());
        g.add_player(2, "b");
        assert!(g.is_full());
        g.remove_player(1);
        assert!(!g.is_full());
    }

    #[test]
    fn test_leaving_hands_the_win_to_the_survivor() {
        let mut g = game();
        g.add_player(1, "a");
        g.add_player(2, "b");

        let out = g.remove_player(2);
        assert_eq!(g.winner(), Some(1));
        assert!(to(&out, 2).is_empty());
        let kinds: Vec<_> = to(&out, 1).iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                crate::protocol::CommandKind::UpdateRoster,
                crate::protocol::CommandKind::GameOver,
            ]
        );
    }

    #[test]
    fn test_decided_game_is_closed_to_new_players() {
        let mut g = game();
        g.add_player(1, "a");
        g.add_player(2, "b");
        assert!(g.is_open());

        g.handle(2, Command::GameOver(GameOverPayload::default()));
        assert_eq!(g.winner(), Some(1));
        assert!(!g.is_full());
        assert!(!g.is_open());
    }

    #[test]
    fn test_solo_player_leaving_announces_nothing() {
        let mut g = game();
        g.add_player(1, "a");
        assert!(g.remove_player(1).is_empty());
        assert!(g.is_empty());
        assert_eq!(g.winner(), None);
    }
}
