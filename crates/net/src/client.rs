//! Client session
//!
//! Runs the join handshake, then keeps the local matrix and the other
//! players' snapshots in step with the server. Input intents go through
//! [`Controls`], which publishes the matrix after every change.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use netris_core::{drop_interval_ms, Bag, Generator, Matrix, MatrixEvent, MatrixSnapshot, SharedMatrix};

use crate::connection::{Connection, Inbound};
use crate::error::SessionError;
use crate::protocol::{
    Command, GameOverPayload, JoinGamePayload, MessagePayload, NicknamePayload, QuitGamePayload,
    RosterEntry, SendGarbagePayload, StartGamePayload, UpdateMatrixPayload,
};
use crate::types::{GameAction, GameId, PlayerId};

/// Send the matrix and any events it produced since the last publish
async fn publish(connection: &Connection, matrix: &SharedMatrix) -> Result<(), SessionError> {
    let (events, snapshot) = {
        let mut m = matrix.write();
        (m.take_events(), m.snapshot())
    };

    connection
        .send(Command::UpdateMatrix(UpdateMatrixPayload {
            player: 0,
            matrix: (&snapshot).into(),
        }))
        .await?;

    for event in events {
        match event {
            MatrixEvent::Score { lines, points } => debug!(lines, points, "scored"),
            MatrixEvent::SendGarbage(rows) => {
                connection
                    .send(Command::SendGarbage(SendGarbagePayload { player: 0, rows }))
                    .await?
            }
            MatrixEvent::GameOver => {
                info!(score = snapshot.score, lines = snapshot.lines, "game over");
                connection
                    .send(Command::GameOver(GameOverPayload::default()))
                    .await?
            }
        }
    }
    Ok(())
}

/// Input side of a session; cheap to clone into tasks
///
/// Each change and its publication happen under one turn lock, so the
/// server sees matrices in the order they were produced.
#[derive(Debug, Clone)]
pub struct Controls {
    connection: Connection,
    matrix: SharedMatrix,
    turn: Arc<Mutex<()>>,
}

impl Controls {
    pub fn matrix(&self) -> &SharedMatrix {
        &self.matrix
    }

    pub fn is_game_over(&self) -> bool {
        self.matrix.read().is_game_over()
    }

    /// Deal the first piece
    pub async fn start(&self) -> Result<bool, SessionError> {
        let _turn = self.turn.lock().await;
        let started = self.matrix.write().start();
        publish(&self.connection, &self.matrix).await?;
        Ok(started)
    }

    /// Apply an input intent and publish the result
    pub async fn apply(&self, action: GameAction) -> Result<bool, SessionError> {
        let _turn = self.turn.lock().await;
        let changed = self.matrix.write().apply_action(action);
        if changed {
            publish(&self.connection, &self.matrix).await?;
        }
        Ok(changed)
    }

    /// One step of gravity
    pub async fn tick(&self) -> Result<bool, SessionError> {
        let _turn = self.turn.lock().await;
        let moved = self.matrix.write().lower_piece();
        publish(&self.connection, &self.matrix).await?;
        Ok(moved)
    }

    pub async fn chat(&self, message: &str) -> Result<(), SessionError> {
        self.connection
            .send(Command::Message(MessagePayload {
                player: 0,
                message: message.to_string(),
            }))
            .await?;
        Ok(())
    }

    pub async fn rename(&self, name: &str) -> Result<(), SessionError> {
        self.connection
            .send(Command::Nickname(NicknamePayload {
                player: 0,
                name: name.to_string(),
            }))
            .await?;
        Ok(())
    }
}

/// A joined game, seen from one player
#[derive(Debug)]
pub struct ClientSession {
    controls: Controls,
    inbound: mpsc::Receiver<Inbound>,
    player: PlayerId,
    game: GameId,
    start: StartGamePayload,
    roster: Vec<RosterEntry>,
    remote: BTreeMap<PlayerId, MatrixSnapshot>,
    chat: Vec<MessagePayload>,
    winner: Option<PlayerId>,
    disconnected: bool,
}

impl ClientSession {
    /// Send `request` and wait for the acknowledgement and start parameters
    pub async fn join(
        connection: Connection,
        mut inbound: mpsc::Receiver<Inbound>,
        request: JoinGamePayload,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        connection.send(Command::JoinGame(request)).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut ack: Option<JoinGamePayload> = None;
        let mut roster = Vec::new();

        let (ack, start) = loop {
            let next = tokio::time::timeout_at(deadline, inbound.recv())
                .await
                .map_err(|_| SessionError::Handshake(format!("no start after {:?}", timeout)))?;
            let Some(Inbound { command, .. }) = next else {
                return Err(SessionError::Handshake("connection closed".to_string()));
            };
            match command {
                Command::JoinGame(payload) => ack = Some(payload),
                Command::UpdateRoster(payload) => roster = payload.players,
                Command::StartGame(start) => match ack.take() {
                    Some(ack) => break (ack, start),
                    None => {
                        return Err(SessionError::Handshake(
                            "start received before acknowledgement".to_string(),
                        ))
                    }
                },
                Command::Disconnect(payload) => {
                    return Err(SessionError::Handshake(format!(
                        "server disconnected: {}",
                        payload.message
                    )))
                }
                other => debug!(kind = %other.kind(), "ignored during join"),
            }
        };

        let minos = Generator::new().generate(start.rank)?;
        let bag = Bag::new(start.seed, minos);
        let matrix = Matrix::with_bag(start.width, start.height, start.buffer, bag);

        let game = ack.game.unwrap_or_default();
        info!(player = ack.player, game, seed = start.seed, "joined game");

        Ok(Self {
            controls: Controls {
                connection,
                matrix: SharedMatrix::new(matrix),
                turn: Arc::default(),
            },
            inbound,
            player: ack.player,
            game,
            start,
            roster,
            remote: BTreeMap::new(),
            chat: Vec::new(),
            winner: None,
            disconnected: false,
        })
    }

    pub fn controls(&self) -> Controls {
        self.controls.clone()
    }

    pub fn matrix(&self) -> &SharedMatrix {
        &self.controls.matrix
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn game(&self) -> GameId {
        self.game
    }

    pub fn start_parameters(&self) -> &StartGamePayload {
        &self.start
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    /// Last snapshot another player published
    pub fn remote(&self, player: PlayerId) -> Option<&MatrixSnapshot> {
        self.remote.get(&player)
    }

    pub fn chat_log(&self) -> &[MessagePayload] {
        &self.chat
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Drop the local piece every level-dependent interval until game over
    pub fn spawn_gravity(&self) -> JoinHandle<()> {
        let controls = self.controls.clone();
        tokio::spawn(async move {
            loop {
                let (level, over) = {
                    let m = controls.matrix.read();
                    (m.level(), m.is_game_over())
                };
                if over || controls.connection.is_terminated() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(drop_interval_ms(level) as u64)).await;
                if controls.tick().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Apply one server command to the session state
    pub fn handle(&mut self, command: &Command) {
        match command {
            Command::UpdateRoster(payload) => self.roster = payload.players.clone(),
            Command::UpdateMatrix(payload) if payload.player != self.player => {
                match MatrixSnapshot::try_from(payload.matrix.clone()) {
                    Ok(snapshot) => {
                        self.remote.insert(payload.player, snapshot);
                    }
                    Err(e) => debug!(player = payload.player, error = %e, "bad remote matrix"),
                }
            }
            Command::ReceiveGarbage(payload) => {
                debug!(from = payload.player, rows = payload.rows, "garbage incoming");
                self.controls.matrix.write().add_pending_garbage(payload.rows);
            }
            Command::Message(payload) => self.chat.push(payload.clone()),
            Command::GameOver(payload) => {
                if let Some(winner) = payload.winner {
                    info!(winner, "game finished");
                    self.winner = Some(winner);
                }
                if payload.player == self.player {
                    self.controls.matrix.write().set_game_over();
                }
            }
            Command::Disconnect(payload) => {
                info!(reason = %payload.message, "server disconnected");
                self.disconnected = true;
            }
            _ => {}
        }
    }

    /// Wait for the next server command, apply it and hand it back
    ///
    /// Returns None once the connection is gone.
    pub async fn next(&mut self) -> Option<Command> {
        let Inbound { command, .. } = self.inbound.recv().await?;
        self.handle(&command);
        Some(command)
    }

    /// Leave the game and close the connection
    pub async fn quit(self) {
        let connection = self.controls.connection;
        let _ = connection
            .send(Command::QuitGame(QuitGamePayload::default()))
            .await;
        connection.close().await;
    }
}
