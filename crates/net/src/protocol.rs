//! Protocol module - newline-delimited JSON commands
//!
//! Every message is one line holding an envelope:
//!
//! ```text
//! {"cmd":2,"Data":{"t":"17"}}
//! ```
//!
//! `cmd` is the integer [`CommandKind`] and `Data` the kind's payload, kept
//! as raw JSON until the kind is known. Payload fields use compact names
//! (`p` player, `n` name, `m` message, ...).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use netris_core::{ActiveSnapshot, MatrixSnapshot};

use crate::error::ProtocolError;
use crate::types::{Block, GameId, PlayerId, Point};

/// Integer discriminant carried in the `cmd` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    Disconnect,
    Ping,
    Pong,
    Nickname,
    Message,
    JoinGame,
    QuitGame,
    UpdateRoster,
    StartGame,
    GameOver,
    UpdateMatrix,
    SendGarbage,
    ReceiveGarbage,
    Stats,
    ListGames,
}

impl CommandKind {
    pub const ALL: [CommandKind; 15] = [
        CommandKind::Disconnect,
        CommandKind::Ping,
        CommandKind::Pong,
        CommandKind::Nickname,
        CommandKind::Message,
        CommandKind::JoinGame,
        CommandKind::QuitGame,
        CommandKind::UpdateRoster,
        CommandKind::StartGame,
        CommandKind::GameOver,
        CommandKind::UpdateMatrix,
        CommandKind::SendGarbage,
        CommandKind::ReceiveGarbage,
        CommandKind::Stats,
        CommandKind::ListGames,
    ];

    pub fn code(self) -> i64 {
        match self {
            CommandKind::Disconnect => 1,
            CommandKind::Ping => 2,
            CommandKind::Pong => 3,
            CommandKind::Nickname => 4,
            CommandKind::Message => 5,
            CommandKind::JoinGame => 6,
            CommandKind::QuitGame => 7,
            CommandKind::UpdateRoster => 8,
            CommandKind::StartGame => 9,
            CommandKind::GameOver => 10,
            CommandKind::UpdateMatrix => 11,
            CommandKind::SendGarbage => 12,
            CommandKind::ReceiveGarbage => 13,
            CommandKind::Stats => 14,
            CommandKind::ListGames => 15,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Disconnect => "disconnect",
            CommandKind::Ping => "ping",
            CommandKind::Pong => "pong",
            CommandKind::Nickname => "nickname",
            CommandKind::Message => "message",
            CommandKind::JoinGame => "join_game",
            CommandKind::QuitGame => "quit_game",
            CommandKind::UpdateRoster => "update_roster",
            CommandKind::StartGame => "start_game",
            CommandKind::GameOver => "game_over",
            CommandKind::UpdateMatrix => "update_matrix",
            CommandKind::SendGarbage => "send_garbage",
            CommandKind::ReceiveGarbage => "receive_garbage",
            CommandKind::Stats => "stats",
            CommandKind::ListGames => "list_games",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============== Payloads ==============

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectPayload {
    /// Reason
    #[serde(rename = "m", default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    #[serde(rename = "t", default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongPayload {
    /// Token of the ping being answered
    #[serde(rename = "t", default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicknamePayload {
    #[serde(rename = "p", default)]
    pub player: PlayerId,
    #[serde(rename = "n")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "p", default)]
    pub player: PlayerId,
    #[serde(rename = "m")]
    pub message: String,
}

/// Descriptor for a game the joining player wants created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGame {
    #[serde(rename = "n", default)]
    pub name: String,
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i32>,
    #[serde(rename = "mx", default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<usize>,
}

/// Join request (client) and acknowledgement (server)
///
/// The server's reply carries the allocated player id and the game joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGamePayload {
    #[serde(rename = "p", default)]
    pub player: PlayerId,
    #[serde(rename = "n", default)]
    pub name: String,
    #[serde(rename = "g", default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameId>,
    #[serde(rename = "new", default, skip_serializing_if = "Option::is_none")]
    pub new_game: Option<NewGame>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuitGamePayload {
    #[serde(rename = "p", default)]
    pub player: PlayerId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(rename = "p")]
    pub player: PlayerId,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "a", default)]
    pub alive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterPayload {
    #[serde(rename = "g")]
    pub game: GameId,
    #[serde(rename = "r", default)]
    pub players: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGamePayload {
    #[serde(rename = "s")]
    pub seed: u64,
    #[serde(rename = "r")]
    pub rank: i32,
    #[serde(rename = "w")]
    pub width: i32,
    #[serde(rename = "h")]
    pub height: i32,
    #[serde(rename = "b")]
    pub buffer: i32,
    /// The game was already running when this player joined
    #[serde(rename = "st", default)]
    pub started: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverPayload {
    #[serde(rename = "p", default)]
    pub player: PlayerId,
    #[serde(rename = "w", default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveState {
    #[serde(rename = "c")]
    pub cells: Vec<(i32, i32)>,
    #[serde(rename = "b")]
    pub block: u8,
}

/// Wire form of a [`MatrixSnapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixState {
    #[serde(rename = "w")]
    pub width: i32,
    #[serde(rename = "h")]
    pub height: i32,
    #[serde(rename = "b")]
    pub buffer: i32,
    /// Occupied cells as `[index, block code]`
    #[serde(rename = "c", default)]
    pub cells: Vec<(usize, u8)>,
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveState>,
    #[serde(rename = "s", default)]
    pub score: u32,
    #[serde(rename = "l", default)]
    pub lines: u32,
    #[serde(rename = "g", default)]
    pub pending_garbage: u32,
    #[serde(rename = "o", default)]
    pub game_over: bool,
}

impl From<&MatrixSnapshot> for MatrixState {
    fn from(snapshot: &MatrixSnapshot) -> Self {
        Self {
            width: snapshot.width,
            height: snapshot.height,
            buffer: snapshot.buffer,
            cells: snapshot
                .cells
                .iter()
                .map(|&(i, block)| (i, block.code()))
                .collect(),
            active: snapshot.active.as_ref().map(|a| ActiveState {
                cells: a.cells.iter().map(|p| (p.x, p.y)).collect(),
                block: a.block.code(),
            }),
            score: snapshot.score,
            lines: snapshot.lines,
            pending_garbage: snapshot.pending_garbage,
            game_over: snapshot.game_over,
        }
    }
}

impl TryFrom<MatrixState> for MatrixSnapshot {
    type Error = ProtocolError;

    fn try_from(state: MatrixState) -> Result<Self, Self::Error> {
        let block = |code: u8| Block::from_code(code).ok_or(ProtocolError::InvalidBlock(code));

        let mut cells = state
            .cells
            .into_iter()
            .map(|(i, code)| Ok((i, block(code)?)))
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        cells.sort_unstable_by_key(|&(i, _)| i);
        cells.dedup_by_key(|&mut (i, _)| i);

        let active = match state.active {
            Some(a) => Some(ActiveSnapshot {
                cells: a.cells.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
                block: block(a.block)?,
            }),
            None => None,
        };

        Ok(MatrixSnapshot {
            width: state.width,
            height: state.height,
            buffer: state.buffer,
            cells,
            active,
            score: state.score,
            lines: state.lines,
            pending_garbage: state.pending_garbage,
            game_over: state.game_over,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMatrixPayload {
    #[serde(rename = "p", default)]
    pub player: PlayerId,
    #[serde(rename = "m")]
    pub matrix: MatrixState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendGarbagePayload {
    #[serde(rename = "p", default)]
    pub player: PlayerId,
    #[serde(rename = "r")]
    pub rows: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGarbagePayload {
    /// Sender of the garbage
    #[serde(rename = "p", default)]
    pub player: PlayerId,
    #[serde(rename = "r")]
    pub rows: u32,
}

/// Server-wide counters; sent empty as a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsPayload {
    #[serde(rename = "pl", default)]
    pub players: usize,
    #[serde(rename = "g", default)]
    pub games: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameListing {
    #[serde(rename = "g")]
    pub id: GameId,
    #[serde(rename = "n", default)]
    pub name: String,
    #[serde(rename = "pl", default)]
    pub players: usize,
    #[serde(rename = "mx", default)]
    pub max_players: usize,
}

/// Open games; sent empty as a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListGamesPayload {
    #[serde(rename = "g", default)]
    pub games: Vec<GameListing>,
}

// ============== Commands ==============

/// Every message of the protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Disconnect(DisconnectPayload),
    Ping(PingPayload),
    Pong(PongPayload),
    Nickname(NicknamePayload),
    Message(MessagePayload),
    JoinGame(JoinGamePayload),
    QuitGame(QuitGamePayload),
    UpdateRoster(RosterPayload),
    StartGame(StartGamePayload),
    GameOver(GameOverPayload),
    UpdateMatrix(UpdateMatrixPayload),
    SendGarbage(SendGarbagePayload),
    ReceiveGarbage(ReceiveGarbagePayload),
    Stats(StatsPayload),
    ListGames(ListGamesPayload),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Disconnect(_) => CommandKind::Disconnect,
            Command::Ping(_) => CommandKind::Ping,
            Command::Pong(_) => CommandKind::Pong,
            Command::Nickname(_) => CommandKind::Nickname,
            Command::Message(_) => CommandKind::Message,
            Command::JoinGame(_) => CommandKind::JoinGame,
            Command::QuitGame(_) => CommandKind::QuitGame,
            Command::UpdateRoster(_) => CommandKind::UpdateRoster,
            Command::StartGame(_) => CommandKind::StartGame,
            Command::GameOver(_) => CommandKind::GameOver,
            Command::UpdateMatrix(_) => CommandKind::UpdateMatrix,
            Command::SendGarbage(_) => CommandKind::SendGarbage,
            Command::ReceiveGarbage(_) => CommandKind::ReceiveGarbage,
            Command::Stats(_) => CommandKind::Stats,
            Command::ListGames(_) => CommandKind::ListGames,
        }
    }

    /// Overwrite the player field of commands a client originates, so a
    /// peer cannot speak for another player
    pub fn stamp(&mut self, player: PlayerId) {
        match self {
            Command::Nickname(p) => p.player = player,
            Command::Message(p) => p.player = player,
            Command::QuitGame(p) => p.player = player,
            Command::GameOver(p) => p.player = player,
            Command::UpdateMatrix(p) => p.player = player,
            Command::SendGarbage(p) => p.player = player,
            _ => {}
        }
    }

    fn payload(&self) -> serde_json::Result<Box<RawValue>> {
        use serde_json::value::to_raw_value;

        match self {
            Command::Disconnect(p) => to_raw_value(p),
            Command::Ping(p) => to_raw_value(p),
            Command::Pong(p) => to_raw_value(p),
            Command::Nickname(p) => to_raw_value(p),
            Command::Message(p) => to_raw_value(p),
            Command::JoinGame(p) => to_raw_value(p),
            Command::QuitGame(p) => to_raw_value(p),
            Command::UpdateRoster(p) => to_raw_value(p),
            Command::StartGame(p) => to_raw_value(p),
            Command::GameOver(p) => to_raw_value(p),
            Command::UpdateMatrix(p) => to_raw_value(p),
            Command::SendGarbage(p) => to_raw_value(p),
            Command::ReceiveGarbage(p) => to_raw_value(p),
            Command::Stats(p) => to_raw_value(p),
            Command::ListGames(p) => to_raw_value(p),
        }
    }
}

fn decode_payload(kind: CommandKind, data: &str) -> serde_json::Result<Command> {
    use serde_json::from_str;

    Ok(match kind {
        CommandKind::Disconnect => Command::Disconnect(from_str(data)?),
        CommandKind::Ping => Command::Ping(from_str(data)?),
        CommandKind::Pong => Command::Pong(from_str(data)?),
        CommandKind::Nickname => Command::Nickname(from_str(data)?),
        CommandKind::Message => Command::Message(from_str(data)?),
        CommandKind::JoinGame => Command::JoinGame(from_str(data)?),
        CommandKind::QuitGame => Command::QuitGame(from_str(data)?),
        CommandKind::UpdateRoster => Command::UpdateRoster(from_str(data)?),
        CommandKind::StartGame => Command::StartGame(from_str(data)?),
        CommandKind::GameOver => Command::GameOver(from_str(data)?),
        CommandKind::UpdateMatrix => Command::UpdateMatrix(from_str(data)?),
        CommandKind::SendGarbage => Command::SendGarbage(from_str(data)?),
        CommandKind::ReceiveGarbage => Command::ReceiveGarbage(from_str(data)?),
        CommandKind::Stats => Command::Stats(from_str(data)?),
        CommandKind::ListGames => Command::ListGames(from_str(data)?),
    })
}

/// One framed message
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<'a> {
    pub cmd: i64,
    #[serde(rename = "Data", borrow)]
    pub data: &'a RawValue,
}

/// Serialize a command into a single envelope line (without the newline)
pub fn encode(command: &Command) -> Result<String, ProtocolError> {
    let kind = command.kind();
    let encode_err = |source| ProtocolError::Encode { kind, source };

    let data = command.payload().map_err(encode_err)?;
    serde_json::to_string(&Envelope {
        cmd: kind.code(),
        data: &data,
    })
    .map_err(encode_err)
}

/// Parse one envelope line
///
/// An unknown `cmd` yields [`ProtocolError::UnknownCommand`], which callers
/// treat as recoverable.
pub fn decode(line: &str) -> Result<Command, ProtocolError> {
    let envelope: Envelope<'_> = serde_json::from_str(line).map_err(ProtocolError::Envelope)?;
    let kind = CommandKind::from_code(envelope.cmd)
        .ok_or(ProtocolError::UnknownCommand(envelope.cmd))?;
    decode_payload(kind, envelope.data.get())
        .map_err(|source| ProtocolError::Payload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        for (i, kind) in CommandKind::ALL.iter().enumerate() {
            assert_eq!(kind.code(), i as i64 + 1);
            assert_eq!(CommandKind::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(CommandKind::from_code(0), None);
        assert_eq!(CommandKind::from_code(16), None);
    }

    #[test]
    fn test_ping_envelope_layout() {
        let line = encode(&Command::Ping(PingPayload {
            token: "17".to_string(),
        }))
        .unwrap();
        assert_eq!(line, r#"{"cmd":2,"Data":{"t":"17"}}"#);
    }

    #[test]
    fn test_compact_field_names() {
        let line = encode(&Command::Message(MessagePayload {
            player: 3,
            message: "hi".to_string(),
        }))
        .unwrap();
        assert_eq!(line, r#"{"cmd":5,"Data":{"p":3,"m":"hi"}}"#);
    }

    #[test]
    fn test_unknown_kind_is_distinguished() {
        let err = decode(r#"{"cmd":99,"Data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(99)));
    }

    #[test]
    fn test_bad_payload_reports_kind() {
        let err = decode(r#"{"cmd":12,"Data":{"r":"lots"}}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Payload {
                kind: CommandKind::SendGarbage,
                ..
            }
        ));
    }

    #[test]
    fn test_bad_envelope() {
        assert!(matches!(
            decode("not json").unwrap_err(),
            ProtocolError::Envelope(_)
        ));
        assert!(matches!(
            decode(r#"{"Data":{}}"#).unwrap_err(),
            ProtocolError::Envelope(_)
        ));
    }

    #[test]
    fn test_stamp_overwrites_sender() {
        let mut cmd = Command::SendGarbage(SendGarbagePayload { player: 9, rows: 2 });
        cmd.stamp(4);
        assert_eq!(
            cmd,
            Command::SendGarbage(SendGarbagePayload { player: 4, rows: 2 })
        );
    }

    #[test]
    fn test_matrix_state_rejects_unknown_block() {
        let state = MatrixState {
            width: 2,
            height: 2,
            buffer: 0,
            cells: vec![(0, 200)],
            active: None,
            score: 0,
            lines: 0,
            pending_garbage: 0,
            game_over: false,
        };
        assert!(matches!(
            MatrixSnapshot::try_from(state),
            Err(ProtocolError::InvalidBlock(200))
        ));
    }
}
