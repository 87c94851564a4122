//! Wire events and the routing envelope used for room fan-out.
//!
//! `ServerEvent` is the tagged payload written to clients. `GameEvent` wraps
//! a payload with the game code it belongs to; the server's event bridge
//! routes on the code and serializes only the payload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::grid::{Direction, GridLayout};
use crate::ids::{EntryId, GridId};

/// Kind of a persisted game message (chat line or system log line).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    LogAttempt,
    LogSuccess,
    LogFail,
    LogJoin,
    LogLeave,
    LogNext,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Chat => "chat",
            Self::LogAttempt => "log_attempt",
            Self::LogSuccess => "log_success",
            Self::LogFail => "log_fail",
            Self::LogJoin => "log_join",
            Self::LogLeave => "log_leave",
            Self::LogNext => "log_next",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "log_attempt" => Ok(Self::LogAttempt),
            "log_success" => Ok(Self::LogSuccess),
            "log_fail" => Ok(Self::LogFail),
            "log_join" => Ok(Self::LogJoin),
            "log_leave" => Ok(Self::LogLeave),
            "log_next" => Ok(Self::LogNext),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// A player's ephemeral cursor/location state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    pub pseudo: String,
    pub color: String,
    pub row: Option<usize>,
    pub col: Option<usize>,
    pub direction: Direction,
    pub entry_id: Option<EntryId>,
}

/// One scoreboard line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub pseudo: String,
    pub color: String,
    pub score: i64,
}

/// A chat/log message as sent to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub pseudo: Option<String>,
    pub color: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at: String,
}

/// Game header shared by snapshots and HTTP responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub id: String,
    pub code: String,
    pub owner_pseudo: String,
    pub theme: String,
    pub difficulty: String,
    pub status: String,
}

/// Client-safe view of the active grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridInfo {
    pub id: GridId,
    pub index_number: i64,
    pub layout: GridLayout,
}

/// A claim as shown in snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimInfo {
    pub entry_id: EntryId,
    pub claimed_by: String,
    pub claimed_at: String,
}

/// A player as shown in snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub pseudo: String,
    pub color: String,
    pub score_total: i64,
}

/// A cell position, used in incorrect-entry payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

/// Events sent from server to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full state snapshot, delivered to a joining connection only.
    GameState {
        game: GameInfo,
        grid: Option<GridInfo>,
        cells: HashMap<String, String>,
        claims: Vec<ClaimInfo>,
        players: Vec<PlayerInfo>,
        messages: Vec<WireMessage>,
        presence: Vec<PresenceState>,
        scoreboard: Vec<ScoreEntry>,
    },
    CellUpdate {
        row: usize,
        col: usize,
        value: String,
        pseudo: String,
    },
    PresenceUpdate {
        #[serde(flatten)]
        state: PresenceState,
    },
    PresenceRemove {
        pseudo: String,
    },
    EntryClaimed {
        entry_id: EntryId,
        pseudo: String,
        color: String,
        word: String,
    },
    EntryIncorrect {
        entry_id: EntryId,
        cells: Vec<CellPos>,
    },
    ScoreboardUpdate {
        scores: Vec<ScoreEntry>,
    },
    MessageBroadcast {
        message: WireMessage,
    },
    GridCompleted {
        final_scores: Vec<ScoreEntry>,
        podium: Vec<ScoreEntry>,
    },
    GridNext {
        grid: GridInfo,
    },
    Error {
        message: String,
    },
}

/// A server event addressed to one game's room, optionally excluding the
/// connection that caused it (join/leave/cursor echoes).
#[derive(Clone, Debug)]
pub struct GameEvent {
    pub code: String,
    pub event: ServerEvent,
    pub except_connection: Option<String>,
}

impl GameEvent {
    pub fn new(code: impl Into<String>, event: ServerEvent) -> Self {
        Self { code: code.into(), event, except_connection: None }
    }

    pub fn except(code: impl Into<String>, event: ServerEvent, connection: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            event,
            except_connection: Some(connection.into()),
        }
    }

    pub fn game_code(&self) -> &str {
        &self.code
    }
}
