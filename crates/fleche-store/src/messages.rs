use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use fleche_core::events::{MessageKind, WireMessage};
use fleche_core::ids::{GameId, MessageId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub game_id: GameId,
    pub kind: MessageKind,
    pub pseudo: Option<String>,
    pub color: Option<String>,
    pub content: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: String,
}

impl MessageRow {
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            kind: self.kind,
            pseudo: self.pseudo.clone(),
            color: self.color.clone(),
            content: self.content.clone(),
            payload: self.payload.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Chat messages and system log lines, shared table.
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, payload, content), fields(game_id = %game_id, kind = %kind))]
    pub fn add(
        &self,
        game_id: &GameId,
        kind: MessageKind,
        pseudo: Option<&str>,
        color: Option<&str>,
        content: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<MessageRow, StoreError> {
        let id = MessageId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, game_id, type, pseudo, color, content, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.as_str(),
                    game_id.as_str(),
                    kind.to_string(),
                    pseudo,
                    color,
                    content,
                    payload.as_ref().map(serde_json::Value::to_string),
                    now,
                ],
            )?;
            Ok(MessageRow {
                id,
                game_id: game_id.clone(),
                kind,
                pseudo: pseudo.map(str::to_string),
                color: color.map(str::to_string),
                content: content.to_string(),
                payload,
                created_at: now,
            })
        })
    }

    /// Last `limit` messages of a game in chronological order.
    pub fn recent(&self, game_id: &GameId, limit: u32) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, type, pseudo, color, content, payload, created_at
                 FROM messages WHERE game_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![game_id.as_str(), limit])?;
            let mut messages = Vec::new();
            while let Some(row) = rows.next()? {
                let kind_str: String = row_helpers::get(row, 1, "messages", "type")?;
                let payload = row_helpers::get_opt::<String>(row, 5, "messages", "payload")?
                    .map(|raw| row_helpers::parse_json(&raw, "messages", "payload"))
                    .transpose()?;
                messages.push(MessageRow {
                    id: MessageId::from_raw(row_helpers::get::<String>(row, 0, "messages", "id")?),
                    game_id: game_id.clone(),
                    kind: row_helpers::parse_enum(&kind_str, "messages", "type")?,
                    pseudo: row_helpers::get_opt(row, 2, "messages", "pseudo")?,
                    color: row_helpers::get_opt(row, 3, "messages", "color")?,
                    content: row_helpers::get(row, 4, "messages", "content")?,
                    payload,
                    created_at: row_helpers::get(row, 6, "messages", "created_at")?,
                });
            }
            // Fetched newest-first; flip to chronological for display.
            messages.reverse();
            Ok(messages)
        })
    }
}
