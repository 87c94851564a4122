//! In-memory presence: who is connected to which game, and where their
//! cursor sits. Nothing here is persisted and nothing here throttles;
//! cursor rate limiting is the coordinator's job.

use std::collections::HashMap;

use dashmap::DashMap;

use fleche_core::events::PresenceState;
use fleche_core::grid::Direction;
use fleche_core::ids::EntryId;

use crate::client::ClientId;

/// Reverse-index payload: which game/identity a connection belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionInfo {
    pub game_code: String,
    pub pseudo: String,
    pub color: String,
}

/// Two indexes: `game code → pseudo → presence` for room snapshots, and
/// `connection → identity` for O(1) lookup on disconnect.
#[derive(Default)]
pub struct PresenceTracker {
    games: DashMap<String, HashMap<String, PresenceState>>,
    connections: DashMap<ClientId, ConnectionInfo>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's presence in a game. The cursor starts
    /// nowhere; a later `update_cursor` places it.
    pub fn join(&self, conn: &ClientId, game_code: &str, pseudo: &str, color: &str) -> PresenceState {
        self.connections.insert(
            conn.clone(),
            ConnectionInfo {
                game_code: game_code.to_string(),
                pseudo: pseudo.to_string(),
                color: color.to_string(),
            },
        );

        let state = PresenceState {
            pseudo: pseudo.to_string(),
            color: color.to_string(),
            row: None,
            col: None,
            direction: Direction::Right,
            entry_id: None,
        };
        self.games
            .entry(game_code.to_string())
            .or_default()
            .insert(pseudo.to_string(), state.clone());
        state
    }

    /// Move a connection's cursor. None when the connection never joined.
    pub fn update_cursor(
        &self,
        conn: &ClientId,
        row: usize,
        col: usize,
        direction: Direction,
        entry_id: Option<EntryId>,
    ) -> Option<(String, PresenceState)> {
        let info = self.connections.get(conn)?;
        let mut game = self.games.get_mut(&info.game_code)?;
        let state = game.get_mut(&info.pseudo)?;

        state.row = Some(row);
        state.col = Some(col);
        state.direction = direction;
        state.entry_id = entry_id;

        Some((info.game_code.clone(), state.clone()))
    }

    /// Drop a connection's presence. Removing the last presence of a game
    /// removes the game's map entirely.
    pub fn leave(&self, conn: &ClientId) -> Option<ConnectionInfo> {
        let (_, info) = self.connections.remove(conn)?;

        let mut drop_game = false;
        if let Some(mut game) = self.games.get_mut(&info.game_code) {
            game.remove(&info.pseudo);
            drop_game = game.is_empty();
        }
        if drop_game {
            self.games.remove(&info.game_code);
        }

        Some(info)
    }

    /// Identity of a connection, if it joined a game.
    pub fn info(&self, conn: &ClientId) -> Option<ConnectionInfo> {
        self.connections.get(conn).map(|i| i.clone())
    }

    /// All presences in a game.
    pub fn snapshot(&self, game_code: &str) -> Vec<PresenceState> {
        self.games
            .get(game_code)
            .map(|game| game.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of present players in a game.
    pub fn player_count(&self, game_code: &str) -> usize {
        self.games.get(game_code).map_or(0, |game| game.len())
    }

    /// Number of games with at least one presence (leak check).
    pub fn game_count(&self) -> usize {
        self.games.len()
    }
}
