use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use fleche_core::ids::GameId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerRow {
    pub game_id: GameId,
    pub pseudo: String,
    pub color: String,
    pub score_total: i64,
    pub last_seen: String,
}

pub struct PlayerRepo {
    db: Database,
}

impl PlayerRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the player on first join, refresh color/last_seen on rejoin.
    /// The accumulated score is preserved across rejoins.
    #[instrument(skip(self), fields(game_id = %game_id, pseudo))]
    pub fn upsert(&self, game_id: &GameId, pseudo: &str, color: &str) -> Result<PlayerRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO players (game_id, pseudo, color, score_total, last_seen)
                 VALUES (?1, ?2, ?3, 0, ?4)
                 ON CONFLICT(game_id, pseudo)
                 DO UPDATE SET color = excluded.color, last_seen = excluded.last_seen",
                rusqlite::params![game_id.as_str(), pseudo, color, now],
            )?;

            let mut stmt = conn.prepare(
                "SELECT game_id, pseudo, color, score_total, last_seen
                 FROM players WHERE game_id = ?1 AND pseudo = ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![game_id.as_str(), pseudo])?;
            match rows.next()? {
                Some(row) => row_to_player(row),
                None => Err(StoreError::NotFound(format!("player {pseudo}"))),
            }
        })
    }

    /// Award one point.
    #[instrument(skip(self), fields(game_id = %game_id, pseudo))]
    pub fn increment_score(&self, game_id: &GameId, pseudo: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE players SET score_total = score_total + 1
                 WHERE game_id = ?1 AND pseudo = ?2",
                rusqlite::params![game_id.as_str(), pseudo],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("player {pseudo}")));
            }
            Ok(())
        })
    }

    /// Players of a game, highest score first.
    pub fn list_by_score(&self, game_id: &GameId) -> Result<Vec<PlayerRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT game_id, pseudo, color, score_total, last_seen
                 FROM players WHERE game_id = ?1
                 ORDER BY score_total DESC, pseudo",
            )?;
            let mut rows = stmt.query([game_id.as_str()])?;
            let mut players = Vec::new();
            while let Some(row) = rows.next()? {
                players.push(row_to_player(row)?);
            }
            Ok(players)
        })
    }

    pub fn get(&self, game_id: &GameId, pseudo: &str) -> Result<PlayerRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT game_id, pseudo, color, score_total, last_seen
                 FROM players WHERE game_id = ?1 AND pseudo = ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![game_id.as_str(), pseudo])?;
            match rows.next()? {
                Some(row) => row_to_player(row),
                None => Err(StoreError::NotFound(format!("player {pseudo}"))),
            }
        })
    }
}

fn row_to_player(row: &rusqlite::Row<'_>) -> Result<PlayerRow, StoreError> {
    Ok(PlayerRow {
        game_id: GameId::from_raw(row_helpers::get::<String>(row, 0, "players", "game_id")?),
        pseudo: row_helpers::get(row, 1, "players", "pseudo")?,
        color: row_helpers::get(row, 2, "players", "color")?,
        score_total: row_helpers::get(row, 3, "players", "score_total")?,
        last_seen: row_helpers::get(row, 4, "players", "last_seen")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> PlayerRepo {
        PlayerRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn upsert_creates_with_zero_score() {
        let repo = repo();
        let game_id = GameId::new();
        let player = repo.upsert(&game_id, "zoe", "#FF0000").unwrap();
        assert_eq!(player.score_total, 0);
        assert_eq!(player.color, "#FF0000");
    }

    #[test]
    fn upsert_preserves_score_and_updates_color() {
        let repo = repo();
        let game_id = GameId::new();
        repo.upsert(&game_id, "zoe", "#FF0000").unwrap();
        repo.increment_score(&game_id, "zoe").unwrap();

        let rejoined = repo.upsert(&game_id, "zoe", "#00FF00").unwrap();
        assert_eq!(rejoined.score_total, 1);
        assert_eq!(rejoined.color, "#00FF00");
    }

    #[test]
    fn increment_score_adds_exactly_one() {
        let repo = repo();
        let game_id = GameId::new();
        repo.upsert(&game_id, "zoe", "#FF0000").unwrap();

        repo.increment_score(&game_id, "zoe").unwrap();
        repo.increment_score(&game_id, "zoe").unwrap();
        assert_eq!(repo.get(&game_id, "zoe").unwrap().score_total, 2);
    }

    #[test]
    fn increment_unknown_player_fails() {
        let repo = repo();
        let game_id = GameId::new();
        assert!(matches!(
            repo.increment_score(&game_id, "ghost"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_orders_by_score_desc() {
        let repo = repo();
        let game_id = GameId::new();
        repo.upsert(&game_id, "zoe", "#FF0000").unwrap();
        repo.upsert(&game_id, "ana", "#00FF00").unwrap();
        repo.increment_score(&game_id, "ana").unwrap();

        let players = repo.list_by_score(&game_id).unwrap();
        assert_eq!(players[0].pseudo, "ana");
        assert_eq!(players[1].pseudo, "zoe");
    }

    #[test]
    fn pseudo_unique_per_game_not_globally() {
        let repo = repo();
        let g1 = GameId::new();
        let g2 = GameId::new();
        repo.upsert(&g1, "zoe", "#FF0000").unwrap();
        repo.upsert(&g2, "zoe", "#00FF00").unwrap();
        repo.increment_score(&g1, "zoe").unwrap();

        assert_eq!(repo.get(&g1, "zoe").unwrap().score_total, 1);
        assert_eq!(repo.get(&g2, "zoe").unwrap().score_total, 0);
    }
}
