use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use fleche_core::ids::{GameId, GridId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Active,
    Ended,
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

impl std::str::FromStr for GameStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(format!("unknown game status: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRow {
    pub id: GameId,
    pub code: String,
    pub owner_pseudo: String,
    pub theme: String,
    pub difficulty: String,
    pub status: GameStatus,
    pub current_grid_id: Option<GridId>,
    pub created_at: String,
}

/// An active game plus its live player count, for the lobby listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameListing {
    pub game: GameRow,
    pub player_count: i64,
}

pub struct GameRepo {
    db: Database,
}

impl GameRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new game. The code must already be checked for uniqueness;
    /// the UNIQUE constraint turns a lost race into a Conflict.
    #[instrument(skip(self), fields(code, owner_pseudo))]
    pub fn create(
        &self,
        code: &str,
        owner_pseudo: &str,
        theme: &str,
        difficulty: &str,
    ) -> Result<GameRow, StoreError> {
        let id = GameId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO games (id, code, owner_pseudo, theme, difficulty, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6)",
                rusqlite::params![id.as_str(), code, owner_pseudo, theme, difficulty, now],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!("game code {code} already exists"))
                }
                other => StoreError::from(other),
            })?;

            Ok(GameRow {
                id,
                code: code.to_string(),
                owner_pseudo: owner_pseudo.to_string(),
                theme: theme.to_string(),
                difficulty: difficulty.to_string(),
                status: GameStatus::Active,
                current_grid_id: None,
                created_at: now,
            })
        })
    }

    /// Get a game by its join code (case-insensitive).
    #[instrument(skip(self), fields(code))]
    pub fn get_by_code(&self, code: &str) -> Result<GameRow, StoreError> {
        let code = code.to_ascii_uppercase();
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, code, owner_pseudo, theme, difficulty, status, current_grid_id, created_at
                 FROM games WHERE code = ?1",
            )?;
            let mut rows = stmt.query([&code])?;
            match rows.next()? {
                Some(row) => row_to_game(row),
                None => Err(StoreError::NotFound(format!("game {code}"))),
            }
        })
    }

    /// Whether a code is already taken.
    pub fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM games WHERE code = ?1",
                [code],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Point the game at a new current grid.
    #[instrument(skip(self), fields(game_id = %game_id, grid_id = %grid_id))]
    pub fn set_current_grid(&self, game_id: &GameId, grid_id: &GridId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE games SET current_grid_id = ?1 WHERE id = ?2",
                rusqlite::params![grid_id.as_str(), game_id.as_str()],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(game_id = %game_id, status = %status))]
    pub fn update_status(&self, game_id: &GameId, status: GameStatus) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE games SET status = ?1 WHERE id = ?2",
                rusqlite::params![status.to_string(), game_id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Active games with player counts, newest first.
    pub fn list_active(&self) -> Result<Vec<GameListing>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.code, g.owner_pseudo, g.theme, g.difficulty, g.status,
                        g.current_grid_id, g.created_at,
                        (SELECT COUNT(*) FROM players p WHERE p.game_id = g.id)
                 FROM games g WHERE g.status = 'active'
                 ORDER BY g.created_at DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let game = row_to_game(row)?;
                let player_count: i64 = row_helpers::get(row, 8, "games", "player_count")?;
                results.push(GameListing { game, player_count });
            }
            Ok(results)
        })
    }

    /// Hard delete a game and everything hanging off it.
    #[instrument(skip(self), fields(game_id = %game_id))]
    pub fn delete(&self, game_id: &GameId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM entry_claims WHERE grid_id IN (SELECT id FROM grids WHERE game_id = ?1)",
                [game_id.as_str()],
            )?;
            conn.execute(
                "DELETE FROM grid_cells WHERE grid_id IN (SELECT id FROM grids WHERE game_id = ?1)",
                [game_id.as_str()],
            )?;
            conn.execute("DELETE FROM grids WHERE game_id = ?1", [game_id.as_str()])?;
            conn.execute("DELETE FROM players WHERE game_id = ?1", [game_id.as_str()])?;
            conn.execute("DELETE FROM messages WHERE game_id = ?1", [game_id.as_str()])?;
            conn.execute("DELETE FROM games WHERE id = ?1", [game_id.as_str()])?;
            Ok(())
        })
    }
}

fn row_to_game(row: &rusqlite::Row<'_>) -> Result<GameRow, StoreError> {
    let status_str: String = row_helpers::get(row, 5, "games", "status")?;
    Ok(GameRow {
        id: GameId::from_raw(row_helpers::get::<String>(row, 0, "games", "id")?),
        code: row_helpers::get(row, 1, "games", "code")?,
        owner_pseudo: row_helpers::get(row, 2, "games", "owner_pseudo")?,
        theme: row_helpers::get(row, 3, "games", "theme")?,
        difficulty: row_helpers::get(row, 4, "games", "difficulty")?,
        status: row_helpers::parse_enum(&status_str, "games", "status")?,
        current_grid_id: row_helpers::get_opt::<String>(row, 6, "games", "current_grid_id")?
            .map(GridId::from_raw),
        created_at: row_helpers::get(row, 7, "games", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> GameRepo {
        GameRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn create_and_get_by_code() {
        let repo = repo();
        let game = repo.create("AB12", "zoe", "general", "easy").unwrap();
        assert!(game.id.as_str().starts_with("game_"));
        assert_eq!(game.status, GameStatus::Active);
        assert!(game.current_grid_id.is_none());

        let fetched = repo.get_by_code("AB12").unwrap();
        assert_eq!(fetched.id, game.id);
        assert_eq!(fetched.owner_pseudo, "zoe");
    }

    #[test]
    fn get_by_code_is_case_insensitive() {
        let repo = repo();
        repo.create("AB12", "zoe", "general", "easy").unwrap();
        assert!(repo.get_by_code("ab12").is_ok());
    }

    #[test]
    fn unknown_code_is_not_found() {
        let repo = repo();
        assert!(matches!(repo.get_by_code("ZZZZ"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn duplicate_code_is_conflict() {
        let repo = repo();
        repo.create("AB12", "zoe", "general", "easy").unwrap();
        let result = repo.create("AB12", "ana", "general", "easy");
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn code_exists() {
        let repo = repo();
        assert!(!repo.code_exists("AB12").unwrap());
        repo.create("AB12", "zoe", "general", "easy").unwrap();
        assert!(repo.code_exists("AB12").unwrap());
    }

    #[test]
    fn set_current_grid() {
        let repo = repo();
        let game = repo.create("AB12", "zoe", "general", "easy").unwrap();
        let grid_id = GridId::new();
        repo.set_current_grid(&game.id, &grid_id).unwrap();
        let fetched = repo.get_by_code("AB12").unwrap();
        assert_eq!(fetched.current_grid_id.as_ref(), Some(&grid_id));
    }

    #[test]
    fn update_status() {
        let repo = repo();
        let game = repo.create("AB12", "zoe", "general", "easy").unwrap();
        repo.update_status(&game.id, GameStatus::Ended).unwrap();
        assert_eq!(repo.get_by_code("AB12").unwrap().status, GameStatus::Ended);
    }

    #[test]
    fn list_active_excludes_ended() {
        let repo = repo();
        repo.create("AB12", "zoe", "general", "easy").unwrap();
        let ended = repo.create("CD34", "ana", "general", "easy").unwrap();
        repo.update_status(&ended.id, GameStatus::Ended).unwrap();

        let listings = repo.list_active().unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].game.code, "AB12");
        assert_eq!(listings[0].player_count, 0);
    }

    #[test]
    fn delete_removes_game() {
        let repo = repo();
        let game = repo.create("AB12", "zoe", "general", "easy").unwrap();
        repo.delete(&game.id).unwrap();
        assert!(repo.get_by_code("AB12").is_err());
    }
}
