use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use fleche_core::events::ScoreEntry;
use fleche_core::grid::{EntryMap, GridLayout};
use fleche_core::ids::{GameId, GridId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A stored grid. `layout` is client-safe; `entries` (answers + cell lists)
/// is server-only and is deliberately not part of this row type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridRow {
    pub id: GridId,
    pub game_id: GameId,
    pub index_number: i64,
    pub layout: GridLayout,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Archived grid detail for the history view.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridArchive {
    pub grid: GridRow,
    pub final_cells: Option<HashMap<String, String>>,
    pub final_scores: Option<Vec<ScoreEntry>>,
}

pub struct GridRepo {
    db: Database,
}

impl GridRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a freshly generated grid.
    #[instrument(skip(self, layout, entries), fields(game_id = %game_id, index_number))]
    pub fn insert(
        &self,
        game_id: &GameId,
        index_number: i64,
        layout: &GridLayout,
        entries: &EntryMap,
    ) -> Result<GridRow, StoreError> {
        let id = GridId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO grids (id, game_id, index_number, layout, entries, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    game_id.as_str(),
                    index_number,
                    serde_json::to_string(layout)?,
                    serde_json::to_string(entries)?,
                    now,
                ],
            )?;
            Ok(GridRow {
                id,
                game_id: game_id.clone(),
                index_number,
                layout: layout.clone(),
                created_at: now,
                completed_at: None,
            })
        })
    }

    #[instrument(skip(self), fields(grid_id = %id))]
    pub fn get(&self, id: &GridId) -> Result<GridRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, game_id, index_number, layout, created_at, completed_at
                 FROM grids WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_grid(row),
                None => Err(StoreError::NotFound(format!("grid {id}"))),
            }
        })
    }

    /// Server-only entries map (canonical answers + ordered cells).
    pub fn entries(&self, id: &GridId) -> Result<EntryMap, StoreError> {
        self.db.with_conn(|conn| {
            let raw: String = conn
                .query_row("SELECT entries FROM grids WHERE id = ?1", [id.as_str()], |row| {
                    row.get(0)
                })
                .map_err(|_| StoreError::NotFound(format!("grid {id}")))?;
            row_helpers::parse_json(&raw, "grids", "entries")
        })
    }

    /// Mark a grid completed. Returns true for exactly one caller: the
    /// `completed_at IS NULL` guard makes the transition one-shot.
    #[instrument(skip(self), fields(grid_id = %id))]
    pub fn try_mark_completed(&self, id: &GridId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "UPDATE grids SET completed_at = ?1 WHERE id = ?2 AND completed_at IS NULL",
                rusqlite::params![now, id.as_str()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Snapshot the final cell map and scoreboard when rotating away from a
    /// grid. Keeps an earlier completion timestamp if one exists.
    #[instrument(skip(self, final_cells, final_scores), fields(grid_id = %id))]
    pub fn archive_final_state(
        &self,
        id: &GridId,
        final_cells: &HashMap<String, String>,
        final_scores: &[ScoreEntry],
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE grids SET final_cells = ?1, final_scores = ?2,
                        completed_at = COALESCE(completed_at, ?3)
                 WHERE id = ?4",
                rusqlite::params![
                    serde_json::to_string(final_cells)?,
                    serde_json::to_string(final_scores)?,
                    now,
                    id.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    /// Completed grids of a game, newest first.
    pub fn list_completed(&self, game_id: &GameId) -> Result<Vec<GridRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, game_id, index_number, layout, created_at, completed_at
                 FROM grids WHERE game_id = ?1 AND completed_at IS NOT NULL
                 ORDER BY index_number DESC",
            )?;
            let mut rows = stmt.query([game_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_grid(row)?);
            }
            Ok(results)
        })
    }

    /// One archived grid with its final state, scoped to its game.
    pub fn get_archive(&self, game_id: &GameId, id: &GridId) -> Result<GridArchive, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, game_id, index_number, layout, created_at, completed_at,
                        final_cells, final_scores
                 FROM grids WHERE id = ?1 AND game_id = ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![id.as_str(), game_id.as_str()])?;
            match rows.next()? {
                Some(row) => {
                    let grid = row_to_grid(row)?;
                    let final_cells = row_helpers::get_opt::<String>(row, 6, "grids", "final_cells")?
                        .map(|raw| row_helpers::parse_json(&raw, "grids", "final_cells"))
                        .transpose()?;
                    let final_scores =
                        row_helpers::get_opt::<String>(row, 7, "grids", "final_scores")?
                            .map(|raw| row_helpers::parse_json(&raw, "grids", "final_scores"))
                            .transpose()?;
                    Ok(GridArchive { grid, final_cells, final_scores })
                }
                None => Err(StoreError::NotFound(format!("grid {id}"))),
            }
        })
    }
}

fn row_to_grid(row: &rusqlite::Row<'_>) -> Result<GridRow, StoreError> {
    let layout_raw: String = row_helpers::get(row, 3, "grids", "layout")?;
    Ok(GridRow {
        id: GridId::from_raw(row_helpers::get::<String>(row, 0, "grids", "id")?),
        game_id: GameId::from_raw(row_helpers::get::<String>(row, 1, "grids", "game_id")?),
        index_number: row_helpers::get(row, 2, "grids", "index_number")?,
        layout: row_helpers::parse_json(&layout_raw, "grids", "layout")?,
        created_at: row_helpers::get(row, 4, "grids", "created_at")?,
        completed_at: row_helpers::get_opt(row, 5, "grids", "completed_at")?,
    })
}
