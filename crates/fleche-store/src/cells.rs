use std::collections::HashMap;

use chrono::Utc;
use tracing::instrument;

use fleche_core::grid::cell_key;
use fleche_core::ids::GridId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Writable letter-cell state for a grid, keyed `"row-col"`.
pub struct CellRepo {
    db: Database,
}

impl CellRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert one cell value (uppercased; empty string erases visually but
    /// keeps the row, matching a player clearing a letter).
    #[instrument(skip(self), fields(grid_id = %grid_id, row, col))]
    pub fn upsert(
        &self,
        grid_id: &GridId,
        row: usize,
        col: usize,
        value: &str,
        pseudo: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO grid_cells (grid_id, row, col, value, updated_by_pseudo, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(grid_id, row, col)
                 DO UPDATE SET value = excluded.value,
                               updated_by_pseudo = excluded.updated_by_pseudo,
                               updated_at = excluded.updated_at",
                rusqlite::params![
                    grid_id.as_str(),
                    row as i64,
                    col as i64,
                    value.to_ascii_uppercase(),
                    pseudo,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// Full cell map for a grid. Empty values are kept out of the map so a
    /// cleared cell reads as absent.
    pub fn map(&self, grid_id: &GridId) -> Result<HashMap<String, String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT row, col, value FROM grid_cells WHERE grid_id = ?1")?;
            let mut rows = stmt.query([grid_id.as_str()])?;
            let mut map = HashMap::new();
            while let Some(row) = rows.next()? {
                let r: i64 = row_helpers::get(row, 0, "grid_cells", "row")?;
                let c: i64 = row_helpers::get(row, 1, "grid_cells", "col")?;
                let value: String = row_helpers::get(row, 2, "grid_cells", "value")?;
                if !value.is_empty() {
                    map.insert(cell_key(r as usize, c as usize), value);
                }
            }
            Ok(map)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> CellRepo {
        CellRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn upsert_and_read_back() {
        let repo = repo();
        let grid_id = GridId::new();
        repo.upsert(&grid_id, 2, 3, "m", "zoe").unwrap();

        let map = repo.map(&grid_id).unwrap();
        assert_eq!(map.get("2-3").map(String::as_str), Some("M"));
    }

    #[test]
    fn upsert_overwrites() {
        let repo = repo();
        let grid_id = GridId::new();
        repo.upsert(&grid_id, 0, 0, "A", "zoe").unwrap();
        repo.upsert(&grid_id, 0, 0, "B", "ana").unwrap();

        let map = repo.map(&grid_id).unwrap();
        assert_eq!(map.get("0-0").map(String::as_str), Some("B"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn cleared_cell_reads_as_absent() {
        let repo = repo();
        let grid_id = GridId::new();
        repo.upsert(&grid_id, 0, 0, "A", "zoe").unwrap();
        repo.upsert(&grid_id, 0, 0, "", "zoe").unwrap();

        let map = repo.map(&grid_id).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn maps_are_per_grid() {
        let repo = repo();
        let g1 = GridId::new();
        let g2 = GridId::new();
        repo.upsert(&g1, 0, 0, "A", "zoe").unwrap();

        assert_eq!(repo.map(&g1).unwrap().len(), 1);
        assert!(repo.map(&g2).unwrap().is_empty());
    }
}
