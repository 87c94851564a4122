use chrono::Utc;
use tracing::instrument;

use fleche_core::events::ClaimInfo;
use fleche_core::ids::{EntryId, GridId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Entry claims. The `(grid_id, entry_id)` primary key plus `INSERT OR
/// IGNORE` is the atomic check-and-set the scoring path relies on: under
/// concurrent completing edits, exactly one writer observes `changes() == 1`.
pub struct ClaimRepo {
    db: Database,
}

impl ClaimRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Attempt to claim an entry. Returns true iff this call inserted the
    /// claim; a lost race returns false without error.
    #[instrument(skip(self), fields(grid_id = %grid_id, entry_id = %entry_id, pseudo))]
    pub fn try_claim(
        &self,
        grid_id: &GridId,
        entry_id: &EntryId,
        pseudo: &str,
    ) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO entry_claims (grid_id, entry_id, claimed_by_pseudo, claimed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![grid_id.as_str(), entry_id.as_str(), pseudo, now],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn is_claimed(&self, grid_id: &GridId, entry_id: &EntryId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entry_claims WHERE grid_id = ?1 AND entry_id = ?2",
                rusqlite::params![grid_id.as_str(), entry_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn list(&self, grid_id: &GridId) -> Result<Vec<ClaimInfo>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT entry_id, claimed_by_pseudo, claimed_at
                 FROM entry_claims WHERE grid_id = ?1 ORDER BY claimed_at",
            )?;
            let mut rows = stmt.query([grid_id.as_str()])?;
            let mut claims = Vec::new();
            while let Some(row) = rows.next()? {
                claims.push(ClaimInfo {
                    entry_id: EntryId::from_raw(row_helpers::get::<String>(
                        row,
                        0,
                        "entry_claims",
                        "entry_id",
                    )?),
                    claimed_by: row_helpers::get(row, 1, "entry_claims", "claimed_by_pseudo")?,
                    claimed_at: row_helpers::get(row, 2, "entry_claims", "claimed_at")?,
                });
            }
            Ok(claims)
        })
    }

    pub fn count(&self, grid_id: &GridId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entry_claims WHERE grid_id = ?1",
                [grid_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleche_core::grid::Direction;

    fn repo() -> ClaimRepo {
        ClaimRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn first_claim_wins() {
        let repo = repo();
        let grid_id = GridId::new();
        let entry_id = EntryId::new(1, Direction::Right);

        assert!(repo.try_claim(&grid_id, &entry_id, "zoe").unwrap());
        assert!(!repo.try_claim(&grid_id, &entry_id, "ana").unwrap());

        let claims = repo.list(&grid_id).unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].claimed_by, "zoe");
    }

    #[test]
    fn is_claimed_tracks_state() {
        let repo = repo();
        let grid_id = GridId::new();
        let entry_id = EntryId::new(1, Direction::Down);

        assert!(!repo.is_claimed(&grid_id, &entry_id).unwrap());
        repo.try_claim(&grid_id, &entry_id, "zoe").unwrap();
        assert!(repo.is_claimed(&grid_id, &entry_id).unwrap());
    }

    #[test]
    fn count_is_per_grid() {
        let repo = repo();
        let g1 = GridId::new();
        let g2 = GridId::new();

        repo.try_claim(&g1, &EntryId::new(1, Direction::Right), "zoe").unwrap();
        repo.try_claim(&g1, &EntryId::new(2, Direction::Down), "ana").unwrap();
        repo.try_claim(&g2, &EntryId::new(1, Direction::Right), "zoe").unwrap();

        assert_eq!(repo.count(&g1).unwrap(), 2);
        assert_eq!(repo.count(&g2).unwrap(), 1);
    }

    #[test]
    fn same_entry_id_in_two_grids_is_independent() {
        let repo = repo();
        let g1 = GridId::new();
        let g2 = GridId::new();
        let entry_id = EntryId::new(1, Direction::Right);

        assert!(repo.try_claim(&g1, &entry_id, "zoe").unwrap());
        assert!(repo.try_claim(&g2, &entry_id, "ana").unwrap());
    }
}
