//! Per-grid authoritative state: writable cells, claims, completion.
//!
//! A `SessionStore` is a cheap facade over the repos for one grid. All claim
//! mutation goes through [`SessionStore::record_claim`]; nothing else writes
//! the claim set, which is what keeps the at-most-one invariant enforceable.

use std::collections::HashMap;

use fleche_core::events::ClaimInfo;
use fleche_core::grid::EntryMap;
use fleche_core::ids::{EntryId, GridId};
use fleche_store::cells::CellRepo;
use fleche_store::claims::ClaimRepo;
use fleche_store::grids::GridRepo;
use fleche_store::{Database, StoreError};

pub struct SessionStore {
    grid_id: GridId,
    cells: CellRepo,
    claims: ClaimRepo,
    grids: GridRepo,
}

impl SessionStore {
    pub fn open(db: Database, grid_id: GridId) -> Self {
        Self {
            grid_id,
            cells: CellRepo::new(db.clone()),
            claims: ClaimRepo::new(db.clone()),
            grids: GridRepo::new(db),
        }
    }

    pub fn grid_id(&self) -> &GridId {
        &self.grid_id
    }

    /// Persist one cell value. The single source of truth for that cell
    /// from this point on.
    pub fn write_cell(&self, row: usize, col: usize, value: &str, author: &str) -> Result<(), StoreError> {
        self.cells.upsert(&self.grid_id, row, col, value, author)
    }

    /// Current writable-cell map, keyed `"row-col"`.
    pub fn cells(&self) -> Result<HashMap<String, String>, StoreError> {
        self.cells.map(&self.grid_id)
    }

    pub fn list_claims(&self) -> Result<Vec<ClaimInfo>, StoreError> {
        self.claims.list(&self.grid_id)
    }

    pub fn is_claimed(&self, entry_id: &EntryId) -> Result<bool, StoreError> {
        self.claims.is_claimed(&self.grid_id, entry_id)
    }

    /// Atomic check-and-set `Unclaimed → Claimed(pseudo)`. True iff this
    /// call won; a lost race is false, never an error.
    pub fn record_claim(&self, entry_id: &EntryId, pseudo: &str) -> Result<bool, StoreError> {
        self.claims.try_claim(&self.grid_id, entry_id, pseudo)
    }

    /// Server-only entry definitions (canonical answers + ordered cells).
    pub fn entries(&self) -> Result<EntryMap, StoreError> {
        self.grids.entries(&self.grid_id)
    }

    pub fn total_entries(&self) -> Result<usize, StoreError> {
        Ok(self.entries()?.len())
    }

    pub fn claimed_count(&self) -> Result<usize, StoreError> {
        self.claims.count(&self.grid_id)
    }

    /// A grid is complete exactly when every entry is claimed and there is
    /// at least one entry.
    pub fn is_complete(&self) -> Result<bool, StoreError> {
        let total = self.total_entries()?;
        Ok(total > 0 && self.claimed_count()? >= total)
    }

    /// One-shot completion marker; true for exactly one caller per grid.
    pub fn try_mark_completed(&self) -> Result<bool, StoreError> {
        self.grids.try_mark_completed(&self.grid_id)
    }

    /// Snapshot the final cell map and scoreboard before rotating away.
    pub fn archive_final_state(
        &self,
        final_scores: &[fleche_core::events::ScoreEntry],
    ) -> Result<(), StoreError> {
        let cells = self.cells()?;
        self.grids.archive_final_state(&self.grid_id, &cells, final_scores)
    }
}
