//! Procedural arrowword generation.
//!
//! Words are placed iteratively into a square grid. Every word gets a clue
//! cell immediately before its first letter (left of it for rightward words,
//! above it for downward words); words cross at shared letters. Placement is
//! driven by a scored position search and an explicitly seeded RNG, so a
//! fixed `(size, seed, word cache)` triple always yields the same grid.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument};

use fleche_core::grid::{
    CellKind, CellSpec, ClueSlot, Direction, Entry, EntryMap, GenMetrics, GridLayout,
};
use fleche_core::ids::EntryId;

use crate::error::GameError;
use crate::wordbank::{WordBank, WordCandidate};

/// Word lengths tried in rotation, favoring 3–8 letters.
const LENGTH_ROTATION: [usize; 9] = [4, 5, 6, 5, 4, 7, 3, 6, 8];
/// Placement attempts per generation pass.
const MAX_ATTEMPTS: usize = 500;
/// Scored positions evaluated per attempt.
const TOP_POSITIONS: usize = 40;
/// Probability of skipping a non-crossing position once the grid has seeds.
const SKIP_FLOATING_PROB: f64 = 0.85;
/// Non-crossing placements are skipped once more words than this are placed.
const FLOATING_GRACE: usize = 3;
/// Generation passes per `generate` call, at seeds base, base+1000, …
const MAX_RETRIES: u64 = 10;

/// A finished generation result.
#[derive(Clone, Debug)]
pub struct GeneratedGrid {
    pub layout: GridLayout,
    pub entries: EntryMap,
    pub metrics: GenMetrics,
}

/// Cell state while the grid is under construction.
#[derive(Clone, Debug)]
enum BuildCell {
    Empty,
    Letter { letter: u8, entry_ids: Vec<EntryId> },
    Clue { slots: Vec<ClueSlot> },
}

#[derive(Clone, Copy, Debug)]
struct Position {
    row: usize,
    col: usize,
    direction: Direction,
}

struct ScoredPosition {
    pos: Position,
    score: f64,
    constraints: Vec<Option<u8>>,
    has_crossing: bool,
}

/// Grid under construction.
struct BuildGrid {
    size: usize,
    cells: Vec<BuildCell>,
    words: Vec<Entry>,
    entry_counter: u32,
}

impl BuildGrid {
    fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![BuildCell::Empty; size * size],
            words: Vec::new(),
            entry_counter: 0,
        }
    }

    fn cell(&self, row: usize, col: usize) -> &BuildCell {
        &self.cells[row * self.size + col]
    }

    fn cell_mut(&mut self, row: usize, col: usize) -> &mut BuildCell {
        &mut self.cells[row * self.size + col]
    }

    /// The clue cell sits one step before the word, against its direction.
    /// Positions are enumerated so this never underflows.
    fn clue_position(row: usize, col: usize, direction: Direction) -> (usize, usize) {
        match direction {
            Direction::Right => (row, col - 1),
            Direction::Down => (row - 1, col),
        }
    }

    /// All starts where a word of `length` fits with room for its clue cell.
    fn positions(&self, length: usize) -> Vec<Position> {
        let mut positions = Vec::new();
        if length + 1 > self.size {
            return positions;
        }
        for row in 0..self.size {
            for col in 1..=(self.size - length) {
                positions.push(Position { row, col, direction: Direction::Right });
            }
        }
        for row in 1..=(self.size - length) {
            for col in 0..self.size {
                positions.push(Position { row, col, direction: Direction::Down });
            }
        }
        positions
    }

    /// Fixed letters along a candidate span, plus whether it crosses
    /// an already-placed word.
    fn constraints(&self, pos: Position, length: usize) -> (Vec<Option<u8>>, bool) {
        let mut constraints = Vec::with_capacity(length);
        let mut has_crossing = false;
        for i in 0..length {
            let (r, c) = pos.direction.offset(pos.row, pos.col, i);
            match self.cell(r, c) {
                BuildCell::Letter { letter, .. } => {
                    constraints.push(Some(*letter));
                    has_crossing = true;
                }
                _ => constraints.push(None),
            }
        }
        (constraints, has_crossing)
    }

    /// A word fits if every spanned cell is empty or already holds the same
    /// letter, the clue cell is not a letter, and the clue cell has no slot
    /// in the word's direction yet (two stacked clues are fine, one per
    /// orientation).
    fn can_place(&self, word: &[u8], pos: Position) -> bool {
        for (i, &letter) in word.iter().enumerate() {
            let (r, c) = pos.direction.offset(pos.row, pos.col, i);
            match self.cell(r, c) {
                BuildCell::Empty => {}
                BuildCell::Letter { letter: existing, .. } if *existing == letter => {}
                _ => return false,
            }
        }

        let (clue_r, clue_c) = Self::clue_position(pos.row, pos.col, pos.direction);
        match self.cell(clue_r, clue_c) {
            BuildCell::Empty => true,
            BuildCell::Letter { .. } => false,
            BuildCell::Clue { slots } => slots.iter().all(|s| s.direction != pos.direction),
        }
    }

    /// Write a word into the grid: clue slot, letters, entry record.
    fn place(&mut self, candidate: &WordCandidate, pos: Position) -> bool {
        let word = candidate.normalized.as_bytes();
        if !self.can_place(word, pos) {
            return false;
        }

        self.entry_counter += 1;
        let entry_id = EntryId::new(self.entry_counter, pos.direction);

        let (clue_r, clue_c) = Self::clue_position(pos.row, pos.col, pos.direction);
        let slot = ClueSlot {
            direction: pos.direction,
            text: candidate.clue.clone(),
            text_full: candidate.clue_full.clone(),
            entry_id: entry_id.clone(),
        };
        match self.cell_mut(clue_r, clue_c) {
            cell @ BuildCell::Empty => *cell = BuildCell::Clue { slots: vec![slot] },
            BuildCell::Clue { slots } => slots.push(slot),
            BuildCell::Letter { .. } => unreachable!("checked by can_place"),
        }

        let mut cells = Vec::with_capacity(word.len());
        for (i, &letter) in word.iter().enumerate() {
            let (r, c) = pos.direction.offset(pos.row, pos.col, i);
            match self.cell_mut(r, c) {
                cell @ BuildCell::Empty => {
                    *cell = BuildCell::Letter { letter, entry_ids: vec![entry_id.clone()] };
                }
                BuildCell::Letter { entry_ids, .. } => {
                    if !entry_ids.contains(&entry_id) {
                        entry_ids.push(entry_id.clone());
                    }
                }
                BuildCell::Clue { .. } => unreachable!("checked by can_place"),
            }
            cells.push((r, c));
        }

        self.words.push(Entry {
            id: entry_id,
            answer: candidate.normalized.clone(),
            direction: pos.direction,
            cells,
        });
        true
    }

    /// Freeze into the final layout. Remaining empty cells become black.
    fn finalize(self) -> GeneratedGrid {
        let mut cells = Vec::with_capacity(self.size * self.size);
        let mut metrics = GenMetrics { word_count: self.words.len(), ..GenMetrics::default() };

        for row in 0..self.size {
            for col in 0..self.size {
                let kind = match self.cell(row, col) {
                    BuildCell::Empty => {
                        metrics.black_count += 1;
                        CellKind::Black
                    }
                    BuildCell::Letter { entry_ids, .. } => {
                        metrics.letter_count += 1;
                        CellKind::Letter { entry_ids: entry_ids.clone() }
                    }
                    BuildCell::Clue { slots } => {
                        metrics.clue_count += 1;
                        CellKind::Clue { slots: slots.clone() }
                    }
                };
                cells.push(CellSpec { row, col, kind });
            }
        }

        let entries: EntryMap = self.words.into_iter().map(|e| (e.id.clone(), e)).collect();
        GeneratedGrid {
            layout: GridLayout { rows: self.size, cols: self.size, cells },
            entries,
            metrics,
        }
    }
}

/// Grid generator over an injected word bank.
pub struct GridBuilder {
    bank: Arc<WordBank>,
}

impl GridBuilder {
    pub fn new(bank: Arc<WordBank>) -> Self {
        Self { bank }
    }

    /// Generate with retries: passes run at seeds `base, base+1000, …`; the
    /// best pass (most words) is kept, and a pass reaching the minimum word
    /// count is accepted immediately. Zero placed words after all retries is
    /// a hard generation error.
    #[instrument(skip(self), fields(size, base_seed))]
    pub fn generate(&self, size: usize, base_seed: u64) -> Result<GeneratedGrid, GameError> {
        self.bank.ensure_loaded()?;

        let min_words = if size >= 12 { 8 } else { 6 };
        let mut best: Option<GeneratedGrid> = None;

        for i in 0..MAX_RETRIES {
            let result = self.generate_once(size, base_seed + i * 1000);
            if result.metrics.word_count >= min_words {
                info!(words = result.metrics.word_count, pass = i, "grid accepted");
                return Ok(result);
            }
            if best.as_ref().is_none_or(|b| result.metrics.word_count > b.metrics.word_count) {
                best = Some(result);
            }
        }

        match best {
            Some(grid) if grid.metrics.word_count > 0 => {
                info!(words = grid.metrics.word_count, "keeping best under-target grid");
                Ok(grid)
            }
            _ => Err(GameError::Generation(format!(
                "no words placed on a {size}x{size} grid after {MAX_RETRIES} passes"
            ))),
        }
    }

    /// One generation pass at a fixed seed.
    fn generate_once(&self, size: usize, seed: u64) -> GeneratedGrid {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut grid = BuildGrid::new(size);
        let mut used: HashSet<String> = HashSet::new();

        let target_words = (size as f64 * 2.5).floor() as usize;
        let mut attempts = 0usize;

        while grid.words.len() < target_words && attempts < MAX_ATTEMPTS {
            attempts += 1;

            // Alternate the favored direction to balance the two axes.
            let preferred = if attempts % 2 == 0 { Direction::Right } else { Direction::Down };
            let length = LENGTH_ROTATION[attempts % LENGTH_ROTATION.len()];

            let mut scored: Vec<ScoredPosition> = grid
                .positions(length)
                .into_iter()
                .map(|pos| {
                    let (constraints, has_crossing) = grid.constraints(pos, length);
                    let mut score = 0.0;
                    if has_crossing {
                        score += 100.0;
                    }
                    if pos.direction == preferred {
                        score += 20.0;
                    }
                    // Center bias: early words cluster, later ones spread.
                    let center = size as f64 / 2.0;
                    let center_dist =
                        (pos.row as f64 - center).abs() + (pos.col as f64 - center).abs();
                    score += (size as f64 - center_dist) * 2.0;
                    score += rng.gen::<f64>() * 30.0;

                    ScoredPosition { pos, score, constraints, has_crossing }
                })
                .collect();

            scored.sort_by(|a, b| b.score.total_cmp(&a.score));

            for candidate_pos in scored.iter().take(TOP_POSITIONS) {
                // Once the grid is seeded, floating words are mostly skipped
                // so later words interlock instead of drifting apart.
                if grid.words.len() > FLOATING_GRACE
                    && !candidate_pos.has_crossing
                    && rng.gen::<f64>() < SKIP_FLOATING_PROB
                {
                    continue;
                }

                let Some(word) =
                    self.bank
                        .find_candidate(length, &candidate_pos.constraints, &used, &mut rng)
                else {
                    continue;
                };

                if grid.place(&word, candidate_pos.pos) {
                    used.insert(word.normalized);
                    break;
                }
            }
        }

        debug!(words = grid.words.len(), attempts, seed, "generation pass done");
        grid.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wordbank::test_support::demo_bank;
    use fleche_core::grid::cell_key;
    use std::collections::HashMap;

    fn builder() -> GridBuilder {
        GridBuilder::new(Arc::new(demo_bank()))
    }

    fn cells_by_pos(layout: &GridLayout) -> HashMap<String, &CellKind> {
        layout.cells.iter().map(|c| (cell_key(c.row, c.col), &c.kind)).collect()
    }

    #[test]
    fn generates_a_playable_grid() {
        let grid = builder().generate(10, 42).unwrap();
        assert!(grid.metrics.word_count >= 6);
        assert_eq!(grid.layout.cells.len(), 100);
        assert_eq!(grid.metrics.word_count, grid.entries.len());
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let builder = builder();
        let a = builder.generate(10, 42).unwrap();
        let b = builder.generate(10, 42).unwrap();
        assert_eq!(a.layout, b.layout);
        assert_eq!(a.entries, b.entries);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn every_letter_cell_belongs_to_an_entry() {
        let grid = builder().generate(10, 42).unwrap();
        for cell in &grid.layout.cells {
            if let CellKind::Letter { entry_ids } = &cell.kind {
                assert!(!entry_ids.is_empty(), "orphan letter at ({},{})", cell.row, cell.col);
                for id in entry_ids {
                    let entry = grid.entries.get(id).expect("entry exists");
                    assert!(entry.cells.contains(&(cell.row, cell.col)));
                }
            }
        }
    }

    #[test]
    fn every_entry_has_a_clue_cell_before_it() {
        let grid = builder().generate(10, 42).unwrap();
        let cells = cells_by_pos(&grid.layout);

        for entry in grid.entries.values() {
            let (first_r, first_c) = entry.cells[0];
            let (clue_r, clue_c) = match entry.direction {
                Direction::Right => (first_r, first_c - 1),
                Direction::Down => (first_r - 1, first_c),
            };
            match cells.get(&cell_key(clue_r, clue_c)) {
                Some(CellKind::Clue { slots }) => {
                    let slot = slots
                        .iter()
                        .find(|s| s.entry_id == entry.id)
                        .expect("clue slot for entry");
                    assert_eq!(slot.direction, entry.direction);
                    assert!(!slot.text.is_empty());
                }
                other => panic!("expected clue before {}, got {other:?}", entry.id),
            }
        }
    }

    #[test]
    fn crossing_letters_agree() {
        let grid = builder().generate(10, 42).unwrap();
        // Project every entry's answer onto the grid; a shared cell must
        // receive the same letter from both directions.
        let mut letters: HashMap<(usize, usize), u8> = HashMap::new();
        for entry in grid.entries.values() {
            for (i, &pos) in entry.cells.iter().enumerate() {
                let letter = entry.answer.as_bytes()[i];
                if let Some(&existing) = letters.get(&pos) {
                    assert_eq!(existing, letter, "conflict at {pos:?}");
                }
                letters.insert(pos, letter);
            }
        }
    }

    #[test]
    fn clue_cells_have_at_most_one_slot_per_direction() {
        let grid = builder().generate(10, 42).unwrap();
        for cell in &grid.layout.cells {
            if let CellKind::Clue { slots } = &cell.kind {
                assert!(!slots.is_empty());
                assert!(slots.len() <= 2);
                if slots.len() == 2 {
                    assert_ne!(slots[0].direction, slots[1].direction);
                }
            }
        }
    }

    #[test]
    fn entry_ids_are_unique_and_deterministic() {
        let grid = builder().generate(10, 42).unwrap();
        let ids: HashSet<&EntryId> = grid.entries.keys().collect();
        assert_eq!(ids.len(), grid.entries.len());
        for entry in grid.entries.values() {
            let suffix = format!("-{}", entry.direction);
            assert!(entry.id.as_str().ends_with(&suffix), "id {} direction mismatch", entry.id);
        }
    }

    #[test]
    fn word_count_within_target() {
        let grid = builder().generate(10, 42).unwrap();
        assert!(grid.metrics.word_count <= 25, "target is 2.5 x size");
    }

    #[test]
    fn empty_bank_is_a_generation_error() {
        use crate::wordbank::test_support::FixedSource;
        use crate::wordbank::WordBank;

        let bank = WordBank::new(Box::new(FixedSource::new(Vec::new())));
        let builder = GridBuilder::new(Arc::new(bank));
        let result = builder.generate(10, 42);
        assert!(matches!(result, Err(GameError::Generation(_))));
    }

    #[test]
    fn metrics_cover_the_whole_grid() {
        let grid = builder().generate(8, 7).unwrap();
        let m = grid.metrics;
        assert_eq!(m.letter_count + m.black_count + m.clue_count, 64);
        assert!(m.letter_count > 0);
        assert!(m.clue_count > 0);
    }
}
