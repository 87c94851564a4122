//! Claim resolution keyed off single-cell edits.
//!
//! The UI has no explicit "submit word" action: any edit implicitly checks
//! the 0, 1 or 2 entries passing through the edited cell. An entry can
//! therefore be re-evaluated many times as its letters arrive; only the edit
//! that completes it with the right word claims it, and only once.

use serde::Serialize;
use tracing::{debug, info, instrument};

use fleche_core::events::{CellPos, MessageKind, ScoreEntry};
use fleche_core::grid::{cell_key, CellKind, Entry, GridLayout};
use fleche_core::ids::{EntryId, GameId};
use fleche_store::messages::MessageRepo;
use fleche_store::players::PlayerRepo;
use fleche_store::Database;

use crate::error::GameError;
use crate::session::SessionStore;

/// One cell edit, already validated upstream.
#[derive(Clone, Debug)]
pub struct CellEdit {
    pub row: usize,
    pub col: usize,
    /// Empty to erase, otherwise a single uppercase letter.
    pub value: String,
    pub author: String,
    pub author_color: String,
}

/// Outcome for one affected entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum EntryOutcome {
    Claimed {
        entry_id: EntryId,
        word: String,
        pseudo: String,
        color: String,
        cells: Vec<CellPos>,
    },
    Incorrect {
        entry_id: EntryId,
        word: String,
        cells: Vec<CellPos>,
    },
}

/// Everything a single edit produced.
#[derive(Clone, Debug, Default)]
pub struct EditResult {
    /// False when the edit was rejected (non-letter cell, or fully locked).
    pub applied: bool,
    pub entries: Vec<EntryOutcome>,
    /// Present when this edit completed the grid; carries the final
    /// scoreboard, score-descending.
    pub completed: Option<Vec<ScoreEntry>>,
}

pub struct ClaimResolver {
    db: Database,
    messages: MessageRepo,
    players: PlayerRepo,
}

impl ClaimResolver {
    pub fn new(db: Database) -> Self {
        Self {
            messages: MessageRepo::new(db.clone()),
            players: PlayerRepo::new(db.clone()),
            db,
        }
    }

    /// Apply a cell edit and resolve any entries it completes.
    #[instrument(skip(self, session, layout, edit), fields(game_id = %game_id, row = edit.row, col = edit.col))]
    pub fn process_edit(
        &self,
        game_id: &GameId,
        session: &SessionStore,
        layout: &GridLayout,
        edit: &CellEdit,
    ) -> Result<EditResult, GameError> {
        let mut result = EditResult::default();

        let Some(cell) = layout.cell(edit.row, edit.col) else {
            return Ok(result);
        };
        let CellKind::Letter { entry_ids } = &cell.kind else {
            debug!("edit targets a non-letter cell, ignored");
            return Ok(result);
        };

        let entries = session.entries()?;

        // Lock policy: the cell stays editable while any entry through it is
        // still open; once all are claimed the edit is silently dropped.
        let mut all_claimed = true;
        for id in entry_ids {
            if !session.is_claimed(id)? {
                all_claimed = false;
                break;
            }
        }
        if !entry_ids.is_empty() && all_claimed {
            debug!("cell fully locked by claims, edit ignored");
            return Ok(result);
        }

        session.write_cell(edit.row, edit.col, &edit.value, &edit.author)?;
        result.applied = true;

        // Overlay the just-written value over the store read so a racing
        // read cannot hand us a stale copy of our own cell.
        let mut cells = session.cells()?;
        let key = cell_key(edit.row, edit.col);
        if edit.value.is_empty() {
            cells.remove(&key);
        } else {
            cells.insert(key, edit.value.clone());
        }

        let mut any_claimed = false;
        for entry_id in entry_ids {
            let Some(entry) = entries.get(entry_id) else {
                continue;
            };
            if session.is_claimed(entry_id)? {
                continue;
            }

            let Some(word) = reconstruct(entry, &cells) else {
                continue; // still incomplete, stays unclaimed
            };

            let entry_cells: Vec<CellPos> =
                entry.cells.iter().map(|&(row, col)| CellPos { row, col }).collect();

            self.messages
                .add(
                    game_id,
                    MessageKind::LogAttempt,
                    Some(&edit.author),
                    Some(&edit.author_color),
                    &format!("{} tente {}", edit.author, word),
                    Some(serde_json::json!({ "entryId": entry_id, "word": word })),
                )
                .ok();

            if word.eq_ignore_ascii_case(&entry.answer) {
                // First completing writer wins; a lost race is a normal no-op.
                if session.record_claim(entry_id, &edit.author)? {
                    self.players.increment_score(game_id, &edit.author)?;
                    self.messages
                        .add(
                            game_id,
                            MessageKind::LogSuccess,
                            Some(&edit.author),
                            Some(&edit.author_color),
                            &format!("{} a trouvé {} !", edit.author, word),
                            Some(serde_json::json!({ "entryId": entry_id, "word": word })),
                        )
                        .ok();
                    info!(entry_id = %entry_id, word, pseudo = %edit.author, "entry claimed");
                    any_claimed = true;
                    result.entries.push(EntryOutcome::Claimed {
                        entry_id: entry_id.clone(),
                        word,
                        pseudo: edit.author.clone(),
                        color: edit.author_color.clone(),
                        cells: entry_cells,
                    });
                }
            } else {
                self.messages
                    .add(
                        game_id,
                        MessageKind::LogFail,
                        Some(&edit.author),
                        Some(&edit.author_color),
                        &format!("{} {} incorrect", edit.author, word),
                        Some(serde_json::json!({ "entryId": entry_id, "word": word })),
                    )
                    .ok();
                result.entries.push(EntryOutcome::Incorrect {
                    entry_id: entry_id.clone(),
                    word,
                    cells: entry_cells,
                });
            }
        }

        // Completion check gated on the one-shot marker so two racing final
        // claims produce exactly one completion.
        if any_claimed && session.is_complete()? && session.try_mark_completed()? {
            let scores = self.scoreboard(game_id)?;
            session.archive_final_state(&scores)?;
            info!(game_id = %game_id, "grid completed");
            result.completed = Some(scores);
        }

        Ok(result)
    }

    /// Current scoreboard, score-descending.
    pub fn scoreboard(&self, game_id: &GameId) -> Result<Vec<ScoreEntry>, GameError> {
        let players = PlayerRepo::new(self.db.clone()).list_by_score(game_id)?;
        Ok(players
            .into_iter()
            .map(|p| ScoreEntry { pseudo: p.pseudo, color: p.color, score: p.score_total })
            .collect())
    }
}

/// Rebuild the word currently sitting in an entry's cells, or None while any
/// cell is still empty.
fn reconstruct(entry: &Entry, cells: &std::collections::HashMap<String, String>) -> Option<String> {
    let mut word = String::with_capacity(entry.cells.len());
    for &(row, col) in &entry.cells {
        let letter = cells.get(&cell_key(row, col))?;
        if letter.is_empty() {
            return None;
        }
        word.push_str(&letter.to_ascii_uppercase());
    }
    Some(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleche_core::grid::{CellSpec, Direction, EntryMap};
    use fleche_store::games::GameRepo;
    use fleche_store::grids::GridRepo;

    /// 1x5 strip: clue at (0,0), MARS across (0,1)-(0,4).
    fn mars_grid(db: &Database) -> (GameId, SessionStore, GridLayout) {
        let game = GameRepo::new(db.clone()).create("AB12", "zoe", "general", "easy").unwrap();
        let id = EntryId::new(1, Direction::Right);

        let mut cells = vec![CellSpec {
            row: 0,
            col: 0,
            kind: CellKind::Clue {
                slots: vec![fleche_core::grid::ClueSlot {
                    direction: Direction::Right,
                    text: "Planète rouge".into(),
                    text_full: "Planète rouge".into(),
                    entry_id: id.clone(),
                }],
            },
        }];
        for col in 1..=4 {
            cells.push(CellSpec {
                row: 0,
                col,
                kind: CellKind::Letter { entry_ids: vec![id.clone()] },
            });
        }
        let layout = GridLayout { rows: 1, cols: 5, cells };

        let mut entries = EntryMap::new();
        entries.insert(
            id.clone(),
            Entry {
                id,
                answer: "MARS".into(),
                direction: Direction::Right,
                cells: vec![(0, 1), (0, 2), (0, 3), (0, 4)],
            },
        );

        let grid = GridRepo::new(db.clone()).insert(&game.id, 1, &layout, &entries).unwrap();
        let session = SessionStore::open(db.clone(), grid.id);
        (game.id, session, layout)
    }

    fn edit(row: usize, col: usize, value: &str, author: &str) -> CellEdit {
        CellEdit {
            row,
            col,
            value: value.into(),
            author: author.into(),
            author_color: "#FF0000".into(),
        }
    }

    fn setup() -> (Database, GameId, SessionStore, GridLayout, ClaimResolver) {
        let db = Database::in_memory().unwrap();
        let (game_id, session, layout) = mars_grid(&db);
        let players = PlayerRepo::new(db.clone());
        players.upsert(&game_id, "zoe", "#FF0000").unwrap();
        players.upsert(&game_id, "ana", "#00FF00").unwrap();
        let resolver = ClaimResolver::new(db.clone());
        (db, game_id, session, layout, resolver)
    }

    #[test]
    fn incomplete_entry_stays_unclaimed() {
        let (_db, game_id, session, layout, resolver) = setup();
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 1, "M", "zoe")).unwrap();
        assert!(result.applied);
        assert!(result.entries.is_empty());
        assert_eq!(session.claimed_count().unwrap(), 0);
    }

    #[test]
    fn completing_correct_word_claims_and_scores() {
        let (db, game_id, session, layout, resolver) = setup();
        for (col, letter) in [(1, "M"), (2, "A"), (3, "R")] {
            resolver.process_edit(&game_id, &session, &layout, &edit(0, col, letter, "zoe")).unwrap();
        }
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 4, "S", "zoe")).unwrap();

        assert_eq!(result.entries.len(), 1);
        match &result.entries[0] {
            EntryOutcome::Claimed { word, pseudo, cells, .. } => {
                assert_eq!(word, "MARS");
                assert_eq!(pseudo, "zoe");
                assert_eq!(cells.len(), 4);
            }
            other => panic!("expected claim, got {other:?}"),
        }

        let players = PlayerRepo::new(db);
        assert_eq!(players.get(&game_id, "zoe").unwrap().score_total, 1);
        assert_eq!(players.get(&game_id, "ana").unwrap().score_total, 0);
    }

    #[test]
    fn completing_wrong_word_is_incorrect_and_leaves_entry_open() {
        let (db, game_id, session, layout, resolver) = setup();
        for (col, letter) in [(1, "M"), (2, "E"), (3, "R")] {
            resolver.process_edit(&game_id, &session, &layout, &edit(0, col, letter, "ana")).unwrap();
        }
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 4, "S", "ana")).unwrap();

        match &result.entries[0] {
            EntryOutcome::Incorrect { word, cells, .. } => {
                assert_eq!(word, "MERS");
                assert_eq!(cells.len(), 4);
            }
            other => panic!("expected incorrect, got {other:?}"),
        }
        assert!(!session.is_claimed(&EntryId::new(1, Direction::Right)).unwrap());
        assert_eq!(PlayerRepo::new(db).get(&game_id, "ana").unwrap().score_total, 0);

        // The entry stays open: a later correct fix claims it.
        resolver.process_edit(&game_id, &session, &layout, &edit(0, 2, "A", "zoe")).unwrap();
        assert!(session.is_claimed(&EntryId::new(1, Direction::Right)).unwrap());
    }

    #[test]
    fn match_is_case_insensitive() {
        let (_db, game_id, session, layout, resolver) = setup();
        // Lowercase input; upstream normalization is uppercase but the
        // comparison itself must not care.
        for (col, letter) in [(1, "m"), (2, "a"), (3, "r")] {
            session.write_cell(0, col, letter, "zoe").unwrap();
        }
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 4, "s", "zoe")).unwrap();
        assert!(matches!(result.entries[0], EntryOutcome::Claimed { .. }));
    }

    #[test]
    fn resubmitting_claimed_entry_changes_nothing() {
        let (db, game_id, session, layout, resolver) = setup();
        for (col, letter) in [(1, "M"), (2, "A"), (3, "R"), (4, "S")] {
            resolver.process_edit(&game_id, &session, &layout, &edit(0, col, letter, "zoe")).unwrap();
        }
        assert_eq!(PlayerRepo::new(db.clone()).get(&game_id, "zoe").unwrap().score_total, 1);

        // Same final letter again, this time from another player. The cell
        // is fully locked, so nothing is applied and no score moves.
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 4, "S", "ana")).unwrap();
        assert!(!result.applied);
        assert!(result.entries.is_empty());
        assert_eq!(session.claimed_count().unwrap(), 1);
        assert_eq!(PlayerRepo::new(db.clone()).get(&game_id, "zoe").unwrap().score_total, 1);
        assert_eq!(PlayerRepo::new(db).get(&game_id, "ana").unwrap().score_total, 0);
    }

    #[test]
    fn local_overlay_beats_stale_read() {
        let (_db, game_id, session, layout, resolver) = setup();
        // Pre-fill all but the last letter directly.
        for (col, letter) in [(1, "M"), (2, "A"), (3, "R")] {
            session.write_cell(0, col, letter, "zoe").unwrap();
        }
        // The claim-eligible read happens inside the same call as the write.
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 4, "S", "zoe")).unwrap();
        assert!(matches!(result.entries[0], EntryOutcome::Claimed { .. }));
    }

    #[test]
    fn grid_completion_emits_sorted_scores_once() {
        let (_db, game_id, session, layout, resolver) = setup();
        // zoe takes the only entry → grid complete.
        for (col, letter) in [(1, "M"), (2, "A"), (3, "R")] {
            resolver.process_edit(&game_id, &session, &layout, &edit(0, col, letter, "zoe")).unwrap();
        }
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 4, "S", "zoe")).unwrap();

        let scores = result.completed.expect("grid completed");
        assert_eq!(scores[0].pseudo, "zoe");
        assert_eq!(scores[0].score, 1);
        assert!(scores.windows(2).all(|w| w[0].score >= w[1].score));

        // The one-shot marker was consumed.
        assert!(!session.try_mark_completed().unwrap());
    }

    #[test]
    fn erase_edit_applies_without_outcomes() {
        let (_db, game_id, session, layout, resolver) = setup();
        resolver.process_edit(&game_id, &session, &layout, &edit(0, 1, "M", "zoe")).unwrap();
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 1, "", "zoe")).unwrap();
        assert!(result.applied);
        assert!(result.entries.is_empty());
        assert!(session.cells().unwrap().get("0-1").is_none());
    }

    #[test]
    fn edit_outside_letter_cells_is_ignored() {
        let (_db, game_id, session, layout, resolver) = setup();
        // (0,0) is the clue cell.
        let result = resolver.process_edit(&game_id, &session, &layout, &edit(0, 0, "X", "zoe")).unwrap();
        assert!(!result.applied);
        assert!(session.cells().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_completing_edits_claim_exactly_once() {
        let db = Database::in_memory().unwrap();
        let (game_id, session, layout) = mars_grid(&db);
        let players = PlayerRepo::new(db.clone());
        players.upsert(&game_id, "zoe", "#FF0000").unwrap();
        players.upsert(&game_id, "ana", "#00FF00").unwrap();

        for (col, letter) in [(1, "M"), (2, "A"), (3, "R")] {
            session.write_cell(0, col, letter, "zoe").unwrap();
        }

        let session = std::sync::Arc::new(session);
        let layout = std::sync::Arc::new(layout);

        let spawn = |author: &'static str, color: &'static str| {
            let db = db.clone();
            let game_id = game_id.clone();
            let session = std::sync::Arc::clone(&session);
            let layout = std::sync::Arc::clone(&layout);
            tokio::task::spawn_blocking(move || {
                let resolver = ClaimResolver::new(db);
                let edit = CellEdit {
                    row: 0,
                    col: 4,
                    value: "S".into(),
                    author: author.into(),
                    author_color: color.into(),
                };
                resolver.process_edit(&game_id, &session, &layout, &edit).unwrap()
            })
        };

        let (a, b) = tokio::join!(spawn("zoe", "#FF0000"), spawn("ana", "#00FF00"));
        let (a, b) = (a.unwrap(), b.unwrap());

        let claims: Vec<_> = a
            .entries
            .iter()
            .chain(b.entries.iter())
            .filter(|o| matches!(o, EntryOutcome::Claimed { .. }))
            .collect();
        assert_eq!(claims.len(), 1, "exactly one claim event");

        let zoe = players.get(&game_id, "zoe").unwrap().score_total;
        let ana = players.get(&game_id, "ana").unwrap().score_total;
        assert_eq!(zoe + ana, 1, "exactly one point awarded");

        let completions = [&a, &b].iter().filter(|r| r.completed.is_some()).count();
        assert_eq!(completions, 1, "exactly one grid_completed");
    }
}
