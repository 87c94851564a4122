//! Grid data model: cells, entries, finished layouts.
//!
//! A finished grid is a `size × size` matrix of tagged cells. Letter cells
//! carry the typed set of entries passing through them; clue cells carry up
//! to two clue slots (one per direction). Canonical answers never appear in
//! the layout; they live in the server-only entries map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::EntryId;

/// Direction of an entry or a player cursor.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Right,
    Down,
}

impl Direction {
    /// The cell `steps` positions along this direction from `(row, col)`.
    pub fn offset(self, row: usize, col: usize, steps: usize) -> (usize, usize) {
        match self {
            Direction::Right => (row, col + steps),
            Direction::Down => (row + steps, col),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Right => f.write_str("right"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// One clue occupying a slot of a clue cell. A clue cell holds at most one
/// slot per direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClueSlot {
    pub direction: Direction,
    pub text: String,
    pub text_full: String,
    pub entry_id: EntryId,
}

/// Cell payload, decided once at generation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum CellKind {
    /// Unused filler cell.
    Black,
    /// Writable letter cell belonging to one or two entries.
    Letter { entry_ids: Vec<EntryId> },
    /// Definition cell pointing at the entries starting next to it.
    Clue { slots: Vec<ClueSlot> },
}

/// A positioned cell in the finished layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellSpec {
    pub row: usize,
    pub col: usize,
    #[serde(flatten)]
    pub kind: CellKind,
}

/// One placed word: canonical answer, direction, ordered cell positions.
/// Server-only; never serialized into client payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub answer: String,
    pub direction: Direction,
    pub cells: Vec<(usize, usize)>,
}

/// Client-safe finished grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<CellSpec>,
}

impl GridLayout {
    pub fn cell(&self, row: usize, col: usize) -> Option<&CellSpec> {
        self.cells.iter().find(|c| c.row == row && c.col == col)
    }

    /// Entry ids passing through a letter cell (empty for other cell kinds).
    pub fn entry_ids_at(&self, row: usize, col: usize) -> &[EntryId] {
        match self.cell(row, col).map(|c| &c.kind) {
            Some(CellKind::Letter { entry_ids }) => entry_ids,
            _ => &[],
        }
    }
}

/// Placement statistics for a generated grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenMetrics {
    pub word_count: usize,
    pub letter_count: usize,
    pub black_count: usize,
    pub clue_count: usize,
}

/// Map of entries by id, as stored in the server-only grid column.
pub type EntryMap = BTreeMap<EntryId, Entry>;

/// Key for the writable-cell value map, `"row-col"`.
pub fn cell_key(row: usize, col: usize) -> String {
    format!("{row}-{col}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_offset() {
        assert_eq!(Direction::Right.offset(2, 3, 4), (2, 7));
        assert_eq!(Direction::Down.offset(2, 3, 4), (6, 3));
    }

    #[test]
    fn direction_wire_form() {
        assert_eq!(serde_json::to_string(&Direction::Right).unwrap(), "\"right\"");
        assert_eq!(serde_json::to_string(&Direction::Down).unwrap(), "\"down\"");
    }

    #[test]
    fn cell_spec_serializes_flat() {
        let cell = CellSpec {
            row: 1,
            col: 2,
            kind: CellKind::Letter {
                entry_ids: vec![EntryId::new(1, Direction::Right)],
            },
        };
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json["row"], 1);
        assert_eq!(json["type"], "letter");
        assert_eq!(json["entryIds"][0], "1-right");
    }

    #[test]
    fn clue_cell_serializes_slots() {
        let cell = CellSpec {
            row: 0,
            col: 0,
            kind: CellKind::Clue {
                slots: vec![ClueSlot {
                    direction: Direction::Down,
                    text: "Planète rouge".into(),
                    text_full: "Quatrième planète du système solaire".into(),
                    entry_id: EntryId::new(2, Direction::Down),
                }],
            },
        };
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json["type"], "clue");
        assert_eq!(json["slots"][0]["direction"], "down");
        assert_eq!(json["slots"][0]["entryId"], "2-down");
        // No answer anywhere in the client payload.
        assert!(json.get("answer").is_none());
    }

    #[test]
    fn layout_entry_ids_at() {
        let id = EntryId::new(1, Direction::Right);
        let layout = GridLayout {
            rows: 2,
            cols: 2,
            cells: vec![
                CellSpec { row: 0, col: 0, kind: CellKind::Black },
                CellSpec {
                    row: 0,
                    col: 1,
                    kind: CellKind::Letter { entry_ids: vec![id.clone()] },
                },
            ],
        };
        assert_eq!(layout.entry_ids_at(0, 1), &[id]);
        assert!(layout.entry_ids_at(0, 0).is_empty());
        assert!(layout.entry_ids_at(1, 1).is_empty());
    }

    #[test]
    fn cell_key_format() {
        assert_eq!(cell_key(4, 11), "4-11");
    }
}
