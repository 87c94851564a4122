pub mod events;
pub mod grid;
pub mod ids;
pub mod validation;

pub use grid::{CellKind, CellSpec, ClueSlot, Direction, Entry, GenMetrics, GridLayout};
pub use ids::{EntryId, GameId, GridId, MessageId};
