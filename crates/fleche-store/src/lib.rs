pub mod cells;
pub mod claims;
pub mod database;
pub mod error;
pub mod games;
pub mod grids;
pub mod messages;
pub mod players;
pub mod row_helpers;
pub mod schema;
pub mod words;

pub use database::Database;
pub use error::StoreError;
