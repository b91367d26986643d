//! Storage bindings of the repository contract.

pub mod sqlite;

pub use sqlite::{SqliteConnection, SqliteRepository};
