//! Photo metadata persistence.
//!
//! A two-context store: callers read and stage writes against an in-memory
//! foreground view, and a single background writer commits staged change
//! sets to SQLite in the order they were saved. Records are deduplicated by
//! their upstream id.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{PhotoRepository, SaveReceipt, SqlitePhotoRepository};
pub use error::StateError;
pub use types::{PhotoFilter, PhotoRecord, SortField, SortKey};
