//! SQLite-backed record stores: the plain relational adapter and a
//! reactive wrapper that broadcasts change events after every write.

mod relational;
mod watched;

pub use relational::SqliteRecordStore;
pub use watched::{ChangeEvent, ChangeOp, WatchedSqliteStore};
