//! In-memory backends: the cache adapter for the typed scalar contract
//! and a non-persistent record store used both as a backend in its own
//! right and as the lifecycle manager's explicit fallback.

mod kv;
mod records;

pub use kv::MemoryKvStore;
pub use records::MemoryRecordStore;
