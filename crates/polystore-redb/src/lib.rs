//! Document stores built on [`redb`](https://docs.rs/redb): a plain
//! document backend and an offline-first variant that keeps revision
//! counters and tombstones for later reconciliation.

mod document;
mod offline;

pub use document::DocumentStore;
pub use offline::OfflineDocumentStore;
