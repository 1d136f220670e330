//! Persistence layer
//!
//! Two kinds of key-value store back the core:
//! - a durable SQLite store shared by every instance that opens the same
//!   file (the cross-tab substrate for credentials and call records)
//! - a volatile in-memory store that dies with the process (session data)
//!
//! Plus an in-process broadcast hub used for best-effort change hints.

mod broadcast;
mod database;
mod memory;

pub use broadcast::{BroadcastChannel, BroadcastHub, CallNotice, NoticeReceiver};
pub use database::SqliteStore;
pub use memory::MemoryStore;

/// Errors raised by a [`KeyValueStore`]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal string key-value store
///
/// Operations are short and bounded; there is no locking across
/// read-modify-write sequences, by contract.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Get current Unix timestamp in milliseconds
#[inline]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
