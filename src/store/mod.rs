//! Stream store boundary.
//!
//! The consumer never coordinates with other consumers directly. Everything
//! cross-process goes through the single-command atomics of the store:
//! consumer-group reads, create-only writes, and per-entry acks.

pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Stream entry field holding the encoded payload.
pub const MESSAGE_KEY: &str = "msg";

/// Stream id selecting entries never delivered to any consumer of the group.
pub const NEW_ENTRIES_ONLY: &str = ">";

/// Arguments for a consumer-group read.
#[derive(Debug, Clone)]
pub struct ReadGroupArgs<'a> {
    pub stream: &'a str,
    pub group: &'a str,
    pub consumer: &'a str,
    pub count: usize,
    pub block: Duration,
}

/// One entry of a stream as returned by a group read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, Vec<u8>>,
}

/// Entries returned for one stream by a group read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBatch {
    pub stream: String,
    pub entries: Vec<StreamEntry>,
}

/// Operations the consumer needs from the underlying store.
#[async_trait]
pub trait StreamStore: Send + Sync + 'static {
    /// Unconditionally write `value` at `key`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Write `value` at `key` only if the key does not exist.
    /// Returns whether this call created the key.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool>;

    /// Read a plain key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Read new entries for a consumer of a group.
    /// `None` means the store had no data before the block elapsed.
    async fn read_group(&self, args: &ReadGroupArgs<'_>) -> Result<Option<Vec<StreamBatch>>>;

    /// Acknowledge an entry, removing it from the group's pending list.
    /// Returns the number of entries acknowledged.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<u64>;

    /// Create the consumer group (and the stream if missing).
    /// An already existing group is not an error.
    async fn create_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Append an entry to the stream, returning its id.
    async fn append(&self, stream: &str, fields: &[(&str, Vec<u8>)]) -> Result<String>;
}
