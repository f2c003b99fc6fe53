//! In-process store with Redis consumer-group semantics (for testing).
//!
//! Keys expire lazily against tokio's clock, so paused-time tests observe
//! expiry deterministically. Faults can be injected per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{ReadGroupArgs, StreamBatch, StreamEntry, StreamStore};
use crate::error::{Error, Result};

/// A plain key as last written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub value: String,
    pub ttl: Duration,
    pub written_at: Instant,
}

/// Arguments of a group read, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub count: usize,
    pub block: Duration,
}

/// Operations that can be made to fail or stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Set,
    SetIfAbsent,
    Get,
    ReadGroup,
    Ack,
}

#[derive(Debug, Default)]
struct Group {
    /// Index into the stream's entries of the next never-delivered entry.
    next: usize,
    /// Delivered but unacknowledged ids, with the consumer they went to.
    pending: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: Vec<StreamEntry>,
    groups: HashMap<String, Group>,
    last_ms: u64,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<String, KeyEntry>,
    writes: HashMap<String, usize>,
    streams: HashMap<String, Stream>,
    failing: HashMap<Op, String>,
    stalled: Vec<Op>,
    scripted: VecDeque<Option<Vec<StreamBatch>>>,
    acks: Vec<String>,
    last_read: Option<ReadRequest>,
}

/// In-memory [`StreamStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoned only if a test panicked mid-call.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every call of `op` fail with a store error until cleared.
    pub fn fail(&self, op: Op, reason: &str) {
        self.lock().failing.insert(op, reason.to_string());
    }

    /// Make every call of `op` never complete until cleared.
    pub fn stall(&self, op: Op) {
        self.lock().stalled.push(op);
    }

    /// Remove injected failures and stalls for `op`.
    pub fn clear_faults(&self, op: Op) {
        let mut inner = self.lock();
        inner.failing.remove(&op);
        inner.stalled.retain(|o| *o != op);
    }

    /// Queue a raw reply to be returned by the next group read instead of
    /// consulting the streams.
    pub fn script_read_reply(&self, reply: Option<Vec<StreamBatch>>) {
        self.lock().scripted.push_back(reply);
    }

    /// Current, unexpired entry for `key`.
    pub fn entry(&self, key: &str) -> Option<KeyEntry> {
        let now = Instant::now();
        self.lock()
            .keys
            .get(key)
            .filter(|e| e.written_at + e.ttl > now)
            .cloned()
    }

    /// Number of successful writes to `key`.
    pub fn write_count(&self, key: &str) -> usize {
        self.lock().writes.get(key).copied().unwrap_or(0)
    }

    /// Ids pending in `group` of `stream`, sorted by id.
    pub fn pending(&self, stream: &str, group: &str) -> Vec<String> {
        self.lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every id acknowledged so far, in ack order.
    pub fn acked(&self) -> Vec<String> {
        self.lock().acks.clone()
    }

    /// Arguments of the most recent group read.
    pub fn last_read(&self) -> Option<ReadRequest> {
        self.lock().last_read.clone()
    }

    async fn gate(&self, op: Op) -> Result<()> {
        let (stalled, failing) = {
            let inner = self.lock();
            (inner.stalled.contains(&op), inner.failing.get(&op).cloned())
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        match failing {
            Some(reason) => Err(Error::Store(reason)),
            None => Ok(()),
        }
    }
}

fn write_key(inner: &mut Inner, key: &str, value: String, ttl: Duration) {
    inner.keys.insert(
        key.to_string(),
        KeyEntry {
            value,
            ttl,
            written_at: Instant::now(),
        },
    );
    *inner.writes.entry(key.to_string()).or_default() += 1;
}

fn no_group(stream: &str, group: &str) -> Error {
    Error::Store(format!(
        "NOGROUP no such key '{stream}' or consumer group '{group}'"
    ))
}

#[async_trait]
impl StreamStore for MemoryStore {
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.gate(Op::Set).await?;
        write_key(&mut self.lock(), key, value, ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        self.gate(Op::SetIfAbsent).await?;
        let now = Instant::now();
        let mut inner = self.lock();
        let live = inner
            .keys
            .get(key)
            .is_some_and(|e| e.written_at + e.ttl > now);
        if live {
            return Ok(false);
        }
        write_key(&mut inner, key, value, ttl);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.gate(Op::Get).await?;
        Ok(self.entry(key).map(|e| e.value))
    }

    async fn read_group(&self, args: &ReadGroupArgs<'_>) -> Result<Option<Vec<StreamBatch>>> {
        self.lock().last_read = Some(ReadRequest {
            stream: args.stream.to_string(),
            group: args.group.to_string(),
            consumer: args.consumer.to_string(),
            count: args.count,
            block: args.block,
        });
        self.gate(Op::ReadGroup).await?;
        let mut inner = self.lock();
        if let Some(reply) = inner.scripted.pop_front() {
            return Ok(reply);
        }

        let stream = inner
            .streams
            .get_mut(args.stream)
            .ok_or_else(|| no_group(args.stream, args.group))?;
        let Stream {
            entries, groups, ..
        } = stream;
        let group = groups
            .get_mut(args.group)
            .ok_or_else(|| no_group(args.stream, args.group))?;

        let end = entries.len().min(group.next + args.count.max(1));
        if group.next >= end {
            return Ok(None);
        }
        let delivered: Vec<StreamEntry> = entries[group.next..end].to_vec();
        for entry in &delivered {
            group
                .pending
                .insert(entry.id.clone(), args.consumer.to_string());
        }
        group.next = end;

        Ok(Some(vec![StreamBatch {
            stream: args.stream.to_string(),
            entries: delivered,
        }]))
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<u64> {
        self.gate(Op::Ack).await?;
        let mut inner = self.lock();
        let removed = inner
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .and_then(|g| g.pending.remove(id))
            .is_some();
        if removed {
            inner.acks.push(id.to_string());
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut inner = self.lock();
        let stream = inner.streams.entry(stream.to_string()).or_default();
        let next = stream.entries.len();
        stream
            .groups
            .entry(group.to_string())
            .or_insert_with(|| Group {
                next,
                pending: BTreeMap::new(),
            });
        Ok(())
    }

    async fn append(&self, stream: &str, fields: &[(&str, Vec<u8>)]) -> Result<String> {
        let mut inner = self.lock();
        let stream = inner.streams.entry(stream.to_string()).or_default();

        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        if now_ms > stream.last_ms {
            stream.last_ms = now_ms;
            stream.seq = 0;
        } else {
            stream.seq += 1;
        }
        let id = format!("{}-{}", stream.last_ms, stream.seq);

        stream.entries.push(StreamEntry {
            id: id.clone(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        Ok(id)
    }
}
