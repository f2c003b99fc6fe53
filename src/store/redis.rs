//! Redis-backed store using a shared, auto-reconnecting connection.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};

use super::{ReadGroupArgs, StreamBatch, StreamEntry, StreamStore};
use crate::error::{Error, Result};

/// Redis store handle. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Parse the url and open a managed connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(Error::Connection)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(Error::Connection)?;
        Ok(Self { conn })
    }

    /// Round-trip a PING.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn millis(d: Duration) -> u64 {
    // Redis rejects a zero expiry and treats a zero block as "forever".
    (d.as_millis() as u64).max(1)
}

#[async_trait]
impl StreamStore for RedisStore {
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.pset_ex(key, value, millis(ttl)).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn read_group(&self, args: &ReadGroupArgs<'_>) -> Result<Option<Vec<StreamBatch>>> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(args.group, args.consumer)
            .count(args.count)
            .block(millis(args.block) as usize);
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[args.stream], &[super::NEW_ENTRIES_ONLY], &opts)
            .await?;
        let Some(reply) = reply else {
            return Ok(None);
        };

        let mut batches = Vec::with_capacity(reply.keys.len());
        for key in reply.keys {
            let mut entries = Vec::with_capacity(key.ids.len());
            for stream_id in key.ids {
                let mut fields = std::collections::HashMap::with_capacity(stream_id.map.len());
                for (field, value) in stream_id.map {
                    let bytes: Vec<u8> = redis::from_redis_value(&value).map_err(|e| {
                        Error::UnexpectedReply(format!(
                            "field {field:?} of entry {} is not a string: {e}",
                            stream_id.id
                        ))
                    })?;
                    fields.insert(field, bytes);
                }
                entries.push(StreamEntry {
                    id: stream_id.id,
                    fields,
                });
            }
            batches.push(StreamBatch {
                stream: key.key,
                entries,
            });
        }
        Ok(Some(batches))
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let acked: u64 = conn.xack(stream, group, &[id]).await?;
        Ok(acked)
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "$").await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, stream: &str, fields: &[(&str, Vec<u8>)]) -> Result<String> {
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", fields).await?;
        Ok(id)
    }
}
