//! Stream consumer: heartbeat, single-message reads, create-only results.
//!
//! Many processes run the same consumer against one stream and group.
//! The store decides who gets which new entry (group reads) and whose
//! result wins (create-only writes); the consumer itself holds no locks.

pub mod heartbeat;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, warn};
use uuid::Uuid;

use crate::codec::Decode;
use crate::config::ConsumerConfig;
use crate::error::{Error, Result};
use crate::store::{MESSAGE_KEY, ReadGroupArgs, RedisStore, StreamBatch, StreamEntry, StreamStore};
use crate::telemetry::consumer::{
    record_message, record_outcome, start_consume_span, start_result_span,
};
use crate::telemetry::metrics;

pub use heartbeat::{HeartbeatTask, heartbeat_key};

/// Block duration for group reads. Zero would block forever, so reads
/// use the smallest positive wait and callers poll in a loop.
pub const READ_BLOCK: Duration = Duration::from_millis(1);

/// A delivered stream entry with its decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<T> {
    pub id: String,
    pub value: T,
}

/// One member of a consumer group.
pub struct Consumer<T, S = RedisStore> {
    id: String,
    store: Arc<S>,
    config: ConsumerConfig,
    heartbeat: Option<HeartbeatTask>,
    _value: PhantomData<fn() -> T>,
}

impl<T: Decode> Consumer<T, RedisStore> {
    /// Validate the config and connect to Redis.
    pub async fn connect(config: ConsumerConfig) -> Result<Self> {
        config.validate()?;
        let store = RedisStore::connect(config.redis_url.expose_secret()).await?;
        Self::with_store(config, Arc::new(store))
    }
}

impl<T: Decode, S: StreamStore> Consumer<T, S> {
    /// Build a consumer over an existing store handle.
    ///
    /// Each consumer gets a fresh random id, used both as its group
    /// member name and in its heartbeat key.
    pub fn with_store(config: ConsumerConfig, store: Arc<S>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            store,
            config,
            heartbeat: None,
            _value: PhantomData,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn heartbeat_key(&self) -> String {
        heartbeat_key(&self.id)
    }

    /// Start heartbeating in the background until `cancel` fires or
    /// [`Consumer::stop_and_wait`] is called.
    pub fn start(&mut self, cancel: &CancellationToken) {
        if self.is_running() {
            warn!(consumer = %self.id, "consumer already started");
            return;
        }
        // A task stopped by its parent token is replaced.
        self.heartbeat = Some(HeartbeatTask::spawn(
            Arc::clone(&self.store),
            self.id.clone(),
            self.config.heartbeat_interval(),
            self.config.heartbeat_expiry(),
            cancel,
        ));
    }

    pub fn is_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop heartbeating and wait for the background task to exit.
    pub async fn stop_and_wait(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.stop_and_wait().await;
        }
    }

    /// Write a single heartbeat now.
    pub async fn heartbeat(&self, cancel: &CancellationToken) -> Result<()> {
        heartbeat::beat(
            self.store.as_ref(),
            &self.id,
            self.config.heartbeat_expiry(),
            cancel,
        )
        .await
    }

    /// Read the next entry never delivered to any member of the group.
    ///
    /// Returns `Ok(None)` when the stream has nothing new. Anything other
    /// than exactly one stream with exactly one entry is an error, as is a
    /// payload that fails to decode; such an entry stays pending.
    pub async fn consume(&self, cancel: &CancellationToken) -> Result<Option<Message<T>>> {
        let span = start_consume_span(&self.id, &self.config.redis_stream);
        let result = self.read_one(cancel, &span).instrument(span.clone()).await;

        let outcome = match &result {
            Ok(Some(_)) => "message",
            Ok(None) => "empty",
            Err(_) => "error",
        };
        metrics::reads().add(
            1,
            &[
                KeyValue::new("stream", self.config.redis_stream.clone()),
                KeyValue::new("result", outcome),
            ],
        );
        result
    }

    async fn read_one(&self, cancel: &CancellationToken, span: &Span) -> Result<Option<Message<T>>> {
        let args = ReadGroupArgs {
            stream: &self.config.redis_stream,
            group: &self.config.redis_group,
            consumer: &self.id,
            count: 1,
            block: READ_BLOCK,
        };
        let reply = with_cancel(cancel, self.store.read_group(&args))
            .await
            .map_err(|e| {
                nest(e, |source| Error::Read {
                    consumer_id: self.id.clone(),
                    source,
                })
            })?;
        let Some(batches) = reply else {
            return Ok(None);
        };

        let entry = single_entry(batches)?;
        record_message(span, &entry.id);
        debug!(consumer = %self.id, message_id = %entry.id, "consuming message");

        let payload = entry
            .fields
            .get(MESSAGE_KEY)
            .ok_or_else(|| Error::MissingPayload {
                message_id: entry.id.clone(),
            })?;
        let value = T::decode(payload).map_err(|e| Error::Decode {
            message_id: entry.id.clone(),
            source: Box::new(e),
        })?;

        Ok(Some(Message {
            id: entry.id,
            value,
        }))
    }

    /// Publish `result` for `message_id`, then acknowledge the message.
    ///
    /// The result is written create-only, so across all consumers only the
    /// first writer succeeds. A losing writer gets [`Error::ResultExists`]
    /// and does not ack. The ack only ever follows a stored result; if it
    /// fails the result stays stored.
    pub async fn set_result(
        &self,
        cancel: &CancellationToken,
        message_id: &str,
        result: &str,
    ) -> Result<()> {
        let span = start_result_span(&self.id, message_id);
        let outcome = self
            .publish(cancel, message_id, result)
            .instrument(span.clone())
            .await;

        let label = match &outcome {
            Ok(()) => "ok",
            Err(Error::ResultExists { .. }) => "duplicate",
            Err(_) => "error",
        };
        record_outcome(&span, label);
        metrics::results().add(
            1,
            &[
                KeyValue::new("stream", self.config.redis_stream.clone()),
                KeyValue::new("result", label),
            ],
        );
        outcome
    }

    async fn publish(&self, cancel: &CancellationToken, message_id: &str, result: &str) -> Result<()> {
        let created = with_cancel(
            cancel,
            self.store.set_if_absent(
                message_id,
                result.to_string(),
                self.config.response_entry_timeout,
            ),
        )
        .await
        .map_err(|e| {
            nest(e, |source| Error::PublishResult {
                message_id: message_id.to_string(),
                source,
            })
        })?;
        if !created {
            debug!(consumer = %self.id, message_id, "result already set, leaving message pending");
            return Err(Error::ResultExists {
                message_id: message_id.to_string(),
            });
        }

        let acked = with_cancel(
            cancel,
            self.store
                .ack(&self.config.redis_stream, &self.config.redis_group, message_id),
        )
        .await;
        metrics::acks().add(
            1,
            &[
                KeyValue::new("stream", self.config.redis_stream.clone()),
                KeyValue::new("result", if acked.is_ok() { "ok" } else { "error" }),
            ],
        );
        let acked = acked.map_err(|e| {
            nest(e, |source| Error::Ack {
                message_id: message_id.to_string(),
                source,
            })
        })?;
        if acked == 0 {
            debug!(consumer = %self.id, message_id, "message was not pending at ack");
        }
        Ok(())
    }
}

impl<T, S> Drop for Consumer<T, S> {
    fn drop(&mut self) {
        if let Some(task) = &self.heartbeat {
            task.cancel();
        }
    }
}

/// Run `op` unless `cancel` fires first.
pub(crate) async fn with_cancel<F, R>(cancel: &CancellationToken, op: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = op => res,
    }
}

/// Wrap a store error with call context. Cancellation is passed through.
fn nest(err: Error, wrap: impl FnOnce(Box<Error>) -> Error) -> Error {
    if matches!(err, Error::Cancelled) {
        err
    } else {
        wrap(Box::new(err))
    }
}

fn single_entry(batches: Vec<StreamBatch>) -> Result<StreamEntry> {
    let [batch] = <[StreamBatch; 1]>::try_from(batches).map_err(|batches| {
        Error::UnexpectedReply(format!(
            "{} streams returned: {:?}",
            batches.len(),
            batches.iter().map(|b| &b.stream).collect::<Vec<_>>()
        ))
    })?;
    let [entry] = <[StreamEntry; 1]>::try_from(batch.entries).map_err(|entries| {
        Error::UnexpectedReply(format!(
            "stream {} returned {} entries",
            batch.stream,
            entries.len()
        ))
    })?;
    Ok(entry)
}
