//! Error types for pubsub-consumer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connecting to store: {0}")]
    Connection(#[source] redis::RedisError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store error: {0}")]
    Store(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("reading message for consumer {consumer_id:?}: {source}")]
    Read {
        consumer_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("unexpected reply for single message read: {0}")]
    UnexpectedReply(String),

    #[error("message {message_id} has no payload field")]
    MissingPayload { message_id: String },

    #[error("decoding message {message_id}: {source}")]
    Decode {
        message_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("result for message {message_id} already exists")]
    ResultExists { message_id: String },

    #[error("setting result for message {message_id}: {source}")]
    PublishResult {
        message_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("acking message {message_id}: {source}")]
    Ack {
        message_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error was caused by caller-requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Read { source, .. }
            | Error::PublishResult { source, .. }
            | Error::Ack { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
