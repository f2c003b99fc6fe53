//! # pubsub-consumer
//!
//! One member of a Redis-stream consumer group used as an at-least-once
//! work queue.
//!
//! Provides heartbeating (liveness keys with expiry), single-message group
//! reads with typed decoding, and create-only result publication followed
//! by acknowledgement, plus OpenTelemetry observability.

pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod store;
pub mod telemetry;

pub use codec::{Decode, Encode, Json};
pub use config::ConsumerConfig;
pub use consumer::{Consumer, Message};
pub use error::{Error, Result};
