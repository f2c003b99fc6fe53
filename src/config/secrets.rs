//! Secret handling utilities.
//!
//! Re-exports the secrecy types the consumer configuration is built on.

pub use secrecy::{ExposeSecret, SecretString};
