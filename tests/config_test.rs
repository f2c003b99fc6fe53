use std::sync::Arc;
use std::time::Duration;

use pubsub_consumer::Consumer;
use pubsub_consumer::config::{Config, ConsumerConfig, DEFAULT_GROUP, DEFAULT_STREAM};
use pubsub_consumer::error::Error;
use pubsub_consumer::store::MemoryStore;
use secrecy::{ExposeSecret, SecretString};

const VARS: [&str; 5] = [
    "REDIS_URL",
    "REDIS_STREAM",
    "REDIS_GROUP",
    "RESPONSE_ENTRY_TIMEOUT_SECS",
    "KEEPALIVE_TIMEOUT_MS",
];

fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

// Environment mutation is process-global, so every env scenario runs in
// this single test.
#[test]
fn config_from_env() {
    clear_env();
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe { std::env::set_var("REDIS_URL", "redis://localhost:6379") };
    let config = Config::from_env().unwrap();
    assert_eq!(
        config.consumer.redis_url.expose_secret(),
        "redis://localhost:6379"
    );
    assert_eq!(config.consumer.redis_stream, DEFAULT_STREAM);
    assert_eq!(config.consumer.redis_group, DEFAULT_GROUP);
    assert_eq!(config.consumer.keepalive_timeout, Duration::from_secs(300));
    assert!(!config.log_level.is_empty());

    unsafe {
        std::env::set_var("REDIS_STREAM", "proofs");
        std::env::set_var("REDIS_GROUP", "provers");
        std::env::set_var("RESPONSE_ENTRY_TIMEOUT_SECS", "120");
        std::env::set_var("KEEPALIVE_TIMEOUT_MS", "2000");
    }
    let consumer = ConsumerConfig::from_env().unwrap();
    assert_eq!(consumer.redis_stream, "proofs");
    assert_eq!(consumer.redis_group, "provers");
    assert_eq!(consumer.response_entry_timeout, Duration::from_secs(120));
    assert_eq!(consumer.keepalive_timeout, Duration::from_secs(2));

    unsafe { std::env::set_var("KEEPALIVE_TIMEOUT_MS", "soon") };
    assert!(matches!(ConsumerConfig::from_env(), Err(Error::Config(_))));

    unsafe { std::env::set_var("KEEPALIVE_TIMEOUT_MS", "0") };
    assert!(matches!(ConsumerConfig::from_env(), Err(Error::Config(_))));

    clear_env();
}

#[test]
fn validate_rejects_empty_url() {
    let config = ConsumerConfig::default();
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    let config = ConsumerConfig {
        redis_url: SecretString::from("redis://localhost:6379"),
        ..ConsumerConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn validate_rejects_keepalive_below_one_tick() {
    let config = ConsumerConfig {
        keepalive_timeout: Duration::from_nanos(5),
        redis_url: SecretString::from("redis://localhost:6379"),
        ..ConsumerConfig::default()
    };
    assert!(config.heartbeat_interval().is_zero());
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    let built = Consumer::<String, MemoryStore>::with_store(config, Arc::new(MemoryStore::new()));
    assert!(matches!(built, Err(Error::Config(_))));

    let config = ConsumerConfig {
        keepalive_timeout: Duration::from_nanos(10),
        redis_url: SecretString::from("redis://localhost:6379"),
        ..ConsumerConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn heartbeat_timing_derives_from_keepalive() {
    let config = ConsumerConfig {
        keepalive_timeout: Duration::from_secs(10),
        ..ConsumerConfig::default()
    };
    assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    assert_eq!(config.heartbeat_expiry(), Duration::from_secs(20));

    let test = ConsumerConfig::for_tests();
    assert_eq!(test.heartbeat_interval(), Duration::from_millis(3));
    assert_eq!(test.heartbeat_expiry(), Duration::from_millis(60));
}

#[test]
fn debug_output_hides_url() {
    let config = ConsumerConfig {
        redis_url: SecretString::from("redis://:hunter2@localhost:6379"),
        ..ConsumerConfig::default()
    };
    assert!(!format!("{config:?}").contains("hunter2"));
}
