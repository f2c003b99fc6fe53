//! End-to-end tests against a real Redis.
//!
//! Requires REDIS_URL or a local Redis on the default port. Each test uses
//! a fresh stream name so reruns don't see old entries.

use std::sync::Arc;
use std::time::Duration;

use pubsub_consumer::codec::{Encode, Json};
use pubsub_consumer::config::ConsumerConfig;
use pubsub_consumer::consumer::Consumer;
use pubsub_consumer::error::Error;
use pubsub_consumer::store::{MESSAGE_KEY, RedisStore, StreamStore};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn setup() -> (Arc<RedisStore>, ConsumerConfig) {
    let store = RedisStore::connect(&redis_url()).await.unwrap();
    store.health_check().await.unwrap();

    let config = ConsumerConfig {
        redis_url: SecretString::from(redis_url()),
        redis_stream: format!("test-stream-{}", uuid::Uuid::new_v4()),
        ..ConsumerConfig::for_tests()
    };
    store
        .create_group(&config.redis_stream, &config.redis_group)
        .await
        .unwrap();
    (Arc::new(store), config)
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn produce_consume_and_publish() {
    let (store, config) = setup().await;
    let stream = config.redis_stream.clone();
    let consumer: Consumer<Json<serde_json::Value>> =
        Consumer::with_store(config, Arc::clone(&store)).unwrap();
    let cancel = CancellationToken::new();

    assert!(consumer.consume(&cancel).await.unwrap().is_none());

    let payload = Json(serde_json::json!({"block": 42})).encode().unwrap();
    let id = store
        .append(&stream, &[(MESSAGE_KEY, payload)])
        .await
        .unwrap();

    let msg = consumer.consume(&cancel).await.unwrap().unwrap();
    assert_eq!(msg.id, id);
    assert_eq!(msg.value.0["block"], 42);

    consumer.set_result(&cancel, &msg.id, "ok").await.unwrap();
    assert_eq!(store.get(&msg.id).await.unwrap().as_deref(), Some("ok"));

    let err = consumer.set_result(&cancel, &msg.id, "again").await.unwrap_err();
    assert!(matches!(err, Error::ResultExists { .. }));
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn heartbeat_key_is_written_with_expiry() {
    let (store, mut config) = setup().await;
    config.keepalive_timeout = Duration::from_secs(1);
    let mut consumer: Consumer<Json<serde_json::Value>> =
        Consumer::with_store(config, Arc::clone(&store)).unwrap();
    let cancel = CancellationToken::new();

    consumer.start(&cancel);
    tokio::time::sleep(Duration::from_millis(250)).await;
    let value = store.get(&consumer.heartbeat_key()).await.unwrap();
    assert!(value.is_some_and(|v| v.parse::<i64>().is_ok()));

    consumer.stop_and_wait().await;
    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert!(store.get(&consumer.heartbeat_key()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn create_group_is_idempotent() {
    let (store, config) = setup().await;
    store
        .create_group(&config.redis_stream, &config.redis_group)
        .await
        .unwrap();
}
