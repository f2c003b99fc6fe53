//! pubsub CLI: run a consumer, feed the stream, look up results.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pubsub_consumer::codec::{Encode, Json};
use pubsub_consumer::config::Config;
use pubsub_consumer::consumer::Consumer;
use pubsub_consumer::store::{MESSAGE_KEY, RedisStore, StreamStore};
use pubsub_consumer::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pubsub", about = "Redis stream consumer-group worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a consumer that publishes each JSON value back as its result
    Serve {
        /// Pause after an empty read or a failed read
        #[arg(long, default_value_t = 50)]
        idle_backoff_ms: u64,
    },
    /// Append a JSON payload to the stream
    Produce {
        /// JSON document to enqueue
        payload: String,
    },
    /// Show the stored result for a message
    Result {
        /// Stream entry ID (e.g. 1700000000000-0)
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { idle_backoff_ms } => {
            cmd_serve(config, Duration::from_millis(idle_backoff_ms)).await
        }
        Command::Produce { payload } => cmd_produce(config, payload).await,
        Command::Result { id } => cmd_result(config, id).await,
    }
}

async fn cmd_serve(config: Config, idle_backoff: Duration) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "pubsub".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let store = Arc::new(RedisStore::connect(config.consumer.redis_url.expose_secret()).await?);
    store
        .create_group(&config.consumer.redis_stream, &config.consumer.redis_group)
        .await?;

    let mut consumer: Consumer<Json<serde_json::Value>> =
        Consumer::with_store(config.consumer, store)?;

    let cancel = CancellationToken::new();
    let ctrl = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.cancel();
    });

    consumer.start(&cancel);
    info!(
        consumer = consumer.id(),
        stream = %consumer.config().redis_stream,
        group = %consumer.config().redis_group,
        "consumer started"
    );

    loop {
        match consumer.consume(&cancel).await {
            Ok(Some(msg)) => {
                let result = serde_json::to_string(&msg.value.0)?;
                match consumer.set_result(&cancel, &msg.id, &result).await {
                    Ok(()) => info!(message_id = %msg.id, "result published"),
                    Err(e) if e.is_cancelled() => break,
                    Err(e) => warn!(message_id = %msg.id, error = %e, "publishing result"),
                }
                continue;
            }
            Ok(None) => {}
            Err(e) if e.is_cancelled() => break,
            Err(e) => error!(error = %e, "consuming message"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(idle_backoff) => {}
        }
    }

    consumer.stop_and_wait().await;
    info!(consumer = consumer.id(), "consumer stopped");
    Ok(())
}

async fn cmd_produce(config: Config, payload: String) -> anyhow::Result<()> {
    let value: serde_json::Value = serde_json::from_str(&payload)?;
    let bytes = Json(value).encode()?;

    let store = RedisStore::connect(config.consumer.redis_url.expose_secret()).await?;
    // Group creation starts at the stream tail, so it must precede the append.
    store
        .create_group(&config.consumer.redis_stream, &config.consumer.redis_group)
        .await?;
    let id = store
        .append(&config.consumer.redis_stream, &[(MESSAGE_KEY, bytes)])
        .await?;

    println!("{id}");
    Ok(())
}

async fn cmd_result(config: Config, id: String) -> anyhow::Result<()> {
    let store = RedisStore::connect(config.consumer.redis_url.expose_secret()).await?;
    match store.get(&id).await? {
        Some(result) => println!("{result}"),
        None => println!("No result for {id}."),
    }
    Ok(())
}
