//! relmsg-dispatch entry point.
//!
//! Thin composition root: connects to Postgres, builds the store handles,
//! and runs the four dispatcher loops until SIGINT. The actual
//! `MessageHandler`/`Transport` collaborators are supplied by the
//! embedding application (§6.3) — this binary wires in logging stand-ins
//! so the loops have somewhere to deliver to when run standalone.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use relmsg_config::{InboxOptions, OutboxOptions, QueueOptions, StoreOptions};
use relmsg_db::{conn::ConnectionProvider, DeadLetterStore, InboxStore, OutboxStore, QueueStore};
use relmsg_dispatch::{HandlerFailure, InboxProcessor, MessageHandler, OutboxPublisher, QueuePoller, Transport};

struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(
        &self,
        message_type: &str,
        payload: &Value,
        _cancel: &CancellationToken,
    ) -> Result<Value, HandlerFailure> {
        info!(message_type, %payload, "handled message");
        Ok(Value::Null)
    }
}

struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, destination: &str, payload: &Value) -> Result<(), HandlerFailure> {
        info!(destination, %payload, "published message");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let pool = relmsg_db::connect_from_env().await.context("connect to Postgres")?;
    relmsg_db::migrate(&pool).await.context("run migrations")?;

    let options = StoreOptions::default();
    let conn = ConnectionProvider::owned(pool);

    let outbox = Arc::new(OutboxStore::new(conn.clone(), options.clone())?);
    let inbox = Arc::new(InboxStore::new(conn.clone(), options.clone())?);
    let queue = Arc::new(QueueStore::new(conn.clone(), options.clone(), QueueOptions::default().lease_duration)?);
    let dead_letter = Arc::new(DeadLetterStore::new(conn.clone(), options.clone())?);

    let cancel = CancellationToken::new();

    let publisher = OutboxPublisher::new(
        outbox,
        dead_letter.clone(),
        Arc::new(LoggingTransport),
        OutboxOptions::default(),
        "relmsg-dispatch",
    );
    let inbox_processor = InboxProcessor::new(
        inbox,
        dead_letter.clone(),
        Arc::new(LoggingHandler),
        InboxOptions::default(),
        "relmsg-dispatch",
    );
    let queue_poller = QueuePoller::new(
        queue,
        dead_letter,
        Arc::new(LoggingHandler),
        QueueOptions::default(),
        "default",
    );

    let outbox_cancel = cancel.clone();
    let inbox_cancel = cancel.clone();
    let queue_cancel = cancel.clone();

    let outbox_task = tokio::spawn(async move { publisher.run(outbox_cancel).await });
    let inbox_task = tokio::spawn(async move { inbox_processor.run(inbox_cancel).await });
    let queue_task = tokio::spawn(async move { queue_poller.run(queue_cancel).await });

    info!("relmsg-dispatch running; ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");
    cancel.cancel();

    let _ = tokio::join!(outbox_task, inbox_task, queue_task);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}
