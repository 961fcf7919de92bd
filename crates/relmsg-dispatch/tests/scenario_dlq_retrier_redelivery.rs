//! Scenario: DLQ Retrier. An operator-triggered redelivery transitions a
//! dead-lettered entry to `Retried` only if the transport actually accepts
//! it; a failed redelivery leaves the entry `Active` for another attempt.

mod support;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use relmsg_config::StoreOptions;
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::DeadLetterStore;
use relmsg_dispatch::DlqRetrier;
use relmsg_schemas::{DeadLetterContext, DeadLetterStatus};
use support::RecordingTransport;

#[tokio::test]
async fn successful_redelivery_transitions_to_retried() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let id = store
        .send(
            json!({"orderId": 5}),
            "order.created",
            DeadLetterContext {
                reason: "handler exploded".to_string(),
                component: "Outbox",
                retry_count: 3,
                failure_time: Utc::now(),
                exception_message: Some("handler exploded".to_string()),
                metadata: None,
            },
        )
        .await?;

    let transport = Arc::new(RecordingTransport::succeeding());
    let retrier = DlqRetrier::new(store.clone(), transport.clone());

    let entry = store
        .get("order.created", 10)
        .await?
        .into_iter()
        .find(|e| e.id == id)
        .expect("entry must be Active and retrievable");

    retrier.retry_one(&entry, "orders.topic").await?;
    assert_eq!(transport.sent().len(), 1);

    let remaining = store.get("order.created", 10).await?;
    assert!(remaining.is_empty(), "a retried entry must no longer be Active");

    Ok(())
}

#[tokio::test]
async fn failed_redelivery_leaves_entry_active() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let id = store
        .send(
            json!({"orderId": 6}),
            "order.created",
            DeadLetterContext {
                reason: "handler exploded".to_string(),
                component: "Outbox",
                retry_count: 3,
                failure_time: Utc::now(),
                exception_message: Some("handler exploded".to_string()),
                metadata: None,
            },
        )
        .await?;

    let transport = Arc::new(RecordingTransport::failing(relmsg_dispatch::HandlerFailure::transient("still down")));
    let retrier = DlqRetrier::new(store.clone(), transport);

    let entry = store.get("order.created", 10).await?.into_iter().find(|e| e.id == id).unwrap();
    let result = retrier.retry_one(&entry, "orders.topic").await;
    assert!(result.is_err(), "a failed redelivery must surface an error");

    let still_active = store.get("order.created", 10).await?;
    assert_eq!(still_active.len(), 1);
    assert_eq!(still_active[0].status, DeadLetterStatus::Active);

    Ok(())
}

#[tokio::test]
async fn discard_one_transitions_to_discarded() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let id = store
        .send(
            json!({"orderId": 7}),
            "order.created",
            DeadLetterContext {
                reason: "unrecoverable".to_string(),
                component: "Inbox",
                retry_count: 0,
                failure_time: Utc::now(),
                exception_message: None,
                metadata: None,
            },
        )
        .await?;

    let transport = Arc::new(RecordingTransport::succeeding());
    let retrier = DlqRetrier::new(store.clone(), transport);

    retrier.discard_one(&id).await?;
    let remaining = store.get("order.created", 10).await?;
    assert!(remaining.is_empty(), "a discarded entry must no longer be Active");

    let again = retrier.discard_one(&id).await;
    assert!(again.is_err(), "discarding an already-discarded entry must fail");

    Ok(())
}
