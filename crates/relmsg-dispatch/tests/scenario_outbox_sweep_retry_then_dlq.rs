//! Scenario: Outbox Publisher sweep. A transient transport failure is
//! retried with jittered backoff until `max_retries` is exhausted, at which
//! point the row is marked `Failed` and dead-lettered.

mod support;

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use relmsg_config::{OutboxOptions, StoreOptions};
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::{DeadLetterStore, OutboxStore};
use relmsg_dispatch::{FixedJitter, HandlerFailure, OutboxPublisher};
use relmsg_schemas::{AddOutboxOptions, OutboxStatus};
use support::RecordingTransport;

#[tokio::test]
async fn failing_transport_retries_then_dead_letters_after_max_retries() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(OutboxStore::new(ConnectionProvider::owned(pool.clone()), StoreOptions::default())?);
    let dead_letter = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let transport = Arc::new(RecordingTransport::failing(HandlerFailure::transient("destination unreachable")));

    let id = "order-created-1";
    store
        .add(
            id,
            "order.created",
            json!({"orderId": 1}),
            AddOutboxOptions {
                destination: Some("orders.topic".to_string()),
                max_retries: 2,
            },
        )
        .await?;

    let options = OutboxOptions {
        max_retries: 2,
        batch_size: 10,
        ..OutboxOptions::default()
    };
    // Zero jitter collapses `next_retry_at` onto `now`, so the row is
    // reclaimable on the very next sweep against the store's real clock
    // instead of waiting out a real backoff delay.
    let publisher = OutboxPublisher::new(store.clone(), dead_letter.clone(), transport.clone(), options, "publisher-1")
        .with_jitter(Arc::new(FixedJitter(0.0)));

    let cancel = CancellationToken::new();

    // Sweep 1: attempt 1 fails, retry_count becomes 1 (<= max_retries), row returns to Pending.
    let claimed = publisher.sweep_once(&cancel).await?;
    assert_eq!(claimed, 1);
    let after_first = store.get(id).await?.expect("row must still exist");
    assert_eq!(after_first.status, OutboxStatus::Pending);
    assert_eq!(after_first.retry_count, 1);

    // Sweep 2: attempt 2 fails, retry_count reaches max_retries, row still returns to Pending.
    let claimed = publisher.sweep_once(&cancel).await?;
    assert_eq!(claimed, 1);
    let after_second = store.get(id).await?.expect("row must still exist");
    assert_eq!(after_second.status, OutboxStatus::Pending);
    assert_eq!(after_second.retry_count, 2);

    // Sweep 3: attempt 3 exceeds max_retries, row is marked Failed and dead-lettered.
    let claimed = publisher.sweep_once(&cancel).await?;
    assert_eq!(claimed, 1);
    let after_third = store.get(id).await?.expect("row must still exist");
    assert_eq!(after_third.status, OutboxStatus::Failed);
    assert_eq!(after_third.retry_count, 2);
    assert_eq!(after_third.last_error.as_deref(), Some("destination unreachable"));

    let dlq_count = dead_letter.get_count().await?;
    assert_eq!(dlq_count, 1, "exhausted outbox entry must land in the dead-letter store");

    let dlq_entries = dead_letter.get("order.created", 10).await?;
    assert_eq!(dlq_entries.len(), 1);
    assert_eq!(dlq_entries[0].component, "Outbox");
    assert_eq!(dlq_entries[0].retry_count, 2);

    assert_eq!(transport.sent().len(), 3, "transport must be invoked once per sweep");

    Ok(())
}

#[tokio::test]
async fn succeeding_transport_marks_processed_on_first_sweep() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(OutboxStore::new(ConnectionProvider::owned(pool.clone()), StoreOptions::default())?);
    let dead_letter = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let transport = Arc::new(RecordingTransport::succeeding());

    let id = "order-created-2";
    store
        .add(id, "order.created", json!({"orderId": 2}), AddOutboxOptions::default())
        .await?;

    let publisher = OutboxPublisher::new(store.clone(), dead_letter, transport.clone(), OutboxOptions::default(), "publisher-1");
    let cancel = CancellationToken::new();

    let claimed = publisher.sweep_once(&cancel).await?;
    assert_eq!(claimed, 1);

    let entry = store.get(id).await?.expect("row must still exist");
    assert_eq!(entry.status, OutboxStatus::Processed);
    assert!(entry.processed_at.is_some());
    assert_eq!(transport.sent().len(), 1);

    Ok(())
}
