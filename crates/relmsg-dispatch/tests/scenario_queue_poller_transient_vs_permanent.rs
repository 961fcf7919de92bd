//! Scenario: Queue Poller. A transient failure requeues the entry for
//! redelivery; a permanent failure discards it and dead-letters it. Queue
//! entries carry no retry-count column, so the split is binary.

mod support;

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use relmsg_config::{QueueOptions, StoreOptions};
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::{DeadLetterStore, QueueStore};
use relmsg_dispatch::{HandlerFailure, QueuePoller};
use relmsg_schemas::{default_lease, EnqueueOptions};
use support::ScriptedHandler;

#[tokio::test]
async fn transient_failure_requeues_for_redelivery() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(QueueStore::new(
        ConnectionProvider::owned(pool.clone()),
        StoreOptions::default(),
        default_lease(),
    )?);
    let dead_letter = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let handler = Arc::new(ScriptedHandler::new(vec![
        Err(HandlerFailure::transient("downstream timeout")),
        Ok(json!({"ok": true})),
    ]));

    let queue = "orders";
    store
        .enqueue(queue, "order.created", json!({"orderId": 9}), EnqueueOptions::default())
        .await?;

    let poller = QueuePoller::new(store.clone(), dead_letter.clone(), handler.clone(), QueueOptions::default(), queue);
    let cancel = CancellationToken::new();

    let handled = poller.poll_once(&cancel).await?;
    assert!(handled);
    assert_eq!(handler.call_count(), 1);
    assert_eq!(store.get_queue_depth(queue).await?, 1, "a transiently failed entry must remain in the queue");

    // Redelivery on the second poll succeeds and acknowledges the entry.
    let handled = poller.poll_once(&cancel).await?;
    assert!(handled);
    assert_eq!(handler.call_count(), 2);
    assert_eq!(store.get_queue_depth(queue).await?, 0, "an acknowledged entry leaves the active queue depth");

    let dlq_count = dead_letter.get_count().await?;
    assert_eq!(dlq_count, 0, "a transient failure must never reach the dead-letter store");

    Ok(())
}

#[tokio::test]
async fn permanent_failure_discards_and_dead_letters() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(QueueStore::new(
        ConnectionProvider::owned(pool.clone()),
        StoreOptions::default(),
        default_lease(),
    )?);
    let dead_letter = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let handler = Arc::new(ScriptedHandler::new(vec![Err(HandlerFailure::permanent("payload schema invalid"))]));

    let queue = "orders";
    store
        .enqueue(queue, "order.created", json!({"orderId": 10}), EnqueueOptions::default())
        .await?;

    let poller = QueuePoller::new(store.clone(), dead_letter.clone(), handler, QueueOptions::default(), queue);
    let cancel = CancellationToken::new();

    let handled = poller.poll_once(&cancel).await?;
    assert!(handled);
    assert_eq!(store.get_queue_depth(queue).await?, 0, "a permanently failed entry must leave the active queue");

    let dlq = dead_letter.get("order.created", 10).await?;
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].component, "Queue");

    Ok(())
}
