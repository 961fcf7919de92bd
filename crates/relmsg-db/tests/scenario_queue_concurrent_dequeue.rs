//! Scenario: Queue Concurrent Dequeue Never Double-Delivers
//!
//! Enqueue 100 messages on one queue, half at priority 10 and half at
//! priority 1 interleaved, then race 4 concurrent dequeuers against it.
//! `FOR UPDATE SKIP LOCKED` must guarantee every message is delivered to
//! exactly one dequeuer, and that all 50 high-priority messages drain before
//! any low-priority one.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use relmsg_config::StoreOptions;
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::QueueStore;
use relmsg_schemas::{default_lease, EnqueueOptions};

#[tokio::test]
async fn hundred_messages_four_dequeuers_no_duplicates_priority_first() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(QueueStore::new(
        ConnectionProvider::owned(pool),
        StoreOptions::default(),
        default_lease(),
    )?);
    let queue_name = format!("q-{}", Uuid::new_v4());

    for i in 0..100 {
        let priority = if i % 2 == 0 { 10 } else { 1 };
        store
            .enqueue(
                &queue_name,
                "work.item",
                json!({"i": i}),
                EnqueueOptions {
                    priority,
                    delay: None,
                },
            )
            .await?;
    }

    // Shared log, appended to in the actual order each dequeue() call
    // completes, so delivery order reflects real contention rather than
    // per-task collection order.
    let delivery_log = Arc::new(Mutex::new(Vec::<(String, i32)>::with_capacity(100)));

    let mut handles = Vec::with_capacity(4);
    for _ in 0..4 {
        let store = store.clone();
        let queue_name = queue_name.clone();
        let delivery_log = delivery_log.clone();
        handles.push(tokio::spawn(async move {
            loop {
                match store.dequeue(&queue_name).await {
                    Ok(Some(entry)) => delivery_log.lock().await.push((entry.id, entry.priority)),
                    Ok(None) => break,
                    Err(e) => panic!("dequeue failed: {e}"),
                }
            }
        }));
    }

    for handle in handles {
        handle.await.expect("dequeuer task panicked");
    }
    let all = Arc::try_unwrap(delivery_log)
        .expect("all tasks joined, log must be uniquely owned")
        .into_inner();

    assert_eq!(all.len(), 100, "every enqueued message must be delivered exactly once");
    let distinct_ids: HashSet<_> = all.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(distinct_ids.len(), 100, "no message may be delivered twice");

    // `dequeue` always selects the highest remaining priority, so across the
    // true completion order every priority-10 delivery must precede every
    // priority-1 delivery — the first 50 entries in the log are priority 10.
    let priorities: Vec<i32> = all.iter().map(|(_, p)| *p).collect();
    assert_eq!(&priorities[..50], &[10; 50][..], "first 50 deliveries must all be priority 10");
    assert_eq!(&priorities[50..], &[1; 50][..], "remaining deliveries must all be priority 1");

    Ok(())
}
