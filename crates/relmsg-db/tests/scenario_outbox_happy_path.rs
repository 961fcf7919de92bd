//! Scenario: Outbox Happy Path
//!
//! Add a message, claim it the way `OutboxPublisher::sweep_once` would, and
//! mark it processed. No retry, no DLQ hand-off.
//!
//! Skips gracefully when `RELMSG_DATABASE_URL` is not set.

use serde_json::json;
use uuid::Uuid;

use relmsg_config::StoreOptions;
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::OutboxStore;
use relmsg_schemas::{AddOutboxOptions, OutboxStatus};

#[tokio::test]
async fn add_claim_then_mark_processed_leaves_clean_record() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = OutboxStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?;
    let id = format!("m-{}", Uuid::new_v4());

    store
        .add(
            &id,
            "order.created",
            json!({"x": 1}),
            AddOutboxOptions {
                max_retries: 3,
                ..Default::default()
            },
        )
        .await?;

    let claimed = store.claim_batch(10, "dispatcher-1").await?;
    assert_eq!(claimed.len(), 1, "the fresh row must be claimable");
    assert_eq!(claimed[0].id, id);
    assert_eq!(claimed[0].status, OutboxStatus::Claimed);

    let marked = store.mark_processed(&id).await?;
    assert!(marked);

    let entry = store.get(&id).await?.expect("row must still exist");
    assert_eq!(entry.status, OutboxStatus::Processed);
    assert!(entry.processed_at.is_some());
    assert_eq!(entry.retry_count, 0);

    Ok(())
}
