//! Scenario: Idempotency Replay, Then TTL Expiry
//!
//! A stored success is replayed verbatim on every `get` within its TTL.
//! Once `expires_at` has passed, the row is invisible to `get` (§3.7's
//! "a row with expires_at <= now is absent to readers") even though it is
//! still physically present until `cleanup_expired` runs.

use chrono::Utc;
use serde_json::json;

use relmsg_config::StoreOptions;
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::IdempotencyStore;
use relmsg_schemas::IdempotencyStatus;

#[tokio::test]
async fn success_replays_until_ttl_then_disappears() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = IdempotencyStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?;
    let key = "charge-customer-42";

    store
        .store_success(key, json!({"charged": true, "amount": 500}), chrono::Duration::seconds(1))
        .await?;

    // Within TTL, the cached result replays verbatim.
    let first = store.get(key).await?.expect("row must be visible inside its TTL");
    assert_eq!(first.status, IdempotencyStatus::Success);
    assert_eq!(first.success_result, Some(json!({"charged": true, "amount": 500})));

    let second = store.get(key).await?.expect("replay must be stable on repeated reads");
    assert_eq!(second.success_result, first.success_result);

    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;

    let after_expiry = store.get(key).await?;
    assert!(after_expiry.is_none(), "expired row must be invisible to get()");

    let removed = store.cleanup_expired().await?;
    assert_eq!(removed, 1, "cleanup_expired must physically remove the expired row");

    Ok(())
}

#[tokio::test]
async fn storing_under_an_existing_key_overwrites_rather_than_errors() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = IdempotencyStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?;
    let key = "charge-customer-7";

    store
        .store_failure(key, "Transient", "gateway timeout", None, chrono::Duration::minutes(5))
        .await?;
    let failed = store.get(key).await?.expect("failure row must be visible");
    assert_eq!(failed.status, IdempotencyStatus::Failure);
    assert_eq!(failed.failure_message.as_deref(), Some("gateway timeout"));

    // A later successful attempt for the same key overwrites the failure
    // atomically — the idempotency cache is upsert semantics throughout.
    store
        .store_success(key, json!({"charged": true}), chrono::Duration::minutes(5))
        .await?;
    let succeeded = store.get(key).await?.expect("row must still exist under the same key");
    assert_eq!(succeeded.status, IdempotencyStatus::Success);
    assert!(succeeded.failure_message.is_none(), "overwrite must clear the stale failure fields");
    assert_eq!(succeeded.success_result, Some(json!({"charged": true})));

    let now = Utc::now();
    assert!(succeeded.stored_at <= now);

    Ok(())
}
