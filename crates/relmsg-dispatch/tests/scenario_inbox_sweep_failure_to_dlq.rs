//! Scenario: Inbox Processor sweep. A handler failure goes straight to
//! `Failed` + dead-letter, with no retry-count column and no retry policy.

mod support;

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use relmsg_config::{InboxOptions, StoreOptions};
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::{DeadLetterStore, InboxStore};
use relmsg_dispatch::{HandlerFailure, InboxProcessor};
use relmsg_schemas::{AddInboxOptions, InboxStatus};
use support::ScriptedHandler;

#[tokio::test]
async fn failing_handler_marks_failed_and_dead_letters_immediately() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(InboxStore::new(ConnectionProvider::owned(pool.clone()), StoreOptions::default())?);
    let dead_letter = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let handler = Arc::new(ScriptedHandler::new(vec![Err(HandlerFailure::permanent("schema mismatch"))]));

    let id = "inbound-1";
    store
        .add(id, "payment.received", json!({"amount": 100}), AddInboxOptions::default())
        .await?;

    let processor = InboxProcessor::new(store.clone(), dead_letter.clone(), handler.clone(), InboxOptions::default(), "processor-1");
    let cancel = CancellationToken::new();

    let claimed = processor.sweep_once(&cancel).await?;
    assert_eq!(claimed, 1);
    assert_eq!(handler.call_count(), 1);

    let entry = store.get(id).await?.expect("row must still exist");
    assert_eq!(entry.status, InboxStatus::Failed);
    assert_eq!(entry.error.as_deref(), Some("schema mismatch"));

    let dlq = dead_letter.get("payment.received", 10).await?;
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].component, "Inbox");
    assert_eq!(dlq[0].retry_count, 0, "the Inbox has no retry policy; it hands off on the first failure");

    Ok(())
}

#[tokio::test]
async fn succeeding_handler_marks_processed() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(InboxStore::new(ConnectionProvider::owned(pool.clone()), StoreOptions::default())?);
    let dead_letter = Arc::new(DeadLetterStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?);
    let handler = Arc::new(ScriptedHandler::new(vec![Ok(json!({"ok": true}))]));

    let id = "inbound-2";
    store
        .add(id, "payment.received", json!({"amount": 250}), AddInboxOptions::default())
        .await?;

    let processor = InboxProcessor::new(store.clone(), dead_letter, handler, InboxOptions::default(), "processor-1");
    let cancel = CancellationToken::new();

    processor.sweep_once(&cancel).await?;

    let entry = store.get(id).await?.expect("row must still exist");
    assert_eq!(entry.status, InboxStatus::Processed);
    assert!(entry.processed_at.is_some());

    Ok(())
}
