//! Scenario: Idempotency Mediator. The first invocation runs the handler
//! and caches the result; a second call with the same key replays the
//! cached outcome without invoking the handler again.

mod support;

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use relmsg_config::StoreOptions;
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::IdempotencyStore;
use relmsg_dispatch::{HandlerFailure, IdempotencyMediator, MediatedError, MediatedOutcome};
use support::ScriptedHandler;

#[tokio::test]
async fn second_call_replays_without_reinvoking_handler() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = IdempotencyStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?;
    let handler = ScriptedHandler::new(vec![Ok(json!({"charged": true, "amount": 500}))]);
    let mediator = IdempotencyMediator::new(&store, chrono::Duration::minutes(5), chrono::Duration::minutes(5));
    let cancel = CancellationToken::new();
    let key = "charge-customer-99";

    let first = mediator
        .invoke(key, "charge.customer", &json!({"amount": 500}), &handler, &cancel)
        .await?;
    assert!(matches!(first, MediatedOutcome::Fresh(_)));
    assert_eq!(first.clone().into_value(), json!({"charged": true, "amount": 500}));
    assert_eq!(handler.call_count(), 1);

    let second = mediator
        .invoke(key, "charge.customer", &json!({"amount": 500}), &handler, &cancel)
        .await?;
    assert!(matches!(second, MediatedOutcome::Replayed(_)));
    assert_eq!(second.into_value(), json!({"charged": true, "amount": 500}));
    assert_eq!(handler.call_count(), 1, "a cache hit must never invoke the handler again");

    Ok(())
}

#[tokio::test]
async fn replayed_failure_is_reconstructed_with_its_original_message() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = IdempotencyStore::new(ConnectionProvider::owned(pool), StoreOptions::default())?;
    let handler = ScriptedHandler::new(vec![Err(HandlerFailure::permanent("card declined"))]);
    let mediator = IdempotencyMediator::new(&store, chrono::Duration::minutes(5), chrono::Duration::minutes(5));
    let cancel = CancellationToken::new();
    let key = "charge-customer-100";

    let first = mediator
        .invoke(key, "charge.customer", &json!({"amount": 10}), &handler, &cancel)
        .await;
    match first {
        Err(MediatedError::Handler(failure)) => assert_eq!(failure.message, "card declined"),
        other => panic!("expected the handler's own failure on first invocation, got {other:?}"),
    }
    assert_eq!(handler.call_count(), 1);

    let second = mediator
        .invoke(key, "charge.customer", &json!({"amount": 10}), &handler, &cancel)
        .await;
    match second {
        Err(MediatedError::Replayed(replayed)) => {
            assert_eq!(replayed.failure_type, "Permanent");
            assert_eq!(replayed.failure_message, "card declined");
        }
        other => panic!("expected a replayed failure on the second invocation, got {other:?}"),
    }
    assert_eq!(handler.call_count(), 1, "a replayed failure must never invoke the handler again");

    Ok(())
}
