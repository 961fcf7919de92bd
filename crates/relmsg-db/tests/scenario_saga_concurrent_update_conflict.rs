//! Scenario: Saga Concurrency Conflict
//!
//! Two concurrent `update` calls against the same saga, both loaded from the
//! same starting version, race each other. The version check and the write
//! happen in a single `UPDATE ... WHERE version = $expected` statement, so
//! exactly one succeeds and advances the version; the other observes
//! `ConcurrencyConflict`.

use std::sync::Arc;

use uuid::Uuid;

use relmsg_config::StoreOptions;
use relmsg_db::conn::ConnectionProvider;
use relmsg_db::SagaStore;
use relmsg_schemas::StoreError;
use relmsg_testkit::fixtures::{TestSaga, TestSagaCodec};

#[tokio::test]
async fn only_one_of_two_concurrent_updates_succeeds() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let store = Arc::new(SagaStore::<TestSagaCodec>::new(
        ConnectionProvider::owned(pool),
        StoreOptions::default(),
    )?);
    let correlation_id = Uuid::new_v4();

    let initial = TestSaga {
        state: "Started".to_string(),
        completed: false,
    };
    let saved = store.save(correlation_id, &initial).await?;
    assert_eq!(saved.version, 0);

    let a = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .update(
                    correlation_id,
                    0,
                    &TestSaga {
                        state: "AdvancedByA".to_string(),
                        completed: false,
                    },
                )
                .await
        })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .update(
                    correlation_id,
                    0,
                    &TestSaga {
                        state: "AdvancedByB".to_string(),
                        completed: false,
                    },
                )
                .await
        })
    };

    let result_a = a.await.expect("task A panicked");
    let result_b = b.await.expect("task B panicked");

    let successes = [&result_a, &result_b].into_iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent update must succeed");

    let failure = if result_a.is_err() { &result_a } else { &result_b };
    match failure {
        Err(StoreError::ConcurrencyConflict { expected, actual, .. }) => {
            assert_eq!(*expected, 1, "conflict must report the row's actual stored version");
            assert_eq!(*actual, 0, "conflict must report the version the loser attempted");
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }

    let final_state = store.find(correlation_id).await?.expect("saga must still exist");
    assert_eq!(final_state.version, 1);
    assert!(final_state.saga.state == "AdvancedByA" || final_state.saga.state == "AdvancedByB");

    Ok(())
}
