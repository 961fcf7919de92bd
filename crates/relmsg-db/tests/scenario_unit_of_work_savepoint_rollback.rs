//! Scenario: Unit of Work Savepoint Rollback
//!
//! `Outbox.add("a")`, open a savepoint, `Outbox.add("b")`, roll back to the
//! savepoint, commit. "a" must survive; "b" must never have existed.

use serde_json::json;
use uuid::Uuid;

use relmsg_config::StoreOptions;
use relmsg_db::unit_of_work::Isolation;
use relmsg_db::UnitOfWorkFactory;
use relmsg_schemas::AddOutboxOptions;

#[tokio::test]
async fn rollback_to_savepoint_discards_only_the_work_after_it() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let factory = UnitOfWorkFactory::new(pool.clone(), StoreOptions::default());
    let mut uow = factory.begin(Isolation::ReadCommitted).await?;

    let id_a = format!("a-{}", Uuid::new_v4());
    let id_b = format!("b-{}", Uuid::new_v4());

    uow.outbox()?
        .add(&id_a, "order.created", json!({"x": 1}), AddOutboxOptions::default())
        .await?;

    uow.savepoint("before_b").await?;

    uow.outbox()?
        .add(&id_b, "order.created", json!({"x": 2}), AddOutboxOptions::default())
        .await?;

    uow.rollback_to_savepoint("before_b").await?;
    uow.commit().await?;

    let store = relmsg_db::OutboxStore::new(relmsg_db::conn::ConnectionProvider::owned(pool), StoreOptions::default())?;
    assert!(store.get(&id_a).await?.is_some(), "work before the savepoint must survive commit");
    assert!(store.get(&id_b).await?.is_none(), "work after the savepoint must not survive rollback_to_savepoint");

    Ok(())
}

#[tokio::test]
async fn rollback_discards_the_entire_transaction() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let factory = UnitOfWorkFactory::new(pool.clone(), StoreOptions::default());
    let mut uow = factory.begin(Isolation::ReadCommitted).await?;

    let id = format!("rolled-back-{}", Uuid::new_v4());
    uow.outbox()?
        .add(&id, "order.created", json!({"x": 1}), AddOutboxOptions::default())
        .await?;
    uow.rollback().await?;

    let store = relmsg_db::OutboxStore::new(relmsg_db::conn::ConnectionProvider::owned(pool), StoreOptions::default())?;
    assert!(store.get(&id).await?.is_none(), "a fully rolled-back transaction must leave no trace");

    Ok(())
}

#[tokio::test]
async fn begin_while_active_is_rejected() -> anyhow::Result<()> {
    let Some(pool) = relmsg_testkit::try_test_pool().await? else {
        eprintln!("SKIP: RELMSG_DATABASE_URL not set");
        return Ok(());
    };
    relmsg_testkit::truncate_all(&pool).await?;

    let mut uow = relmsg_db::UnitOfWork::new(pool, StoreOptions::default());
    uow.begin(Isolation::ReadCommitted).await?;
    let second_begin = uow.begin(Isolation::ReadCommitted).await;
    assert!(second_begin.is_err(), "a second begin() on an active transaction must fail");

    uow.dispose().await?;
    Ok(())
}
