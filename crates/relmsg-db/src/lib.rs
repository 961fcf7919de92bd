//! Relational-store backing for the reliable messaging core: Outbox,
//! Inbox, Durable Queue, Saga Store, Dead-Letter Store, Idempotency
//! Cache, and the Unit of Work that coordinates them in one transaction.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub mod conn;
pub mod dead_letter_store;
pub mod idempotency_store;
pub mod inbox_store;
pub mod message_store;
pub mod outbox_store;
pub mod queue_store;
pub mod saga_store;
pub mod schema;
pub mod sqlerr;
pub mod unit_of_work;

pub use conn::{ConnectionProvider, ExecGuard};
pub use dead_letter_store::DeadLetterStore;
pub use idempotency_store::IdempotencyStore;
pub use inbox_store::InboxStore;
pub use message_store::MessageStore;
pub use outbox_store::OutboxStore;
pub use queue_store::QueueStore;
pub use saga_store::SagaStore;
pub use schema::SchemaInitializer;
pub use unit_of_work::{Isolation, UnitOfWork, UnitOfWorkFactory};

pub const ENV_DB_URL: &str = "RELMSG_DATABASE_URL";

/// Connect to Postgres using `RELMSG_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Test helper used by `relmsg-testkit` and integration tests: connect via
/// `RELMSG_DATABASE_URL`, ensure migrations are applied, return the pool.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations. The seven core tables are also created
/// lazily by `SchemaInitializer`; the migration set exists for deployments
/// that prefer an explicit, version-controlled schema rollout instead of
/// `autoCreateTables`.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence), used by CLI/ops
/// tooling and by `relmsg-testkit`'s pool bootstrap.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='outbox'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_outbox_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_outbox_table: bool,
}
