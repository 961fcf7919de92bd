//! Live-database bootstrap for scenario tests: connect via the env var,
//! run migrations, hand back a ready pool, or `None` when the env var is
//! unset so CI without a database skips rather than fails.

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Returns `Ok(None)` (not an error) when `RELMSG_DATABASE_URL` is unset,
/// so `#[ignore]`-gated scenario tests can early-return cleanly.
pub async fn try_test_pool() -> Result<Option<PgPool>> {
    if std::env::var(relmsg_db::ENV_DB_URL).is_err() {
        return Ok(None);
    }
    let pool = relmsg_db::testkit_db_pool().await.context("bootstrap test db pool")?;
    Ok(Some(pool))
}

/// Wipes every core table. Tests call this between scenarios instead of
/// standing up a fresh database per test.
pub async fn truncate_all(pool: &PgPool) -> Result<()> {
    sqlx::query(
        "TRUNCATE TABLE messages, outbox, inbox, queue, dead_letter, sagas, idempotency_responses",
    )
    .execute(pool)
    .await
    .context("truncate core tables")?;
    Ok(())
}
