//! Component A — Connection/Txn Provider (spec §4.A).
//!
//! Two modes:
//! - `Owned`: each operation borrows a short-lived connection from the
//!   pool. Thread-safe, re-entrant, no ambient transaction.
//! - `Shared`: every operation executes against the same transaction,
//!   serialized behind a mutex (spec §5: "Shared-connection mode is NOT
//!   thread-safe across operations; callers MUST serialize use of the
//!   UoW"). Used by `UnitOfWork` to make every store handle it produces
//!   participate in one outer transaction.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use relmsg_schemas::StoreError;

use crate::sqlerr::map_sqlx_error;

#[derive(Clone)]
pub enum ConnectionProvider {
    Owned(PgPool),
    Shared(Arc<Mutex<Transaction<'static, Postgres>>>),
}

impl ConnectionProvider {
    pub fn owned(pool: PgPool) -> Self {
        ConnectionProvider::Owned(pool)
    }

    pub fn shared(txn: Arc<Mutex<Transaction<'static, Postgres>>>) -> Self {
        ConnectionProvider::Shared(txn)
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ConnectionProvider::Shared(_))
    }

    /// Acquire an executor for the next SQL call. In owned mode this pulls
    /// a connection from the pool (returned to the pool on drop); in
    /// shared mode this takes the UoW's transaction mutex for the
    /// duration of the guard.
    pub async fn acquire(&self, component: &'static str) -> Result<ExecGuard, StoreError> {
        match self {
            ConnectionProvider::Owned(pool) => {
                let conn = pool
                    .acquire()
                    .await
                    .map_err(|e| map_sqlx_error(component, None, e))?;
                Ok(ExecGuard::Pooled(conn))
            }
            ConnectionProvider::Shared(txn) => {
                let guard = txn.clone().lock_owned().await;
                Ok(ExecGuard::Shared(guard))
            }
        }
    }
}

pub enum ExecGuard {
    Pooled(PoolConnection<Postgres>),
    Shared(OwnedMutexGuard<Transaction<'static, Postgres>>),
}

impl Deref for ExecGuard {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            ExecGuard::Pooled(c) => c,
            ExecGuard::Shared(tx) => tx,
        }
    }
}

impl DerefMut for ExecGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            ExecGuard::Pooled(c) => c,
            ExecGuard::Shared(tx) => tx,
        }
    }
}
