//! Unit of Work (spec §4.D): transaction lifecycle + savepoints, exposing
//! store handles that all share the same connection/transaction via
//! `ConnectionProvider::Shared`.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use relmsg_config::StoreOptions;
use relmsg_schemas::{SagaCodec, StoreError};

use crate::conn::ConnectionProvider;
use crate::dead_letter_store::DeadLetterStore;
use crate::inbox_store::InboxStore;
use crate::message_store::MessageStore;
use crate::outbox_store::OutboxStore;
use crate::queue_store::QueueStore;
use crate::saga_store::SagaStore;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "UnitOfWork";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Isolation {
    fn as_sql(&self) -> &'static str {
        match self {
            Isolation::ReadCommitted => "READ COMMITTED",
            Isolation::RepeatableRead => "REPEATABLE READ",
            Isolation::Serializable => "SERIALIZABLE",
        }
    }
}

/// A transaction scope shared by every store handle it produces.
///
/// `begin` is idempotent by assertion (§4.D: "a second call while active
/// fails with 'transaction already active'"); `dispose` is safe to call
/// twice.
pub struct UnitOfWork {
    pool: PgPool,
    options: StoreOptions,
    txn: Option<Arc<Mutex<Transaction<'static, Postgres>>>>,
    savepoints: Vec<String>,
}

impl UnitOfWork {
    pub fn new(pool: PgPool, options: StoreOptions) -> Self {
        Self {
            pool,
            options,
            txn: None,
            savepoints: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.txn.is_some()
    }

    pub async fn begin(&mut self, isolation: Isolation) -> Result<(), StoreError> {
        if self.txn.is_some() {
            return Err(StoreError::Serialization {
                component: COMPONENT,
                key: None,
                message: "transaction already active".to_string(),
            });
        }

        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql()))
            .execute(&mut *txn)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;

        self.txn = Some(Arc::new(Mutex::new(txn)));
        self.savepoints.clear();
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), StoreError> {
        let txn = self.take_active()?;
        let txn = Arc::try_unwrap(txn)
            .map_err(|_| StoreError::Serialization {
                component: COMPONENT,
                key: None,
                message: "store handles still hold the transaction".to_string(),
            })?
            .into_inner();
        txn.commit().await.map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        self.savepoints.clear();
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), StoreError> {
        let txn = self.take_active()?;
        let txn = Arc::try_unwrap(txn)
            .map_err(|_| StoreError::Serialization {
                component: COMPONENT,
                key: None,
                message: "store handles still hold the transaction".to_string(),
            })?
            .into_inner();
        txn.rollback().await.map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        self.savepoints.clear();
        Ok(())
    }

    fn take_active(&mut self) -> Result<Arc<Mutex<Transaction<'static, Postgres>>>, StoreError> {
        self.txn.take().ok_or_else(|| StoreError::Serialization {
            component: COMPONENT,
            key: None,
            message: "no active transaction".to_string(),
        })
    }

    fn active_txn(&self) -> Result<&Arc<Mutex<Transaction<'static, Postgres>>>, StoreError> {
        self.txn.as_ref().ok_or_else(|| StoreError::Serialization {
            component: COMPONENT,
            key: None,
            message: "no active transaction".to_string(),
        })
    }

    /// Savepoint names are unique within an active transaction (§4.D).
    pub async fn savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        relmsg_config::validate_identifier(COMPONENT, name)?;
        if self.savepoints.iter().any(|s| s == name) {
            return Err(StoreError::Serialization {
                component: COMPONENT,
                key: Some(name.to_string()),
                message: format!("savepoint '{name}' already exists in this transaction"),
            });
        }
        let txn = self.active_txn()?.clone();
        let mut guard = txn.lock().await;
        sqlx::query(&format!("SAVEPOINT {name}"))
            .execute(&mut **guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(name), e))?;
        drop(guard);
        self.savepoints.push(name.to_string());
        Ok(())
    }

    /// `rollbackToSavepoint` also discards every savepoint created after
    /// the named one (§4.D).
    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        let position = self
            .savepoints
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| StoreError::NotFound {
                component: COMPONENT,
                key: name.to_string(),
            })?;
        let txn = self.active_txn()?.clone();
        let mut guard = txn.lock().await;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .execute(&mut **guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(name), e))?;
        drop(guard);
        self.savepoints.truncate(position + 1);
        Ok(())
    }

    /// Rolls back any active transaction; safe to call twice (§4.D).
    pub async fn dispose(&mut self) -> Result<(), StoreError> {
        if self.txn.is_some() {
            self.rollback().await?;
        }
        Ok(())
    }

    fn provider(&self) -> Result<ConnectionProvider, StoreError> {
        let txn = self.active_txn()?.clone();
        Ok(ConnectionProvider::shared(txn))
    }

    pub fn outbox(&self) -> Result<OutboxStore, StoreError> {
        OutboxStore::new(self.provider()?, self.options.clone())
    }

    pub fn inbox(&self) -> Result<InboxStore, StoreError> {
        InboxStore::new(self.provider()?, self.options.clone())
    }

    pub fn queue(&self, lease_duration: chrono::Duration) -> Result<QueueStore, StoreError> {
        QueueStore::new(self.provider()?, self.options.clone(), lease_duration)
    }

    pub fn messages(&self) -> Result<MessageStore, StoreError> {
        MessageStore::new(self.provider()?, self.options.clone())
    }

    pub fn dead_letter(&self) -> Result<DeadLetterStore, StoreError> {
        DeadLetterStore::new(self.provider()?, self.options.clone())
    }

    pub fn sagas<C: SagaCodec>(&self) -> Result<SagaStore<C>, StoreError> {
        SagaStore::new(self.provider()?, self.options.clone())
    }
}

/// Creates a `UnitOfWork` with an already-active transaction at a chosen
/// isolation level — the typical integration entry point (§4.D "A Factory
/// creates a UoW with an already-active txn").
pub struct UnitOfWorkFactory {
    pool: PgPool,
    options: StoreOptions,
}

impl UnitOfWorkFactory {
    pub fn new(pool: PgPool, options: StoreOptions) -> Self {
        Self { pool, options }
    }

    pub async fn begin(&self, isolation: Isolation) -> Result<UnitOfWork, StoreError> {
        let mut uow = UnitOfWork::new(self.pool.clone(), self.options.clone());
        uow.begin(isolation).await?;
        Ok(uow)
    }
}
