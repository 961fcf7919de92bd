//! Saga Store (spec §4.C.6), generic over a caller-supplied `SagaCodec` so
//! the store never performs runtime reflection to reconstruct a concrete
//! type (§9: "model as a typed handle parameterized by saga type with a
//! mandatory codec; avoid dynamic dispatch on arbitrary objects").

use std::marker::PhantomData;

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use relmsg_config::StoreOptions;
use relmsg_schemas::{SagaCodec, StoreError, VersionedSaga};

use crate::conn::ConnectionProvider;
use crate::schema::SchemaInitializer;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "Saga";

pub struct SagaStore<C: SagaCodec> {
    conn: ConnectionProvider,
    schema: SchemaInitializer,
    table: String,
    _codec: PhantomData<C>,
}

impl<C: SagaCodec> SagaStore<C> {
    pub fn new(conn: ConnectionProvider, options: StoreOptions) -> Result<Self, StoreError> {
        let table = qualified(&options.schema, &options.table_names.sagas);
        let schema = SchemaInitializer::new(conn.clone(), options)?;
        Ok(Self {
            conn,
            schema,
            table,
            _codec: PhantomData,
        })
    }

    async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.schema.ensure_initialized().await
    }

    pub async fn find(&self, correlation_id: Uuid) -> Result<Option<VersionedSaga<C::Saga>>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT correlation_id, saga_type, current_state, created_at, updated_at, \
                    is_completed, version, saga_data \
             FROM {} WHERE correlation_id = $1 AND saga_type = $2",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(correlation_id)
            .bind(C::saga_type())
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(&correlation_id.to_string()), e))?;
        row.as_ref().map(row_to_versioned::<C>).transpose()
    }

    pub async fn find_by_state(
        &self,
        state: &str,
        max_results: i64,
    ) -> Result<Vec<VersionedSaga<C::Saga>>, StoreError> {
        self.ensure_ready().await?;
        let max_results = max_results.min(1000);
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT correlation_id, saga_type, current_state, created_at, updated_at, \
                    is_completed, version, saga_data \
             FROM {} WHERE saga_type = $1 AND current_state = $2 \
             ORDER BY updated_at DESC LIMIT $3",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(C::saga_type())
            .bind(state)
            .bind(max_results)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        rows.iter().map(row_to_versioned::<C>).collect()
    }

    /// `findStale(olderThan, maxResults)` (§4.C.6): incomplete sagas whose
    /// `updated_at` predates `now - olderThan`, oldest first.
    pub async fn find_stale(
        &self,
        older_than: chrono::Duration,
        max_results: i64,
    ) -> Result<Vec<VersionedSaga<C::Saga>>, StoreError> {
        self.ensure_ready().await?;
        let max_results = max_results.min(1000);
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let threshold = Utc::now() - older_than;
        let sql = format!(
            "SELECT correlation_id, saga_type, current_state, created_at, updated_at, \
                    is_completed, version, saga_data \
             FROM {} WHERE saga_type = $1 AND is_completed = false AND updated_at < $2 \
             ORDER BY updated_at ASC LIMIT $3",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(C::saga_type())
            .bind(threshold)
            .bind(max_results)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        rows.iter().map(row_to_versioned::<C>).collect()
    }

    /// `save(saga)` (§4.C.6): a unique-violation on `correlation_id` maps
    /// to `Duplicate` — callers should use `update` instead.
    pub async fn save(&self, correlation_id: Uuid, saga: &C::Saga) -> Result<VersionedSaga<C::Saga>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let now = Utc::now();
        let current_state = C::current_state(saga);
        let is_completed = C::is_completed(saga);
        let saga_data = C::encode(saga);

        let sql = format!(
            "INSERT INTO {} (correlation_id, saga_type, current_state, created_at, updated_at, \
                              is_completed, version, saga_data) \
             VALUES ($1, $2, $3, $4, $4, $5, 0, $6)",
            self.table
        );
        sqlx::query(&sql)
            .bind(correlation_id)
            .bind(C::saga_type())
            .bind(&current_state)
            .bind(now)
            .bind(is_completed)
            .bind(&saga_data)
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(&correlation_id.to_string()), e))?;

        Ok(VersionedSaga {
            correlation_id,
            saga: C::decode(saga_data).map_err(|err| StoreError::Serialization {
                component: COMPONENT,
                key: Some(correlation_id.to_string()),
                message: err.to_string(),
            })?,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// `update(saga)` (§4.C.6): the optimistic-concurrency protocol. The
    /// version check and the write happen in one `UPDATE ... WHERE version =
    /// $expected` statement, so two racing callers can never both believe
    /// they won — the loser's statement simply affects zero rows, which we
    /// turn into `ConcurrencyConflict` by re-reading the current version.
    pub async fn update(
        &self,
        correlation_id: Uuid,
        expected_version: i64,
        saga: &C::Saga,
    ) -> Result<VersionedSaga<C::Saga>, StoreError> {
        self.ensure_ready().await?;
        let key = correlation_id.to_string();
        let mut guard = self.conn.acquire(COMPONENT).await?;

        let now = Utc::now();
        let new_version = expected_version + 1;
        let current_state = C::current_state(saga);
        let is_completed = C::is_completed(saga);
        let saga_data = C::encode(saga);

        let update_sql = format!(
            "UPDATE {} SET current_state = $1, updated_at = $2, is_completed = $3, version = $4, saga_data = $5 \
             WHERE correlation_id = $6 AND saga_type = $7 AND version = $8 \
             RETURNING version",
            self.table
        );
        let updated = sqlx::query(&update_sql)
            .bind(&current_state)
            .bind(now)
            .bind(is_completed)
            .bind(new_version)
            .bind(&saga_data)
            .bind(correlation_id)
            .bind(C::saga_type())
            .bind(expected_version)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(&key), e))?;

        if updated.is_none() {
            let current_sql = format!(
                "SELECT version FROM {} WHERE correlation_id = $1 AND saga_type = $2",
                self.table
            );
            let row = sqlx::query(&current_sql)
                .bind(correlation_id)
                .bind(C::saga_type())
                .fetch_optional(&mut *guard)
                .await
                .map_err(|e| map_sqlx_error(COMPONENT, Some(&key), e))?;

            return match row {
                None => Err(StoreError::NotFound {
                    component: COMPONENT,
                    key,
                }),
                Some(row) => {
                    let stored_version: i64 =
                        row.try_get("version").map_err(|e| map_sqlx_error(COMPONENT, Some(&key), e))?;
                    Err(StoreError::ConcurrencyConflict {
                        component: COMPONENT,
                        key,
                        expected: stored_version,
                        actual: expected_version,
                    })
                }
            };
        }

        Ok(VersionedSaga {
            correlation_id,
            saga: C::decode(saga_data).map_err(|err| StoreError::Serialization {
                component: COMPONENT,
                key: Some(key),
                message: err.to_string(),
            })?,
            version: new_version,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn delete(&self, correlation_id: Uuid) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "DELETE FROM {} WHERE correlation_id = $1 AND saga_type = $2 RETURNING correlation_id",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(correlation_id)
            .bind(C::saga_type())
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(&correlation_id.to_string()), e))?;
        Ok(row.is_some())
    }
}

fn qualified(schema: &Option<String>, table: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{table}"),
        None => table.to_string(),
    }
}

fn row_to_versioned<C: SagaCodec>(row: &sqlx::postgres::PgRow) -> Result<VersionedSaga<C::Saga>, StoreError> {
    let correlation_id: Uuid = row
        .try_get("correlation_id")
        .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
    let saga_data: serde_json::Value = row.try_get("saga_data").map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
    let saga = C::decode(saga_data).map_err(|err| StoreError::Serialization {
        component: COMPONENT,
        key: Some(correlation_id.to_string()),
        message: err.to_string(),
    })?;

    Ok(VersionedSaga {
        correlation_id,
        saga,
        version: row.try_get("version").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
    })
}
