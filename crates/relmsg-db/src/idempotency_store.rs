//! Idempotency Cache (spec §4.C.7). Upsert semantics throughout — storing
//! under an existing key overwrites status and result atomically and is
//! never an error (§7: "Idempotency: upsert, not raised").

use chrono::Utc;
use sqlx::Row;

use relmsg_config::StoreOptions;
use relmsg_schemas::{IdempotencyResponse, IdempotencyStatus, StoreError};

use crate::conn::ConnectionProvider;
use crate::schema::SchemaInitializer;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "Idempotency";

pub struct IdempotencyStore {
    conn: ConnectionProvider,
    schema: SchemaInitializer,
    table: String,
}

impl IdempotencyStore {
    pub fn new(conn: ConnectionProvider, options: StoreOptions) -> Result<Self, StoreError> {
        let table = qualified(&options.schema, &options.table_names.idempotency_responses);
        let schema = SchemaInitializer::new(conn.clone(), options)?;
        Ok(Self {
            conn,
            schema,
            table,
        })
    }

    async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.schema.ensure_initialized().await
    }

    /// `get(key)` (§4.C.7): excludes expired rows, matching §3.7's
    /// "row with expires_at <= now is absent to readers" invariant.
    pub async fn get(&self, key: &str) -> Result<Option<IdempotencyResponse>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT idempotency_key, status, success_result, failure_type, failure_message, \
                    failure_stack_trace, stored_at, expires_at \
             FROM {} WHERE idempotency_key = $1 AND expires_at > $2",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(Utc::now())
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(key), e))?;
        row.as_ref().map(row_to_response).transpose()
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    pub async fn store_success(
        &self,
        key: &str,
        result: serde_json::Value,
        ttl: chrono::Duration,
    ) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO {table} (idempotency_key, status, success_result, failure_type, \
                                   failure_message, failure_stack_trace, stored_at, expires_at) \
             VALUES ($1, $2, $3, NULL, NULL, NULL, $4, $5) \
             ON CONFLICT (idempotency_key) DO UPDATE SET \
                status = EXCLUDED.status, \
                success_result = EXCLUDED.success_result, \
                failure_type = NULL, \
                failure_message = NULL, \
                failure_stack_trace = NULL, \
                stored_at = EXCLUDED.stored_at, \
                expires_at = EXCLUDED.expires_at",
            table = self.table
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(IdempotencyStatus::Success.as_i16())
            .bind(&result)
            .bind(now)
            .bind(now + ttl)
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(key), e))?;
        Ok(())
    }

    pub async fn store_failure(
        &self,
        key: &str,
        failure_type: &str,
        failure_message: &str,
        failure_stack_trace: Option<&str>,
        ttl: chrono::Duration,
    ) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO {table} (idempotency_key, status, success_result, failure_type, \
                                   failure_message, failure_stack_trace, stored_at, expires_at) \
             VALUES ($1, $2, NULL, $3, $4, $5, $6, $7) \
             ON CONFLICT (idempotency_key) DO UPDATE SET \
                status = EXCLUDED.status, \
                success_result = NULL, \
                failure_type = EXCLUDED.failure_type, \
                failure_message = EXCLUDED.failure_message, \
                failure_stack_trace = EXCLUDED.failure_stack_trace, \
                stored_at = EXCLUDED.stored_at, \
                expires_at = EXCLUDED.expires_at",
            table = self.table
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(IdempotencyStatus::Failure.as_i16())
            .bind(failure_type)
            .bind(failure_message)
            .bind(failure_stack_trace)
            .bind(now)
            .bind(now + ttl)
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(key), e))?;
        Ok(())
    }

    /// `cleanupExpired()` (§4.C.7): returns the number of rows removed.
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!("DELETE FROM {} WHERE expires_at <= $1", self.table);
        let result = sqlx::query(&sql)
            .bind(Utc::now())
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        Ok(result.rows_affected())
    }
}

fn qualified(schema: &Option<String>, table: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{table}"),
        None => table.to_string(),
    }
}

fn row_to_response(row: &sqlx::postgres::PgRow) -> Result<IdempotencyResponse, StoreError> {
    let status_i16: i16 = row.try_get("status").map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
    let status = IdempotencyStatus::from_i16(status_i16).ok_or_else(|| StoreError::Serialization {
        component: COMPONENT,
        key: row.try_get::<String, _>("idempotency_key").ok(),
        message: format!("unrecognized idempotency status {status_i16}"),
    })?;

    Ok(IdempotencyResponse {
        idempotency_key: row
            .try_get("idempotency_key")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        status,
        success_result: row
            .try_get("success_result")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        failure_type: row
            .try_get("failure_type")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        failure_message: row
            .try_get("failure_message")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        failure_stack_trace: row
            .try_get("failure_stack_trace")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        stored_at: row.try_get("stored_at").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
    })
}
