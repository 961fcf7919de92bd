//! Dead-Letter Store (spec §4.C.5). Terminal bucket for irrecoverable
//! messages; transitions out of `Active` are one-way.

use chrono::Utc;
use sqlx::Row;
use std::collections::BTreeMap;
use uuid::Uuid;

use relmsg_config::StoreOptions;
use relmsg_schemas::{DeadLetterContext, DeadLetterEntry, DeadLetterStatistics, DeadLetterStatus, StoreError};

use crate::conn::ConnectionProvider;
use crate::schema::SchemaInitializer;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "DeadLetter";

pub struct DeadLetterStore {
    conn: ConnectionProvider,
    schema: SchemaInitializer,
    table: String,
}

impl DeadLetterStore {
    pub fn new(conn: ConnectionProvider, options: StoreOptions) -> Result<Self, StoreError> {
        let table = qualified(&options.schema, &options.table_names.dead_letter);
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

    pub async fn send(
        &self,
        message_payload: serde_json::Value,
        message_type: &str,
        ctx: DeadLetterContext,
    ) -> Result<String, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let sql = format!(
            "INSERT INTO {} (id, message_payload, message_type, reason, component, retry_count, \
                              failure_time, status, created_at, exception_message, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(&message_payload)
            .bind(message_type)
            .bind(&ctx.reason)
            .bind(ctx.component)
            .bind(ctx.retry_count)
            .bind(ctx.failure_time)
            .bind(DeadLetterStatus::Active.as_i32())
            .bind(now)
            .bind(&ctx.exception_message)
            .bind(&ctx.metadata)
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(&id), e))?;

        Ok(id)
    }

    /// `get<T>(limit)` (§4.C.5): Active rows for `message_type`, newest
    /// failure first.
    pub async fn get(&self, message_type: &str, limit: i64) -> Result<Vec<DeadLetterEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT id, message_payload, message_type, reason, component, retry_count, \
                    failure_time, status, created_at, retried_at, discarded_at, \
                    exception_message, metadata \
             FROM {} WHERE status = $1 AND message_type = $2 \
             ORDER BY failure_time DESC LIMIT $3",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(DeadLetterStatus::Active.as_i32())
            .bind(message_type)
            .bind(limit)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        rows.iter().map(row_to_entry).collect()
    }

    pub async fn retry(&self, id: &str) -> Result<bool, StoreError> {
        self.transition(id, DeadLetterStatus::Retried, "retried_at").await
    }

    pub async fn discard(&self, id: &str) -> Result<bool, StoreError> {
        self.transition(id, DeadLetterStatus::Discarded, "discarded_at").await
    }

    async fn transition(
        &self,
        id: &str,
        new_status: DeadLetterStatus,
        timestamp_column: &str,
    ) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "UPDATE {table} SET status = $2, {col} = $3 WHERE id = $1 AND status = $4 RETURNING id",
            table = self.table,
            col = timestamp_column
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(new_status.as_i32())
            .bind(Utc::now())
            .bind(DeadLetterStatus::Active.as_i32())
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        Ok(row.is_some())
    }

    pub async fn get_count(&self) -> Result<i64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!("SELECT count(*) AS n FROM {} WHERE status = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(DeadLetterStatus::Active.as_i32())
            .fetch_one(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        row.try_get::<i64, _>("n")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))
    }

    /// `getStatistics()` (§4.C.5).
    pub async fn get_statistics(&self) -> Result<DeadLetterStatistics, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;

        let counts_sql = format!(
            "SELECT \
                count(*) FILTER (WHERE status = 0) AS active, \
                count(*) FILTER (WHERE status = 1) AS retried, \
                count(*) FILTER (WHERE status = 2) AS discarded, \
                count(*) AS total, \
                min(failure_time) FILTER (WHERE status = 0) AS oldest_active, \
                max(failure_time) FILTER (WHERE status = 0) AS newest_active \
             FROM {}",
            self.table
        );
        let counts = sqlx::query(&counts_sql)
            .fetch_one(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;

        let by_component_sql = format!(
            "SELECT component, count(*) AS n FROM {} WHERE status = 0 GROUP BY component",
            self.table
        );
        let by_component_rows = sqlx::query(&by_component_sql)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        let mut count_by_component = BTreeMap::new();
        for row in &by_component_rows {
            let component: String = row.try_get("component").map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
            let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
            count_by_component.insert(component, n);
        }

        let reasons_sql = format!(
            "SELECT reason, count(*) AS n FROM {} WHERE status = 0 \
             GROUP BY reason ORDER BY n DESC LIMIT 10",
            self.table
        );
        let reason_rows = sqlx::query(&reasons_sql)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        let mut top_reasons = Vec::with_capacity(reason_rows.len());
        for row in &reason_rows {
            let reason: String = row.try_get("reason").map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
            let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
            top_reasons.push((reason, n));
        }

        Ok(DeadLetterStatistics {
            active: counts.try_get("active").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
            retried: counts.try_get("retried").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
            discarded: counts.try_get("discarded").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
            total: counts.try_get("total").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
            count_by_component,
            top_reasons,
            oldest_active: counts
                .try_get("oldest_active")
                .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
            newest_active: counts
                .try_get("newest_active")
                .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        })
    }
}

fn qualified(schema: &Option<String>, table: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{table}"),
        None => table.to_string(),
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<DeadLetterEntry, StoreError> {
    let status_i32: i32 = row.try_get("status").map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
    let status = DeadLetterStatus::from_i32(status_i32).ok_or_else(|| StoreError::Serialization {
        component: COMPONENT,
        key: row.try_get::<String, _>("id").ok(),
        message: format!("unrecognized dead-letter status {status_i32}"),
    })?;

    Ok(DeadLetterEntry {
        id: row.try_get("id").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        message_payload: row
            .try_get("message_payload")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        message_type: row
            .try_get("message_type")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        reason: row.try_get("reason").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        component: row
            .try_get("component")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        retry_count: row
            .try_get("retry_count")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        failure_time: row
            .try_get("failure_time")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        status,
        created_at: row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        retried_at: row
            .try_get("retried_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        discarded_at: row
            .try_get("discarded_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        exception_message: row
            .try_get("exception_message")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        metadata: row
            .try_get("metadata")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
    })
}
