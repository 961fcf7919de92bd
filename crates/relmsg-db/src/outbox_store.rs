//! Outbox Store (spec §4.C.2). The store records transitions requested by
//! the dispatcher; it never decides retry-vs-fail policy itself (that's
//! `relmsg-dispatch`'s `OutboxPublisher`).

use chrono::Utc;
use sqlx::Row;

use relmsg_config::StoreOptions;
use relmsg_schemas::{AddOutboxOptions, OutboxEntry, OutboxPendingQuery, OutboxStatus, StoreError};

use crate::conn::ConnectionProvider;
use crate::schema::SchemaInitializer;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "Outbox";

pub struct OutboxStore {
    conn: ConnectionProvider,
    schema: SchemaInitializer,
    table: String,
}

impl OutboxStore {
    pub fn new(conn: ConnectionProvider, options: StoreOptions) -> Result<Self, StoreError> {
        let table = qualified(&options.schema, &options.table_names.outbox);
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

    pub async fn add(
        &self,
        id: &str,
        message_type: &str,
        payload: serde_json::Value,
        options: AddOutboxOptions,
    ) -> Result<OutboxEntry, StoreError> {
        self.ensure_ready().await?;
        let now = Utc::now();
        let mut guard = self.conn.acquire(COMPONENT).await?;

        let sql = format!(
            "INSERT INTO {} (id, message_type, payload, destination, status, retry_count, max_retries, created_at) \
             VALUES ($1, $2, $3, $4, 'Pending', 0, $5, $6) \
             RETURNING id, message_type, payload, destination, status, retry_count, max_retries, \
                       created_at, processed_at, next_retry_at, last_error, claimed_at, claimed_by",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(message_type)
            .bind(&payload)
            .bind(&options.destination)
            .bind(options.max_retries)
            .bind(now)
            .fetch_one(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;

        row_to_entry(&row)
    }

    pub async fn get(&self, id: &str) -> Result<Option<OutboxEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT id, message_type, payload, destination, status, retry_count, max_retries, \
                    created_at, processed_at, next_retry_at, last_error, claimed_at, claimed_by \
             FROM {} WHERE id = $1",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        row.as_ref().map(row_to_entry).transpose()
    }

    /// `getPending` (§4.C.2): defaults to `status = Pending`, ordered
    /// `created_at ASC` (FIFO).
    pub async fn get_pending(&self, query: OutboxPendingQuery) -> Result<Vec<OutboxEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let status = query.status.unwrap_or(OutboxStatus::Pending);
        let limit = query.limit.unwrap_or(100);

        let sql = format!(
            "SELECT id, message_type, payload, destination, status, retry_count, max_retries, \
                    created_at, processed_at, next_retry_at, last_error, claimed_at, claimed_by \
             FROM {} \
             WHERE status = $1 \
               AND ($2::timestamptz IS NULL OR created_at < $2) \
               AND ($3::timestamptz IS NULL OR created_at > $3) \
             ORDER BY created_at ASC \
             LIMIT $4",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(query.older_than)
            .bind(query.newer_than)
            .bind(limit)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Atomically claims up to `batch_size` Pending rows for exclusive
    /// dispatch via `FOR UPDATE SKIP LOCKED`, so two dispatcher replicas
    /// never race on the same row (§4.E). Claimed rows that are never
    /// resolved within `claim_timeout` are eligible for
    /// `recover_stale_claims`.
    pub async fn claim_batch(
        &self,
        batch_size: i64,
        claimant: &str,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let now = Utc::now();

        let sql = format!(
            "WITH to_claim AS ( \
                 SELECT id FROM {table} \
                 WHERE status = 'Pending' AND (next_retry_at IS NULL OR next_retry_at <= $1) \
                 ORDER BY created_at ASC \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE {table} \
                SET status = 'Claimed', claimed_at = $1, claimed_by = $3 \
              WHERE id IN (SELECT id FROM to_claim) \
             RETURNING id, message_type, payload, destination, status, retry_count, max_retries, \
                       created_at, processed_at, next_retry_at, last_error, claimed_at, claimed_by",
            table = self.table
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(batch_size)
            .bind(claimant)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Returns Claimed rows older than `claim_timeout` back to Pending
    /// (supplemental: spec §9's stale-claim recovery extended to Outbox).
    pub async fn recover_stale_claims(
        &self,
        claim_timeout: chrono::Duration,
    ) -> Result<u64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let threshold = Utc::now() - claim_timeout;
        let sql = format!(
            "UPDATE {} SET status = 'Pending', claimed_at = NULL, claimed_by = NULL \
             WHERE status = 'Claimed' AND claimed_at < $1",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(threshold)
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        Ok(result.rows_affected())
    }

    pub async fn mark_processed(&self, id: &str) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "UPDATE {} SET status = 'Processed', processed_at = $2 WHERE id = $1 RETURNING id",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(Utc::now())
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        Ok(row.is_some())
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "UPDATE {} SET status = 'Failed', last_error = $2 WHERE id = $1 RETURNING id",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(error)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        Ok(row.is_some())
    }

    /// `updateRetryCount` (§4.C.2): intermediate transition; the caller
    /// computes the backoff schedule. Never lowers `retry_count` (§8).
    /// Reverts status to `Pending` so the row is eligible for `claim_batch`
    /// again once `next_retry_at` elapses.
    pub async fn update_retry_count(
        &self,
        id: &str,
        retry_count: i32,
        next_retry_at: Option<chrono::DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "UPDATE {} SET retry_count = $2, next_retry_at = $3, last_error = COALESCE($4, last_error), \
                            status = 'Pending', claimed_at = NULL, claimed_by = NULL \
             WHERE id = $1 AND retry_count < $2 RETURNING id",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(retry_count)
            .bind(next_retry_at)
            .bind(error)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        Ok(row.is_some())
    }

    pub async fn get_pending_count(&self) -> Result<i64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!("SELECT count(*) AS n FROM {} WHERE status = 'Pending'", self.table);
        let row = sqlx::query(&sql)
            .fetch_one(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        row.try_get::<i64, _>("n")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))
    }

    pub async fn get_failed(&self, limit: i64) -> Result<Vec<OutboxEntry>, StoreError> {
        self.get_pending(OutboxPendingQuery {
            status: Some(OutboxStatus::Failed),
            limit: Some(limit),
            ..Default::default()
        })
        .await
    }
}

fn qualified(schema: &Option<String>, table: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{table}"),
        None => table.to_string(),
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<OutboxEntry, StoreError> {
    let status_str: String = row
        .try_get("status")
        .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
    let status = OutboxStatus::parse(&status_str).ok_or_else(|| StoreError::Serialization {
        component: COMPONENT,
        key: row.try_get::<String, _>("id").ok(),
        message: format!("unrecognized outbox status '{status_str}'"),
    })?;

    Ok(OutboxEntry {
        id: row.try_get("id").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        message_type: row
            .try_get("message_type")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        payload: row.try_get("payload").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        destination: row
            .try_get("destination")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        status,
        retry_count: row
            .try_get("retry_count")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        max_retries: row
            .try_get("max_retries")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        processed_at: row
            .try_get("processed_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        next_retry_at: row
            .try_get("next_retry_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        last_error: row
            .try_get("last_error")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        claimed_at: row
            .try_get("claimed_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        claimed_by: row
            .try_get("claimed_by")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
    })
}
