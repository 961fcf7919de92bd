//! Inbox Store (spec §4.C.3). Deduplicates on insert with a conditional
//! `INSERT ... ON CONFLICT DO NOTHING` rather than catching a uniqueness
//! violation (§9: "prefer a conditional insert that returns a row-count,
//! rather than catching a uniqueness violation").

use chrono::Utc;
use sqlx::Row;

use relmsg_config::StoreOptions;
use relmsg_schemas::{AddInboxOptions, InboxEntry, InboxPendingQuery, InboxStatus, StoreError};

use crate::conn::ConnectionProvider;
use crate::schema::SchemaInitializer;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "Inbox";

pub struct InboxStore {
    conn: ConnectionProvider,
    schema: SchemaInitializer,
    table: String,
}

impl InboxStore {
    pub fn new(conn: ConnectionProvider, options: StoreOptions) -> Result<Self, StoreError> {
        let table = qualified(&options.schema, &options.table_names.inbox);
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

    /// `add(msg, options) → entry | null` (§4.C.3): returns `None` on
    /// duplicate rather than raising, matching §7's Inbox-specific
    /// `Duplicate` propagation rule.
    pub async fn add(
        &self,
        id: &str,
        message_type: &str,
        payload: serde_json::Value,
        options: AddInboxOptions,
    ) -> Result<Option<InboxEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let now = Utc::now();
        let window_minutes = options.deduplication_window.map(|d| d.num_minutes() as i32);

        let sql = format!(
            "INSERT INTO {} (id, message_type, payload, source, status, received_at, \
                              require_idempotency, deduplication_window_minutes) \
             VALUES ($1, $2, $3, $4, 'Pending', $5, $6, $7) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING id, message_type, payload, source, status, received_at, processed_at, \
                       error, require_idempotency, deduplication_window_minutes, claimed_at, claimed_by",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(message_type)
            .bind(&payload)
            .bind(&options.source)
            .bind(now)
            .bind(options.require_idempotency)
            .bind(window_minutes)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;

        row.as_ref().map(row_to_entry).transpose()
    }

    /// `isDuplicate(id, window?)` (§4.C.3): a primary-key lookup, optionally
    /// narrowed to rows received within `window`.
    pub async fn is_duplicate(
        &self,
        id: &str,
        window: Option<chrono::Duration>,
    ) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let threshold = window.map(|w| Utc::now() - w);
        let sql = format!(
            "SELECT 1 FROM {} WHERE id = $1 AND ($2::timestamptz IS NULL OR received_at >= $2)",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(threshold)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        Ok(row.is_some())
    }

    pub async fn get(&self, id: &str) -> Result<Option<InboxEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT id, message_type, payload, source, status, received_at, processed_at, \
                    error, require_idempotency, deduplication_window_minutes, claimed_at, claimed_by \
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

    pub async fn mark_processed(&self, id: &str) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "UPDATE {} SET status = 'Processed', processed_at = $2 \
             WHERE id = $1 AND status <> 'Processed' RETURNING id",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(Utc::now())
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        if row.is_some() {
            return Ok(true);
        }
        // idempotent: already-processed rows report success too (§8
        // "markProcessed is idempotent on the status field").
        self.get(id)
            .await
            .map(|e| matches!(e.map(|e| e.status), Some(InboxStatus::Processed)))
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "UPDATE {} SET status = 'Failed', error = $2 WHERE id = $1 RETURNING id",
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

    /// `getPending` (§4.C.3): oldest-first, matching the processing order
    /// used by the Inbox dispatcher. `getUnprocessed` is this with
    /// `status = Pending`.
    pub async fn get_pending(&self, query: InboxPendingQuery) -> Result<Vec<InboxEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let status = query.status.unwrap_or(InboxStatus::Pending);
        let limit = query.limit.unwrap_or(100);
        let sql = format!(
            "SELECT id, message_type, payload, source, status, received_at, processed_at, \
                    error, require_idempotency, deduplication_window_minutes, claimed_at, claimed_by \
             FROM {} WHERE status = $1 ORDER BY received_at ASC LIMIT $2",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Claims up to `batch_size` Pending rows with `FOR UPDATE SKIP LOCKED`
    /// so concurrent Inbox processor replicas never race on the same row
    /// (§9 supplement, same treatment as Outbox's `claim_batch`).
    pub async fn claim_batch(
        &self,
        batch_size: i64,
        claimant: &str,
    ) -> Result<Vec<InboxEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let now = Utc::now();
        let sql = format!(
            "WITH to_claim AS ( \
                 SELECT id FROM {table} WHERE status = 'Pending' \
                 ORDER BY received_at ASC LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE {table} SET status = 'Claimed', claimed_at = $1, claimed_by = $3 \
              WHERE id IN (SELECT id FROM to_claim) \
             RETURNING id, message_type, payload, source, status, received_at, processed_at, \
                       error, require_idempotency, deduplication_window_minutes, claimed_at, claimed_by",
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

    pub async fn get_unprocessed_count(&self) -> Result<i64, StoreError> {
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

    /// Purges terminal rows (`Processed`/`Failed`) older than `older_than`;
    /// never purges `Pending` (§4.C.3).
    pub async fn cleanup_old_entries(
        &self,
        older_than: chrono::DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "DELETE FROM {} WHERE status IN ('Processed', 'Failed') AND received_at < $1",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(older_than)
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

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<InboxEntry, StoreError> {
    let status_str: String = row
        .try_get("status")
        .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
    let status = InboxStatus::parse(&status_str).ok_or_else(|| StoreError::Serialization {
        component: COMPONENT,
        key: row.try_get::<String, _>("id").ok(),
        message: format!("unrecognized inbox status '{status_str}'"),
    })?;
    let window_minutes: Option<i32> = row
        .try_get("deduplication_window_minutes")
        .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;

    Ok(InboxEntry {
        id: row.try_get("id").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        message_type: row
            .try_get("message_type")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        payload: row.try_get("payload").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        source: row.try_get("source").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        status,
        received_at: row
            .try_get("received_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        processed_at: row
            .try_get("processed_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        error: row.try_get("error").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        require_idempotency: row
            .try_get("require_idempotency")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        deduplication_window: window_minutes.map(|m| chrono::Duration::minutes(m as i64)),
        claimed_at: row
            .try_get("claimed_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        claimed_by: row
            .try_get("claimed_by")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
    })
}
