//! Durable Queue: priority + FIFO ordering with visibility-timeout lease
//! semantics, claimed via the same `FOR UPDATE SKIP LOCKED` pattern used
//! for the Outbox.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use relmsg_config::StoreOptions;
use relmsg_schemas::{EnqueueOptions, QueueEntry, StoreError};

use crate::conn::ConnectionProvider;
use crate::schema::SchemaInitializer;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "Queue";

pub struct QueueStore {
    conn: ConnectionProvider,
    schema: SchemaInitializer,
    table: String,
    lease_duration: chrono::Duration,
}

impl QueueStore {
    pub fn new(
        conn: ConnectionProvider,
        options: StoreOptions,
        lease_duration: chrono::Duration,
    ) -> Result<Self, StoreError> {
        let table = qualified(&options.schema, &options.table_names.queue);
        let schema = SchemaInitializer::new(conn.clone(), options)?;
        Ok(Self {
            conn,
            schema,
            table,
            lease_duration,
        })
    }

    async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.schema.ensure_initialized().await
    }

    pub async fn enqueue(
        &self,
        queue_name: &str,
        message_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<QueueEntry, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let visible_at = options.delay.map(|d| now + d);
        let delay_minutes = options.delay.map(|d| d.num_minutes() as i32);

        let sql = format!(
            "INSERT INTO {} (id, queue_name, message_type, payload, priority, enqueued_at, \
                              visible_at, dequeue_count, delay_minutes, acknowledged) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, false) \
             RETURNING id, queue_name, message_type, payload, priority, enqueued_at, visible_at, \
                       dequeue_count, delay_minutes, acknowledged",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(queue_name)
            .bind(message_type)
            .bind(&payload)
            .bind(options.priority)
            .bind(now)
            .bind(visible_at)
            .bind(delay_minutes)
            .fetch_one(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(&id), e))?;

        row_to_entry(&row)
    }

    /// `dequeue(queueName)` (§4.C.4): selects the single visible row with
    /// max `priority`, ties broken by min `enqueued_at`, locked with
    /// `FOR UPDATE SKIP LOCKED` so concurrent dequeuers never observe the
    /// same row (§8 "never both return the same entry"). Pushes
    /// `visible_at` forward by the lease window.
    pub async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let now = Utc::now();
        let new_visible_at = now + self.lease_duration;

        let sql = format!(
            "WITH candidate AS ( \
                 SELECT id FROM {table} \
                 WHERE queue_name = $1 AND acknowledged = false \
                   AND (visible_at IS NULL OR visible_at <= $2) \
                 ORDER BY priority DESC, enqueued_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE {table} \
                SET dequeue_count = dequeue_count + 1, visible_at = $3 \
              WHERE id IN (SELECT id FROM candidate) \
             RETURNING id, queue_name, message_type, payload, priority, enqueued_at, visible_at, \
                       dequeue_count, delay_minutes, acknowledged",
            table = self.table
        );
        let row = sqlx::query(&sql)
            .bind(queue_name)
            .bind(now)
            .bind(new_visible_at)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;

        row.as_ref().map(row_to_entry).transpose()
    }

    /// `peek(queueName, count)` (§4.C.4): no lock, no state change.
    pub async fn peek(&self, queue_name: &str, count: i64) -> Result<Vec<QueueEntry>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let now = Utc::now();
        let sql = format!(
            "SELECT id, queue_name, message_type, payload, priority, enqueued_at, visible_at, \
                    dequeue_count, delay_minutes, acknowledged \
             FROM {} \
             WHERE queue_name = $1 AND acknowledged = false \
               AND (visible_at IS NULL OR visible_at <= $2) \
             ORDER BY priority DESC, enqueued_at ASC \
             LIMIT $3",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(queue_name)
            .bind(now)
            .bind(count)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        rows.iter().map(row_to_entry).collect()
    }

    pub async fn acknowledge(&self, queue_name: &str, id: &str) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "UPDATE {} SET acknowledged = true WHERE id = $1 AND queue_name = $2 RETURNING id",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(queue_name)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        Ok(row.is_some())
    }

    /// `reject(queueName, id, requeue)` (§4.C.4): `requeue=true` makes the
    /// row immediately visible again; `requeue=false` deletes it.
    pub async fn reject(&self, queue_name: &str, id: &str, requeue: bool) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        if requeue {
            let sql = format!(
                "UPDATE {} SET visible_at = $3 WHERE id = $1 AND queue_name = $2 RETURNING id",
                self.table
            );
            let row = sqlx::query(&sql)
                .bind(id)
                .bind(queue_name)
                .bind(Utc::now())
                .fetch_optional(&mut *guard)
                .await
                .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
            Ok(row.is_some())
        } else {
            let sql = format!(
                "DELETE FROM {} WHERE id = $1 AND queue_name = $2 RETURNING id",
                self.table
            );
            let row = sqlx::query(&sql)
                .bind(id)
                .bind(queue_name)
                .fetch_optional(&mut *guard)
                .await
                .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
            Ok(row.is_some())
        }
    }

    pub async fn get_queue_depth(&self, queue_name: &str) -> Result<i64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT count(*) AS n FROM {} WHERE queue_name = $1 AND acknowledged = false",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(queue_name)
            .fetch_one(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        row.try_get::<i64, _>("n")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))
    }

    /// A no-op: queues are implicit (§4.C.4, §9 — `createQueue`/`deleteQueue`
    /// asymmetry resolved in favor of "implicit queues only", so
    /// `createQueue` is dropped from the public surface entirely and this
    /// exists only to document that decision at the call site).
    pub async fn queue_exists(&self, queue_name: &str) -> Result<bool, StoreError> {
        Ok(self.get_queue_depth(queue_name).await? > 0)
    }

    pub async fn get_queues(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT DISTINCT queue_name FROM {} WHERE acknowledged = false ORDER BY queue_name",
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        rows.iter()
            .map(|r| {
                r.try_get::<String, _>("queue_name")
                    .map_err(|e| map_sqlx_error(COMPONENT, None, e))
            })
            .collect()
    }

    /// `deleteQueue` (§4.C.4): removes all rows for the named queue.
    pub async fn delete_queue(&self, queue_name: &str) -> Result<u64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!("DELETE FROM {} WHERE queue_name = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(queue_name)
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

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<QueueEntry, StoreError> {
    let delay_minutes: Option<i32> = row
        .try_get("delay_minutes")
        .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
    Ok(QueueEntry {
        id: row.try_get("id").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        queue_name: row
            .try_get("queue_name")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        message_type: row
            .try_get("message_type")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        payload: row.try_get("payload").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        priority: row
            .try_get("priority")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        enqueued_at: row
            .try_get("enqueued_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        visible_at: row
            .try_get("visible_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        dequeue_count: row
            .try_get("dequeue_count")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        delay: delay_minutes.map(|m| chrono::Duration::minutes(m as i64)),
        acknowledged: row
            .try_get("acknowledged")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
    })
}
