//! Message Store (spec §4.C.1). `ORDER BY` columns are whitelisted via
//! `MessageOrderColumn::as_sql()` (§9: "free-form column names MUST NOT be
//! interpolated") rather than accepted as a raw string.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use relmsg_config::StoreOptions;
use relmsg_schemas::{MessageQuery, MessageRecord, StoreError, StoreMessageOptions};

use crate::conn::ConnectionProvider;
use crate::schema::SchemaInitializer;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "MessageStore";

pub struct MessageStore {
    conn: ConnectionProvider,
    schema: SchemaInitializer,
    table: String,
}

impl MessageStore {
    pub fn new(conn: ConnectionProvider, options: StoreOptions) -> Result<Self, StoreError> {
        let table = qualified(&options.schema, &options.table_names.messages);
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

    pub async fn store(
        &self,
        message_type: &str,
        payload: serde_json::Value,
        options: StoreMessageOptions,
    ) -> Result<String, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = options.ttl.map(|ttl| now + ttl);

        let sql = format!(
            "INSERT INTO {} (id, message_type, payload, timestamp, correlation_id, collection, \
                              metadata, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $4)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(message_type)
            .bind(&payload)
            .bind(now)
            .bind(&options.correlation_id)
            .bind(&options.collection)
            .bind(&options.metadata)
            .bind(expires_at)
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(&id), e))?;

        Ok(id)
    }

    /// `retrieve<T>(id)` (§4.C.1): returns `None` if absent or expired
    /// (§3.1 "a row with expires_at <= now MUST be treated as absent").
    pub async fn retrieve(&self, id: &str) -> Result<Option<MessageRecord>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT id, message_type, payload, timestamp, correlation_id, collection, metadata, \
                    expires_at, created_at \
             FROM {} WHERE id = $1 AND (expires_at IS NULL OR expires_at > $2)",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(Utc::now())
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.retrieve(id).await?.is_some())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!("DELETE FROM {} WHERE id = $1 RETURNING id", self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        Ok(row.is_some())
    }

    pub async fn update(&self, id: &str, payload: serde_json::Value) -> Result<bool, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!("UPDATE {} SET payload = $2 WHERE id = $1 RETURNING id", self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&payload)
            .fetch_optional(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, Some(id), e))?;
        Ok(row.is_some())
    }

    pub async fn clear(&self) -> Result<u64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!("DELETE FROM {}", self.table);
        let result = sqlx::query(&sql)
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        Ok(result.rows_affected())
    }

    pub async fn query(&self, query: MessageQuery) -> Result<Vec<MessageRecord>, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let order_column = query
            .order_by
            .map(|c| c.as_sql())
            .unwrap_or_else(|| relmsg_schemas::MessageOrderColumn::Timestamp.as_sql());
        let direction = query.direction.as_sql();
        let limit = query.limit.unwrap_or(100);
        let offset = query.offset.unwrap_or(0);
        let now = Utc::now();

        let sql = format!(
            "SELECT id, message_type, payload, timestamp, correlation_id, collection, metadata, \
                    expires_at, created_at \
             FROM {table} \
             WHERE (expires_at IS NULL OR expires_at > $1) \
               AND ($2::varchar IS NULL OR collection = $2) \
               AND ($3::timestamptz IS NULL OR timestamp >= $3) \
               AND ($4::timestamptz IS NULL OR timestamp <= $4) \
             ORDER BY {order_column} {direction} \
             LIMIT $5 OFFSET $6",
            table = self.table,
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(&query.collection)
            .bind(query.from)
            .bind(query.to)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn count(&self, collection: Option<&str>) -> Result<i64, StoreError> {
        self.ensure_ready().await?;
        let mut guard = self.conn.acquire(COMPONENT).await?;
        let sql = format!(
            "SELECT count(*) AS n FROM {} WHERE (expires_at IS NULL OR expires_at > $1) \
               AND ($2::varchar IS NULL OR collection = $2)",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(collection)
            .fetch_one(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        row.try_get::<i64, _>("n")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))
    }
}

fn qualified(schema: &Option<String>, table: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{table}"),
        None => table.to_string(),
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<MessageRecord, StoreError> {
    Ok(MessageRecord {
        id: row.try_get("id").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        message_type: row
            .try_get("message_type")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        payload: row.try_get("payload").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        timestamp: row.try_get("timestamp").map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        correlation_id: row
            .try_get("correlation_id")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        collection: row
            .try_get("collection")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        metadata: row
            .try_get("metadata")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?,
    })
}
