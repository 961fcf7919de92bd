use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A generic stored message (§3.1). `message_type` is a type tag the
/// caller-supplied type registry resolves on read; this crate never
/// attempts to reconstruct a concrete Rust type from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub message_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub collection: Option<String>,
    pub metadata: Option<Value>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Options accepted by `MessageStore::store`.
#[derive(Debug, Clone, Default)]
pub struct StoreMessageOptions {
    pub ttl: Option<chrono::Duration>,
    pub collection: Option<String>,
    pub metadata: Option<Value>,
    pub correlation_id: Option<String>,
}

/// Whitelisted `ORDER BY` columns for `MessageStore::query` (§4.C.1,
/// §9 "free-form column names MUST NOT be interpolated").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrderColumn {
    Timestamp,
    CreatedAt,
}

impl MessageOrderColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            MessageOrderColumn::Timestamp => "timestamp",
            MessageOrderColumn::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub collection: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub order_by: Option<MessageOrderColumn>,
    pub direction: SortDirection,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Desc
    }
}
