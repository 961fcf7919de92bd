use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadLetterStatus {
    Active,
    Retried,
    Discarded,
}

impl DeadLetterStatus {
    pub fn as_i32(&self) -> i32 {
        match self {
            DeadLetterStatus::Active => 0,
            DeadLetterStatus::Retried => 1,
            DeadLetterStatus::Discarded => 2,
        }
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(DeadLetterStatus::Active),
            1 => Some(DeadLetterStatus::Retried),
            2 => Some(DeadLetterStatus::Discarded),
            _ => None,
        }
    }
}

/// §3.5. Generic over the payload's logical type via `message_type`; the
/// store itself never deserializes the payload (no runtime reflection —
/// §9 "replace with an explicit type registry owned by the Serializer
/// collaborator").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: String,
    pub message_payload: Value,
    pub message_type: String,
    pub reason: String,
    pub component: String,
    pub retry_count: i32,
    pub failure_time: DateTime<Utc>,
    pub status: DeadLetterStatus,
    pub created_at: DateTime<Utc>,
    pub retried_at: Option<DateTime<Utc>>,
    pub discarded_at: Option<DateTime<Utc>>,
    pub exception_message: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct DeadLetterContext {
    pub reason: String,
    pub component: &'static str,
    pub retry_count: i32,
    pub failure_time: DateTime<Utc>,
    pub exception_message: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterStatistics {
    pub active: i64,
    pub retried: i64,
    pub discarded: i64,
    pub total: i64,
    pub count_by_component: BTreeMap<String, i64>,
    pub top_reasons: Vec<(String, i64)>,
    pub oldest_active: Option<DateTime<Utc>>,
    pub newest_active: Option<DateTime<Utc>>,
}
