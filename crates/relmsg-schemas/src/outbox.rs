use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Claimed,
    Processed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "Pending",
            OutboxStatus::Claimed => "Claimed",
            OutboxStatus::Processed => "Processed",
            OutboxStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(OutboxStatus::Pending),
            "Claimed" => Some(OutboxStatus::Claimed),
            "Processed" => Some(OutboxStatus::Processed),
            "Failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

/// `Claimed` makes the `FOR UPDATE SKIP LOCKED` batch claim an explicit,
/// externally observable state rather than an in-transaction-only detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub message_type: String,
    pub payload: Value,
    pub destination: Option<String>,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AddOutboxOptions {
    pub destination: Option<String>,
    pub max_retries: i32,
}

impl Default for AddOutboxOptions {
    fn default() -> Self {
        Self {
            destination: None,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutboxPendingQuery {
    pub status: Option<OutboxStatus>,
    pub older_than: Option<DateTime<Utc>>,
    pub newer_than: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}
