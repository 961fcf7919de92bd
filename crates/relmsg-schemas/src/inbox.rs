use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboxStatus {
    Pending,
    Claimed,
    Processed,
    Failed,
}

impl InboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxStatus::Pending => "Pending",
            InboxStatus::Claimed => "Claimed",
            InboxStatus::Processed => "Processed",
            InboxStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(InboxStatus::Pending),
            "Claimed" => Some(InboxStatus::Claimed),
            "Processed" => Some(InboxStatus::Processed),
            "Failed" => Some(InboxStatus::Failed),
            _ => None,
        }
    }
}

/// §3.3. `id` doubles as the message id the dedup window is keyed on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: String,
    pub message_type: String,
    pub payload: Value,
    pub source: Option<String>,
    pub status: InboxStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub require_idempotency: bool,
    pub deduplication_window: Option<chrono::Duration>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AddInboxOptions {
    pub source: Option<String>,
    pub require_idempotency: bool,
    pub deduplication_window: Option<chrono::Duration>,
}

impl Default for AddInboxOptions {
    fn default() -> Self {
        Self {
            source: None,
            require_idempotency: true,
            deduplication_window: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InboxPendingQuery {
    pub status: Option<InboxStatus>,
    pub limit: Option<i64>,
}
