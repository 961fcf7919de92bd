use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// §3.4. Queues are implicit: a queue "exists" iff it has >=1
/// unacknowledged row (§9 open question, resolved in favor of no
/// `queues` registry table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub queue_name: String,
    pub message_type: String,
    pub payload: Value,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub visible_at: Option<DateTime<Utc>>,
    pub dequeue_count: i32,
    pub delay: Option<chrono::Duration>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub priority: i32,
    pub delay: Option<chrono::Duration>,
}

/// Default visibility-timeout lease (§3.4, §9 "configurable lease
/// recommended; backwards-compatible default stays at 5 minutes").
pub fn default_lease() -> chrono::Duration {
    chrono::Duration::minutes(5)
}
