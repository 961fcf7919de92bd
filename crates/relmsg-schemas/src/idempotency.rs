use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    Success,
    Failure,
}

impl IdempotencyStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            IdempotencyStatus::Success => 0,
            IdempotencyStatus::Failure => 1,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(IdempotencyStatus::Success),
            1 => Some(IdempotencyStatus::Failure),
            _ => None,
        }
    }
}

/// §3.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyResponse {
    pub idempotency_key: String,
    pub status: IdempotencyStatus,
    pub success_result: Option<Value>,
    pub failure_type: Option<String>,
    pub failure_message: Option<String>,
    pub failure_stack_trace: Option<String>,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyResponse {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
