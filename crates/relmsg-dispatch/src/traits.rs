//! Collaborator interfaces the core consumes (spec §6.3). Implementations
//! are supplied by the composition root; this crate ships none beyond the
//! in-memory test doubles used by its own scenario tests.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A classified handler failure: the dispatcher needs to know whether a
/// failure is worth retrying, not just that it happened.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub message: String,
    pub transient: bool,
}

impl HandlerFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerFailure {}

/// `MessageHandler` (§6.3): `handle(message, ctx) -> result | failure`.
/// Cancellation is honored via the token; failures are pre-classified by
/// the handler rather than sniffed from an exception type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        message_type: &str,
        payload: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, HandlerFailure>;
}

/// `Transport` (§6.3): the Outbox dispatcher's publish step.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, destination: &str, payload: &Value) -> Result<(), HandlerFailure>;
}

/// `Serializer` (§6.3). The core never reflects over payload types (§9);
/// callers that need typed round-trips supply a codec keyed by a type tag
/// rather than relying on runtime type information.
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, HandlerFailure>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Value, HandlerFailure>;
}

/// Default JSON serializer; payloads are already `serde_json::Value` at
/// rest, so this is a thin pass-through.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, HandlerFailure> {
        serde_json::to_vec(value).map_err(|e| HandlerFailure::permanent(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, HandlerFailure> {
        serde_json::from_slice(bytes).map_err(|e| HandlerFailure::permanent(e.to_string()))
    }
}
