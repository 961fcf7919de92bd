//! Idempotency Mediator (spec §4.F): wraps a handler invocation around the
//! Idempotency Cache so repeated calls with the same key replay the first
//! outcome instead of re-running the handler.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use relmsg_db::IdempotencyStore;
use relmsg_schemas::{IdempotencyResponse, IdempotencyStatus, StoreError};

use crate::traits::{HandlerFailure, MessageHandler};

/// Reconstructed from a stored `Failure` response (§4.F step 2: "re-raise a
/// reconstructed exception holding `failure_type` + `failure_message`").
#[derive(Debug, Clone)]
pub struct ReplayedFailure {
    pub failure_type: String,
    pub failure_message: String,
}

impl std::fmt::Display for ReplayedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.failure_type, self.failure_message)
    }
}

impl std::error::Error for ReplayedFailure {}

#[derive(Debug, Clone)]
pub enum MediatedOutcome {
    Fresh(Value),
    Replayed(Value),
}

impl MediatedOutcome {
    pub fn into_value(self) -> Value {
        match self {
            MediatedOutcome::Fresh(v) | MediatedOutcome::Replayed(v) => v,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediatedError {
    #[error("replayed failure: {0}")]
    Replayed(#[from] ReplayedFailure),
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerFailure),
    #[error("idempotency store error: {0}")]
    Store(#[from] StoreError),
}

pub struct IdempotencyMediator<'a> {
    store: &'a IdempotencyStore,
    success_ttl: chrono::Duration,
    failure_ttl: chrono::Duration,
}

impl<'a> IdempotencyMediator<'a> {
    pub fn new(store: &'a IdempotencyStore, success_ttl: chrono::Duration, failure_ttl: chrono::Duration) -> Self {
        Self {
            store,
            success_ttl,
            failure_ttl,
        }
    }

    /// Runs `handler` under idempotency protection for `key`. On a cache
    /// hit the handler is never invoked (§8 scenario 5).
    #[instrument(skip(self, handler, message_type, payload, cancel), fields(key = %key))]
    pub async fn invoke(
        &self,
        key: &str,
        message_type: &str,
        payload: &Value,
        handler: &dyn MessageHandler,
        cancel: &CancellationToken,
    ) -> Result<MediatedOutcome, MediatedError> {
        if let Some(cached) = self.store.get(key).await? {
            debug!("idempotency cache hit");
            return replay(cached);
        }

        match handler.handle(message_type, payload, cancel).await {
            Ok(result) => {
                self.store.store_success(key, result.clone(), self.success_ttl).await?;
                Ok(MediatedOutcome::Fresh(result))
            }
            Err(failure) => {
                self.store
                    .store_failure(
                        key,
                        if failure.transient { "Transient" } else { "Permanent" },
                        &failure.message,
                        None,
                        self.failure_ttl,
                    )
                    .await?;
                Err(failure.into())
            }
        }
    }
}

fn replay(cached: IdempotencyResponse) -> Result<MediatedOutcome, MediatedError> {
    match cached.status {
        IdempotencyStatus::Success => Ok(MediatedOutcome::Replayed(
            cached.success_result.unwrap_or(Value::Null),
        )),
        IdempotencyStatus::Failure => Err(ReplayedFailure {
            failure_type: cached.failure_type.unwrap_or_else(|| "Unknown".to_string()),
            failure_message: cached.failure_message.unwrap_or_default(),
        }
        .into()),
    }
}
