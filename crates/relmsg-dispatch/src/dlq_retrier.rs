//! DLQ Retrier (spec §4.E: "DLQ retrier on-demand"). Unlike the other three
//! loops this one has no fixed poll interval — it acts on explicit operator
//! requests (retry one entry, or discard it), typically triggered from an
//! ops tool rather than a timer.

use std::sync::Arc;

use relmsg_db::DeadLetterStore;
use relmsg_schemas::{DeadLetterEntry, StoreError};

use crate::traits::Transport;

pub struct DlqRetrier {
    store: Arc<DeadLetterStore>,
    transport: Arc<dyn Transport>,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("dead-letter entry {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("redelivery failed: {0}")]
    Redelivery(String),
}

impl DlqRetrier {
    pub fn new(store: Arc<DeadLetterStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Re-sends one dead-lettered entry's payload to `destination` and
    /// marks it `Retried` only if redelivery succeeds; a failed redelivery
    /// leaves the entry `Active` so the operator can try again or discard.
    pub async fn retry_one(&self, entry: &DeadLetterEntry, destination: &str) -> Result<(), RetryError> {
        self.transport
            .send(destination, &entry.message_payload)
            .await
            .map_err(|e| RetryError::Redelivery(e.to_string()))?;

        let transitioned = self.store.retry(&entry.id).await?;
        if !transitioned {
            return Err(RetryError::NotFound(entry.id.clone()));
        }
        Ok(())
    }

    pub async fn discard_one(&self, id: &str) -> Result<(), RetryError> {
        let transitioned = self.store.discard(id).await?;
        if !transitioned {
            return Err(RetryError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
