//! Inbox Processor (spec §4.E / §4.C.3). The Inbox has no retry-count
//! column (§3.3) — a failed entry goes straight to `Failed` + a
//! Dead-Letter hand-off; the Outbox/Saga retry-then-fail policy does not
//! apply here.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use relmsg_config::InboxOptions;
use relmsg_db::{DeadLetterStore, InboxStore};
use relmsg_schemas::DeadLetterContext;

use crate::traits::MessageHandler;

const COMPONENT: &str = "Inbox";

pub struct InboxProcessor {
    store: Arc<InboxStore>,
    dead_letter: Arc<DeadLetterStore>,
    handler: Arc<dyn MessageHandler>,
    options: InboxOptions,
    claimant: String,
}

impl InboxProcessor {
    pub fn new(
        store: Arc<InboxStore>,
        dead_letter: Arc<DeadLetterStore>,
        handler: Arc<dyn MessageHandler>,
        options: InboxOptions,
        claimant: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dead_letter,
            handler,
            options,
            claimant: claimant.into(),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(component = COMPONENT, "dispatcher loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }

            if let Err(e) = self.sweep_once(&cancel).await {
                error!(component = COMPONENT, error = %e, "sweep failed");
            }

            if let Err(e) = self.store.cleanup_old_entries(Utc::now() - self.options.retention).await {
                warn!(component = COMPONENT, error = %e, "retention cleanup failed");
            }
        }
    }

    pub async fn sweep_once(&self, cancel: &CancellationToken) -> Result<usize, relmsg_schemas::StoreError> {
        let batch = self.store.claim_batch(self.options.batch_size, &self.claimant).await?;
        let n = batch.len();

        for entry in batch {
            if cancel.is_cancelled() {
                break;
            }

            match self.handler.handle(&entry.message_type, &entry.payload, cancel).await {
                Ok(_) => {
                    self.store.mark_processed(&entry.id).await?;
                }
                Err(failure) => {
                    self.store.mark_failed(&entry.id, &failure.message).await?;
                    self.dead_letter
                        .send(
                            entry.payload.clone(),
                            &entry.message_type,
                            DeadLetterContext {
                                reason: failure.message.clone(),
                                component: COMPONENT,
                                retry_count: 0,
                                failure_time: Utc::now(),
                                exception_message: Some(failure.message),
                                metadata: None,
                            },
                        )
                        .await?;
                }
            }
        }

        Ok(n)
    }
}
