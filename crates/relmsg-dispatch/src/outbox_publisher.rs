//! Outbox Publisher: claims a batch of Pending rows, hands each to the
//! `Transport`, and transitions it to `Processed`/`Failed` on the
//! dispatcher's retry-then-DLQ policy.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use relmsg_config::OutboxOptions;
use relmsg_db::OutboxStore;
use relmsg_schemas::DeadLetterContext;

use crate::backoff::{full_jitter, JitterSource, SystemJitter};
use crate::clock::{Clock, SystemClock};
use crate::traits::Transport;

const COMPONENT: &str = "Outbox";

pub struct OutboxPublisher {
    store: Arc<OutboxStore>,
    dead_letter: Arc<relmsg_db::DeadLetterStore>,
    transport: Arc<dyn Transport>,
    options: OutboxOptions,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
    claimant: String,
}

impl OutboxPublisher {
    pub fn new(
        store: Arc<OutboxStore>,
        dead_letter: Arc<relmsg_db::DeadLetterStore>,
        transport: Arc<dyn Transport>,
        options: OutboxOptions,
        claimant: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dead_letter,
            transport,
            options,
            clock: Arc::new(SystemClock),
            jitter: Arc::new(SystemJitter),
            claimant: claimant.into(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Runs until `cancel` fires. A shared token lets every dispatcher loop
    /// in the process shut down together.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(component = COMPONENT, "dispatcher loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }

            if let Err(e) = self.recover_stale().await {
                warn!(component = COMPONENT, error = %e, "stale-claim recovery failed");
            }

            if let Err(e) = self.sweep_once(&cancel).await {
                error!(component = COMPONENT, error = %e, "sweep failed");
            }
        }
    }

    async fn recover_stale(&self) -> Result<(), relmsg_schemas::StoreError> {
        self.store
            .recover_stale_claims(chrono::Duration::from_std(self.options.claim_timeout).unwrap_or(chrono::Duration::seconds(60)))
            .await?;
        Ok(())
    }

    /// One claim-and-process pass; public so scenario tests can drive the
    /// dispatcher deterministically without a sleep loop.
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> Result<usize, relmsg_schemas::StoreError> {
        let batch = self.store.claim_batch(self.options.batch_size, &self.claimant).await?;
        let n = batch.len();

        for entry in batch {
            if cancel.is_cancelled() {
                break;
            }

            let destination = entry.destination.clone().unwrap_or_default();
            match self.transport.send(&destination, &entry.payload).await {
                Ok(()) => {
                    self.store.mark_processed(&entry.id).await?;
                }
                Err(failure) => {
                    let next_attempt = entry.retry_count + 1;
                    if next_attempt <= self.options.max_retries {
                        let delay = full_jitter(next_attempt as u32, self.jitter.as_ref());
                        let next_retry_at =
                            self.clock.now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                        self.store
                            .update_retry_count(&entry.id, next_attempt, Some(next_retry_at), Some(&failure.message))
                            .await?;
                    } else {
                        self.store.mark_failed(&entry.id, &failure.message).await?;
                        self.dead_letter
                            .send(
                                entry.payload.clone(),
                                &entry.message_type,
                                DeadLetterContext {
                                    reason: failure.message.clone(),
                                    component: COMPONENT,
                                    retry_count: next_attempt - 1,
                                    failure_time: Utc::now(),
                                    exception_message: Some(failure.message),
                                    metadata: None,
                                },
                            )
                            .await?;
                    }
                }
            }
        }

        Ok(n)
    }
}
