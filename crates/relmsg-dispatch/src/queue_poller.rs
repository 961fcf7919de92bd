//! Queue Poller (spec §4.E / §4.C.4). `QueueEntry` carries no retry-count
//! column, so the dispatcher's retry policy is binary: a transient failure
//! re-exposes the row immediately (`reject(requeue=true)`); a permanent
//! one removes it and hands off to the Dead-Letter Store.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use relmsg_config::QueueOptions;
use relmsg_db::{DeadLetterStore, QueueStore};
use relmsg_schemas::DeadLetterContext;

use crate::traits::MessageHandler;

const COMPONENT: &str = "Queue";

pub struct QueuePoller {
    store: Arc<QueueStore>,
    dead_letter: Arc<DeadLetterStore>,
    handler: Arc<dyn MessageHandler>,
    options: QueueOptions,
    queue_name: String,
}

impl QueuePoller {
    pub fn new(
        store: Arc<QueueStore>,
        dead_letter: Arc<DeadLetterStore>,
        handler: Arc<dyn MessageHandler>,
        options: QueueOptions,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dead_letter,
            handler,
            options,
            queue_name: queue_name.into(),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(component = COMPONENT, queue = %self.queue_name, "dispatcher loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }

            if let Err(e) = self.poll_once(&cancel).await {
                error!(component = COMPONENT, queue = %self.queue_name, error = %e, "poll failed");
            }
        }
    }

    /// Dequeues and processes at most one entry; public so scenario tests
    /// can drive several concurrent pollers deterministically (§8 "Queue
    /// concurrent dequeue").
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<bool, relmsg_schemas::StoreError> {
        let Some(entry) = self.store.dequeue(&self.queue_name).await? else {
            return Ok(false);
        };

        if cancel.is_cancelled() {
            self.store.reject(&self.queue_name, &entry.id, true).await?;
            return Ok(true);
        }

        match self.handler.handle(&entry.message_type, &entry.payload, cancel).await {
            Ok(_) => {
                self.store.acknowledge(&self.queue_name, &entry.id).await?;
            }
            Err(failure) if failure.transient => {
                self.store.reject(&self.queue_name, &entry.id, true).await?;
            }
            Err(failure) => {
                self.store.reject(&self.queue_name, &entry.id, false).await?;
                self.dead_letter
                    .send(
                        entry.payload.clone(),
                        &entry.message_type,
                        DeadLetterContext {
                            reason: failure.message.clone(),
                            component: COMPONENT,
                            retry_count: entry.dequeue_count,
                            failure_time: Utc::now(),
                            exception_message: Some(failure.message),
                            metadata: None,
                        },
                    )
                    .await?;
            }
        }

        Ok(true)
    }
}
