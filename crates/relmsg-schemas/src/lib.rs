//! Wire and row types shared by `relmsg-db` and `relmsg-dispatch`.
//!
//! Kept free of any SQL driver dependency so a caller that only needs the
//! `MessageHandler`/`Transport` trait surface (relmsg-dispatch) does not
//! have to pull in `sqlx`.

pub mod dead_letter;
pub mod error;
pub mod idempotency;
pub mod inbox;
pub mod message;
pub mod outbox;
pub mod queue;
pub mod saga;

pub use dead_letter::{DeadLetterContext, DeadLetterEntry, DeadLetterStatistics, DeadLetterStatus};
pub use error::{Component, StoreError, StoreResult};
pub use idempotency::{IdempotencyResponse, IdempotencyStatus};
pub use inbox::{AddInboxOptions, InboxEntry, InboxPendingQuery, InboxStatus};
pub use message::{
    MessageOrderColumn, MessageQuery, MessageRecord, SortDirection, StoreMessageOptions,
};
pub use outbox::{AddOutboxOptions, OutboxEntry, OutboxPendingQuery, OutboxStatus};
pub use queue::{default_lease, EnqueueOptions, QueueEntry};
pub use saga::{SagaCodec, SagaRow, VersionedSaga};
