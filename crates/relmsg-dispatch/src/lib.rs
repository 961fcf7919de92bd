//! Dispatcher Loops + Idempotency Mediator (spec §4.E, §4.F): the
//! background workers that turn durable store state into handler
//! invocations, and the mediator that sits in front of idempotent handler
//! calls.

pub mod backoff;
pub mod clock;
pub mod dlq_retrier;
pub mod inbox_processor;
pub mod mediator;
pub mod outbox_publisher;
pub mod queue_poller;
pub mod traits;

pub use backoff::{full_jitter, FixedJitter, JitterSource, SystemJitter};
pub use clock::{Clock, FakeClock, SystemClock};
pub use dlq_retrier::{DlqRetrier, RetryError};
pub use inbox_processor::InboxProcessor;
pub use mediator::{IdempotencyMediator, MediatedError, MediatedOutcome, ReplayedFailure};
pub use outbox_publisher::OutboxPublisher;
pub use queue_poller::QueuePoller;
pub use traits::{HandlerFailure, JsonSerializer, MessageHandler, Serializer, Transport};
