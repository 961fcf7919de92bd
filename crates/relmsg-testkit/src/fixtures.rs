//! Fixture builders. Each returns the option/context struct a store method
//! takes, pre-filled with values that are sane defaults for a test and
//! cheap to override via struct-update syntax at the call site.

use chrono::Utc;
use serde_json::{json, Value};

use relmsg_schemas::{AddInboxOptions, AddOutboxOptions, DeadLetterContext, EnqueueOptions};

pub fn outbox_add() -> (Value, AddOutboxOptions) {
    (json!({"x": 1}), AddOutboxOptions::default())
}

pub fn inbox_add() -> (Value, AddInboxOptions) {
    (json!({"x": 1}), AddInboxOptions::default())
}

pub fn queue_enqueue(priority: i32) -> (Value, EnqueueOptions) {
    (
        json!({"x": 1}),
        EnqueueOptions {
            priority,
            delay: None,
        },
    )
}

pub fn dead_letter_ctx(component: &'static str, reason: impl Into<String>) -> DeadLetterContext {
    DeadLetterContext {
        reason: reason.into(),
        component,
        retry_count: 0,
        failure_time: Utc::now(),
        exception_message: None,
        metadata: None,
    }
}

/// A trivial saga for exercising `SagaStore<TestSagaCodec>` without a
/// concrete production saga type (§9 "typed handle parameterized by saga
/// type with a mandatory codec").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSaga {
    pub state: String,
    pub completed: bool,
}

pub struct TestSagaCodec;

impl relmsg_schemas::SagaCodec for TestSagaCodec {
    type Saga = TestSaga;

    fn saga_type() -> &'static str {
        "TestSaga"
    }

    fn current_state(saga: &Self::Saga) -> String {
        saga.state.clone()
    }

    fn is_completed(saga: &Self::Saga) -> bool {
        saga.completed
    }

    fn encode(saga: &Self::Saga) -> Value {
        json!({"state": saga.state, "completed": saga.completed})
    }

    fn decode(value: Value) -> Result<Self::Saga, serde_json::Error> {
        Ok(TestSaga {
            state: value["state"].as_str().unwrap_or_default().to_string(),
            completed: value["completed"].as_bool().unwrap_or(false),
        })
    }
}
