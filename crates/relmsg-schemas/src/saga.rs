use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A saga codec: the typed handle parameterized by saga type from §9
/// ("Generic saga repository: model as a typed handle parameterized by
/// saga type with a mandatory codec; avoid dynamic dispatch on arbitrary
/// objects"). Implementors round-trip their saga's domain state through
/// `serde_json::Value` without the store knowing the concrete type.
pub trait SagaCodec: Send + Sync + 'static {
    type Saga: Send + Sync;

    fn saga_type() -> &'static str;
    fn current_state(saga: &Self::Saga) -> String;
    fn is_completed(saga: &Self::Saga) -> bool;
    fn encode(saga: &Self::Saga) -> serde_json::Value;
    fn decode(value: serde_json::Value) -> Result<Self::Saga, serde_json::Error>;
}

/// The persisted row shape (§3.6), independent of any particular saga's
/// domain type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRow {
    pub correlation_id: Uuid,
    pub saga_type: String,
    pub current_state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_completed: bool,
    pub version: i64,
    pub saga_data: serde_json::Value,
}

/// A decoded saga row, version-tagged so the optimistic-concurrency
/// protocol in §4.C.6 can compare caller vs. stored version without a
/// second round trip.
#[derive(Debug, Clone)]
pub struct VersionedSaga<T> {
    pub correlation_id: Uuid,
    pub saga: T,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
