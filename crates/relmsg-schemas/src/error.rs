//! The stable error taxonomy shared by every store and dispatcher loop.
//!
//! Every variant carries the primary key (or key-like attribute) of the
//! offending row plus the originating component name, so operators can
//! correlate a log line with a DLQ entry or a metric without re-deriving
//! context from the call stack.

use thiserror::Error;

/// A component name as it appears in logs, DLQ hand-offs, and error
/// context. Kept as `&'static str` rather than an enum because new
/// dispatcher/store components are added without touching this crate.
pub type Component = &'static str;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{component}: not found (key={key})")]
    NotFound { component: Component, key: String },

    #[error("{component}: duplicate key={key}")]
    Duplicate { component: Component, key: String },

    #[error("{component}: concurrency conflict on key={key} (expected version {expected}, actual {actual})")]
    ConcurrencyConflict {
        component: Component,
        key: String,
        expected: i64,
        actual: i64,
    },

    #[error("{component}: invalid identifier '{identifier}'")]
    IdentifierInvalid {
        component: Component,
        identifier: String,
    },

    #[error("{component}: connectivity error on key={key:?}: {source}")]
    Connectivity {
        component: Component,
        key: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("{component}: timeout on key={key:?}")]
    Timeout {
        component: Component,
        key: Option<String>,
    },

    #[error("{component}: serialization failure on key={key:?}: {message}")]
    Serialization {
        component: Component,
        key: Option<String>,
        message: String,
    },

    #[error("{component}: cancelled (key={key:?})")]
    Cancelled {
        component: Component,
        key: Option<String>,
    },
}

impl StoreError {
    pub fn key(&self) -> Option<&str> {
        match self {
            StoreError::NotFound { key, .. } => Some(key),
            StoreError::Duplicate { key, .. } => Some(key),
            StoreError::ConcurrencyConflict { key, .. } => Some(key),
            StoreError::IdentifierInvalid { identifier, .. } => Some(identifier),
            StoreError::Connectivity { key, .. } => key.as_deref(),
            StoreError::Timeout { key, .. } => key.as_deref(),
            StoreError::Serialization { key, .. } => key.as_deref(),
            StoreError::Cancelled { key, .. } => key.as_deref(),
        }
    }

    pub fn component(&self) -> Component {
        match self {
            StoreError::NotFound { component, .. }
            | StoreError::Duplicate { component, .. }
            | StoreError::ConcurrencyConflict { component, .. }
            | StoreError::IdentifierInvalid { component, .. }
            | StoreError::Connectivity { component, .. }
            | StoreError::Timeout { component, .. }
            | StoreError::Serialization { component, .. }
            | StoreError::Cancelled { component, .. } => component,
        }
    }

    /// True for the kinds a dispatcher loop should feed back into its own
    /// retry schedule rather than surface to the caller (§7: "Local
    /// recovery: connectivity + timeout at the dispatcher layer feed the
    /// retry schedule").
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Connectivity { .. } | StoreError::Timeout { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
