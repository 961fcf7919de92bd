//! The enumerated configuration surface for the durable stores.

use std::time::Duration;

use crate::identifier::validate_identifier;
use relmsg_schemas::StoreError;

/// Table name overrides, one per durable store, plus the Message store's
/// own table since it is backed by a table too.
#[derive(Debug, Clone)]
pub struct TableNames {
    pub messages: String,
    pub outbox: String,
    pub inbox: String,
    pub queue: String,
    pub dead_letter: String,
    pub sagas: String,
    pub idempotency_responses: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            messages: "messages".into(),
            outbox: "outbox".into(),
            inbox: "inbox".into(),
            queue: "queue".into(),
            dead_letter: "dead_letter".into(),
            sagas: "sagas".into(),
            idempotency_responses: "idempotency_responses".into(),
        }
    }
}

impl TableNames {
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_identifier("SchemaInitializer", &self.messages)?;
        validate_identifier("SchemaInitializer", &self.outbox)?;
        validate_identifier("SchemaInitializer", &self.inbox)?;
        validate_identifier("SchemaInitializer", &self.queue)?;
        validate_identifier("SchemaInitializer", &self.dead_letter)?;
        validate_identifier("SchemaInitializer", &self.sagas)?;
        validate_identifier("SchemaInitializer", &self.idempotency_responses)?;
        Ok(())
    }
}

/// The two dialects in scope. Only the DDL text generated by the schema
/// initializer varies by dialect; the store query layer always targets
/// the PostgreSQL wire protocol via `sqlx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    TSql,
}

impl Default for SqlDialect {
    fn default() -> Self {
        SqlDialect::Postgres
    }
}

/// Top-level connection/behavior options (§6.2).
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Required in owned mode; ignored when the caller supplies a shared
    /// connection/transaction (§4.A).
    pub connection_string: Option<String>,
    pub schema: Option<String>,
    pub table_names: TableNames,
    pub auto_create_tables: bool,
    pub command_timeout: Duration,
    pub dialect: SqlDialect,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            connection_string: None,
            schema: None,
            table_names: TableNames::default(),
            auto_create_tables: true,
            command_timeout: Duration::from_secs(30),
            dialect: SqlDialect::Postgres,
        }
    }
}

impl StoreOptions {
    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(schema) = &self.schema {
            validate_identifier("SchemaInitializer", schema)?;
        }
        self.table_names.validate()
    }
}

/// §6.2 Outbox dispatcher behavior.
#[derive(Debug, Clone)]
pub struct OutboxOptions {
    pub max_retries: i32,
    pub batch_size: i64,
    pub poll_interval: Duration,
    /// Window after which a CLAIMED-but-unresolved row is treated as
    /// abandoned and returned to PENDING (§C supplement: stale-claim
    /// recovery).
    pub claim_timeout: Duration,
}

impl Default for OutboxOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            batch_size: 50,
            poll_interval: Duration::from_secs(5),
            claim_timeout: Duration::from_secs(60),
        }
    }
}

/// §6.2 Inbox duplicate policy + cleanup.
#[derive(Debug, Clone)]
pub struct InboxOptions {
    pub require_idempotency: bool,
    pub deduplication_window: Option<chrono::Duration>,
    pub retention: chrono::Duration,
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub claim_timeout: Duration,
}

impl Default for InboxOptions {
    fn default() -> Self {
        Self {
            require_idempotency: true,
            deduplication_window: None,
            retention: chrono::Duration::days(7),
            batch_size: 50,
            poll_interval: Duration::from_secs(1),
            claim_timeout: Duration::from_secs(60),
        }
    }
}

/// §6.2 Queue lease + polling.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub lease_duration: chrono::Duration,
    pub poll_interval: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            lease_duration: relmsg_schemas::default_lease(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// §6.2 Idempotency cache lifetimes; §4.F "typical defaults: success 7
/// days, failure 1 hour".
#[derive(Debug, Clone)]
pub struct IdempotencyOptions {
    pub success_ttl: chrono::Duration,
    pub failure_ttl: chrono::Duration,
}

impl Default for IdempotencyOptions {
    fn default() -> Self {
        Self {
            success_ttl: chrono::Duration::days(7),
            failure_ttl: chrono::Duration::hours(1),
        }
    }
}
