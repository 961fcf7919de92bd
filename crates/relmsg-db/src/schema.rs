//! Schema Initializer.
//!
//! DDL is generated, never hand-maintained per table, so the dialect hint
//! only has to special-case the handful of syntax differences between
//! Postgres and T-SQL rather than duplicate seven CREATE TABLE statements.
//! Identifiers are validated by `relmsg_config::validate_identifier` before
//! they ever reach a format string. DDL only runs from an explicit
//! `initialize()` call, never from a constructor.

use std::sync::Arc;

use tokio::sync::Mutex;

use relmsg_config::{validate_identifier, SqlDialect, StoreOptions};
use relmsg_schemas::StoreError;

use crate::conn::ConnectionProvider;
use crate::sqlerr::map_sqlx_error;

const COMPONENT: &str = "SchemaInitializer";

/// One-shot init latch per store instance. `Arc<Mutex<bool>>` rather than
/// `std::sync::Once` because the guarded body is async.
#[derive(Clone)]
pub struct SchemaInitializer {
    conn: ConnectionProvider,
    options: StoreOptions,
    initialized: Arc<Mutex<bool>>,
}

impl SchemaInitializer {
    pub fn new(conn: ConnectionProvider, options: StoreOptions) -> Result<Self, StoreError> {
        options.validate()?;
        Ok(Self {
            conn,
            options,
            initialized: Arc::new(Mutex::new(false)),
        })
    }

    /// Ensures schema + all seven tables exist. Safe to call repeatedly;
    /// only the first caller (per instance) actually issues DDL.
    pub async fn ensure_initialized(&self) -> Result<(), StoreError> {
        let mut done = self.initialized.lock().await;
        if *done {
            return Ok(());
        }
        if !self.options.auto_create_tables {
            *done = true;
            return Ok(());
        }

        if let Some(schema) = &self.options.schema {
            self.init_schema(schema).await?;
        }

        for statement in self.table_statements() {
            self.execute_script(&statement).await?;
        }

        for statement in self.index_statements() {
            self.execute_script(&statement).await?;
        }

        *done = true;
        Ok(())
    }

    /// No-op for the default schema, otherwise an idempotent
    /// `CREATE SCHEMA IF NOT EXISTS`.
    pub async fn init_schema(&self, name: &str) -> Result<(), StoreError> {
        validate_identifier(COMPONENT, name)?;
        let ddl = match self.options.dialect {
            SqlDialect::Postgres => format!("CREATE SCHEMA IF NOT EXISTS {name}"),
            SqlDialect::TSql => format!(
                "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = N'{name}') EXEC('CREATE SCHEMA {name}')"
            ),
        };
        self.execute_script(&ddl).await
    }

    /// Runs a single DDL batch on the ambient connection/txn.
    pub async fn execute_script(&self, ddl: &str) -> Result<(), StoreError> {
        let mut guard = self.conn.acquire(COMPONENT).await?;
        sqlx::query(ddl)
            .execute(&mut *guard)
            .await
            .map_err(|e| map_sqlx_error(COMPONENT, None, e))?;
        Ok(())
    }

    fn qualified(&self, table: &str) -> String {
        match &self.options.schema {
            Some(schema) => format!("{schema}.{table}"),
            None => table.to_string(),
        }
    }

    fn table_statements(&self) -> Vec<String> {
        let names = &self.options.table_names;
        let dialect = self.options.dialect;
        vec![
            messages_ddl(&self.qualified(&names.messages), dialect),
            outbox_ddl(&self.qualified(&names.outbox), dialect),
            inbox_ddl(&self.qualified(&names.inbox), dialect),
            queue_ddl(&self.qualified(&names.queue), dialect),
            dead_letter_ddl(&self.qualified(&names.dead_letter), dialect),
            sagas_ddl(&self.qualified(&names.sagas), dialect),
            idempotency_ddl(&self.qualified(&names.idempotency_responses), dialect),
        ]
    }

    /// Indexes matching `migrations/0001_core_tables.sql` exactly, so the
    /// `autoCreateTables` path and the explicit migration leave the same
    /// schema behind. `next_retry_at`'s and `visible_at`'s partial indexes
    /// are the ones the Outbox/Queue claim scans actually depend on.
    fn index_statements(&self) -> Vec<String> {
        let names = &self.options.table_names;
        let dialect = self.options.dialect;
        let mut statements = Vec::new();
        statements.extend(messages_indexes(&names.messages, &self.qualified(&names.messages), dialect));
        statements.extend(outbox_indexes(&names.outbox, &self.qualified(&names.outbox), dialect));
        statements.extend(inbox_indexes(&names.inbox, &self.qualified(&names.inbox), dialect));
        statements.extend(queue_indexes(&names.queue, &self.qualified(&names.queue), dialect));
        statements.extend(dead_letter_indexes(&names.dead_letter, &self.qualified(&names.dead_letter), dialect));
        statements.extend(sagas_indexes(&names.sagas, &self.qualified(&names.sagas), dialect));
        statements.extend(idempotency_indexes(
            &names.idempotency_responses,
            &self.qualified(&names.idempotency_responses),
            dialect,
        ));
        statements
    }
}

fn json_type(dialect: SqlDialect) -> &'static str {
    match dialect {
        SqlDialect::Postgres => "jsonb",
        SqlDialect::TSql => "nvarchar(max)",
    }
}

fn ts_type(dialect: SqlDialect) -> &'static str {
    match dialect {
        SqlDialect::Postgres => "timestamptz",
        SqlDialect::TSql => "datetimeoffset",
    }
}

fn bool_type(dialect: SqlDialect) -> &'static str {
    match dialect {
        SqlDialect::Postgres => "boolean",
        SqlDialect::TSql => "bit",
    }
}

fn create_if_not_exists(dialect: SqlDialect, table: &str, body: &str) -> String {
    match dialect {
        SqlDialect::Postgres => format!("CREATE TABLE IF NOT EXISTS {table} (\n{body}\n)"),
        SqlDialect::TSql => format!(
            "IF OBJECT_ID(N'{table}', N'U') IS NULL CREATE TABLE {table} (\n{body}\n)"
        ),
    }
}

fn false_literal(dialect: SqlDialect) -> &'static str {
    match dialect {
        SqlDialect::Postgres => "false",
        SqlDialect::TSql => "0",
    }
}

/// `index` is the bare name (unique per-database); `table` is already
/// schema-qualified. T-SQL has no `CREATE INDEX IF NOT EXISTS`, so it's
/// spelled out as a `sys.indexes` guard, same as `create_if_not_exists`
/// does for tables via `OBJECT_ID`.
fn create_index_if_not_exists(dialect: SqlDialect, index: &str, table: &str, definition: &str) -> String {
    match dialect {
        SqlDialect::Postgres => format!("CREATE INDEX IF NOT EXISTS {index} ON {table} {definition}"),
        SqlDialect::TSql => format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.indexes WHERE name = N'{index}' AND object_id = OBJECT_ID(N'{table}')) \
             CREATE INDEX {index} ON {table} {definition}"
        ),
    }
}

fn messages_ddl(table: &str, dialect: SqlDialect) -> String {
    let json = json_type(dialect);
    let ts = ts_type(dialect);
    let body = format!(
        "  id varchar(100) PRIMARY KEY,\n\
         \u{20}\u{20}message_type varchar(500) NOT NULL,\n\
         \u{20}\u{20}payload {json} NOT NULL,\n\
         \u{20}\u{20}timestamp {ts} NOT NULL,\n\
         \u{20}\u{20}correlation_id varchar(100),\n\
         \u{20}\u{20}collection varchar(100),\n\
         \u{20}\u{20}metadata {json},\n\
         \u{20}\u{20}expires_at {ts},\n\
         \u{20}\u{20}created_at {ts} NOT NULL"
    );
    create_if_not_exists(dialect, table, &body)
}

fn outbox_ddl(table: &str, dialect: SqlDialect) -> String {
    let json = json_type(dialect);
    let ts = ts_type(dialect);
    let body = format!(
        "  id varchar(100) PRIMARY KEY,\n\
         \u{20}\u{20}message_type varchar(500) NOT NULL,\n\
         \u{20}\u{20}payload {json} NOT NULL,\n\
         \u{20}\u{20}destination varchar(200),\n\
         \u{20}\u{20}status varchar(50) NOT NULL DEFAULT 'Pending',\n\
         \u{20}\u{20}retry_count int NOT NULL DEFAULT 0,\n\
         \u{20}\u{20}max_retries int NOT NULL DEFAULT 3,\n\
         \u{20}\u{20}created_at {ts} NOT NULL,\n\
         \u{20}\u{20}processed_at {ts},\n\
         \u{20}\u{20}next_retry_at {ts},\n\
         \u{20}\u{20}last_error text,\n\
         \u{20}\u{20}claimed_at {ts},\n\
         \u{20}\u{20}claimed_by varchar(200)"
    );
    create_if_not_exists(dialect, table, &body)
}

fn inbox_ddl(table: &str, dialect: SqlDialect) -> String {
    let json = json_type(dialect);
    let ts = ts_type(dialect);
    let b = bool_type(dialect);
    let body = format!(
        "  id varchar(100) PRIMARY KEY,\n\
         \u{20}\u{20}message_type varchar(500) NOT NULL,\n\
         \u{20}\u{20}payload {json} NOT NULL,\n\
         \u{20}\u{20}source varchar(200),\n\
         \u{20}\u{20}status varchar(50) NOT NULL DEFAULT 'Pending',\n\
         \u{20}\u{20}received_at {ts} NOT NULL,\n\
         \u{20}\u{20}processed_at {ts},\n\
         \u{20}\u{20}error text,\n\
         \u{20}\u{20}require_idempotency {b} NOT NULL DEFAULT true,\n\
         \u{20}\u{20}deduplication_window_minutes int,\n\
         \u{20}\u{20}claimed_at {ts},\n\
         \u{20}\u{20}claimed_by varchar(200)"
    );
    create_if_not_exists(dialect, table, &body)
}

fn queue_ddl(table: &str, dialect: SqlDialect) -> String {
    let json = json_type(dialect);
    let ts = ts_type(dialect);
    let b = bool_type(dialect);
    let body = format!(
        "  id varchar(100) PRIMARY KEY,\n\
         \u{20}\u{20}queue_name varchar(200) NOT NULL,\n\
         \u{20}\u{20}message_type varchar(500) NOT NULL,\n\
         \u{20}\u{20}payload {json} NOT NULL,\n\
         \u{20}\u{20}priority int NOT NULL DEFAULT 0,\n\
         \u{20}\u{20}enqueued_at {ts} NOT NULL,\n\
         \u{20}\u{20}visible_at {ts},\n\
         \u{20}\u{20}dequeue_count int NOT NULL DEFAULT 0,\n\
         \u{20}\u{20}delay_minutes int,\n\
         \u{20}\u{20}acknowledged {b} NOT NULL DEFAULT false"
    );
    create_if_not_exists(dialect, table, &body)
}

fn dead_letter_ddl(table: &str, dialect: SqlDialect) -> String {
    let json = json_type(dialect);
    let ts = ts_type(dialect);
    let body = format!(
        "  id varchar(100) PRIMARY KEY,\n\
         \u{20}\u{20}message_payload {json} NOT NULL,\n\
         \u{20}\u{20}message_type varchar(500) NOT NULL,\n\
         \u{20}\u{20}reason text NOT NULL,\n\
         \u{20}\u{20}component varchar(200) NOT NULL,\n\
         \u{20}\u{20}retry_count int NOT NULL,\n\
         \u{20}\u{20}failure_time {ts} NOT NULL,\n\
         \u{20}\u{20}status int NOT NULL DEFAULT 0,\n\
         \u{20}\u{20}created_at {ts} NOT NULL,\n\
         \u{20}\u{20}retried_at {ts},\n\
         \u{20}\u{20}discarded_at {ts},\n\
         \u{20}\u{20}exception_message text,\n\
         \u{20}\u{20}metadata {json}"
    );
    create_if_not_exists(dialect, table, &body)
}

fn sagas_ddl(table: &str, dialect: SqlDialect) -> String {
    let json = json_type(dialect);
    let ts = ts_type(dialect);
    let b = bool_type(dialect);
    let uuid = match dialect {
        SqlDialect::Postgres => "uuid",
        SqlDialect::TSql => "uniqueidentifier",
    };
    let body = format!(
        "  correlation_id {uuid} PRIMARY KEY,\n\
         \u{20}\u{20}saga_type varchar(500) NOT NULL,\n\
         \u{20}\u{20}current_state varchar(100) NOT NULL,\n\
         \u{20}\u{20}created_at {ts} NOT NULL,\n\
         \u{20}\u{20}updated_at {ts} NOT NULL,\n\
         \u{20}\u{20}is_completed {b} NOT NULL DEFAULT false,\n\
         \u{20}\u{20}version bigint NOT NULL DEFAULT 0,\n\
         \u{20}\u{20}saga_data {json} NOT NULL"
    );
    create_if_not_exists(dialect, table, &body)
}

fn idempotency_ddl(table: &str, dialect: SqlDialect) -> String {
    let json = json_type(dialect);
    let ts = ts_type(dialect);
    let body = format!(
        "  idempotency_key varchar(450) PRIMARY KEY,\n\
         \u{20}\u{20}status smallint NOT NULL,\n\
         \u{20}\u{20}success_result {json},\n\
         \u{20}\u{20}failure_type varchar(500),\n\
         \u{20}\u{20}failure_message text,\n\
         \u{20}\u{20}failure_stack_trace text,\n\
         \u{20}\u{20}stored_at {ts} NOT NULL,\n\
         \u{20}\u{20}expires_at {ts} NOT NULL"
    );
    create_if_not_exists(dialect, table, &body)
}

fn messages_indexes(name: &str, table: &str, dialect: SqlDialect) -> Vec<String> {
    vec![
        create_index_if_not_exists(dialect, &format!("idx_{name}_timestamp"), table, "(timestamp desc)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_type"), table, "(message_type)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_correlation"), table, "(correlation_id)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_collection"), table, "(collection)"),
        create_index_if_not_exists(
            dialect,
            &format!("idx_{name}_expires"),
            table,
            "(expires_at) WHERE expires_at IS NOT NULL",
        ),
    ]
}

fn outbox_indexes(name: &str, table: &str, dialect: SqlDialect) -> Vec<String> {
    vec![
        create_index_if_not_exists(dialect, &format!("idx_{name}_status"), table, "(status)"),
        create_index_if_not_exists(
            dialect,
            &format!("idx_{name}_next_retry"),
            table,
            "(next_retry_at) WHERE status = 'Pending'",
        ),
        create_index_if_not_exists(dialect, &format!("idx_{name}_created"), table, "(created_at desc)"),
    ]
}

fn inbox_indexes(name: &str, table: &str, dialect: SqlDialect) -> Vec<String> {
    vec![
        create_index_if_not_exists(dialect, &format!("idx_{name}_status"), table, "(status)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_received"), table, "(received_at desc)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_processed"), table, "(processed_at)"),
    ]
}

fn queue_indexes(name: &str, table: &str, dialect: SqlDialect) -> Vec<String> {
    let not_acknowledged = false_literal(dialect);
    vec![
        create_index_if_not_exists(dialect, &format!("idx_{name}_name"), table, "(queue_name)"),
        create_index_if_not_exists(
            dialect,
            &format!("idx_{name}_dispatch_order"),
            table,
            "(queue_name, priority desc, enqueued_at)",
        ),
        create_index_if_not_exists(
            dialect,
            &format!("idx_{name}_visible"),
            table,
            &format!("(queue_name, visible_at) WHERE acknowledged = {not_acknowledged}"),
        ),
    ]
}

fn dead_letter_indexes(name: &str, table: &str, dialect: SqlDialect) -> Vec<String> {
    vec![
        create_index_if_not_exists(dialect, &format!("idx_{name}_status"), table, "(status)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_type"), table, "(message_type)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_failure_time"), table, "(failure_time desc)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_component"), table, "(component)"),
    ]
}

fn sagas_indexes(name: &str, table: &str, dialect: SqlDialect) -> Vec<String> {
    vec![
        create_index_if_not_exists(dialect, &format!("idx_{name}_state"), table, "(current_state)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_updated"), table, "(updated_at)"),
        create_index_if_not_exists(dialect, &format!("idx_{name}_type_state"), table, "(saga_type, current_state)"),
        create_index_if_not_exists(
            dialect,
            &format!("idx_{name}_completed_updated"),
            table,
            "(is_completed, updated_at)",
        ),
    ]
}

fn idempotency_indexes(name: &str, table: &str, dialect: SqlDialect) -> Vec<String> {
    vec![create_index_if_not_exists(dialect, &format!("idx_{name}_expires"), table, "(expires_at)")]
}
