//! Translates `sqlx::Error` into the stable taxonomy from `relmsg-schemas`.
//! Centralized here so every store maps driver errors the same way instead
//! of re-deriving the `sqlx::Error::Database` inspection at each call
//! site.

use relmsg_schemas::StoreError;

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
const PG_QUERY_CANCELED: &str = "57014";
const PG_CONNECTION_EXCEPTION_CLASS: &str = "08";

pub fn map_sqlx_error(component: &'static str, key: Option<&str>, err: sqlx::Error) -> StoreError {
    let key = key.map(|k| k.to_string());

    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound {
            component,
            key: key.unwrap_or_default(),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout { component, key },
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            match code.as_deref() {
                Some(PG_UNIQUE_VIOLATION) => StoreError::Duplicate {
                    component,
                    key: key.unwrap_or_default(),
                },
                Some(PG_LOCK_NOT_AVAILABLE) | Some(PG_QUERY_CANCELED) => {
                    StoreError::Timeout { component, key }
                }
                Some(code) if code.starts_with(PG_CONNECTION_EXCEPTION_CLASS) => {
                    StoreError::Connectivity {
                        component,
                        key,
                        source: anyhow::Error::new(err),
                    }
                }
                _ => StoreError::Connectivity {
                    component,
                    key,
                    source: anyhow::Error::new(err),
                },
            }
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StoreError::Connectivity {
            component,
            key,
            source: anyhow::Error::new(err),
        },
        _ => StoreError::Connectivity {
            component,
            key,
            source: anyhow::Error::new(err),
        },
    }
}

/// True when a unique-constraint violation names the given constraint, the
/// teacher's own `is_unique_constraint_violation` pattern generalized to
/// take a constraint name parameter rather than being called ad hoc.
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION)
                && db_err.constraint() == Some(constraint)
    )
}
