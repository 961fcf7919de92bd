//! Identifier validation (§4.B): schema and table names must match
//! `^[A-Za-z_][A-Za-z0-9_]*$` and are checked *before* being interpolated
//! into any DDL string. Payload/filter values never take this path — they
//! always flow through parameterized placeholders.

use relmsg_schemas::StoreError;

const MAX_IDENTIFIER_LEN: usize = 128;

/// Validates a schema or table identifier, returning the identifier back
/// (so call sites can validate-and-use in one expression) or a
/// `StoreError::IdentifierInvalid` naming the offending component.
pub fn validate_identifier<'a>(
    component: &'static str,
    identifier: &'a str,
) -> Result<&'a str, StoreError> {
    let mut chars = identifier.chars();
    let ok = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if !ok || identifier.is_empty() || identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(StoreError::IdentifierInvalid {
            component,
            identifier: identifier.to_string(),
        });
    }

    Ok(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_identifier("test", "outbox").is_ok());
        assert!(validate_identifier("test", "_private_schema").is_ok());
        assert!(validate_identifier("test", "Outbox_V2").is_ok());
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(validate_identifier("test", "2fast").is_err());
    }

    #[test]
    fn rejects_sql_metacharacters() {
        assert!(validate_identifier("test", "outbox; drop table users;--").is_err());
        assert!(validate_identifier("test", "outbox.public").is_err());
        assert!(validate_identifier("test", "outbox'").is_err());
        assert!(validate_identifier("test", "").is_err());
    }
}
