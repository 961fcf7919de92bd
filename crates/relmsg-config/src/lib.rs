//! The configuration surface for the reliable-messaging core (spec §6.2)
//! plus the identifier validation every store and the schema initializer
//! run before building any SQL (spec §4.B).

pub mod identifier;
pub mod options;

pub use identifier::validate_identifier;
pub use options::{
    IdempotencyOptions, InboxOptions, OutboxOptions, QueueOptions, SqlDialect, StoreOptions,
    TableNames,
};
