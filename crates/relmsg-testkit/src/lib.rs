//! Test fixtures for the reliable-messaging core: a live-database pool
//! bootstrap (skips gracefully without `RELMSG_DATABASE_URL`) plus builders
//! for each entity type, shared by `relmsg-db`'s and `relmsg-dispatch`'s
//! scenario tests.

pub mod fixtures;
pub mod pool;

pub use fixtures::{dead_letter_ctx, outbox_add, queue_enqueue};
pub use pool::{truncate_all, try_test_pool};
