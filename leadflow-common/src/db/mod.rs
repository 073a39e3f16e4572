//! Record store: schema bootstrap and queries
//!
//! Uniqueness constraints are the concurrency control. Writes that can race
//! on one return [`InsertOutcome`] instead of surfacing an integrity error.

pub mod idempotency;
pub mod init;
pub mod insights;
pub mod leads;
pub mod retry;

pub use idempotency::IdempotencyRecord;
pub use init::{connect_readonly, init_database, open_pool};
pub use retry::retry_on_lock;

/// Result of a write guarded by a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// This writer created the row
    Inserted,
    /// A row with the same unique key already existed; nothing was written
    AlreadyExists,
}
