//! Transfer state over a TTL key-value store
//!
//! Handles:
//! - Key scheme and TTLs shared by all handlers
//! - Record shapes (pending, completed, orphaned, indices, markers)
//! - In-memory and PostgreSQL backends

pub mod keys;
pub mod memory;
pub mod postgres;
pub mod records;
mod store;

pub use keys::{IndexKind, KeySpace, StatSide};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use records::{
    CompletedTransfer, OrphanReason, OrphanedMint, PendingTransfer, RecordStatus, Resolution,
    TransferType,
};
pub use store::{is_empty_value, KvBackend, Store};
