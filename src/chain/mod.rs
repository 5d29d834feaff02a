//! Chain module - CCTP domain and EVM chain id resolution
//!
//! The registry is built once from configuration (or the built-in table)
//! and shared read-only by every handler.

pub mod registry;

pub use registry::{ChainEntry, ChainRegistry, DomainLookup};
