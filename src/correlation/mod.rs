//! Burn/mint correlation
//!
//! The handlers here share no in-process state. They coordinate through the
//! store only:
//! 1. `BurnRecorder` stores pending transfers and resolves earlier orphans
//! 2. `MintMatcher` completes pending transfers or records orphans
//! 3. `CompletionNotifier` announces each completed transfer once
//! 4. `StaleIndexJanitor` drops index entries whose targets are gone
//!
//! Webhook side effects are returned as `Effect`s and run by `EffectRunner`
//! after the state transition that produced them has been written.

pub mod burn;
pub mod effects;
pub mod engine;
pub mod janitor;
mod merge;
pub mod mint;
pub mod notify;

#[cfg(test)]
mod tests;

pub use burn::{BurnOutcome, BurnRecorder, BurnReport};
pub use effects::{Effect, EffectRunner};
pub use engine::{CorrelationEngine, IngestReport};
pub use janitor::{StaleIndexJanitor, SweepReport};
pub use mint::{MintMatcher, MintOutcome, MintReport};
pub use notify::{CompletionNotifier, NotifyOutcome};

use crate::chain::ChainRegistry;
use crate::clock::Clock;
use crate::state::keys::STATS_TTL_SECS;
use crate::state::records::UnsupportedChainStat;
use crate::state::{StatSide, Store};

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Why an event was ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedDestination(String),
    UnknownDestination(u32),
    UnsupportedSource(String),
    UnknownSource(u32),
}

/// Dependencies shared by every handler
#[derive(Clone)]
pub struct CorrelationContext {
    pub store: Store,
    pub chains: Arc<ChainRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl CorrelationContext {
    pub fn new(store: Store, chains: Arc<ChainRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            chains,
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_secs()
    }

    /// Count a skip caused by an unsupported chain. Failures only log.
    pub(crate) async fn bump_unsupported(&self, side: StatSide, chain: &str) {
        crate::metrics::record_unsupported(side.label(), chain);

        let key = self.store.keys().unsupported_stat(side, chain);
        let count = match self.store.get::<UnsupportedChainStat>(&key).await {
            Ok(stat) => stat.map(|s| s.count).unwrap_or(0),
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                0
            }
        };

        let stat = UnsupportedChainStat {
            count: count + 1,
            last_seen: self.now(),
        };
        if let Err(e) = self.store.put(&key, &stat, STATS_TTL_SECS).await {
            warn!("Failed to update {}: {}", key, e);
        }
    }

    /// Delete a key, logging instead of failing
    pub(crate) async fn delete_quietly(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to delete {}: {}", key, e);
                false
            }
        }
    }
}
