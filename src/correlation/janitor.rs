//! Stale-index janitor
//!
//! Index records outlive their targets when a delete fails or a TTL lapses
//! first. The janitor dereferences every index entry and drops the ones whose
//! target is gone. TTLs handle the common case; this is the backstop.

use super::CorrelationContext;
use crate::error::{CorrelatorResult, StoreResult};
use crate::state::keys::{IndexKind, PENDING_TTL_SECS};
use crate::state::records::{fallback_pointer, LegacyPendingIndex};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub legacy_removed: usize,
    pub purged: u64,
    pub errors: usize,
}

pub struct StaleIndexJanitor {
    ctx: CorrelationContext,
    concurrency: usize,
    shutdown: Arc<RwLock<bool>>,
}

impl StaleIndexJanitor {
    pub fn new(ctx: CorrelationContext, concurrency: usize) -> Self {
        Self {
            ctx,
            concurrency: concurrency.max(1),
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Sweep on `every` until stopped
    pub async fn run(&self, every: Duration) {
        let mut ticker = interval(every);
        info!("Stale-index janitor started (every {:?})", every);

        loop {
            ticker.tick().await;
            if *self.shutdown.read().await {
                break;
            }

            match self.sweep().await {
                Ok(report) if report.removed + report.legacy_removed > 0 => info!(
                    "Janitor removed {} stale index entries ({} legacy) of {} scanned",
                    report.removed, report.legacy_removed, report.scanned
                ),
                Ok(report) => debug!("Janitor scanned {} index entries", report.scanned),
                Err(e) => error!("Janitor sweep failed: {}", e),
            }
        }

        info!("Stale-index janitor stopped");
    }

    pub async fn stop(&self) {
        let mut shutdown = self.shutdown.write().await;
        *shutdown = true;
    }

    /// One pass over every index kind
    pub async fn sweep(&self) -> CorrelatorResult<SweepReport> {
        let store = &self.ctx.store;
        let keys = store.keys();

        let mut candidates = store.scan("orphanIndex:").await?;
        candidates.extend(
            store
                .scan("burn:")
                .await?
                .into_iter()
                .filter(|k| keys.index_kind(k) == Some(IndexKind::FallbackBody)),
        );

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };

        let results: Vec<StoreResult<bool>> = stream::iter(candidates)
            .map(|key| async move { self.check_index(&key).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Janitor could not check an index entry: {}", e);
                    report.errors += 1;
                }
            }
        }

        match self.sweep_legacy().await {
            Ok(removed) => report.legacy_removed = removed,
            Err(e) => {
                warn!("Janitor could not sweep legacy pending index: {}", e);
                report.errors += 1;
            }
        }

        report.purged = store.backend().purge_expired().await?;
        Ok(report)
    }

    /// Delete `index_key` if its target is gone; returns whether it was
    /// deleted
    async fn check_index(&self, index_key: &str) -> StoreResult<bool> {
        let store = &self.ctx.store;
        let Some(kind) = store.keys().index_kind(index_key) else {
            return Ok(false);
        };
        let Some(value) = store.get_raw(index_key).await? else {
            return Ok(false);
        };

        let target = match kind {
            IndexKind::Orphan | IndexKind::OrphanBody => orphan_target(&value),
            IndexKind::FallbackBody => match fallback_pointer(&value) {
                Some(pointer) => Some(pointer.to_string()),
                // Self-contained entry with no pointer to follow
                None => return Ok(false),
            },
        };

        let stale = match target {
            Some(target) => !store.exists(&target).await?,
            None => true,
        };
        if stale {
            store.delete(index_key).await?;
            debug!("Removed stale {} {}", kind.label(), index_key);
            crate::metrics::record_janitor_removal(kind.label());
        }
        Ok(stale)
    }

    /// Rewrite the legacy `pending-index` list without entries whose target
    /// is gone
    async fn sweep_legacy(&self) -> StoreResult<usize> {
        let store = &self.ctx.store;
        let legacy_key = store.keys().legacy_pending_index();
        let Some(raw) = store.get_raw(&legacy_key).await? else {
            return Ok(0);
        };
        let Ok(mut index) = serde_json::from_value::<LegacyPendingIndex>(raw) else {
            warn!("Legacy index {} is unreadable; leaving it to expire", legacy_key);
            return Ok(0);
        };

        let before = index.burns.len();
        let mut live = Vec::with_capacity(before);
        for entry in index.burns {
            if store.exists(&entry.key).await? {
                live.push(entry);
            }
        }
        let removed = before - live.len();
        if removed == 0 {
            return Ok(0);
        }

        index.burns = live;
        if index.burns.is_empty() {
            store.delete(&legacy_key).await?;
        } else {
            store.put(&legacy_key, &index, PENDING_TTL_SECS).await?;
        }
        crate::metrics::record_janitor_removal("legacy_pending_index");
        Ok(removed)
    }
}

fn orphan_target(value: &Value) -> Option<String> {
    value
        .get("orphanKey")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
