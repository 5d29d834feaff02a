//! Mint matcher: completes pending transfers or records orphans

use super::merge::{self, MintSide};
use super::{CorrelationContext, Effect, SkipReason};
use crate::chain::DomainLookup;
use crate::error::{CorrelatorResult, StoreError, StoreResult, ValidationError};
use crate::events::{body_hash, hex_key, MintReceipt, TxContext};
use crate::state::keys::{COMPLETED_TTL_SECS, ORPHAN_TTL_SECS};
use crate::state::records::{
    fallback_pointer, MessageReceivedInfo, NotifiedMarker, OrphanIndexEntry,
};
use crate::state::{
    CompletedTransfer, KeySpace, OrphanReason, OrphanedMint, PendingTransfer, RecordStatus,
    Resolution, StatSide,
};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MintOutcome {
    Matched {
        completed_key: String,
        resolved_by: Resolution,
        duration_seconds: Option<i64>,
    },
    /// Replay of a mint whose transfer was already completed
    AlreadyCompleted { canonical_key: String },
    Orphaned {
        orphan_key: String,
        reason: OrphanReason,
    },
    /// Replay of a mint that is already recorded as an orphan
    DuplicateOrphan { orphan_key: String },
    Skipped { skip: SkipReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MintReport {
    pub outcome: MintOutcome,
    pub effects: Vec<Effect>,
}

impl MintReport {
    fn without_effects(outcome: MintOutcome) -> Self {
        Self {
            outcome,
            effects: Vec::new(),
        }
    }
}

/// Result of looking up the burn behind a mint
enum BurnLookup {
    Found {
        record: PendingTransfer,
        /// Keys to retire once the completed record is written
        retire: Vec<String>,
        via: Resolution,
    },
    Missing {
        corrupt: bool,
    },
}

pub struct MintMatcher {
    ctx: CorrelationContext,
}

impl MintMatcher {
    pub fn new(ctx: CorrelationContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, tx: &TxContext, mint: &MintReceipt) -> CorrelatorResult<MintReport> {
        let source_chain = match self.ctx.chains.lookup_domain(mint.source_domain) {
            DomainLookup::Supported(entry) => entry.name.clone(),
            DomainLookup::Unobservable(entry) => {
                info!(
                    "Skipping mint {}: unsupported source {}",
                    tx.tx_hash, entry.name
                );
                self.ctx
                    .bump_unsupported(StatSide::Source, &entry.name)
                    .await;
                return Ok(MintReport::without_effects(MintOutcome::Skipped {
                    skip: SkipReason::UnsupportedSource(entry.name.clone()),
                }));
            }
            DomainLookup::Unknown => {
                debug!(
                    "Skipping mint {}: unknown source domain {}",
                    tx.tx_hash, mint.source_domain
                );
                return Ok(MintReport::without_effects(MintOutcome::Skipped {
                    skip: SkipReason::UnknownSource(mint.source_domain),
                }));
            }
        };

        let key = hex_key(mint.canonical_key.as_bytes());
        let body_hash = (!mint.message_body.is_empty()).then(|| body_hash(&mint.message_body));
        let destination_chain = self.ctx.chains.chain_name(tx.chain_id);

        if self.already_notified(&source_chain, &key).await? {
            // A replayed burn may have re-created its pending record; retire
            // it without touching the announced transfer
            if let BurnLookup::Found { retire, .. } = self
                .find_burn(&source_chain, &key, body_hash.as_deref())
                .await?
            {
                for stale in &retire {
                    self.ctx.delete_quietly(stale).await;
                }
            }
            debug!("Mint {} already notified; ignoring replay", key);
            return Ok(MintReport::without_effects(MintOutcome::AlreadyCompleted {
                canonical_key: key,
            }));
        }

        match self
            .find_burn(&source_chain, &key, body_hash.as_deref())
            .await?
        {
            BurnLookup::Found {
                record,
                retire,
                via,
            } => {
                self.complete(tx, mint, &source_chain, &key, &destination_chain, record, retire, via)
                    .await
            }
            BurnLookup::Missing { corrupt } => {
                let reason = if corrupt {
                    OrphanReason::CorruptBurnData
                } else {
                    OrphanReason::NoBurnData
                };
                self.orphan(tx, mint, &source_chain, &key, body_hash, &destination_chain, reason)
                    .await
            }
        }
    }

    async fn already_notified(&self, source_chain: &str, key: &str) -> StoreResult<bool> {
        let store = &self.ctx.store;
        Ok(store
            .get_raw(&store.keys().notified(source_chain, key))
            .await?
            .map(|marker| NotifiedMarker::is_set(&marker))
            .unwrap_or(false))
    }

    /// Primary key first, then the body-hash index. Records that fail
    /// validation are deleted.
    async fn find_burn(
        &self,
        source_chain: &str,
        key: &str,
        body_hash: Option<&str>,
    ) -> StoreResult<BurnLookup> {
        let store = &self.ctx.store;
        let keys = store.keys();
        let primary_key = keys.pending(source_chain, key);
        let mut corrupt = false;

        if let Some(raw) = store.get_raw(&primary_key).await? {
            match self.validate(&primary_key, raw).await? {
                Some(record) => {
                    let mut retire = vec![primary_key];
                    if let Some(hash) = record.body_hash.as_deref() {
                        retire.push(keys.fallback_body(source_chain, hash));
                    }
                    return Ok(BurnLookup::Found {
                        record,
                        retire,
                        via: Resolution::Primary,
                    });
                }
                None => corrupt = true,
            }
        }

        let Some(hash) = body_hash else {
            return Ok(BurnLookup::Missing { corrupt });
        };
        let index_key = keys.fallback_body(source_chain, hash);
        let Some(index) = store.get_raw(&index_key).await? else {
            return Ok(BurnLookup::Missing { corrupt });
        };

        let (record_key, raw) = match fallback_pointer(&index) {
            // Already looked at the primary key above
            Some(pointer) if pointer == primary_key => {
                return Ok(BurnLookup::Missing { corrupt });
            }
            Some(pointer) => {
                let pointer = pointer.to_string();
                match store.get_raw(&pointer).await? {
                    Some(raw) => (pointer, raw),
                    None => {
                        debug!("Fallback index {} points at missing {}", index_key, pointer);
                        return Ok(BurnLookup::Missing { corrupt });
                    }
                }
            }
            None => (index_key.clone(), index),
        };

        match self.validate(&record_key, raw).await? {
            Some(record) => {
                let mut retire = vec![record_key];
                if !retire.contains(&index_key) {
                    retire.push(index_key);
                }
                Ok(BurnLookup::Found {
                    record,
                    retire,
                    via: Resolution::Fallback,
                })
            }
            None => Ok(BurnLookup::Missing { corrupt: true }),
        }
    }

    /// Parse a stored pending record; a corrupt record is deleted and `None`
    /// returned
    async fn validate(&self, key: &str, raw: Value) -> StoreResult<Option<PendingTransfer>> {
        match PendingTransfer::from_stored(raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                self.report_corrupt(key, &e);
                self.ctx.store.delete(key).await?;
                Ok(None)
            }
        }
    }

    fn report_corrupt(&self, key: &str, error: &ValidationError) {
        warn!("Deleting corrupt pending record {}: {}", key, error);
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        tx: &TxContext,
        mint: &MintReceipt,
        source_chain: &str,
        key: &str,
        destination_chain: &str,
        record: PendingTransfer,
        retire: Vec<String>,
        via: Resolution,
    ) -> CorrelatorResult<MintReport> {
        let store = &self.ctx.store;
        let completed_key = store.keys().completed(source_chain, key);

        // A replayed match keeps the first completed record so the rewrite is
        // value-identical
        let existing = store
            .get_raw(&completed_key)
            .await?
            .and_then(|raw| serde_json::from_value::<CompletedTransfer>(raw).ok())
            .filter(|c| c.mint_timestamp > 0 && !c.amount.trim().is_empty());

        let completed = match existing {
            Some(existing) => existing,
            None => {
                let side = MintSide {
                    canonical_key: key.to_string(),
                    destination_chain: destination_chain.to_string(),
                    destination_chain_id: tx.chain_id,
                    destination_tx_hash: tx.tx_hash.clone(),
                    destination_block_number: tx.block_number,
                    mint_timestamp: self.ctx.now(),
                    received: received_info(mint, key),
                };
                merge::complete(&record, side, via)
            }
        };
        store
            .put(&completed_key, &completed, COMPLETED_TTL_SECS)
            .await?;

        // Primary pending key must go; a failure here surfaces so redelivery
        // can finish the job
        let mut retire = retire.into_iter();
        if let Some(first) = retire.next() {
            store.delete(&first).await?;
        }
        for stale in retire {
            self.ctx.delete_quietly(&stale).await;
        }

        info!(
            "Matched {} mint {} via {} ({} -> {}, duration {:?}s)",
            completed.transfer_type.as_str(),
            key,
            via.as_str(),
            source_chain,
            destination_chain,
            completed.duration_seconds
        );
        crate::metrics::record_match(source_chain, via.as_str());
        if let Some(secs) = completed.duration_seconds {
            crate::metrics::record_duration(completed.transfer_type.as_str(), secs);
        }

        Ok(MintReport::without_effects(MintOutcome::Matched {
            completed_key,
            resolved_by: completed.resolved_by,
            duration_seconds: completed.duration_seconds,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn orphan(
        &self,
        tx: &TxContext,
        mint: &MintReceipt,
        source_chain: &str,
        key: &str,
        body_hash: Option<String>,
        destination_chain: &str,
        reason: OrphanReason,
    ) -> CorrelatorResult<MintReport> {
        let store = &self.ctx.store;
        let keys = store.keys();

        let completed_key = keys.completed(source_chain, key);
        if self.already_notified(source_chain, key).await?
            || store.exists(&completed_key).await?
        {
            debug!("Mint {} already completed; ignoring replay", key);
            return Ok(MintReport::without_effects(MintOutcome::AlreadyCompleted {
                canonical_key: key.to_string(),
            }));
        }

        let index_key = keys.orphan_index(source_chain, key);
        let existing = match store.get::<OrphanIndexEntry>(&index_key).await {
            Ok(entry) => entry,
            Err(StoreError::Serialization { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(existing) = existing {
            if store.exists(&existing.orphan_key).await? {
                debug!("Mint {} already orphaned at {}", key, existing.orphan_key);
                return Ok(MintReport::without_effects(MintOutcome::DuplicateOrphan {
                    orphan_key: existing.orphan_key,
                }));
            }
        }

        // An orphan left behind by an interrupted earlier attempt keeps its key
        let earlier = store
            .scan(&KeySpace::orphaned_scan_prefix(destination_chain, key))
            .await?
            .into_iter()
            .find_map(|k| KeySpace::orphaned_timestamp(&k).map(|ts| (k, ts)));
        let (orphan_key, now) = match earlier {
            Some((orphan_key, ts)) => {
                debug!("Reusing orphan {} for mint {}", orphan_key, key);
                (orphan_key, ts)
            }
            None => {
                let now = self.ctx.now();
                (keys.orphaned(destination_chain, key, now), now)
            }
        };
        let received = received_info(mint, key);
        let orphan = OrphanedMint {
            canonical_key: key.to_string(),
            body_hash: body_hash.clone(),
            source_domain: mint.source_domain,
            source_chain: source_chain.to_string(),
            destination_chain: destination_chain.to_string(),
            destination_chain_id: tx.chain_id,
            destination_tx_hash: tx.tx_hash.clone(),
            destination_block_number: tx.block_number,
            mint_timestamp: now,
            caller: received.caller,
            sender: received.sender,
            finality_threshold_executed: received.finality_threshold_executed,
            status: RecordStatus::Orphaned,
            reason,
        };
        let index = OrphanIndexEntry {
            orphan_key: orphan_key.clone(),
            canonical_key: key.to_string(),
            created_at: now,
        };

        store.put(&orphan_key, &orphan, ORPHAN_TTL_SECS).await?;
        store.put(&index_key, &index, ORPHAN_TTL_SECS).await?;
        if let Some(hash) = body_hash.as_deref() {
            store
                .put(&keys.orphan_body_index(source_chain, hash), &index, ORPHAN_TTL_SECS)
                .await?;
        }

        warn!(
            "Orphaned mint {} on {} from {} ({})",
            key,
            destination_chain,
            source_chain,
            reason.as_str()
        );
        crate::metrics::record_orphan(source_chain, reason.as_str());

        Ok(MintReport {
            outcome: MintOutcome::Orphaned { orphan_key, reason },
            effects: vec![Effect::OrphanAlert(orphan)],
        })
    }
}

fn received_info(mint: &MintReceipt, key: &str) -> MessageReceivedInfo {
    MessageReceivedInfo {
        caller: hex_key(mint.caller.as_bytes()),
        source_domain: mint.source_domain,
        nonce: key.to_string(),
        sender: hex_key(mint.sender.as_bytes()),
        finality_threshold_executed: mint.finality_threshold_executed,
    }
}
