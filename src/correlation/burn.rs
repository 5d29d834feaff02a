//! Burn recorder: stores pending transfers and resolves earlier orphans

use super::merge::{self, MintSide};
use super::{CorrelationContext, Effect, SkipReason};
use crate::chain::DomainLookup;
use crate::error::{CorrelatorResult, StoreResult};
use crate::events::{
    body_hash, canonical_key, envelope_body, hex_key, select_envelope, BurnIntent,
    EnvelopeHeader, MessageCandidate, TxContext,
};
use crate::state::keys::{COMPLETED_TTL_SECS, PENDING_TTL_SECS};
use crate::state::records::{FallbackIndexEntry, NotifiedMarker, OrphanIndexEntry};
use crate::state::{
    OrphanedMint, PendingTransfer, RecordStatus, Resolution, StatSide, TransferType,
};

use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BurnOutcome {
    Recorded {
        canonical_key: String,
        pending_key: String,
    },
    /// Replay of a burn whose transfer was already completed
    AlreadyCompleted { canonical_key: String },
    /// An orphaned mint was waiting for this burn
    Reconciled {
        canonical_key: String,
        completed_key: String,
    },
    Skipped {
        skip: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BurnReport {
    pub outcome: BurnOutcome,
    pub effects: Vec<Effect>,
}

impl BurnReport {
    fn skipped(skip: SkipReason) -> Self {
        Self {
            outcome: BurnOutcome::Skipped { skip },
            effects: Vec::new(),
        }
    }
}

/// An orphan found through one of its index entries
struct FoundOrphan {
    orphan_key: String,
    orphan: OrphanedMint,
}

pub struct BurnRecorder {
    ctx: CorrelationContext,
}

impl BurnRecorder {
    pub fn new(ctx: CorrelationContext) -> Self {
        Self { ctx }
    }

    /// Record one burn observed in `tx`, choosing its envelope among
    /// `candidates`
    pub async fn record(
        &self,
        tx: &TxContext,
        burn: &BurnIntent,
        candidates: &[MessageCandidate],
    ) -> CorrelatorResult<BurnReport> {
        let chains = &self.ctx.chains;
        let source_chain = chains.chain_name(tx.chain_id);
        let bound_domain = chains.by_chain_id(tx.chain_id).map(|e| e.domain);

        let destination_chain = match chains.lookup_domain(burn.destination_domain) {
            DomainLookup::Supported(entry) => entry.name.clone(),
            DomainLookup::Unobservable(entry) => {
                info!(
                    "Skipping burn {} on {}: unsupported destination {}",
                    tx.tx_hash, source_chain, entry.name
                );
                self.ctx
                    .bump_unsupported(StatSide::Destination, &entry.name)
                    .await;
                return Ok(BurnReport::skipped(SkipReason::UnsupportedDestination(
                    entry.name.clone(),
                )));
            }
            DomainLookup::Unknown => {
                let label = format!("domain-{}", burn.destination_domain);
                info!(
                    "Skipping burn {} on {}: unknown destination domain {}",
                    tx.tx_hash, source_chain, burn.destination_domain
                );
                self.ctx
                    .bump_unsupported(StatSide::Destination, &label)
                    .await;
                return Ok(BurnReport::skipped(SkipReason::UnknownDestination(
                    burn.destination_domain,
                )));
            }
        };

        let envelope = select_envelope(candidates, burn, bound_domain)?;
        let key = canonical_key(&envelope.message);
        let body = envelope_body(&envelope.message);
        let body_hash = EnvelopeHeader::parse(&envelope.message)
            .ok()
            .filter(|_| !body.is_empty())
            .map(|_| body_hash(body));

        let pending = PendingTransfer {
            canonical_key: key.clone(),
            body_hash: body_hash.clone(),
            source_chain: source_chain.clone(),
            source_chain_id: tx.chain_id,
            source_domain: bound_domain,
            source_tx_hash: tx.tx_hash.clone(),
            source_block_number: tx.block_number,
            burn_token: hex_key(burn.burn_token.as_bytes()),
            amount: burn.amount.to_string(),
            depositor: hex_key(burn.depositor.as_bytes()),
            mint_recipient: hex_key(burn.mint_recipient.as_bytes()),
            destination_domain: burn.destination_domain,
            destination_chain: destination_chain.clone(),
            destination_token_messenger: hex_key(burn.destination_token_messenger.as_bytes()),
            destination_caller: hex_key(burn.destination_caller.as_bytes()),
            max_fee: burn.max_fee.to_string(),
            min_finality_threshold: burn.min_finality_threshold,
            hook_data: hex_key(&burn.hook_data),
            transfer_type: TransferType::from_min_finality(burn.min_finality_threshold),
            burn_timestamp: Some(self.ctx.now()),
            status: RecordStatus::Pending,
        };

        let keys = self.ctx.store.keys();
        if self.already_completed(&source_chain, &key).await? {
            debug!("Burn {} already completed; ignoring replay", key);
            return Ok(BurnReport {
                outcome: BurnOutcome::AlreadyCompleted { canonical_key: key },
                effects: Vec::new(),
            });
        }

        let pending_key = keys.pending(&source_chain, &key);
        let fallback_key = body_hash
            .as_deref()
            .map(|hash| keys.fallback_body(&source_chain, hash));

        self.write_pending(&pending_key, fallback_key.as_deref(), &pending)
            .await?;
        info!(
            "Stored {} burn {} ({} -> {}, amount {})",
            pending.transfer_type.as_str(),
            key,
            source_chain,
            destination_chain,
            pending.amount
        );
        crate::metrics::record_burn(&source_chain, pending.transfer_type.as_str());

        let mut index_keys = vec![keys.orphan_index(&source_chain, &key)];
        if let Some(hash) = body_hash.as_deref() {
            index_keys.push(keys.orphan_body_index(&source_chain, hash));
        }

        let Some(found) = self.find_orphan(&index_keys).await? else {
            return Ok(BurnReport {
                outcome: BurnOutcome::Recorded {
                    canonical_key: key,
                    pending_key,
                },
                effects: Vec::new(),
            });
        };

        self.reconcile(&pending, &pending_key, fallback_key.as_deref(), found)
            .await
    }

    async fn already_completed(&self, source_chain: &str, key: &str) -> StoreResult<bool> {
        let store = &self.ctx.store;
        let keys = store.keys();
        if store.exists(&keys.completed(source_chain, key)).await? {
            return Ok(true);
        }
        Ok(store
            .get_raw(&keys.notified(source_chain, key))
            .await?
            .map(|marker| NotifiedMarker::is_set(&marker))
            .unwrap_or(false))
    }

    /// Pending record first, then its body index. A failed index write
    /// withdraws the pending record.
    async fn write_pending(
        &self,
        pending_key: &str,
        fallback_key: Option<&str>,
        pending: &PendingTransfer,
    ) -> StoreResult<()> {
        let store = &self.ctx.store;
        store.put(pending_key, pending, PENDING_TTL_SECS).await?;

        if let Some(fallback_key) = fallback_key {
            let entry = FallbackIndexEntry {
                primary_key: pending_key,
                record: pending,
            };
            if let Err(e) = store.put(fallback_key, &entry, PENDING_TTL_SECS).await {
                self.ctx.delete_quietly(pending_key).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Follow orphan index entries in order; dangling or unreadable entries
    /// are deleted on the way
    async fn find_orphan(&self, index_keys: &[String]) -> StoreResult<Option<FoundOrphan>> {
        let store = &self.ctx.store;

        for index_key in index_keys {
            let Some(raw) = store.get_raw(index_key).await? else {
                continue;
            };
            let entry: OrphanIndexEntry = match serde_json::from_value(raw) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Dropping unreadable orphan index {}: {}", index_key, e);
                    self.ctx.delete_quietly(index_key).await;
                    continue;
                }
            };

            let orphan = match store.get_raw(&entry.orphan_key).await? {
                Some(raw) => serde_json::from_value::<OrphanedMint>(raw).ok(),
                None => None,
            };
            match orphan {
                Some(orphan) if !orphan.canonical_key.is_empty() => {
                    return Ok(Some(FoundOrphan {
                        orphan_key: entry.orphan_key,
                        orphan,
                    }));
                }
                _ => {
                    debug!("Dropping dangling orphan index {}", index_key);
                    self.ctx.delete_quietly(index_key).await;
                }
            }
        }

        Ok(None)
    }

    async fn reconcile(
        &self,
        pending: &PendingTransfer,
        pending_key: &str,
        fallback_key: Option<&str>,
        found: FoundOrphan,
    ) -> CorrelatorResult<BurnReport> {
        let FoundOrphan { orphan_key, orphan } = found;
        let keys = self.ctx.store.keys();
        let source_chain = &pending.source_chain;

        let completed = merge::complete(
            pending,
            MintSide::from_orphan(&orphan),
            Resolution::Reconciliation,
        );
        let completed_key = keys.completed(source_chain, &orphan.canonical_key);
        self.ctx
            .store
            .put(&completed_key, &completed, COMPLETED_TTL_SECS)
            .await?;

        // Completed record is durable; the rest is cleanup that the janitor
        // and TTLs also cover
        let mut stale = vec![
            orphan_key,
            keys.orphan_index(source_chain, &orphan.canonical_key),
            pending_key.to_string(),
        ];
        if let Some(hash) = orphan.body_hash.as_deref() {
            stale.push(keys.orphan_body_index(source_chain, hash));
        }
        if let Some(hash) = pending.body_hash.as_deref() {
            stale.push(keys.orphan_body_index(source_chain, hash));
        }
        stale.extend(fallback_key.map(str::to_string));
        stale.dedup();
        for key in &stale {
            self.ctx.delete_quietly(key).await;
        }

        info!(
            "Reconciled orphaned mint {} with burn {} ({} -> {})",
            orphan.canonical_key, pending.source_tx_hash, source_chain, orphan.destination_chain
        );
        crate::metrics::record_reconciliation(source_chain);

        Ok(BurnReport {
            outcome: BurnOutcome::Reconciled {
                canonical_key: orphan.canonical_key.clone(),
                completed_key,
            },
            effects: vec![Effect::NotifyCompletion {
                source_chain: source_chain.clone(),
                canonical_key: orphan.canonical_key,
            }],
        })
    }
}
