//! Completion notifier: announces each completed transfer once

use super::{CorrelationContext, SkipReason};
use crate::chain::DomainLookup;
use crate::error::CorrelatorResult;
use crate::events::{hex_key, MintReceipt};
use crate::notify::{format, Channel, Delivery, Notifier};
use crate::state::keys::NOTIFIED_TTL_SECS;
use crate::state::records::NotifiedMarker;
use crate::state::CompletedTransfer;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOutcome {
    Delivered,
    AlreadyNotified,
    /// No completed record (yet) for the key
    NotCompleted,
    NotConfigured,
    Skipped(SkipReason),
    Failed(String),
}

impl NotifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Delivered => "delivered",
            NotifyOutcome::AlreadyNotified => "already_notified",
            NotifyOutcome::NotCompleted => "not_completed",
            NotifyOutcome::NotConfigured => "not_configured",
            NotifyOutcome::Skipped(_) => "skipped",
            NotifyOutcome::Failed(_) => "failed",
        }
    }
}

pub struct CompletionNotifier {
    ctx: CorrelationContext,
    notifier: Arc<dyn Notifier>,
    explorer_tx_url: String,
}

impl CompletionNotifier {
    pub fn new(
        ctx: CorrelationContext,
        notifier: Arc<dyn Notifier>,
        explorer_tx_url: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            notifier,
            explorer_tx_url: explorer_tx_url.into(),
        }
    }

    /// Trigger from destination-chain activity
    pub async fn on_mint(&self, mint: &MintReceipt) -> CorrelatorResult<NotifyOutcome> {
        let source_chain = match self.ctx.chains.lookup_domain(mint.source_domain) {
            DomainLookup::Supported(entry) => entry.name.clone(),
            DomainLookup::Unobservable(entry) => {
                debug!("Not notifying for unsupported source {}", entry.name);
                return Ok(NotifyOutcome::Skipped(SkipReason::UnsupportedSource(
                    entry.name.clone(),
                )));
            }
            DomainLookup::Unknown => {
                return Ok(NotifyOutcome::Skipped(SkipReason::UnknownSource(
                    mint.source_domain,
                )));
            }
        };

        self.notify(&source_chain, &hex_key(mint.canonical_key.as_bytes()))
            .await
    }

    /// Send the completion message for `(source_chain, canonical_key)` unless
    /// it was already sent
    pub async fn notify(
        &self,
        source_chain: &str,
        canonical_key: &str,
    ) -> CorrelatorResult<NotifyOutcome> {
        let keys = self.ctx.store.keys();
        let notified_key = keys.notified(source_chain, canonical_key);
        let completed_key = keys.completed(source_chain, canonical_key);

        if let Some(marker) = self.ctx.store.get_raw(&notified_key).await? {
            if NotifiedMarker::is_set(&marker) {
                debug!("Already notified for {}", canonical_key);
                return Ok(NotifyOutcome::AlreadyNotified);
            }
        }

        let Some(raw) = self.ctx.store.get_raw(&completed_key).await? else {
            debug!("No completed record yet for {}", completed_key);
            return Ok(NotifyOutcome::NotCompleted);
        };
        let completed: CompletedTransfer = match serde_json::from_value(raw) {
            Ok(completed) => completed,
            Err(e) => {
                warn!("Unreadable completed record {}: {}", completed_key, e);
                return Ok(NotifyOutcome::NotCompleted);
            }
        };
        if completed.amount.trim().is_empty() {
            debug!("Completed record {} has no amount", completed_key);
            return Ok(NotifyOutcome::NotCompleted);
        }

        let message = format::completion_message(&completed, &self.explorer_tx_url);
        let outcome = match self.notifier.send(Channel::Completions, &message).await {
            Ok(Delivery::Delivered) => {
                let marker = NotifiedMarker {
                    notified: true,
                    at: self.ctx.now(),
                };
                self.ctx
                    .store
                    .put(&notified_key, &marker, NOTIFIED_TTL_SECS)
                    .await?;
                self.ctx.store.delete(&completed_key).await?;

                info!(
                    "Notified {} transfer {} ({} -> {})",
                    completed.transfer_type.as_str(),
                    canonical_key,
                    completed.source_chain,
                    completed.destination_chain
                );
                NotifyOutcome::Delivered
            }
            Ok(Delivery::NotConfigured) => NotifyOutcome::NotConfigured,
            Err(e) => {
                error!("Failed to send completion for {}: {}", canonical_key, e);
                NotifyOutcome::Failed(e.to_string())
            }
        };

        crate::metrics::record_notification(Channel::Completions.as_str(), outcome.as_str());
        Ok(outcome)
    }
}
