//! Transaction ingestion: decode, dispatch to the handlers, run effects

use super::effects::EffectReport;
use super::{
    BurnOutcome, BurnRecorder, CompletionNotifier, CorrelationContext, EffectRunner, MintMatcher,
    MintOutcome, NotifyOutcome,
};
use crate::error::{CorrelatorError, CorrelatorResult};
use crate::events::{EventDecoder, RawTransaction};
use crate::notify::Notifier;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Per-handler result in an ingest report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandlerResult<T> {
    Ok { result: T },
    Failed { error: String, retryable: bool },
}

impl<T> HandlerResult<T> {
    fn failed(error: &CorrelatorError) -> Self {
        HandlerResult::Failed {
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, HandlerResult::Ok { .. })
    }
}

/// What one ingested transaction did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub tx_hash: String,
    pub chain_id: u64,
    pub burns: Vec<HandlerResult<BurnOutcome>>,
    pub mints: Vec<HandlerResult<MintOutcome>>,
    pub notifications: Vec<HandlerResult<NotifyOutcome>>,
    pub effects: Vec<EffectReport>,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        !(self.burns.iter().all(HandlerResult::is_ok)
            && self.mints.iter().all(HandlerResult::is_ok)
            && self.notifications.iter().all(HandlerResult::is_ok))
    }
}

/// Routes decoded events to the correlation handlers
pub struct CorrelationEngine {
    decoder: Arc<dyn EventDecoder>,
    burns: BurnRecorder,
    mints: MintMatcher,
    completions: Arc<CompletionNotifier>,
    effects: EffectRunner,
}

impl CorrelationEngine {
    pub fn new(
        ctx: CorrelationContext,
        decoder: Arc<dyn EventDecoder>,
        notifier: Arc<dyn Notifier>,
        explorer_tx_url: impl Into<String>,
    ) -> Self {
        let completions = Arc::new(CompletionNotifier::new(
            ctx.clone(),
            notifier.clone(),
            explorer_tx_url,
        ));

        Self {
            decoder,
            burns: BurnRecorder::new(ctx.clone()),
            mints: MintMatcher::new(ctx),
            effects: EffectRunner::new(notifier, completions.clone()),
            completions,
        }
    }

    /// Handle every CCTP event in `tx`. Handler failures are reported per
    /// event; only a decode failure fails the whole call.
    pub async fn ingest(&self, tx: &RawTransaction) -> CorrelatorResult<IngestReport> {
        let decoded = self.decoder.decode(tx)?;
        let ctx = &decoded.context;

        let mut report = IngestReport {
            tx_hash: ctx.tx_hash.clone(),
            chain_id: ctx.chain_id,
            burns: Vec::with_capacity(decoded.burns.len()),
            mints: Vec::with_capacity(decoded.mints.len()),
            notifications: Vec::with_capacity(decoded.mints.len()),
            effects: Vec::new(),
        };
        if decoded.is_empty() {
            debug!("No CCTP events in {}", ctx.tx_hash);
            return Ok(report);
        }

        let mut effects = Vec::new();

        for burn in &decoded.burns {
            match self.burns.record(ctx, burn, &decoded.messages).await {
                Ok(outcome) => {
                    effects.extend(outcome.effects);
                    report.burns.push(HandlerResult::Ok {
                        result: outcome.outcome,
                    });
                }
                Err(e) => {
                    log_failure("burn", &ctx.tx_hash, &e);
                    report.burns.push(HandlerResult::failed(&e));
                }
            }
        }

        // The matcher must finish before the notifier reads the completed
        // record it may have written
        for mint in &decoded.mints {
            match self.mints.handle(ctx, mint).await {
                Ok(outcome) => {
                    effects.extend(outcome.effects);
                    report.mints.push(HandlerResult::Ok {
                        result: outcome.outcome,
                    });
                }
                Err(e) => {
                    log_failure("mint", &ctx.tx_hash, &e);
                    report.mints.push(HandlerResult::failed(&e));
                }
            }

            match self.completions.on_mint(mint).await {
                Ok(outcome) => report.notifications.push(HandlerResult::Ok { result: outcome }),
                Err(e) => {
                    log_failure("notify", &ctx.tx_hash, &e);
                    report.notifications.push(HandlerResult::failed(&e));
                }
            }
        }

        report.effects = self.effects.run(effects).await;

        info!(
            "Ingested {} on chain {}: {} burns, {} mints, {} effects",
            report.tx_hash,
            report.chain_id,
            report.burns.len(),
            report.mints.len(),
            report.effects.len()
        );
        Ok(report)
    }
}

fn log_failure(handler: &str, tx_hash: &str, e: &CorrelatorError) {
    if e.should_alert() {
        error!("{} handler failed for {}: {}", handler, tx_hash, e);
    } else {
        warn!("{} handler failed for {}: {}", handler, tx_hash, e);
    }
    crate::metrics::record_handler_error(handler, e);
}
