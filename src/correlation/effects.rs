//! Deferred side effects and the shell that runs them

use super::notify::{CompletionNotifier, NotifyOutcome};
use crate::notify::{format, Channel, Delivery, Notifier};
use crate::state::OrphanedMint;

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

/// Work queued by a handler after its state transition is written
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OrphanAlert(OrphanedMint),
    NotifyCompletion {
        source_chain: String,
        canonical_key: String,
    },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::OrphanAlert(_) => "orphan_alert",
            Effect::NotifyCompletion { .. } => "notify_completion",
        }
    }

    pub fn canonical_key(&self) -> &str {
        match self {
            Effect::OrphanAlert(orphan) => &orphan.canonical_key,
            Effect::NotifyCompletion { canonical_key, .. } => canonical_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectReport {
    pub effect: &'static str,
    pub canonical_key: String,
    pub result: String,
}

/// Executes effects; failures are logged and never propagate
pub struct EffectRunner {
    alerts: Arc<dyn Notifier>,
    completions: Arc<CompletionNotifier>,
}

impl EffectRunner {
    pub fn new(alerts: Arc<dyn Notifier>, completions: Arc<CompletionNotifier>) -> Self {
        Self {
            alerts,
            completions,
        }
    }

    pub async fn run(&self, effects: Vec<Effect>) -> Vec<EffectReport> {
        let mut reports = Vec::with_capacity(effects.len());
        for effect in effects {
            let result = self.run_one(&effect).await;
            reports.push(EffectReport {
                effect: effect.name(),
                canonical_key: effect.canonical_key().to_string(),
                result,
            });
        }
        reports
    }

    async fn run_one(&self, effect: &Effect) -> String {
        match effect {
            Effect::OrphanAlert(orphan) => {
                let payload = format::orphan_alert(orphan);
                let result = match self.alerts.send(Channel::Alerts, &payload).await {
                    Ok(Delivery::Delivered) => "delivered".to_string(),
                    Ok(Delivery::NotConfigured) => "not_configured".to_string(),
                    Err(e) => {
                        error!(
                            "Failed to send orphan alert for {}: {}",
                            orphan.canonical_key, e
                        );
                        "failed".to_string()
                    }
                };
                crate::metrics::record_notification(Channel::Alerts.as_str(), &result);
                result
            }
            Effect::NotifyCompletion {
                source_chain,
                canonical_key,
            } => match self.completions.notify(source_chain, canonical_key).await {
                Ok(outcome) => outcome.as_str().to_string(),
                Err(e) => {
                    warn!("Completion notify for {} failed: {}", canonical_key, e);
                    NotifyOutcome::Failed(e.to_string()).as_str().to_string()
                }
            },
        }
    }
}
