//! Webhook notifier over reqwest

use super::{Channel, Delivery, Notifier, SecretProvider};
use crate::config::NotifierConfig;
use crate::error::NotifyError;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Posts JSON payloads to per-channel webhook endpoints
pub struct WebhookNotifier {
    client: Client,
    secrets: Arc<dyn SecretProvider>,
    completion_secret: String,
    alert_secret: String,
}

impl WebhookNotifier {
    pub fn new(
        config: &NotifierConfig,
        secrets: Arc<dyn SecretProvider>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            secrets,
            completion_secret: config.completion_secret.clone(),
            alert_secret: config.alert_secret.clone(),
        })
    }

    fn secret_name(&self, channel: Channel) -> &str {
        match channel {
            Channel::Completions => &self.completion_secret,
            Channel::Alerts => &self.alert_secret,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, channel: Channel, payload: &Value) -> Result<Delivery, NotifyError> {
        let secret = self.secret_name(channel);
        let Some(url) = self.secrets.secret(secret) else {
            info!("No {} configured; skipping {} notification", secret, channel.as_str());
            return Ok(Delivery::NotConfigured);
        };

        let resp = self.client.post(&url).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        debug!("Delivered {} notification ({})", channel.as_str(), status);
        Ok(Delivery::Delivered)
    }
}
