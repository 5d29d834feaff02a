//! Outbound notifications
//!
//! Handles:
//! - Webhook delivery of completion messages and orphan alerts
//! - Webhook endpoint resolution through a secret provider
//! - Slack message formatting

pub mod format;
mod webhook;

pub use webhook::WebhookNotifier;

use crate::error::NotifyError;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Destination of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Completions,
    Alerts,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Completions => "completions",
            Channel::Alerts => "alerts",
        }
    }
}

/// Result of a send that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No endpoint configured for the channel
    NotConfigured,
}

/// Notification sink
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: Channel, payload: &Value) -> Result<Delivery, NotifyError>;
}

/// Source of webhook endpoints and other secrets
pub trait SecretProvider: Send + Sync {
    fn secret(&self, name: &str) -> Option<String>;
}

/// Reads secrets from process environment variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretProvider for EnvSecrets {
    fn secret(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Fixed secret table
#[derive(Debug, Default, Clone)]
pub struct StaticSecrets(HashMap<String, String>);

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }
}

impl SecretProvider for StaticSecrets {
    fn secret(&self, name: &str) -> Option<String> {
        self.0.get(name).filter(|v| !v.is_empty()).cloned()
    }
}
