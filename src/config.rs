//! Configuration management for the CCTP correlator
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::{ChainEntry, ChainRegistry};
use crate::events::decoder::{DEFAULT_MESSAGE_TRANSMITTER, DEFAULT_TOKEN_MESSENGER};

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "CCTP_CORRELATOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub service: ServiceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub janitor: JanitorConfig,
    /// Overrides the built-in CCTP chain table when non-empty
    #[serde(default)]
    pub chains: Vec<ChainEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub instance_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            namespace: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    #[serde(default = "default_token_messenger")]
    pub token_messenger: String,
    #[serde(default = "default_message_transmitter")]
    pub message_transmitter: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            token_messenger: default_token_messenger(),
            message_transmitter: default_message_transmitter(),
        }
    }
}

impl ContractsConfig {
    pub fn token_messenger_address(&self) -> Result<Address> {
        parse_address("contracts.token_messenger", &self.token_messenger)
    }

    pub fn message_transmitter_address(&self) -> Result<Address> {
        parse_address("contracts.message_transmitter", &self.message_transmitter)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Secret holding the completion webhook URL
    #[serde(default = "default_completion_secret")]
    pub completion_secret: String,
    /// Secret holding the alert webhook URL
    #[serde(default = "default_alert_secret")]
    pub alert_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Block explorer transaction URL with a `{tx}` placeholder
    #[serde(default = "default_explorer_tx_url")]
    pub explorer_tx_url: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            completion_secret: default_completion_secret(),
            alert_secret: default_alert_secret(),
            timeout_secs: default_timeout_secs(),
            explorer_tx_url: default_explorer_tx_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JanitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub concurrency: usize,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            concurrency: 8,
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_token_messenger() -> String {
    DEFAULT_TOKEN_MESSENGER.to_string()
}

fn default_message_transmitter() -> String {
    DEFAULT_MESSAGE_TRANSMITTER.to_string()
}

fn default_completion_secret() -> String {
    "SLACK_WEBHOOK_URL".to_string()
}

fn default_alert_secret() -> String {
    "WEBHOOK_URL".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_explorer_tx_url() -> String {
    "https://tdly.co/tx/{tx}".to_string()
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse::<Address>()
        .with_context(|| format!("{} is not a valid address: {:?}", field, value))
}

impl Settings {
    /// Load settings from `$CCTP_CORRELATOR_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.store.backend == StoreBackend::Postgres
            && self.store.url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            anyhow::bail!("store.url is required for the postgres backend");
        }

        if self.store.min_connections > self.store.max_connections {
            anyhow::bail!(
                "store.min_connections ({}) exceeds store.max_connections ({})",
                self.store.min_connections,
                self.store.max_connections
            );
        }

        self.contracts.token_messenger_address()?;
        self.contracts.message_transmitter_address()?;

        if self.janitor.enabled && self.janitor.interval_secs == 0 {
            anyhow::bail!("janitor.interval_secs must be positive");
        }

        if !self.notifier.explorer_tx_url.contains(crate::notify::format::TX_PLACEHOLDER) {
            tracing::warn!(
                "notifier.explorer_tx_url has no {{tx}} placeholder; links will not vary"
            );
        }

        self.chain_registry()?;
        Ok(())
    }

    /// Configured chain table, or the built-in CCTP table
    pub fn chain_registry(&self) -> Result<ChainRegistry> {
        if self.chains.is_empty() {
            return Ok(ChainRegistry::cctp_mainnet());
        }
        ChainRegistry::new(self.chains.clone()).map_err(|e| anyhow::anyhow!("{}", e))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
