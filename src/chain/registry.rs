//! Immutable chain/domain lookup table
//!
//! CCTP identifies chains by a small "domain" number inside messages, while
//! the event feeds identify the observing chain by its EVM chain id. Both
//! must resolve to the same chain name for record keys to line up across the
//! burn and mint sides.

use crate::error::{CorrelatorError, CorrelatorResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_observable() -> bool {
    true
}

/// One chain known to the correlator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub name: String,
    pub domain: u32,
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Whether events on this chain reach the correlator at all
    #[serde(default = "default_observable")]
    pub observable: bool,
}

impl ChainEntry {
    fn new(name: &str, domain: u32, chain_id: Option<u64>, observable: bool) -> Self {
        Self {
            name: name.to_string(),
            domain,
            chain_id,
            observable,
        }
    }
}

/// Result of resolving a CCTP domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainLookup<'a> {
    Supported(&'a ChainEntry),
    Unobservable(&'a ChainEntry),
    Unknown,
}

/// Chain table passed into the handlers at construction
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    entries: Vec<ChainEntry>,
    by_domain: HashMap<u32, usize>,
    by_chain_id: HashMap<u64, usize>,
}

impl ChainRegistry {
    /// Build a registry, rejecting duplicate names, domains or chain ids
    pub fn new(entries: Vec<ChainEntry>) -> CorrelatorResult<Self> {
        let mut by_domain = HashMap::new();
        let mut by_chain_id = HashMap::new();
        let mut names = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(CorrelatorError::Config(format!(
                    "Chain for domain {} has an empty name",
                    entry.domain
                )));
            }
            if names.insert(entry.name.clone(), idx).is_some() {
                return Err(CorrelatorError::Config(format!(
                    "Duplicate chain name {}",
                    entry.name
                )));
            }
            if by_domain.insert(entry.domain, idx).is_some() {
                return Err(CorrelatorError::Config(format!(
                    "Duplicate CCTP domain {}",
                    entry.domain
                )));
            }
            if let Some(chain_id) = entry.chain_id {
                if by_chain_id.insert(chain_id, idx).is_some() {
                    return Err(CorrelatorError::Config(format!(
                        "Duplicate chain id {}",
                        chain_id
                    )));
                }
            }
        }

        Ok(Self {
            entries,
            by_domain,
            by_chain_id,
        })
    }

    /// The CCTP v2 mainnet table
    pub fn cctp_mainnet() -> Self {
        let entries = vec![
            ChainEntry::new("ethereum", 0, Some(1), true),
            ChainEntry::new("avalanche", 1, Some(43114), true),
            ChainEntry::new("optimism", 2, Some(10), true),
            ChainEntry::new("arbitrum", 3, Some(42161), true),
            ChainEntry::new("solana", 5, None, false),
            ChainEntry::new("base", 6, Some(8453), true),
            ChainEntry::new("polygon", 7, Some(137), true),
            ChainEntry::new("unichain", 10, Some(130), true),
            ChainEntry::new("linea", 11, Some(59144), true),
            ChainEntry::new("codex", 12, None, false),
            ChainEntry::new("sonic", 13, Some(146), true),
            ChainEntry::new("worldchain", 14, Some(480), true),
            ChainEntry::new("sei", 16, Some(1329), true),
            ChainEntry::new("bnb", 17, Some(56), true),
            ChainEntry::new("xdc", 18, Some(50), false),
            ChainEntry::new("hyperevm", 19, None, false),
            ChainEntry::new("ink", 21, Some(57073), true),
            ChainEntry::new("plume", 22, Some(98866), true),
            ChainEntry::new("arc-testnet", 26, None, false),
        ];

        // Static table, uniqueness holds by construction
        Self::new(entries).unwrap_or_else(|_| unreachable!("built-in chain table is unique"))
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn by_domain(&self, domain: u32) -> Option<&ChainEntry> {
        self.by_domain.get(&domain).map(|idx| &self.entries[*idx])
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&ChainEntry> {
        self.by_chain_id.get(&chain_id).map(|idx| &self.entries[*idx])
    }

    /// Resolve a domain and classify whether the platform can observe it
    pub fn lookup_domain(&self, domain: u32) -> DomainLookup<'_> {
        match self.by_domain(domain) {
            Some(entry) if entry.observable => DomainLookup::Supported(entry),
            Some(entry) => DomainLookup::Unobservable(entry),
            None => DomainLookup::Unknown,
        }
    }

    /// Chain name for the network an event was observed on
    pub fn chain_name(&self, chain_id: u64) -> String {
        self.by_chain_id(chain_id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| format!("chain-{}", chain_id))
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::cctp_mainnet()
    }
}
