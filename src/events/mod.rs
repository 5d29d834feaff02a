//! CCTP event types and decoding
//!
//! Defines the typed values the correlation handlers consume:
//! - `BurnIntent` from TokenMessenger `DepositForBurn`
//! - `MessageCandidate` from MessageTransmitter `MessageSent`
//! - `MintReceipt` from MessageTransmitter `MessageReceived`
//!
//! Raw transactions arrive as JSON (network, hash, block number, logs) and
//! are turned into these values by an `EventDecoder`.

pub mod decoder;
pub mod envelope;

pub use decoder::AbiEventDecoder;
pub use envelope::{
    body_hash, canonical_key, envelope_body, hex_key, select_envelope, EnvelopeHeader,
};

use crate::error::DecodeError;

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Deserializer, Serialize};

/// Where and when an event was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxContext {
    pub chain_id: u64,
    pub tx_hash: String,
    pub block_number: u64,
}

/// TokenMessenger `DepositForBurn`
#[derive(Debug, Clone, PartialEq)]
pub struct BurnIntent {
    pub burn_token: Address,
    pub amount: U256,
    pub depositor: Address,
    pub mint_recipient: H256,
    pub destination_domain: u32,
    pub destination_token_messenger: H256,
    pub destination_caller: H256,
    pub max_fee: U256,
    pub min_finality_threshold: u32,
    pub hook_data: Bytes,
    /// Position of the burn log inside its transaction
    pub log_index: u64,
}

/// Raw envelope bytes from a `MessageSent` log
#[derive(Debug, Clone, PartialEq)]
pub struct MessageCandidate {
    pub log_index: u64,
    pub message: Bytes,
}

/// MessageTransmitter `MessageReceived`
#[derive(Debug, Clone, PartialEq)]
pub struct MintReceipt {
    pub caller: Address,
    pub source_domain: u32,
    /// Envelope hash; the wire format calls this field `nonce`
    pub canonical_key: H256,
    pub sender: H256,
    pub finality_threshold_executed: u32,
    pub message_body: Bytes,
}

/// One log entry of a raw transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<H256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, deserialize_with = "deserialize_opt_u64")]
    pub log_index: Option<u64>,
}

/// A transaction as delivered by the event feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    /// EVM chain id of the observing network
    #[serde(deserialize_with = "deserialize_u64")]
    pub network: u64,
    pub hash: String,
    #[serde(deserialize_with = "deserialize_u64")]
    pub block_number: u64,
    #[serde(default)]
    pub logs: Vec<TxLog>,
}

impl RawTransaction {
    pub fn context(&self) -> TxContext {
        TxContext {
            chain_id: self.network,
            tx_hash: self.hash.clone(),
            block_number: self.block_number,
        }
    }
}

/// Everything the decoder recognised in one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTransaction {
    pub context: TxContext,
    pub burns: Vec<BurnIntent>,
    pub messages: Vec<MessageCandidate>,
    pub mints: Vec<MintReceipt>,
}

impl DecodedTransaction {
    pub fn is_empty(&self) -> bool {
        self.burns.is_empty() && self.messages.is_empty() && self.mints.is_empty()
    }
}

/// Turns raw chain logs into typed CCTP events
pub trait EventDecoder: Send + Sync {
    fn decode(&self, tx: &RawTransaction) -> Result<DecodedTransaction, DecodeError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn parse_number(raw: NumberOrString) -> Result<u64, String> {
    match raw {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| e.to_string()),
                None => s.parse::<u64>().map_err(|e| e.to_string()),
            }
        }
    }
}

/// Event feeds send chain ids and block numbers as numbers, decimal or hex strings
fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = NumberOrString::deserialize(deserializer)?;
    parse_number(raw).map_err(serde::de::Error::custom)
}

fn deserialize_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(raw) => parse_number(raw).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
