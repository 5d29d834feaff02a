//! Persisted record shapes
//!
//! All records are JSON objects with camelCase field names. Reads are lenient
//! (unknown fields ignored, optional fields defaulted); the required fields of
//! a pending transfer are checked explicitly before it may be matched.

use crate::error::ValidationError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Finality-threshold cutoff between fast and standard transfers
pub const FAST_FINALITY_THRESHOLD: u32 = 1000;

/// Fields a pending transfer must carry to be matchable
const REQUIRED_PENDING_FIELDS: [&str; 3] = ["amount", "sourceChain", "canonicalKey"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferType {
    Fast,
    #[default]
    Standard,
}

impl TransferType {
    pub fn from_min_finality(min_finality_threshold: u32) -> Self {
        if min_finality_threshold <= FAST_FINALITY_THRESHOLD {
            TransferType::Fast
        } else {
            TransferType::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Fast => "fast",
            TransferType::Standard => "standard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    #[default]
    Pending,
    Completed,
    PendingMint,
    Orphaned,
}

/// How a completed transfer found its burn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Primary,
    Fallback,
    Reconciliation,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Primary => "primary",
            Resolution::Fallback => "fallback",
            Resolution::Reconciliation => "reconciliation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReason {
    #[default]
    NoBurnData,
    CorruptBurnData,
}

impl OrphanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanReason::NoBurnData => "no_burn_data",
            OrphanReason::CorruptBurnData => "corrupt_burn_data",
        }
    }
}

/// A burn awaiting its mint, stored under `burn:{src}:{key}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PendingTransfer {
    pub canonical_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_hash: Option<String>,
    pub source_chain: String,
    pub source_chain_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_domain: Option<u32>,
    pub source_tx_hash: String,
    pub source_block_number: u64,
    pub burn_token: String,
    pub amount: String,
    pub depositor: String,
    pub mint_recipient: String,
    pub destination_domain: u32,
    pub destination_chain: String,
    pub destination_token_messenger: String,
    pub destination_caller: String,
    pub max_fee: String,
    pub min_finality_threshold: u32,
    pub hook_data: String,
    pub transfer_type: TransferType,
    pub burn_timestamp: Option<i64>,
    pub status: RecordStatus,
}

impl PendingTransfer {
    /// Validate and parse a stored pending record
    pub fn from_stored(value: Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;
        for field in REQUIRED_PENDING_FIELDS {
            if !has_content(obj, field) {
                return Err(ValidationError::MissingField(field));
            }
        }
        serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))
    }
}

fn has_content(obj: &Map<String, Value>, field: &str) -> bool {
    match obj.get(field) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

/// Body-hash index entry: a pointer to the primary pending key plus a copy of
/// the record, stored under `burn:{src}:body:{bodyHash}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackIndexEntry<'a> {
    pub primary_key: &'a str,
    #[serde(flatten)]
    pub record: &'a PendingTransfer,
}

/// Pointer carried by a fallback index value, if any
pub fn fallback_pointer(value: &Value) -> Option<&str> {
    value
        .get("primaryKey")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Mint-side details copied into the completed record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageReceivedInfo {
    pub caller: String,
    pub source_domain: u32,
    pub nonce: String,
    pub sender: String,
    pub finality_threshold_executed: u32,
}

/// A correlated transfer, stored under `completed:{src}:{key}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletedTransfer {
    pub canonical_key: String,
    /// Key the burn was stored under when it differs from the mint's key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burn_canonical_key: Option<String>,
    pub source_chain: String,
    pub source_chain_id: u64,
    pub source_tx_hash: String,
    pub source_block_number: u64,
    pub burn_token: String,
    pub amount: String,
    pub depositor: String,
    pub mint_recipient: String,
    pub destination_domain: u32,
    pub destination_chain: String,
    pub destination_chain_id: u64,
    pub destination_tx_hash: String,
    pub destination_block_number: u64,
    pub destination_token_messenger: String,
    pub destination_caller: String,
    pub max_fee: String,
    pub min_finality_threshold: u32,
    pub hook_data: String,
    pub transfer_type: TransferType,
    pub burn_timestamp: Option<i64>,
    pub mint_timestamp: i64,
    pub message_received: MessageReceivedInfo,
    pub status: RecordStatus,
    pub duration_seconds: Option<i64>,
    pub resolved_by: Resolution,
}

/// A mint seen before its burn, stored under `orphaned:{dst}:{key}:{ts}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrphanedMint {
    pub canonical_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_hash: Option<String>,
    pub source_domain: u32,
    pub source_chain: String,
    pub destination_chain: String,
    pub destination_chain_id: u64,
    pub destination_tx_hash: String,
    pub destination_block_number: u64,
    pub mint_timestamp: i64,
    pub caller: String,
    pub sender: String,
    pub finality_threshold_executed: u32,
    pub status: RecordStatus,
    pub reason: OrphanReason,
}

/// Pointer from `orphanIndex:{src}:{key}` (or its body variant) to an orphan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanIndexEntry {
    pub orphan_key: String,
    pub canonical_key: String,
    #[serde(default)]
    pub created_at: i64,
}

/// Idempotency marker, stored under `notified:{src}:{key}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifiedMarker {
    pub notified: bool,
    pub at: i64,
}

impl NotifiedMarker {
    /// Whether a stored value marks the transfer as notified
    pub fn is_set(value: &Value) -> bool {
        value.get("notified").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Counter under `stats:unsupported_{side}:{chain}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnsupportedChainStat {
    pub count: u64,
    pub last_seen: i64,
}

/// Entry of the legacy `pending-index` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyIndexEntry {
    pub key: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Legacy `pending-index` record written by older deployments
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyPendingIndex {
    #[serde(default)]
    pub burns: Vec<LegacyIndexEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored_pending() -> Value {
        json!({
            "canonicalKey": "0xaa",
            "sourceChain": "arbitrum",
            "sourceChainId": 42161,
            "amount": "1000000",
            "destinationDomain": 6,
            "destinationChain": "base",
            "minFinalityThreshold": 1000,
            "transferType": "fast",
            "burnTimestamp": 100,
            "status": "pending",
            "someFutureField": true
        })
    }

    #[test]
    fn transfer_type_cutoff_is_inclusive() {
        assert_eq!(TransferType::from_min_finality(1000), TransferType::Fast);
        assert_eq!(TransferType::from_min_finality(0), TransferType::Fast);
        assert_eq!(TransferType::from_min_finality(1001), TransferType::Standard);
        assert_eq!(TransferType::from_min_finality(2000), TransferType::Standard);
    }

    #[test]
    fn valid_pending_record_parses_leniently() {
        let pending = PendingTransfer::from_stored(stored_pending()).unwrap();
        assert_eq!(pending.canonical_key, "0xaa");
        assert_eq!(pending.transfer_type, TransferType::Fast);
        assert_eq!(pending.burn_timestamp, Some(100));
        assert_eq!(pending.depositor, "");
    }

    #[test]
    fn pending_record_without_required_fields_is_invalid() {
        for field in REQUIRED_PENDING_FIELDS {
            let mut value = stored_pending();
            value.as_object_mut().unwrap().remove(field);
            assert_eq!(
                PendingTransfer::from_stored(value),
                Err(ValidationError::MissingField(field))
            );
        }

        let mut blank = stored_pending();
        blank["amount"] = json!("  ");
        assert!(PendingTransfer::from_stored(blank).is_err());

        assert_eq!(
            PendingTransfer::from_stored(json!("burn")),
            Err(ValidationError::NotAnObject)
        );
    }

    #[test]
    fn fallback_entry_flattens_record_next_to_pointer() {
        let pending = PendingTransfer::from_stored(stored_pending()).unwrap();
        let entry = FallbackIndexEntry {
            primary_key: "burn:arbitrum:0xaa",
            record: &pending,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(fallback_pointer(&value), Some("burn:arbitrum:0xaa"));
        assert_eq!(value["amount"], "1000000");

        // The embedded copy is itself a valid pending record
        let embedded = PendingTransfer::from_stored(value).unwrap();
        assert_eq!(embedded, pending);
        assert_eq!(fallback_pointer(&stored_pending()), None);
    }

    #[test]
    fn enums_use_wire_names() {
        assert_eq!(json!(RecordStatus::PendingMint), json!("pending-mint"));
        assert_eq!(json!(Resolution::Reconciliation), json!("reconciliation"));
        assert_eq!(json!(OrphanReason::CorruptBurnData), json!("corrupt_burn_data"));
        assert!(NotifiedMarker::is_set(&json!({"notified": true, "at": 5})));
        assert!(!NotifiedMarker::is_set(&json!({"notified": false})));
    }
}
