//! Merging burn and mint fields into a completed transfer

use crate::state::records::MessageReceivedInfo;
use crate::state::{CompletedTransfer, OrphanedMint, PendingTransfer, RecordStatus, Resolution};

/// Mint-side half of a completed transfer
#[derive(Debug, Clone)]
pub(crate) struct MintSide {
    pub canonical_key: String,
    pub destination_chain: String,
    pub destination_chain_id: u64,
    pub destination_tx_hash: String,
    pub destination_block_number: u64,
    pub mint_timestamp: i64,
    pub received: MessageReceivedInfo,
}

impl MintSide {
    pub fn from_orphan(orphan: &OrphanedMint) -> Self {
        Self {
            canonical_key: orphan.canonical_key.clone(),
            destination_chain: orphan.destination_chain.clone(),
            destination_chain_id: orphan.destination_chain_id,
            destination_tx_hash: orphan.destination_tx_hash.clone(),
            destination_block_number: orphan.destination_block_number,
            mint_timestamp: orphan.mint_timestamp,
            received: MessageReceivedInfo {
                caller: orphan.caller.clone(),
                source_domain: orphan.source_domain,
                nonce: orphan.canonical_key.clone(),
                sender: orphan.sender.clone(),
                finality_threshold_executed: orphan.finality_threshold_executed,
            },
        }
    }
}

/// Negative durations (burn seen after mint) are dropped
pub(crate) fn duration_between(burn_timestamp: Option<i64>, mint_timestamp: i64) -> Option<i64> {
    burn_timestamp
        .map(|burn| mint_timestamp - burn)
        .filter(|secs| *secs >= 0)
}

pub(crate) fn complete(
    burn: &PendingTransfer,
    mint: MintSide,
    resolved_by: Resolution,
) -> CompletedTransfer {
    let burn_canonical_key =
        (burn.canonical_key != mint.canonical_key).then(|| burn.canonical_key.clone());

    CompletedTransfer {
        duration_seconds: duration_between(burn.burn_timestamp, mint.mint_timestamp),
        canonical_key: mint.canonical_key,
        burn_canonical_key,
        source_chain: burn.source_chain.clone(),
        source_chain_id: burn.source_chain_id,
        source_tx_hash: burn.source_tx_hash.clone(),
        source_block_number: burn.source_block_number,
        burn_token: burn.burn_token.clone(),
        amount: burn.amount.clone(),
        depositor: burn.depositor.clone(),
        mint_recipient: burn.mint_recipient.clone(),
        destination_domain: burn.destination_domain,
        destination_chain: mint.destination_chain,
        destination_chain_id: mint.destination_chain_id,
        destination_tx_hash: mint.destination_tx_hash,
        destination_block_number: mint.destination_block_number,
        destination_token_messenger: burn.destination_token_messenger.clone(),
        destination_caller: burn.destination_caller.clone(),
        max_fee: burn.max_fee.clone(),
        min_finality_threshold: burn.min_finality_threshold,
        hook_data: burn.hook_data.clone(),
        transfer_type: burn.transfer_type,
        burn_timestamp: burn.burn_timestamp,
        mint_timestamp: mint.mint_timestamp,
        message_received: mint.received,
        status: RecordStatus::Completed,
        resolved_by,
    }
}
