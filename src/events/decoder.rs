//! ABI decoder for TokenMessengerV2 / MessageTransmitterV2 logs

use super::{
    BurnIntent, DecodedTransaction, EventDecoder, MessageCandidate, MintReceipt, RawTransaction,
    TxLog,
};
use crate::error::DecodeError;

use ethers::abi::{parse_abi, Event, Log as AbiLog, RawLog, Token};
use ethers::types::{Address, Bytes, H256, U256};
use tracing::{debug, warn};

pub const DEPOSIT_FOR_BURN_ABI: &str = "event DepositForBurn(address indexed burnToken, uint256 amount, address indexed depositor, bytes32 mintRecipient, uint32 destinationDomain, bytes32 destinationTokenMessenger, bytes32 destinationCaller, uint256 maxFee, uint32 indexed minFinalityThreshold, bytes hookData)";
pub const MESSAGE_SENT_ABI: &str = "event MessageSent(bytes message)";
pub const MESSAGE_RECEIVED_ABI: &str = "event MessageReceived(address indexed caller, uint32 sourceDomain, bytes32 indexed nonce, bytes32 sender, uint32 indexed finalityThresholdExecuted, bytes messageBody)";

/// CCTP v2 contracts share one address on every EVM chain
pub const DEFAULT_TOKEN_MESSENGER: &str = "0x28b5a0e9c621a5badaa536219b3a228c8168cf5d";
pub const DEFAULT_MESSAGE_TRANSMITTER: &str = "0x81d40f21f12a8f0e3252bccb954d722d4c464b64";

/// Decodes CCTP logs by contract address and event signature
pub struct AbiEventDecoder {
    token_messenger: Address,
    message_transmitter: Address,
    deposit_for_burn: Event,
    message_sent: Event,
    message_received: Event,
}

impl AbiEventDecoder {
    pub fn new(token_messenger: Address, message_transmitter: Address) -> Result<Self, DecodeError> {
        let abi = parse_abi(&[DEPOSIT_FOR_BURN_ABI, MESSAGE_SENT_ABI, MESSAGE_RECEIVED_ABI])
            .map_err(|e| DecodeError::Abi {
                event: "abi",
                message: e.to_string(),
            })?;

        let event = |name: &'static str| {
            abi.event(name).cloned().map_err(|e| DecodeError::Abi {
                event: name,
                message: e.to_string(),
            })
        };

        Ok(Self {
            token_messenger,
            message_transmitter,
            deposit_for_burn: event("DepositForBurn")?,
            message_sent: event("MessageSent")?,
            message_received: event("MessageReceived")?,
        })
    }

    pub fn deposit_for_burn_topic(&self) -> H256 {
        self.deposit_for_burn.signature()
    }

    pub fn message_sent_topic(&self) -> H256 {
        self.message_sent.signature()
    }

    pub fn message_received_topic(&self) -> H256 {
        self.message_received.signature()
    }

    fn parse_burn(&self, log: &TxLog, log_index: u64) -> Result<BurnIntent, DecodeError> {
        let parsed = parse_log(&self.deposit_for_burn, "DepositForBurn", log)?;

        Ok(BurnIntent {
            burn_token: as_address(param(&parsed, "burnToken")?, "burnToken")?,
            amount: as_uint(param(&parsed, "amount")?, "amount")?,
            depositor: as_address(param(&parsed, "depositor")?, "depositor")?,
            mint_recipient: as_bytes32(param(&parsed, "mintRecipient")?, "mintRecipient")?,
            destination_domain: as_u32(param(&parsed, "destinationDomain")?, "destinationDomain")?,
            destination_token_messenger: as_bytes32(
                param(&parsed, "destinationTokenMessenger")?,
                "destinationTokenMessenger",
            )?,
            destination_caller: as_bytes32(
                param(&parsed, "destinationCaller")?,
                "destinationCaller",
            )?,
            max_fee: as_uint(param(&parsed, "maxFee")?, "maxFee")?,
            min_finality_threshold: as_u32(
                param(&parsed, "minFinalityThreshold")?,
                "minFinalityThreshold",
            )?,
            hook_data: as_bytes(param(&parsed, "hookData")?, "hookData")?,
            log_index,
        })
    }

    fn parse_message_sent(&self, log: &TxLog, log_index: u64) -> Result<MessageCandidate, DecodeError> {
        let parsed = parse_log(&self.message_sent, "MessageSent", log)?;
        Ok(MessageCandidate {
            log_index,
            message: as_bytes(param(&parsed, "message")?, "message")?,
        })
    }

    fn parse_mint(&self, log: &TxLog) -> Result<MintReceipt, DecodeError> {
        let parsed = parse_log(&self.message_received, "MessageReceived", log)?;

        Ok(MintReceipt {
            caller: as_address(param(&parsed, "caller")?, "caller")?,
            source_domain: as_u32(param(&parsed, "sourceDomain")?, "sourceDomain")?,
            canonical_key: as_bytes32(param(&parsed, "nonce")?, "nonce")?,
            sender: as_bytes32(param(&parsed, "sender")?, "sender")?,
            finality_threshold_executed: as_u32(
                param(&parsed, "finalityThresholdExecuted")?,
                "finalityThresholdExecuted",
            )?,
            message_body: as_bytes(param(&parsed, "messageBody")?, "messageBody")?,
        })
    }
}

impl EventDecoder for AbiEventDecoder {
    fn decode(&self, tx: &RawTransaction) -> Result<DecodedTransaction, DecodeError> {
        let mut decoded = DecodedTransaction {
            context: tx.context(),
            burns: Vec::new(),
            messages: Vec::new(),
            mints: Vec::new(),
        };

        for (position, log) in tx.logs.iter().enumerate() {
            let Some(topic) = log.topics.first() else {
                continue;
            };
            let log_index = log.log_index.unwrap_or(position as u64);

            if log.address == self.token_messenger && *topic == self.deposit_for_burn_topic() {
                decoded.burns.push(self.parse_burn(log, log_index)?);
            } else if log.address == self.message_transmitter {
                if *topic == self.message_sent_topic() {
                    // A bad candidate only narrows the envelope choice
                    match self.parse_message_sent(log, log_index) {
                        Ok(candidate) => decoded.messages.push(candidate),
                        Err(e) => warn!("Skipping undecodable MessageSent in {}: {}", tx.hash, e),
                    }
                } else if *topic == self.message_received_topic() {
                    decoded.mints.push(self.parse_mint(log)?);
                }
            }
        }

        debug!(
            "Decoded tx {}: {} burns, {} messages, {} mints",
            tx.hash,
            decoded.burns.len(),
            decoded.messages.len(),
            decoded.mints.len()
        );

        Ok(decoded)
    }
}

fn parse_log(event: &Event, name: &'static str, log: &TxLog) -> Result<AbiLog, DecodeError> {
    event
        .parse_log(RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        })
        .map_err(|e| DecodeError::Abi {
            event: name,
            message: e.to_string(),
        })
}

fn param<'a>(log: &'a AbiLog, name: &'static str) -> Result<&'a Token, DecodeError> {
    log.params
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
        .ok_or(DecodeError::UnexpectedToken(name))
}

fn as_address(token: &Token, field: &'static str) -> Result<Address, DecodeError> {
    match token {
        Token::Address(a) => Ok(*a),
        _ => Err(DecodeError::UnexpectedToken(field)),
    }
}

fn as_uint(token: &Token, field: &'static str) -> Result<U256, DecodeError> {
    match token {
        Token::Uint(v) => Ok(*v),
        _ => Err(DecodeError::UnexpectedToken(field)),
    }
}

fn as_u32(token: &Token, field: &'static str) -> Result<u32, DecodeError> {
    let value = as_uint(token, field)?;
    if value > U256::from(u32::MAX) {
        return Err(DecodeError::UnexpectedToken(field));
    }
    Ok(value.low_u32())
}

fn as_bytes32(token: &Token, field: &'static str) -> Result<H256, DecodeError> {
    match token {
        Token::FixedBytes(b) if b.len() == 32 => Ok(H256::from_slice(b)),
        _ => Err(DecodeError::UnexpectedToken(field)),
    }
}

fn as_bytes(token: &Token, field: &'static str) -> Result<Bytes, DecodeError> {
    match token {
        Token::Bytes(b) => Ok(Bytes::from(b.clone())),
        _ => Err(DecodeError::UnexpectedToken(field)),
    }
}
