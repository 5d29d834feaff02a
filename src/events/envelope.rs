//! CCTP v2 message envelope: header parsing, hashing and candidate selection

use super::{BurnIntent, MessageCandidate};
use crate::error::DecodeError;

use sha3::{Digest, Keccak256};

/// version(4) + source(4) + dest(4) + nonce(32) + sender(32) + recipient(32)
/// + destinationCaller(32) + minFinality(4) + finalityExecuted(4)
pub const HEADER_LEN: usize = 148;

const SOURCE_DOMAIN_OFFSET: usize = 4;
const DEST_DOMAIN_OFFSET: usize = 8;
const NONCE_OFFSET: usize = 12;
const SENDER_OFFSET: usize = 44;
const RECIPIENT_OFFSET: usize = 76;
const DEST_CALLER_OFFSET: usize = 108;
const MIN_FINALITY_OFFSET: usize = 140;
const FINALITY_EXECUTED_OFFSET: usize = 144;

/// Fixed-size routing header of a message envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub version: u32,
    pub source_domain: u32,
    pub destination_domain: u32,
    pub nonce: [u8; 32],
    pub sender: [u8; 32],
    pub recipient: [u8; 32],
    pub destination_caller: [u8; 32],
    pub min_finality_threshold: u32,
    pub finality_threshold_executed: u32,
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

fn read_b32(bytes: &[u8], offset: usize) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&bytes[offset..offset + 32]);
    buf
}

impl EnvelopeHeader {
    /// Parse the header; fails when the envelope is shorter than a header
    pub fn parse(envelope: &[u8]) -> Result<Self, DecodeError> {
        if envelope.len() < HEADER_LEN {
            return Err(DecodeError::EnvelopeTooShort {
                len: envelope.len(),
                needed: HEADER_LEN,
            });
        }

        Ok(Self {
            version: read_u32(envelope, 0),
            source_domain: read_u32(envelope, SOURCE_DOMAIN_OFFSET),
            destination_domain: read_u32(envelope, DEST_DOMAIN_OFFSET),
            nonce: read_b32(envelope, NONCE_OFFSET),
            sender: read_b32(envelope, SENDER_OFFSET),
            recipient: read_b32(envelope, RECIPIENT_OFFSET),
            destination_caller: read_b32(envelope, DEST_CALLER_OFFSET),
            min_finality_threshold: read_u32(envelope, MIN_FINALITY_OFFSET),
            finality_threshold_executed: read_u32(envelope, FINALITY_EXECUTED_OFFSET),
        })
    }

    /// Serialize header followed by `body`
    pub fn encode(&self, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.source_domain.to_be_bytes());
        out.extend_from_slice(&self.destination_domain.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sender);
        out.extend_from_slice(&self.recipient);
        out.extend_from_slice(&self.destination_caller);
        out.extend_from_slice(&self.min_finality_threshold.to_be_bytes());
        out.extend_from_slice(&self.finality_threshold_executed.to_be_bytes());
        out.extend_from_slice(body);
        out
    }
}

/// Variable-length body following the header (empty if there is none)
pub fn envelope_body(envelope: &[u8]) -> &[u8] {
    envelope.get(HEADER_LEN..).unwrap_or(&[])
}

/// `0x`-prefixed lowercase hex, the rendering used in every record key
pub fn hex_key(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn keccak(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Correlation key: keccak-256 of the full envelope
pub fn canonical_key(envelope: &[u8]) -> String {
    hex_key(&keccak(envelope))
}

/// Fallback key: keccak-256 of the message body alone
pub fn body_hash(body: &[u8]) -> String {
    hex_key(&keccak(body))
}

/// Pick the envelope belonging to `burn` among all `MessageSent` logs of its
/// transaction.
///
/// Destination domain must match the burn. Among those, a matching source
/// domain (the chain this handler is bound to) wins, then log proximity. With
/// no header match, the first parseable candidate is used, then the first
/// candidate of any shape.
pub fn select_envelope<'a>(
    candidates: &'a [MessageCandidate],
    burn: &BurnIntent,
    bound_domain: Option<u32>,
) -> Result<&'a MessageCandidate, DecodeError> {
    if candidates.is_empty() {
        return Err(DecodeError::NoEnvelope);
    }

    let parsed: Vec<(&'a MessageCandidate, EnvelopeHeader)> = candidates
        .iter()
        .filter_map(|c| EnvelopeHeader::parse(&c.message).ok().map(|h| (c, h)))
        .collect();

    let distance = |c: &MessageCandidate| c.log_index.abs_diff(burn.log_index);

    let dest_matches: Vec<(&'a MessageCandidate, &EnvelopeHeader)> = parsed
        .iter()
        .filter(|entry| entry.1.destination_domain == burn.destination_domain)
        .map(|entry| (entry.0, &entry.1))
        .collect();

    if let Some(domain) = bound_domain {
        let same_source = dest_matches
            .iter()
            .filter(|entry| entry.1.source_domain == domain)
            .min_by_key(|entry| distance(entry.0));
        if let Some(entry) = same_source {
            return Ok(entry.0);
        }
    }

    if let Some(entry) = dest_matches.iter().min_by_key(|entry| distance(entry.0)) {
        return Ok(entry.0);
    }

    if let Some(entry) = parsed.first() {
        return Ok(entry.0);
    }

    Ok(&candidates[0])
}
