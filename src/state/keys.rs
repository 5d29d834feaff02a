//! Record key scheme and TTLs
//!
//! These keys are the contract between the burn, mint and notify handlers;
//! every handler must derive them through `KeySpace`.

pub const PENDING_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const COMPLETED_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub const ORPHAN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const NOTIFIED_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub const STATS_TTL_SECS: u64 = 30 * 24 * 60 * 60;

const BODY_SEGMENT: &str = ":body:";
const LEGACY_PENDING_INDEX: &str = "pending-index";

/// Which side of a transfer referenced an unsupported chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatSide {
    Source,
    Destination,
}

impl StatSide {
    pub fn label(&self) -> &'static str {
        match self {
            StatSide::Source => "src",
            StatSide::Destination => "dst",
        }
    }
}

/// Index records the janitor knows how to dereference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Orphan,
    OrphanBody,
    FallbackBody,
}

impl IndexKind {
    pub fn label(&self) -> &'static str {
        match self {
            IndexKind::Orphan => "orphan_index",
            IndexKind::OrphanBody => "orphan_body_index",
            IndexKind::FallbackBody => "fallback_body_index",
        }
    }
}

/// Optional namespace prefix plus the key builders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(namespace: Option<&str>) -> Self {
        let prefix = match namespace.map(str::trim) {
            Some(ns) if !ns.is_empty() => format!("{}:", ns.trim_end_matches(':')),
            _ => String::new(),
        };
        Self { prefix }
    }

    fn key(&self, body: String) -> String {
        format!("{}{}", self.prefix, body)
    }

    /// Namespaced form of a raw prefix, for scans
    pub fn prefix(&self, raw: &str) -> String {
        format!("{}{}", self.prefix, raw)
    }

    pub fn pending(&self, source_chain: &str, canonical_key: &str) -> String {
        self.key(format!("burn:{}:{}", source_chain, canonical_key))
    }

    pub fn fallback_body(&self, source_chain: &str, body_hash: &str) -> String {
        self.key(format!("burn:{}:body:{}", source_chain, body_hash))
    }

    pub fn completed(&self, source_chain: &str, canonical_key: &str) -> String {
        self.key(format!("completed:{}:{}", source_chain, canonical_key))
    }

    pub fn orphaned(&self, dest_chain: &str, canonical_key: &str, ts: i64) -> String {
        self.key(format!("orphaned:{}:{}:{}", dest_chain, canonical_key, ts))
    }

    /// Unprefixed scan prefix covering every orphan timestamp of a key
    pub fn orphaned_scan_prefix(dest_chain: &str, canonical_key: &str) -> String {
        format!("orphaned:{}:{}:", dest_chain, canonical_key)
    }

    /// Timestamp suffix of an orphan key
    pub fn orphaned_timestamp(orphan_key: &str) -> Option<i64> {
        orphan_key.rsplit(':').next()?.parse().ok()
    }

    pub fn orphan_index(&self, source_chain: &str, canonical_key: &str) -> String {
        self.key(format!("orphanIndex:{}:{}", source_chain, canonical_key))
    }

    pub fn orphan_body_index(&self, source_chain: &str, body_hash: &str) -> String {
        self.key(format!("orphanIndex:{}:body:{}", source_chain, body_hash))
    }

    pub fn notified(&self, source_chain: &str, canonical_key: &str) -> String {
        self.key(format!("notified:{}:{}", source_chain, canonical_key))
    }

    pub fn unsupported_stat(&self, side: StatSide, chain: &str) -> String {
        self.key(format!("stats:unsupported_{}:{}", side.label(), chain))
    }

    pub fn legacy_pending_index(&self) -> String {
        self.key(LEGACY_PENDING_INDEX.to_string())
    }

    /// Classify a full key as one of the sweepable index kinds
    pub fn index_kind(&self, full_key: &str) -> Option<IndexKind> {
        let rest = full_key.strip_prefix(&self.prefix)?;
        if let Some(tail) = rest.strip_prefix("orphanIndex:") {
            if tail.contains(BODY_SEGMENT) {
                return Some(IndexKind::OrphanBody);
            }
            return Some(IndexKind::Orphan);
        }
        if rest.starts_with("burn:") && rest.contains(BODY_SEGMENT) {
            return Some(IndexKind::FallbackBody);
        }
        None
    }
}
