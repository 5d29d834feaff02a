//! Cross-component scenarios over the in-memory store

use super::*;
use crate::chain::ChainRegistry;
use crate::clock::ManualClock;
use crate::error::{CorrelatorError, DecodeError, NotifyError, StoreError, StoreResult};
use crate::events::decoder::fixtures::{burn_log, decoder, message_received_log, message_sent_log};
use crate::events::{
    canonical_key, envelope_body, hex_key, BurnIntent, EnvelopeHeader, MessageCandidate,
    MintReceipt, RawTransaction, TxContext,
};
use crate::notify::{Channel, Delivery, MockNotifier};
use crate::state::records::UnsupportedChainStat;
use crate::state::{
    CompletedTransfer, KeySpace, KvBackend, MemoryStore, OrphanReason, RecordStatus, Resolution,
    Store, TransferType,
};
use super::engine::HandlerResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

const T0: i64 = 1_700_000_000;
const ARBITRUM_ID: u64 = 42161;
const ARBITRUM: u32 = 3;
const BASE_ID: u64 = 8453;
const BASE: u32 = 6;
const EXPLORER: &str = "https://tdly.co/tx/{tx}";

/// Memory store that fails selected operations once
struct FlakyStore {
    inner: MemoryStore,
    fail_delete: Mutex<Vec<String>>,
    fail_put: Mutex<Vec<String>>,
}

impl FlakyStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_delete: Mutex::new(Vec::new()),
            fail_put: Mutex::new(Vec::new()),
        }
    }

    fn fail_next_delete(&self, key: &str) {
        self.fail_delete.lock().unwrap().push(key.to_string());
    }

    fn fail_next_put(&self, key: &str) {
        self.fail_put.lock().unwrap().push(key.to_string());
    }

    fn take(list: &Mutex<Vec<String>>, key: &str) -> bool {
        let mut list = list.lock().unwrap();
        match list.iter().position(|k| k == key) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl KvBackend for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Value, ttl_secs: u64) -> StoreResult<()> {
        if Self::take(&self.fail_put, key) {
            return Err(StoreError::Unavailable(format!("injected put failure on {}", key)));
        }
        self.inner.put(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        if Self::take(&self.fail_delete, key) {
            return Err(StoreError::Unavailable(format!("injected delete failure on {}", key)));
        }
        self.inner.delete(key).await
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.keys(prefix).await
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        self.inner.purge_expired().await
    }
}

/// One CCTP transfer from Arbitrum to Base
struct Transfer {
    envelope: Vec<u8>,
    burn: BurnIntent,
}

impl Transfer {
    fn new(amount: u64, min_finality_threshold: u32) -> Self {
        Self::to_domain(BASE, amount, min_finality_threshold)
    }

    fn to_domain(destination: u32, amount: u64, min_finality_threshold: u32) -> Self {
        let header = EnvelopeHeader {
            version: 1,
            source_domain: ARBITRUM,
            destination_domain: destination,
            nonce: [0u8; 32],
            sender: [0x28; 32],
            recipient: [0x28; 32],
            destination_caller: [0u8; 32],
            min_finality_threshold,
            finality_threshold_executed: 0,
        };
        let mut body = b"burn-message:".to_vec();
        body.extend_from_slice(&amount.to_be_bytes());

        let burn = BurnIntent {
            burn_token: Address::repeat_byte(0xaf),
            amount: U256::from(amount),
            depositor: Address::repeat_byte(0xde),
            mint_recipient: H256::repeat_byte(0xbe),
            destination_domain: destination,
            destination_token_messenger: H256::repeat_byte(0x28),
            destination_caller: H256::zero(),
            max_fee: U256::from(100u64),
            min_finality_threshold,
            hook_data: Bytes::default(),
            log_index: 2,
        };

        Self {
            envelope: header.encode(&body),
            burn,
        }
    }

    fn key(&self) -> String {
        canonical_key(&self.envelope)
    }

    fn candidates(&self) -> Vec<MessageCandidate> {
        vec![MessageCandidate {
            log_index: 1,
            message: Bytes::from(self.envelope.clone()),
        }]
    }

    fn mint(&self) -> MintReceipt {
        MintReceipt {
            caller: Address::repeat_byte(0x11),
            source_domain: ARBITRUM,
            canonical_key: H256::from(keccak256(&self.envelope)),
            sender: H256::repeat_byte(0x28),
            finality_threshold_executed: 1000,
            message_body: Bytes::from(envelope_body(&self.envelope).to_vec()),
        }
    }

    fn burn_raw(&self) -> RawTransaction {
        RawTransaction {
            network: ARBITRUM_ID,
            hash: "0xburn".to_string(),
            block_number: 100,
            logs: vec![
                message_sent_log(&self.envelope, 1),
                burn_log(&self.burn),
            ],
        }
    }

    fn mint_raw(&self) -> RawTransaction {
        RawTransaction {
            network: BASE_ID,
            hash: "0xmint".to_string(),
            block_number: 200,
            logs: vec![message_received_log(&self.mint(), 0)],
        }
    }
}

fn burn_tx() -> TxContext {
    TxContext {
        chain_id: ARBITRUM_ID,
        tx_hash: "0xburn".to_string(),
        block_number: 100,
    }
}

fn mint_tx() -> TxContext {
    TxContext {
        chain_id: BASE_ID,
        tx_hash: "0xmint".to_string(),
        block_number: 200,
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    backend: Arc<FlakyStore>,
    ctx: CorrelationContext,
    burns: BurnRecorder,
    mints: MintMatcher,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let backend = Arc::new(FlakyStore::new(MemoryStore::new(clock.clone())));
        let store = Store::new(backend.clone(), KeySpace::new(Some("cctp")));
        let ctx = CorrelationContext::new(
            store,
            Arc::new(ChainRegistry::cctp_mainnet()),
            clock.clone(),
        );

        Self {
            clock,
            backend,
            burns: BurnRecorder::new(ctx.clone()),
            mints: MintMatcher::new(ctx.clone()),
            ctx,
        }
    }

    fn store(&self) -> &Store {
        &self.ctx.store
    }

    fn keys(&self) -> &KeySpace {
        self.ctx.store.keys()
    }

    fn notifier(&self, mock: MockNotifier) -> CompletionNotifier {
        CompletionNotifier::new(self.ctx.clone(), Arc::new(mock), EXPLORER)
    }

    fn engine(&self, mock: MockNotifier) -> CorrelationEngine {
        CorrelationEngine::new(self.ctx.clone(), Arc::new(decoder()), Arc::new(mock), EXPLORER)
    }

    async fn raw(&self, key: &str) -> Option<Value> {
        self.store().get_raw(key).await.unwrap()
    }

    async fn completed(&self, key: &str) -> CompletedTransfer {
        let key = self.keys().completed("arbitrum", key);
        let raw = self.raw(&key).await.expect("completed record");
        serde_json::from_value(raw).unwrap()
    }

    async fn scan(&self, prefix: &str) -> Vec<String> {
        self.store().scan(prefix).await.unwrap()
    }

    async fn record(&self, t: &Transfer) -> BurnReport {
        assert_ok!(self.burns.record(&burn_tx(), &t.burn, &t.candidates()).await)
    }

    async fn mint(&self, t: &Transfer) -> MintReport {
        assert_ok!(self.mints.handle(&mint_tx(), &t.mint()).await)
    }
}

fn delivering(channel: Channel, times: usize) -> MockNotifier {
    let mut mock = MockNotifier::new();
    mock.expect_send()
        .withf(move |c, _| *c == channel)
        .times(times)
        .returning(|_, _| Ok(Delivery::Delivered));
    mock
}

#[tokio::test]
async fn burn_then_mint_completes_with_duration() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);
    let key = t.key();

    let report = h.record(&t).await;
    assert_eq!(
        report.outcome,
        BurnOutcome::Recorded {
            canonical_key: key.clone(),
            pending_key: format!("cctp:burn:arbitrum:{}", key),
        }
    );
    assert!(report.effects.is_empty());
    assert_eq!(h.scan("burn:").await.len(), 2);

    h.clock.advance(90);
    let report = h.mint(&t).await;
    assert_eq!(
        report.outcome,
        MintOutcome::Matched {
            completed_key: format!("cctp:completed:arbitrum:{}", key),
            resolved_by: Resolution::Primary,
            duration_seconds: Some(90),
        }
    );

    let completed = h.completed(&key).await;
    assert_eq!(completed.amount, "1000000");
    assert_eq!(completed.transfer_type, TransferType::Fast);
    assert_eq!(completed.status, RecordStatus::Completed);
    assert_eq!(completed.source_chain, "arbitrum");
    assert_eq!(completed.destination_chain, "base");
    assert_eq!(completed.destination_tx_hash, "0xmint");
    assert_eq!(completed.duration_seconds, Some(90));
    assert_eq!(completed.burn_canonical_key, None);
    assert!(h.scan("burn:").await.is_empty());
}

#[tokio::test]
async fn unmatched_mint_records_one_orphan_and_index() {
    let h = Harness::new();
    let t = Transfer::new(5_000_000, 2000);
    let key = t.key();

    let report = h.mint(&t).await;
    let orphan_key = format!("cctp:orphaned:base:{}:{}", key, T0);
    assert_eq!(
        report.outcome,
        MintOutcome::Orphaned {
            orphan_key: orphan_key.clone(),
            reason: OrphanReason::NoBurnData,
        }
    );
    assert!(matches!(&report.effects[..], [Effect::OrphanAlert(o)] if o.canonical_key == key));

    assert_eq!(h.scan("orphaned:").await, vec![orphan_key.clone()]);
    let index = h
        .raw(&format!("cctp:orphanIndex:arbitrum:{}", key))
        .await
        .expect("orphan index");
    assert_eq!(index["orphanKey"], json!(orphan_key));
    assert!(h.scan("completed:").await.is_empty());

    // Replays do not create a second orphan or alert
    h.clock.advance(5);
    let replay = h.mint(&t).await;
    assert_eq!(replay.outcome, MintOutcome::DuplicateOrphan { orphan_key });
    assert!(replay.effects.is_empty());
    assert_eq!(h.scan("orphaned:").await.len(), 1);
}

#[tokio::test]
async fn orphan_without_index_is_reused_on_redelivery() {
    let h = Harness::new();
    let t = Transfer::new(5_000_000, 2000);
    let key = t.key();
    let orphan_key = format!("cctp:orphaned:base:{}:{}", key, T0);
    let index_key = h.keys().orphan_index("arbitrum", &key);

    h.backend.fail_next_put(&index_key);
    let err = assert_err!(h.mints.handle(&mint_tx(), &t.mint()).await);
    assert!(err.is_retryable());
    assert_eq!(h.scan("orphaned:").await, vec![orphan_key.clone()]);
    assert_eq!(h.raw(&index_key).await, None);

    h.clock.advance(30);
    let replay = h.mint(&t).await;
    assert_eq!(
        replay.outcome,
        MintOutcome::Orphaned {
            orphan_key: orphan_key.clone(),
            reason: OrphanReason::NoBurnData,
        }
    );
    assert_eq!(h.scan("orphaned:").await, vec![orphan_key.clone()]);

    let orphan = h.raw(&orphan_key).await.expect("orphan record");
    assert_eq!(orphan["mintTimestamp"], json!(T0));
    let index = h.raw(&index_key).await.expect("orphan index");
    assert_eq!(index["orphanKey"], json!(orphan_key));
    assert_eq!(index["createdAt"], json!(T0));
}

#[tokio::test]
async fn burn_after_orphaned_mint_reconciles() {
    let h = Harness::new();
    let t = Transfer::new(2_500_000, 2000);
    let key = t.key();

    h.mint(&t).await;
    h.clock.advance(30);
    let report = h.record(&t).await;

    let completed_key = format!("cctp:completed:arbitrum:{}", key);
    assert_eq!(
        report.outcome,
        BurnOutcome::Reconciled {
            canonical_key: key.clone(),
            completed_key,
        }
    );
    assert_eq!(
        report.effects,
        vec![Effect::NotifyCompletion {
            source_chain: "arbitrum".to_string(),
            canonical_key: key.clone(),
        }]
    );

    let completed = h.completed(&key).await;
    assert_eq!(completed.resolved_by, Resolution::Reconciliation);
    assert_eq!(completed.status, RecordStatus::Completed);
    assert_eq!(completed.transfer_type, TransferType::Standard);
    assert_eq!(completed.mint_timestamp, T0);
    // Burn observed after mint: no meaningful duration
    assert_eq!(completed.duration_seconds, None);

    assert!(h.scan("orphaned:").await.is_empty());
    assert!(h.scan("orphanIndex:").await.is_empty());
    assert!(h.scan("burn:").await.is_empty());

    // The mint arriving again is a replay
    let replay = h.mint(&t).await;
    assert_eq!(
        replay.outcome,
        MintOutcome::AlreadyCompleted { canonical_key: key }
    );
    assert!(h.scan("orphaned:").await.is_empty());
}

#[tokio::test]
async fn both_arrival_orders_converge_with_duplicates() {
    let t = Transfer::new(42_000_000, 1000);

    let burn_first = Harness::new();
    burn_first.record(&t).await;
    burn_first.record(&t).await;
    burn_first.clock.advance(60);
    burn_first.mint(&t).await;
    burn_first.mint(&t).await;

    let mint_first = Harness::new();
    mint_first.mint(&t).await;
    mint_first.mint(&t).await;
    mint_first.clock.advance(60);
    mint_first.record(&t).await;
    mint_first.record(&t).await;

    let a = burn_first.completed(&t.key()).await;
    let b = mint_first.completed(&t.key()).await;
    assert_eq!(a.amount, b.amount);
    assert_eq!(a.source_chain, b.source_chain);
    assert_eq!(a.destination_chain, b.destination_chain);
    assert_eq!(a.canonical_key, b.canonical_key);
    assert_eq!(a.transfer_type, b.transfer_type);
    assert_eq!(a.transfer_type, TransferType::Fast);

    for h in [&burn_first, &mint_first] {
        assert!(h.scan("orphaned:").await.is_empty());
        assert!(h.scan("burn:").await.is_empty());
    }
}

#[tokio::test]
async fn duplicate_burn_after_completion_is_a_no_op() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 2000);

    h.mint(&t).await;
    h.record(&t).await;
    let before = h.completed(&t.key()).await;

    h.clock.advance(15);
    let again = h.record(&t).await;
    assert_eq!(
        again.outcome,
        BurnOutcome::AlreadyCompleted {
            canonical_key: t.key()
        }
    );
    assert!(again.effects.is_empty());
    assert!(h.scan("burn:").await.is_empty());
    assert_eq!(h.completed(&t.key()).await, before);
}

#[tokio::test]
async fn replayed_mint_after_match_is_a_no_op() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);

    h.record(&t).await;
    h.clock.advance(10);
    h.mint(&t).await;
    let before = h.completed(&t.key()).await;

    h.clock.advance(10);
    let replay = h.mint(&t).await;
    assert_eq!(
        replay.outcome,
        MintOutcome::AlreadyCompleted {
            canonical_key: t.key()
        }
    );
    assert!(replay.effects.is_empty());
    assert!(h.scan("orphaned:").await.is_empty());
    assert_eq!(h.completed(&t.key()).await, before);
}

#[tokio::test]
async fn pending_without_amount_is_deleted_and_orphaned_as_corrupt() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);
    let pending_key = h.keys().pending("arbitrum", &t.key());
    h.store()
        .put(
            &pending_key,
            &json!({"canonicalKey": t.key(), "sourceChain": "arbitrum", "status": "pending"}),
            60,
        )
        .await
        .unwrap();

    let report = h.mint(&t).await;
    assert!(matches!(
        report.outcome,
        MintOutcome::Orphaned {
            reason: OrphanReason::CorruptBurnData,
            ..
        }
    ));
    assert_eq!(h.raw(&pending_key).await, None);
    assert!(h.scan("completed:").await.is_empty());

    let orphans = h.scan("orphaned:").await;
    assert_eq!(orphans.len(), 1);
    let orphan = h.raw(&orphans[0]).await.unwrap();
    assert_eq!(orphan["reason"], "corrupt_burn_data");
}

#[tokio::test]
async fn empty_pending_value_reads_as_missing() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);
    h.store()
        .put(&h.keys().pending("arbitrum", &t.key()), &json!({}), 60)
        .await
        .unwrap();

    let report = h.mint(&t).await;
    assert!(matches!(
        report.outcome,
        MintOutcome::Orphaned {
            reason: OrphanReason::NoBurnData,
            ..
        }
    ));
}

#[tokio::test]
async fn body_hash_fallback_matches_when_keys_differ() {
    let h = Harness::new();
    let t = Transfer::new(7_000_000, 500);
    h.record(&t).await;

    let mut mint = t.mint();
    mint.canonical_key = H256::repeat_byte(0x77);
    let mint_key = hex_key(mint.canonical_key.as_bytes());

    h.clock.advance(20);
    let report = assert_ok!(h.mints.handle(&mint_tx(), &mint).await);
    assert!(matches!(
        report.outcome,
        MintOutcome::Matched {
            resolved_by: Resolution::Fallback,
            duration_seconds: Some(20),
            ..
        }
    ));

    let completed = h.completed(&mint_key).await;
    assert_eq!(completed.canonical_key, mint_key);
    assert_eq!(completed.burn_canonical_key, Some(t.key()));
    assert_eq!(completed.amount, "7000000");
    assert!(h.scan("burn:").await.is_empty());
}

#[tokio::test]
async fn fallback_match_survives_burn_and_mint_replays() {
    let h = Harness::new();
    let t = Transfer::new(7_000_000, 500);
    h.record(&t).await;

    let mut mint = t.mint();
    mint.canonical_key = H256::repeat_byte(0x77);
    let mint_key = hex_key(mint.canonical_key.as_bytes());

    h.clock.advance(20);
    assert_ok!(h.mints.handle(&mint_tx(), &mint).await);
    let first = h.completed(&mint_key).await;

    h.clock.advance(30);
    let burn_replay = h.record(&t).await;
    assert!(matches!(burn_replay.outcome, BurnOutcome::Recorded { .. }));
    assert_eq!(h.scan("burn:").await.len(), 2);

    h.clock.advance(50);
    let replay = assert_ok!(h.mints.handle(&mint_tx(), &mint).await);
    assert_eq!(
        replay.outcome,
        MintOutcome::Matched {
            completed_key: h.keys().completed("arbitrum", &mint_key),
            resolved_by: Resolution::Fallback,
            duration_seconds: Some(20),
        }
    );
    assert_eq!(h.completed(&mint_key).await, first);
    assert!(h.scan("burn:").await.is_empty());
}

#[tokio::test]
async fn fallback_match_is_not_redone_after_notification() {
    let h = Harness::new();
    let t = Transfer::new(7_000_000, 500);
    h.record(&t).await;

    let mut mint = t.mint();
    mint.canonical_key = H256::repeat_byte(0x77);
    let mint_key = hex_key(mint.canonical_key.as_bytes());

    h.clock.advance(20);
    assert_ok!(h.mints.handle(&mint_tx(), &mint).await);

    let notifier = h.notifier(delivering(Channel::Completions, 1));
    let outcome = assert_ok!(notifier.notify("arbitrum", &mint_key).await);
    assert_eq!(outcome, NotifyOutcome::Delivered);
    assert!(h.scan("completed:").await.is_empty());

    h.clock.advance(80);
    let burn_replay = h.record(&t).await;
    assert!(matches!(burn_replay.outcome, BurnOutcome::Recorded { .. }));

    let replay = assert_ok!(h.mints.handle(&mint_tx(), &mint).await);
    assert_eq!(
        replay.outcome,
        MintOutcome::AlreadyCompleted {
            canonical_key: mint_key.clone()
        }
    );
    assert!(replay.effects.is_empty());
    assert!(h.scan("completed:").await.is_empty());
    assert!(h.scan("burn:").await.is_empty());
    assert!(h.scan("orphaned:").await.is_empty());

    let again = assert_ok!(notifier.on_mint(&mint).await);
    assert_eq!(again, NotifyOutcome::AlreadyNotified);
}

#[tokio::test]
async fn fallback_pointer_to_missing_record_is_not_found() {
    let h = Harness::new();
    let t = Transfer::new(7_000_000, 500);
    h.record(&t).await;
    h.store()
        .delete(&h.keys().pending("arbitrum", &t.key()))
        .await
        .unwrap();

    let mut mint = t.mint();
    mint.canonical_key = H256::repeat_byte(0x78);
    let report = assert_ok!(h.mints.handle(&mint_tx(), &mint).await);
    assert!(matches!(
        report.outcome,
        MintOutcome::Orphaned {
            reason: OrphanReason::NoBurnData,
            ..
        }
    ));
}

#[tokio::test]
async fn crash_between_completed_write_and_pending_delete_converges() {
    let h = Harness::new();
    let t = Transfer::new(3_000_000, 500);
    let pending_key = h.keys().pending("arbitrum", &t.key());

    h.record(&t).await;
    h.clock.advance(60);
    h.backend.fail_next_delete(&pending_key);

    let err = assert_err!(h.mints.handle(&mint_tx(), &t.mint()).await);
    assert!(err.is_retryable());
    let first = h.completed(&t.key()).await;
    assert!(h.raw(&pending_key).await.is_some());

    h.clock.advance(30);
    let report = h.mint(&t).await;
    assert!(matches!(report.outcome, MintOutcome::Matched { .. }));
    assert_eq!(h.completed(&t.key()).await, first);
    assert_eq!(first.mint_timestamp, T0 + 60);
    assert_eq!(h.raw(&pending_key).await, None);
}

#[tokio::test]
async fn failed_index_write_withdraws_pending_record() {
    let h = Harness::new();
    let t = Transfer::new(3_000_000, 500);
    let body_hash = crate::events::body_hash(envelope_body(&t.envelope));
    h.backend
        .fail_next_put(&h.keys().fallback_body("arbitrum", &body_hash));

    let err = assert_err!(h.burns.record(&burn_tx(), &t.burn, &t.candidates()).await);
    assert!(matches!(err, CorrelatorError::Store(_)));
    assert!(h.scan("burn:").await.is_empty());

    h.record(&t).await;
    assert_eq!(h.scan("burn:").await.len(), 2);
}

#[tokio::test]
async fn burn_without_envelope_is_a_decode_error() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);

    let err = assert_err!(h.burns.record(&burn_tx(), &t.burn, &[]).await);
    assert!(matches!(err, CorrelatorError::Decode(DecodeError::NoEnvelope)));
    assert!(h.scan("burn:").await.is_empty());
}

#[tokio::test]
async fn unsupported_chains_are_skipped_and_counted() {
    let h = Harness::new();

    let to_solana = Transfer::to_domain(5, 1_000_000, 500);
    for _ in 0..2 {
        let report = h.record(&to_solana).await;
        assert_eq!(
            report.outcome,
            BurnOutcome::Skipped {
                skip: SkipReason::UnsupportedDestination("solana".to_string())
            }
        );
    }
    assert!(h.scan("burn:").await.is_empty());
    let stat: UnsupportedChainStat = h
        .store()
        .get("cctp:stats:unsupported_dst:solana")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stat.count, 2);
    assert_eq!(stat.last_seen, T0);

    let t = Transfer::new(1_000_000, 500);
    let mut from_hyperevm = t.mint();
    from_hyperevm.source_domain = 19;
    let report = assert_ok!(h.mints.handle(&mint_tx(), &from_hyperevm).await);
    assert_eq!(
        report.outcome,
        MintOutcome::Skipped {
            skip: SkipReason::UnsupportedSource("hyperevm".to_string())
        }
    );
    assert!(h
        .raw("cctp:stats:unsupported_src:hyperevm")
        .await
        .is_some());

    let mut unknown = t.mint();
    unknown.source_domain = 999;
    let report = assert_ok!(h.mints.handle(&mint_tx(), &unknown).await);
    assert_eq!(
        report.outcome,
        MintOutcome::Skipped {
            skip: SkipReason::UnknownSource(999)
        }
    );
    assert_eq!(h.scan("stats:unsupported_src").await.len(), 1);
    assert!(h.scan("orphaned:").await.is_empty());
}

#[tokio::test]
async fn notification_fires_at_most_once() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);
    h.record(&t).await;
    h.clock.advance(90);
    h.mint(&t).await;

    let notifier = h.notifier(delivering(Channel::Completions, 1));
    let first = assert_ok!(notifier.notify("arbitrum", &t.key()).await);
    assert_eq!(first, NotifyOutcome::Delivered);
    let second = assert_ok!(notifier.on_mint(&t.mint()).await);
    assert_eq!(second, NotifyOutcome::AlreadyNotified);

    let marker = h
        .raw(&h.keys().notified("arbitrum", &t.key()))
        .await
        .unwrap();
    assert_eq!(marker, json!({"notified": true, "at": T0 + 90}));
    assert!(h.scan("completed:").await.is_empty());

    // Mint replays after notification stay no-ops
    let replay = h.mint(&t).await;
    assert!(matches!(replay.outcome, MintOutcome::AlreadyCompleted { .. }));
}

#[tokio::test]
async fn failed_delivery_leaves_no_marker_and_retries() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);
    h.record(&t).await;
    h.mint(&t).await;

    let mut mock = MockNotifier::new();
    let mut seq = mockall::Sequence::new();
    mock.expect_send()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(NotifyError::Status(500)));
    mock.expect_send()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(Delivery::Delivered));
    let notifier = h.notifier(mock);

    let first = assert_ok!(notifier.notify("arbitrum", &t.key()).await);
    assert!(matches!(first, NotifyOutcome::Failed(_)));
    assert_eq!(h.raw(&h.keys().notified("arbitrum", &t.key())).await, None);
    assert!(h.scan("completed:").await.len() == 1);

    let second = assert_ok!(notifier.notify("arbitrum", &t.key()).await);
    assert_eq!(second, NotifyOutcome::Delivered);
}

#[tokio::test]
async fn unconfigured_or_incomplete_notifications_are_skipped() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);

    let mut mock = MockNotifier::new();
    mock.expect_send()
        .times(1)
        .returning(|_, _| Ok(Delivery::NotConfigured));
    let notifier = h.notifier(mock);

    // Nothing completed yet: the sink is never called
    let outcome = assert_ok!(notifier.notify("arbitrum", &t.key()).await);
    assert_eq!(outcome, NotifyOutcome::NotCompleted);

    h.record(&t).await;
    h.mint(&t).await;
    let outcome = assert_ok!(notifier.notify("arbitrum", &t.key()).await);
    assert_eq!(outcome, NotifyOutcome::NotConfigured);
    assert_eq!(h.raw(&h.keys().notified("arbitrum", &t.key())).await, None);
    assert_eq!(h.scan("completed:").await.len(), 1);
}

#[tokio::test]
async fn janitor_drops_dangling_indices_only() {
    let h = Harness::new();
    let keys = h.keys().clone();

    // Live orphan with both indices, live pending with its fallback index
    h.mint(&Transfer::new(1_000_000, 500)).await;
    let live = Transfer::new(2_000_000, 500);
    h.record(&live).await;
    let live_pending = keys.pending("arbitrum", &live.key());

    let dangling_orphan = keys.orphan_index("arbitrum", "0xdead");
    let dangling_fallback = keys.fallback_body("arbitrum", "0xgone");
    let embedded = keys.fallback_body("arbitrum", "0xembedded");
    let store = h.store();
    store
        .put(
            &dangling_orphan,
            &json!({"orphanKey": keys.orphaned("base", "0xdead", 1), "canonicalKey": "0xdead"}),
            60,
        )
        .await
        .unwrap();
    store
        .put(
            &dangling_fallback,
            &json!({"primaryKey": keys.pending("arbitrum", "0xgone"), "amount": "1"}),
            60,
        )
        .await
        .unwrap();
    store
        .put(&embedded, &json!({"canonicalKey": "0xe", "amount": "1"}), 60)
        .await
        .unwrap();
    store
        .put(
            &keys.legacy_pending_index(),
            &json!({"burns": [{"key": live_pending}, {"key": keys.pending("arbitrum", "0xgone")}]}),
            60,
        )
        .await
        .unwrap();

    let janitor = StaleIndexJanitor::new(h.ctx.clone(), 4);
    let report = assert_ok!(janitor.sweep().await);
    assert_eq!(report.scanned, 6);
    assert_eq!(report.removed, 2);
    assert_eq!(report.legacy_removed, 1);
    assert_eq!(report.errors, 0);

    assert_eq!(h.raw(&dangling_orphan).await, None);
    assert_eq!(h.raw(&dangling_fallback).await, None);
    assert!(h.raw(&embedded).await.is_some());
    assert_eq!(h.scan("orphanIndex:").await.len(), 2);
    assert!(h.raw(&live_pending).await.is_some());

    let legacy = h.raw(&keys.legacy_pending_index()).await.unwrap();
    assert_eq!(legacy, json!({"burns": [{"key": live_pending}]}));

    // Second pass finds nothing to do
    let again = assert_ok!(janitor.sweep().await);
    assert_eq!(again.removed + again.legacy_removed, 0);
}

#[tokio::test]
async fn engine_ingests_burn_then_mint_and_notifies_once() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);
    let engine = h.engine(delivering(Channel::Completions, 1));

    let burn = assert_ok!(engine.ingest(&t.burn_raw()).await);
    assert_eq!(burn.burns.len(), 1);
    assert!(!burn.has_failures());
    assert!(burn.mints.is_empty());

    h.clock.advance(45);
    let mint = assert_ok!(engine.ingest(&t.mint_raw()).await);
    assert!(matches!(
        &mint.mints[..],
        [HandlerResult::Ok {
            result: MintOutcome::Matched {
                duration_seconds: Some(45),
                ..
            }
        }]
    ));
    assert_eq!(
        mint.notifications,
        vec![HandlerResult::Ok {
            result: NotifyOutcome::Delivered
        }]
    );

    let replay = assert_ok!(engine.ingest(&t.mint_raw()).await);
    assert_eq!(
        replay.notifications,
        vec![HandlerResult::Ok {
            result: NotifyOutcome::AlreadyNotified
        }]
    );
    assert!(h.scan("orphaned:").await.is_empty());
}

#[tokio::test]
async fn engine_runs_alert_and_reconciliation_effects() {
    let h = Harness::new();
    let t = Transfer::new(9_000_000, 2000);

    let mut mock = MockNotifier::new();
    mock.expect_send()
        .withf(|c, payload| *c == Channel::Alerts && payload["type"] == "orphaned_mint_alert")
        .times(1)
        .returning(|_, _| Ok(Delivery::Delivered));
    mock.expect_send()
        .withf(|c, _| *c == Channel::Completions)
        .times(1)
        .returning(|_, _| Ok(Delivery::Delivered));
    let engine = h.engine(mock);

    let mint = assert_ok!(engine.ingest(&t.mint_raw()).await);
    assert_eq!(mint.effects.len(), 1);
    assert_eq!(mint.effects[0].effect, "orphan_alert");
    assert_eq!(mint.effects[0].result, "delivered");
    assert_eq!(
        mint.notifications,
        vec![HandlerResult::Ok {
            result: NotifyOutcome::NotCompleted
        }]
    );

    let burn = assert_ok!(engine.ingest(&t.burn_raw()).await);
    assert!(matches!(
        &burn.burns[..],
        [HandlerResult::Ok {
            result: BurnOutcome::Reconciled { .. }
        }]
    ));
    assert_eq!(burn.effects[0].effect, "notify_completion");
    assert_eq!(burn.effects[0].result, "delivered");
    assert!(h
        .raw(&h.keys().notified("arbitrum", &t.key()))
        .await
        .is_some());
}

#[tokio::test]
async fn engine_reports_handler_failures_per_event() {
    let h = Harness::new();
    let t = Transfer::new(1_000_000, 500);
    let engine = h.engine(MockNotifier::new());

    // Burn log without its MessageSent companion
    let mut raw = t.burn_raw();
    raw.logs.remove(0);
    let report = assert_ok!(engine.ingest(&raw).await);
    assert!(report.has_failures());
    assert!(matches!(
        &report.burns[..],
        [HandlerResult::Failed {
            retryable: false,
            ..
        }]
    ));

    let empty = RawTransaction {
        network: BASE_ID,
        hash: "0xnothing".to_string(),
        block_number: 1,
        logs: Vec::new(),
    };
    let report = assert_ok!(engine.ingest(&empty).await);
    assert!(report.burns.is_empty() && report.mints.is_empty());
}
