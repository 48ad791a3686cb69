//! Exercises the daemon loop and hunter scheduler against in-memory fake
//! capabilities for the concrete scenarios in SPEC_FULL.md §8.

use async_trait::async_trait;
use chrono::Utc;
use pinwarden::claim_submitter::{ClaimOutcome, ClaimResult, ClaimSubmitter};
use pinwarden::daemon::Daemon;
use pinwarden::error::{GatewayError, LedgerError, StorageNodeError};
use pinwarden::executor::{PinExecutor, PinResult};
use pinwarden::filter::{DefaultFilter, OfferFilter};
use pinwarden::gateway::PublisherGateway;
use pinwarden::hunter::{DefaultFlagSubmitter, Hunter, HunterScheduler, PinVerifier, PinnerRegistryCache, VerificationResult};
use pinwarden::ledger::{CollectResult, FlagResult, LedgerClient, SlotInfo};
use pinwarden::mode::ModeController;
use pinwarden::pipeline::Pipeline;
use pinwarden::poller::EventPoller;
use pinwarden::storage_node::StorageNode;
use pinwarden::store::SqliteStore;
use pinwarden::types::{
    cid_hash_hex, LedgerEvent, Mode, OfferStatus, PinEvent, PinnedEvent, PinnerInfo, RejectReason,
    TrackedCid, TrackedPinStatus, UnpinEvent, VerificationMethod,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ---- shared fakes ----

struct FakePoller {
    batches: StdMutex<Vec<Vec<LedgerEvent>>>,
}

impl FakePoller {
    fn once(events: Vec<LedgerEvent>) -> Self {
        FakePoller { batches: StdMutex::new(vec![events]) }
    }
}

#[async_trait]
impl EventPoller for FakePoller {
    async fn poll(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            Ok(vec![])
        } else {
            Ok(batches.remove(0))
        }
    }
}

struct FakeLedger {
    wallet_balance: i64,
    simulate_fee: i64,
    slot_pins_remaining: u32,
    slot_expired: bool,
}

impl Default for FakeLedger {
    fn default() -> Self {
        FakeLedger { wallet_balance: 10_000_000, simulate_fee: 1_000, slot_pins_remaining: 3, slot_expired: false }
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn poll_events(&self, _since: u64) -> Result<Vec<LedgerEvent>, LedgerError> {
        Ok(vec![])
    }
    async fn get_slot(&self, _slot_id: u64) -> Result<SlotInfo, LedgerError> {
        Ok(SlotInfo { pin_qty: 3, pins_remaining: self.slot_pins_remaining, expired: self.slot_expired })
    }
    async fn is_slot_expired(&self, _slot_id: u64) -> Result<bool, LedgerError> {
        Ok(self.slot_expired)
    }
    async fn get_pinner(&self, _address: &str) -> Result<Option<PinnerInfo>, LedgerError> {
        Ok(Some(PinnerInfo {
            address: "P1".into(),
            node_id: "node1".into(),
            multiaddr: "/ip4/1.2.3.4/tcp/4001".into(),
            active: true,
            cached_at: Utc::now(),
        }))
    }
    async fn current_epoch(&self) -> Result<u64, LedgerError> {
        Ok(1)
    }
    async fn get_balance(&self, _address: &str) -> Result<i64, LedgerError> {
        Ok(self.wallet_balance)
    }
    async fn simulate_fee(&self, _operation: &str) -> Result<i64, LedgerError> {
        Ok(self.simulate_fee)
    }
    async fn collect_pin(&self, _caller: &str, _slot_id: u64) -> Result<CollectResult, LedgerError> {
        unimplemented!("filter never calls collect_pin")
    }
    async fn flag_pinner(&self, _caller: &str, pinner: &str) -> Result<FlagResult, LedgerError> {
        Ok(FlagResult { tx_hash: format!("flag-tx-{pinner}"), flag_count_after: Some(1), bounty_earned: Some(500) })
    }
}

struct FakeGateway;

#[async_trait]
impl PublisherGateway for FakeGateway {
    async fn fetch(&self, _gateway: &str, _cid: &str, _max_bytes: u64) -> Result<Vec<u8>, GatewayError> {
        unimplemented!("executor is faked directly in these tests")
    }
    async fn content_length(&self, _gateway: &str, _cid: &str) -> Result<Option<u64>, GatewayError> {
        Ok(None)
    }
}

struct FakeExecutor {
    success: bool,
    bytes_pinned: i64,
}

#[async_trait]
impl PinExecutor for FakeExecutor {
    async fn pin(&self, cid: &str, _gateway: &str, _max_bytes: u64) -> PinResult {
        PinResult {
            success: self.success,
            cid: cid.to_string(),
            bytes_pinned: self.bytes_pinned,
            error: if self.success { None } else { Some("fetch failed".into()) },
            duration_ms: 5,
        }
    }
    async fn verify_pinned(&self, _cid: &str) -> bool {
        self.success
    }
    async fn unpin(&self, _cid: &str) -> bool {
        true
    }
}

struct FakeSubmitter {
    outcome: StdMutex<Option<ClaimOutcome>>,
}

impl FakeSubmitter {
    fn always(outcome: ClaimOutcome) -> Self {
        FakeSubmitter { outcome: StdMutex::new(Some(outcome)) }
    }
}

#[async_trait]
impl ClaimSubmitter for FakeSubmitter {
    async fn submit_claim(&self, _caller: &str, _slot_id: u64) -> ClaimResult {
        let outcome = self.outcome.lock().unwrap().clone().expect("outcome configured");
        ClaimResult { outcome }
    }
}

struct DummyStorageNode;

#[async_trait]
impl StorageNode for DummyStorageNode {
    async fn add(&self, _bytes: &[u8]) -> Result<String, StorageNodeError> {
        unimplemented!()
    }
    async fn pin_add(&self, _cid: &str) -> Result<(), StorageNodeError> {
        unimplemented!()
    }
    async fn pin_ls(&self, _cid: &str) -> Result<bool, StorageNodeError> {
        unimplemented!()
    }
    async fn pin_rm(&self, _cid: &str) -> Result<(), StorageNodeError> {
        Ok(())
    }
    async fn findprovs(&self, _cid: &str, _num_providers: u32) -> Result<Vec<String>, StorageNodeError> {
        unimplemented!()
    }
    async fn swarm_connect(&self, _multiaddr: &str) -> Result<(), StorageNodeError> {
        unimplemented!()
    }
    async fn block_get(&self, _cid: &str, _timeout: Duration) -> Result<Vec<u8>, StorageNodeError> {
        unimplemented!()
    }
    async fn cat(&self, _cid: &str, _length: u64) -> Result<Vec<u8>, StorageNodeError> {
        unimplemented!()
    }
    async fn id(&self) -> Result<String, StorageNodeError> {
        unimplemented!()
    }
}

fn pin_event(slot_id: u64, cid: &str, offer_price: i64) -> PinEvent {
    PinEvent {
        slot_id,
        cid: cid.to_string(),
        filename: "file.bin".into(),
        gateway: "https://gw.example".into(),
        offer_price,
        pin_qty: 3,
        publisher: "G_PUBLISHER".into(),
        ledger_sequence: slot_id * 10,
    }
}

#[allow(clippy::too_many_arguments)]
fn make_daemon(
    store: Arc<SqliteStore>,
    poller: Arc<dyn EventPoller>,
    filter: Arc<dyn OfferFilter>,
    mode_controller: Arc<ModeController>,
    pipeline: Arc<Pipeline>,
    hunter: Hunter,
) -> Daemon {
    Daemon::new(
        store,
        poller,
        filter,
        mode_controller,
        pipeline,
        hunter,
        "OPERATOR_ADDR".to_string(),
        Duration::from_secs(60),
        false,
        Arc::new(DummyStorageNode),
    )
}

fn make_hunter(store: Arc<SqliteStore>, ledger: Arc<dyn LedgerClient>) -> Hunter {
    let registry_cache = Arc::new(PinnerRegistryCache::new(store.clone(), ledger, 3600));
    Hunter::new(store, registry_cache, "OPERATOR_ADDR".to_string())
}

/// Scenario A: auto-mode happy path ends in `claimed` with the expected
/// activity trail.
#[tokio::test]
async fn scenario_a_auto_mode_happy_path() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let ledger: Arc<dyn LedgerClient> = Arc::new(FakeLedger::default());
    let gateway: Arc<dyn PublisherGateway> = Arc::new(FakeGateway);
    let filter: Arc<dyn OfferFilter> = Arc::new(DefaultFilter::new(store.clone(), ledger.clone(), gateway, 2, 1000, "OPERATOR_ADDR".into()));

    let executor = Arc::new(FakeExecutor { success: true, bytes_pinned: 1024 });
    let submitter = Arc::new(FakeSubmitter::always(ClaimOutcome::Success { amount_earned: 1_000_000, tx_hash: "tx1".into() }));
    let pipeline = Arc::new(Pipeline { store: store.clone(), executor, claim_submitter: submitter, operator_address: "OPERATOR_ADDR".into() });
    let mode_controller = Arc::new(ModeController::new(store.clone(), pipeline.clone()));
    mode_controller.set_mode(Mode::Auto).await.unwrap();

    let poller: Arc<dyn EventPoller> = Arc::new(FakePoller::once(vec![LedgerEvent::Pin(pin_event(1, "Qm...A", 1_000_000))]));
    let hunter = make_hunter(store.clone(), ledger.clone());
    let daemon = make_daemon(store.clone(), poller, filter, mode_controller, pipeline, hunter);

    let cancel = CancellationToken::new();
    cancel.cancel();
    daemon.run(cancel).await.unwrap();

    let offer = store.get_offer(1).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Claimed);

    let claim = store.get_claim(1).await.unwrap().unwrap();
    assert_eq!(claim.amount_earned, 1_000_000);
    assert_eq!(claim.tx_hash, "tx1");
    assert!(store.is_cid_pinned("Qm...A").await.unwrap());

    let activity = store.get_recent_activity(20).await.unwrap();
    let kinds: Vec<_> = activity.iter().rev().map(|e| e.event_type).collect();
    use pinwarden::types::ActivityEventType::*;
    assert_eq!(kinds, vec![OfferSeen, OfferAccepted, PinStarted, PinSuccess, ClaimSubmitted, ClaimSuccess]);
}

/// Scenario B: a below-`min_price` offer is rejected before the executor runs.
#[tokio::test]
async fn scenario_b_price_reject_never_touches_executor() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_daemon_config(pinwarden::types::DaemonConfigUpdate { mode: Some(Mode::Auto), min_price: Some(100), max_content_size: None }).await.unwrap();

    let ledger: Arc<dyn LedgerClient> = Arc::new(FakeLedger::default());
    let gateway: Arc<dyn PublisherGateway> = Arc::new(FakeGateway);
    let filter: Arc<dyn OfferFilter> = Arc::new(DefaultFilter::new(store.clone(), ledger.clone(), gateway, 2, 1000, "OPERATOR_ADDR".into()));

    let calls = Arc::new(AtomicU32::new(0));
    struct CountingExecutor(Arc<AtomicU32>);
    #[async_trait]
    impl PinExecutor for CountingExecutor {
        async fn pin(&self, cid: &str, _gateway: &str, _max_bytes: u64) -> PinResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            PinResult { success: true, cid: cid.to_string(), bytes_pinned: 1, error: None, duration_ms: 1 }
        }
        async fn verify_pinned(&self, _cid: &str) -> bool {
            true
        }
        async fn unpin(&self, _cid: &str) -> bool {
            true
        }
    }
    let executor = Arc::new(CountingExecutor(calls.clone()));
    let submitter = Arc::new(FakeSubmitter::always(ClaimOutcome::Success { amount_earned: 1, tx_hash: "tx".into() }));
    let pipeline = Arc::new(Pipeline { store: store.clone(), executor, claim_submitter: submitter, operator_address: "OPERATOR_ADDR".into() });
    let mode_controller = Arc::new(ModeController::new(store.clone(), pipeline.clone()));

    let poller: Arc<dyn EventPoller> = Arc::new(FakePoller::once(vec![LedgerEvent::Pin(pin_event(2, "Qm...B", 50))]));
    let hunter = make_hunter(store.clone(), ledger.clone());
    let daemon = make_daemon(store.clone(), poller, filter, mode_controller, pipeline, hunter);

    let cancel = CancellationToken::new();
    cancel.cancel();
    daemon.run(cancel).await.unwrap();

    let offer = store.get_offer(2).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Rejected);
    assert_eq!(offer.reject_reason, Some(RejectReason::PriceTooLow));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.get_claim(2).await.unwrap().is_none());
    assert!(!store.is_cid_pinned("Qm...B").await.unwrap());
}

/// Scenario C: approve mode parks the offer, then `approve_offers` plus the
/// next iteration drives it to `claimed`.
#[tokio::test]
async fn scenario_c_approve_flow_reaches_claimed() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let ledger: Arc<dyn LedgerClient> = Arc::new(FakeLedger::default());
    let gateway: Arc<dyn PublisherGateway> = Arc::new(FakeGateway);
    let filter: Arc<dyn OfferFilter> = Arc::new(DefaultFilter::new(store.clone(), ledger.clone(), gateway, 2, 1000, "OPERATOR_ADDR".into()));

    let executor = Arc::new(FakeExecutor { success: true, bytes_pinned: 2048 });
    let submitter = Arc::new(FakeSubmitter::always(ClaimOutcome::Success { amount_earned: 1_000_000, tx_hash: "tx7".into() }));
    let pipeline = Arc::new(Pipeline { store: store.clone(), executor, claim_submitter: submitter, operator_address: "OPERATOR_ADDR".into() });
    let mode_controller = Arc::new(ModeController::new(store.clone(), pipeline.clone()));
    mode_controller.set_mode(Mode::Approve).await.unwrap();

    let poller: Arc<dyn EventPoller> = Arc::new(FakePoller::once(vec![LedgerEvent::Pin(pin_event(7, "Qm...C", 1_000_000))]));
    let hunter = make_hunter(store.clone(), ledger.clone());
    let daemon = make_daemon(store.clone(), poller, filter, mode_controller.clone(), pipeline.clone(), hunter);

    let cancel = CancellationToken::new();
    cancel.cancel();
    daemon.run(cancel).await.unwrap();

    let offer = store.get_offer(7).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::AwaitingApproval);

    let ipc_ctx = pinwarden::ipc::IpcContext {
        store: store.clone(),
        ledger,
        mode_controller,
        verifier: Arc::new(AlwaysPass),
        flag_submitter: Arc::new(NeverFlags),
    };
    let results = pinwarden::ipc::handlers::approve_offers(&ipc_ctx, vec![7]).await;
    assert!(results[0].approved);

    let offer = store.get_offer(7).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Approved);

    pipeline.execute_and_claim(&offer, i64::MAX).await.unwrap();
    let offer = store.get_offer(7).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Claimed);
}

struct AlwaysPass;
#[async_trait]
impl PinVerifier for AlwaysPass {
    async fn verify(&self, _cid: &str, _node_id: &str, _multiaddr: &str) -> VerificationResult {
        VerificationResult { passed: Some(true), method_used: Some(VerificationMethod::Bitswap), methods_attempted: vec![], duration_ms: 0 }
    }
}

struct NeverFlags;
#[async_trait]
impl pinwarden::hunter::FlagSubmitter for NeverFlags {
    async fn submit_flag(&self, _pinner_address: &str) -> pinwarden::hunter::FlagOutcome {
        panic!("should not be called in this scenario")
    }
}

/// Fake verifier whose pass/fail is fixed for the whole test.
struct AlwaysFail;
#[async_trait]
impl PinVerifier for AlwaysFail {
    async fn verify(&self, _cid: &str, _node_id: &str, _multiaddr: &str) -> VerificationResult {
        VerificationResult { passed: Some(false), method_used: Some(VerificationMethod::Bitswap), methods_attempted: vec![], duration_ms: 0 }
    }
}

/// Scenario D: three consecutive failed cycles cross `failure_threshold=3`
/// and the pair gets flagged.
#[tokio::test]
async fn scenario_d_hunter_flags_after_threshold_failures() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let ledger: Arc<dyn LedgerClient> = Arc::new(FakeLedger::default());

    let tracked = TrackedCid { cid: "Qm...X".into(), cid_hash: cid_hash_hex("Qm...X"), slot_id: 50, publisher: "OPERATOR_ADDR".into(), gateway: None, pin_qty: 3 };
    store.add_tracked_cid(&tracked).await.unwrap();
    let pinner_info = ledger.get_pinner("P1").await.unwrap().unwrap();
    store
        .add_tracked_pin(&pinwarden::types::TrackedPin {
            cid: tracked.cid.clone(),
            pinner_address: "P1".into(),
            pinner_node_id: pinner_info.node_id,
            pinner_multiaddr: pinner_info.multiaddr,
            slot_id: 50,
            claimed_at: Utc::now(),
            last_verified_at: None,
            last_checked_at: None,
            consecutive_failures: 0,
            total_checks: 0,
            total_failures: 0,
            status: TrackedPinStatus::Tracking,
            flagged_at: None,
            flag_tx_hash: None,
        })
        .await
        .unwrap();

    let verifier: Arc<dyn PinVerifier> = Arc::new(AlwaysFail);
    let flag_submitter = Arc::new(DefaultFlagSubmitter::new(ledger.clone(), store.clone(), "OPERATOR_ADDR".into()));
    let scheduler = HunterScheduler::new(store.clone(), verifier, flag_submitter, 4, 3, 86_400);

    for _ in 0..3 {
        scheduler.run_cycle().await;
    }

    let pin = store.get_tracked_pin("Qm...X", "P1").await.unwrap().unwrap();
    assert_eq!(pin.status, TrackedPinStatus::FlagSubmitted);
    assert!(store.has_already_flagged("P1").await.unwrap());
    let history = store.get_flag_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].pinner_address, "P1");
}

/// Scenario E: an UNPIN event frees tracking before the failure threshold is
/// reached, and the scheduler then skips the pair.
#[tokio::test]
async fn scenario_e_unpin_clears_tracking() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let ledger: Arc<dyn LedgerClient> = Arc::new(FakeLedger::default());

    let tracked = TrackedCid { cid: "Qm...X".into(), cid_hash: cid_hash_hex("Qm...X"), slot_id: 51, publisher: "OPERATOR_ADDR".into(), gateway: None, pin_qty: 3 };
    store.add_tracked_cid(&tracked).await.unwrap();
    let pinner_info = ledger.get_pinner("P1").await.unwrap().unwrap();
    store
        .add_tracked_pin(&pinwarden::types::TrackedPin {
            cid: tracked.cid.clone(),
            pinner_address: "P1".into(),
            pinner_node_id: pinner_info.node_id,
            pinner_multiaddr: pinner_info.multiaddr,
            slot_id: 51,
            claimed_at: Utc::now(),
            last_verified_at: None,
            last_checked_at: None,
            consecutive_failures: 0,
            total_checks: 0,
            total_failures: 0,
            status: TrackedPinStatus::Tracking,
            flagged_at: None,
            flag_tx_hash: None,
        })
        .await
        .unwrap();

    let registry_cache = Arc::new(PinnerRegistryCache::new(store.clone(), ledger.clone(), 3600));
    let hunter = Hunter::new(store.clone(), registry_cache, "OPERATOR_ADDR".into());
    hunter.on_unpin_event(&UnpinEvent { slot_id: 51, cid_hash: cid_hash_hex("Qm...X"), ledger_sequence: 99 }).await;

    let pin = store.get_tracked_pin("Qm...X", "P1").await.unwrap().unwrap();
    assert_eq!(pin.status, TrackedPinStatus::SlotFreed);

    let verifier: Arc<dyn PinVerifier> = Arc::new(AlwaysFail);
    let flag_submitter = Arc::new(DefaultFlagSubmitter::new(ledger.clone(), store.clone(), "OPERATOR_ADDR".into()));
    let scheduler = HunterScheduler::new(store.clone(), verifier, flag_submitter, 4, 3, 86_400);
    let cycle = scheduler.run_cycle().await;
    assert_eq!(cycle.total_checked, 0, "slot_freed pins must not be picked up by get_due_tracked_pins");
}

/// A tracked pin already flagged still clears to `slot_freed` on UNPIN:
/// `mark_slot_freed_for_cid` must not carve out `flag_submitted`, since
/// SPEC_FULL.md's transition table applies to "any" prior status.
#[tokio::test]
async fn unpin_clears_tracking_even_after_a_flag_was_already_submitted() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let ledger: Arc<dyn LedgerClient> = Arc::new(FakeLedger::default());

    let tracked = TrackedCid { cid: "Qm...Y".into(), cid_hash: cid_hash_hex("Qm...Y"), slot_id: 52, publisher: "OPERATOR_ADDR".into(), gateway: None, pin_qty: 3 };
    store.add_tracked_cid(&tracked).await.unwrap();
    let pinner_info = ledger.get_pinner("P1").await.unwrap().unwrap();
    store
        .add_tracked_pin(&pinwarden::types::TrackedPin {
            cid: tracked.cid.clone(),
            pinner_address: "P1".into(),
            pinner_node_id: pinner_info.node_id,
            pinner_multiaddr: pinner_info.multiaddr,
            slot_id: 52,
            claimed_at: Utc::now(),
            last_verified_at: None,
            last_checked_at: Some(Utc::now()),
            consecutive_failures: 3,
            total_checks: 3,
            total_failures: 3,
            status: TrackedPinStatus::FlagSubmitted,
            flagged_at: Some(Utc::now()),
            flag_tx_hash: Some("flag-tx-P1".into()),
        })
        .await
        .unwrap();

    let registry_cache = Arc::new(PinnerRegistryCache::new(store.clone(), ledger.clone(), 3600));
    let hunter = Hunter::new(store.clone(), registry_cache, "OPERATOR_ADDR".into());
    hunter.on_unpin_event(&UnpinEvent { slot_id: 52, cid_hash: cid_hash_hex("Qm...Y"), ledger_sequence: 100 }).await;

    let pin = store.get_tracked_pin("Qm...Y", "P1").await.unwrap().unwrap();
    assert_eq!(pin.status, TrackedPinStatus::SlotFreed, "flag_submitted pins must still clear to slot_freed on UNPIN");
}

/// Scenario F: crash recovery re-runs the claim submitter for an offer left
/// in `pinned` with no claim row.
#[tokio::test]
async fn scenario_f_crash_recovery_resumes_pinned_offer() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let ledger: Arc<dyn LedgerClient> = Arc::new(FakeLedger::default());
    let gateway: Arc<dyn PublisherGateway> = Arc::new(FakeGateway);
    let filter: Arc<dyn OfferFilter> = Arc::new(DefaultFilter::new(store.clone(), ledger.clone(), gateway, 2, 1000, "OPERATOR_ADDR".into()));

    let event = pin_event(9, "Qm...F", 1_000_000);
    store.save_offer(&event, OfferStatus::Pinning).await.unwrap();
    store.update_offer_status(9, OfferStatus::Pinned, None).await.unwrap();
    assert!(store.get_claim(9).await.unwrap().is_none());

    let executor = Arc::new(FakeExecutor { success: true, bytes_pinned: 4096 });
    let submitter = Arc::new(FakeSubmitter::always(ClaimOutcome::Success { amount_earned: 777, tx_hash: "tx9".into() }));
    let pipeline = Arc::new(Pipeline { store: store.clone(), executor, claim_submitter: submitter, operator_address: "OPERATOR_ADDR".into() });
    let mode_controller = Arc::new(ModeController::new(store.clone(), pipeline.clone()));

    let poller: Arc<dyn EventPoller> = Arc::new(FakePoller::once(vec![]));
    let hunter = make_hunter(store.clone(), ledger.clone());
    let daemon = make_daemon(store.clone(), poller, filter, mode_controller, pipeline, hunter);

    let cancel = CancellationToken::new();
    cancel.cancel();
    daemon.run(cancel).await.unwrap();

    let offer = store.get_offer(9).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Claimed);
    let claim = store.get_claim(9).await.unwrap().unwrap();
    assert_eq!(claim.amount_earned, 777);
    assert_eq!(claim.tx_hash, "tx9");
}
