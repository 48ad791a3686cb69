//! The state store capability: the single durable source of truth (SPEC_FULL.md
//! §4.1). Every other component holds a read handle and mutates only through
//! these operations — never through shared in-memory references.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::types::{
    ActivityEntry, Claim, DaemonConfig, DaemonConfigUpdate, FlagRecord, Offer, OfferStatus,
    PinnerInfo, RejectReason, TrackedCid, TrackedPin, TrackedPinStatus, VerificationCycle,
    VerificationLogEntry, VerificationMethod, MethodOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Result of applying one verifier attempt to a tracked pin: `None` passed
/// means every attempted method errored (neither pass nor fail, SPEC_FULL §4.8).
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub passed: Option<bool>,
    pub method_used: Option<VerificationMethod>,
    pub methods_attempted: Vec<(VerificationMethod, MethodOutcome)>,
    pub duration_ms: u64,
}

/// Aggregated claim totals (§1b: supplemented day-bucketed breakdown).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Earnings {
    pub total: i64,
    pub claim_count: u64,
    pub by_day: Vec<(NaiveDate, i64)>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    // -- Cursor --
    async fn get_cursor(&self) -> Result<u64, StoreError>;
    async fn set_cursor(&self, ledger: u64) -> Result<(), StoreError>;

    // -- Config --
    async fn get_daemon_config(&self) -> Result<DaemonConfig, StoreError>;
    async fn set_daemon_config(&self, update: DaemonConfigUpdate) -> Result<DaemonConfig, StoreError>;

    // -- Offers --
    /// Insert-or-ignore on `slot_id`. Returns `true` if a new row was inserted.
    async fn save_offer(
        &self,
        event: &crate::types::PinEvent,
        initial_status: OfferStatus,
    ) -> Result<bool, StoreError>;
    async fn get_offer(&self, slot_id: u64) -> Result<Option<Offer>, StoreError>;
    async fn update_offer_status(
        &self,
        slot_id: u64,
        status: OfferStatus,
        reject_reason: Option<RejectReason>,
    ) -> Result<(), StoreError>;
    async fn update_offer_pins_remaining(
        &self,
        slot_id: u64,
        pins_remaining: u32,
    ) -> Result<(), StoreError>;
    async fn get_offers_by_status(&self, status: OfferStatus) -> Result<Vec<Offer>, StoreError>;
    async fn get_approval_queue(&self) -> Result<Vec<Offer>, StoreError> {
        self.get_offers_by_status(OfferStatus::AwaitingApproval).await
    }

    // -- Claims --
    async fn save_claim(&self, claim: &Claim) -> Result<(), StoreError>;
    async fn get_claim(&self, slot_id: u64) -> Result<Option<Claim>, StoreError>;

    // -- Pins --
    async fn save_pin(&self, cid: &str, slot_id: Option<u64>, bytes: i64) -> Result<(), StoreError>;
    async fn is_cid_pinned(&self, cid: &str) -> Result<bool, StoreError>;

    // -- Activity --
    async fn log_activity(&self, entry: ActivityEntry) -> Result<(), StoreError>;
    async fn get_recent_activity(&self, limit: u32) -> Result<Vec<ActivityEntry>, StoreError>;

    // -- Hunter: tracked cids / pins --
    async fn add_tracked_cid(&self, tracked: &TrackedCid) -> Result<bool, StoreError>;
    async fn find_tracked_cid_by_hash(&self, cid_hash: &str) -> Result<Option<TrackedCid>, StoreError>;
    /// Insert-or-ignore on `(cid, pinner_address)`. Returns `true` if inserted.
    async fn add_tracked_pin(&self, pin: &TrackedPin) -> Result<bool, StoreError>;
    async fn get_tracked_pin(&self, cid: &str, pinner: &str) -> Result<Option<TrackedPin>, StoreError>;
    async fn get_tracked_pins(
        &self,
        status_filter: Option<TrackedPinStatus>,
    ) -> Result<Vec<TrackedPin>, StoreError>;
    /// Rows eligible for a scheduler cycle: status in {tracking, verified,
    /// suspect}, past `cooldown_after_flag` since any prior flag, ordered by
    /// `(-consecutive_failures, last_checked_at ASC)`.
    async fn get_due_tracked_pins(
        &self,
        now: DateTime<Utc>,
        cooldown_after_flag_secs: i64,
    ) -> Result<Vec<TrackedPin>, StoreError>;
    /// Marks every tracked pin for `cid` as `slot_freed`. Returns rows affected.
    async fn mark_slot_freed_for_cid(&self, cid: &str) -> Result<u64, StoreError>;

    /// Atomically records a verification-log row and applies its effect to the
    /// tracked pin (invariant: consecutive_failures reset happens with the same
    /// write as the status change).
    async fn record_verification_result(
        &self,
        cid: &str,
        pinner: &str,
        outcome: VerificationOutcome,
        checked_at: DateTime<Utc>,
    ) -> Result<TrackedPin, StoreError>;
    async fn append_cycle(&self, cycle: VerificationCycle) -> Result<(), StoreError>;

    // -- Hunter: flags --
    /// Atomically writes a `FlagRecord` and marks the tracked pin `flag_submitted`.
    async fn mark_flagged(
        &self,
        cid: &str,
        pinner: &str,
        record: FlagRecord,
    ) -> Result<(), StoreError>;
    async fn has_already_flagged(&self, pinner: &str) -> Result<bool, StoreError>;
    async fn get_flag_history(&self) -> Result<Vec<FlagRecord>, StoreError>;

    // -- Hunter: pinner registry cache --
    async fn pinner_cache_get(&self, address: &str) -> Result<Option<PinnerInfo>, StoreError>;
    async fn pinner_cache_set(&self, info: &PinnerInfo) -> Result<(), StoreError>;

    // -- Earnings --
    async fn get_earnings(&self, since: Option<DateTime<Utc>>) -> Result<Earnings, StoreError>;
}
