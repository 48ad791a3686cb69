use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A cid the operator published and wants other pinners' claims on it audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCid {
    pub cid: String,
    pub cid_hash: String,
    pub slot_id: u64,
    pub publisher: String,
    pub gateway: Option<String>,
    pub pin_qty: u32,
}

/// Lifecycle status of one tracked `(cid, pinner)` pair (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedPinStatus {
    Tracking,
    Verified,
    Suspect,
    FlagSubmitted,
    SlotFreed,
}

impl fmt::Display for TrackedPinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackedPinStatus::Tracking => "tracking",
            TrackedPinStatus::Verified => "verified",
            TrackedPinStatus::Suspect => "suspect",
            TrackedPinStatus::FlagSubmitted => "flag_submitted",
            TrackedPinStatus::SlotFreed => "slot_freed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TrackedPinStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "tracking" => TrackedPinStatus::Tracking,
            "verified" => TrackedPinStatus::Verified,
            "suspect" => TrackedPinStatus::Suspect,
            "flag_submitted" => TrackedPinStatus::FlagSubmitted,
            "slot_freed" => TrackedPinStatus::SlotFreed,
            _ => return Err("unrecognised tracked pin status"),
        })
    }
}

/// A `(cid, pinner_address)` pair under audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPin {
    pub cid: String,
    pub pinner_address: String,
    pub pinner_node_id: String,
    pub pinner_multiaddr: String,
    pub slot_id: u64,
    pub claimed_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_checks: u32,
    pub total_failures: u32,
    pub status: TrackedPinStatus,
    pub flagged_at: Option<DateTime<Utc>>,
    pub flag_tx_hash: Option<String>,
}

/// The outcome of a single verification method attempt within a `verify()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodOutcome {
    Pass,
    Fail,
    /// Network error: counts as neither pass nor fail.
    Error,
}

/// Which verification tier was run (SPEC_FULL.md §4.8.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    DhtProvider,
    Bitswap,
    Retrieval,
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerificationMethod::DhtProvider => "dht_provider",
            VerificationMethod::Bitswap => "bitswap",
            VerificationMethod::Retrieval => "retrieval",
        };
        write!(f, "{}", s)
    }
}

/// One append-only verification-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationLogEntry {
    pub cid: String,
    pub pinner: String,
    /// `None` when every attempted method errored (neither pass nor fail).
    pub passed: Option<bool>,
    pub method_used: Option<VerificationMethod>,
    pub methods_attempted: Vec<(VerificationMethod, MethodOutcome)>,
    pub duration_ms: u64,
    pub checked_at: DateTime<Utc>,
}

/// Append-only summary of one scheduler cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCycle {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_checked: u32,
    pub passed: u32,
    pub failed: u32,
    pub flagged: u32,
    pub skipped: u32,
    pub errors: u32,
    pub duration_ms: u64,
}

/// Append-only record of a successful flag submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub pinner_address: String,
    pub tx_hash: String,
    pub flag_count_after: Option<u32>,
    pub bounty_earned: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

/// A cached view of an on-chain pinner registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnerInfo {
    pub address: String,
    pub node_id: String,
    pub multiaddr: String,
    pub active: bool,
    pub cached_at: DateTime<Utc>,
}
