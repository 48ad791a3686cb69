use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of user-visible incidents recorded on the activity feed. Never
/// authoritative — the offer/claim/pin tables are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEventType {
    OfferSeen,
    OfferAccepted,
    OfferRejected,
    PinStarted,
    PinSuccess,
    PinFailed,
    ClaimSubmitted,
    ClaimSuccess,
    ClaimFailed,
    HunterCycle,
    HunterFlag,
    Error,
}

impl fmt::Display for ActivityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityEventType::OfferSeen => "offer_seen",
            ActivityEventType::OfferAccepted => "offer_accepted",
            ActivityEventType::OfferRejected => "offer_rejected",
            ActivityEventType::PinStarted => "pin_started",
            ActivityEventType::PinSuccess => "pin_success",
            ActivityEventType::PinFailed => "pin_failed",
            ActivityEventType::ClaimSubmitted => "claim_submitted",
            ActivityEventType::ClaimSuccess => "claim_success",
            ActivityEventType::ClaimFailed => "claim_failed",
            ActivityEventType::HunterCycle => "hunter_cycle",
            ActivityEventType::HunterFlag => "hunter_flag",
            ActivityEventType::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One append-only row on the operator-facing activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub event_type: ActivityEventType,
    pub slot_id: Option<u64>,
    pub cid: Option<String>,
    pub amount: Option<i64>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
