use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single offer's position in the lifecycle state machine (see SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    AwaitingApproval,
    Approved,
    Rejected,
    Pinning,
    Pinned,
    Claiming,
    Claimed,
    PinFailed,
    ClaimFailed,
    Expired,
    Filled,
}

impl OfferStatus {
    /// Terminal statuses can never be left; §3 invariant (a).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OfferStatus::Rejected
                | OfferStatus::Claimed
                | OfferStatus::PinFailed
                | OfferStatus::Expired
                | OfferStatus::Filled
        )
    }

    /// Whether `self -> next` is a legal edge of the state machine in SPEC_FULL.md §3.
    /// `ClaimFailed` is "terminal for this attempt" but retryable on restart, so it is
    /// not in `is_terminal` and may still transition to `Claiming` again.
    pub fn can_transition(self, next: OfferStatus) -> bool {
        use OfferStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Pending, Rejected) => true,
            (Pending, AwaitingApproval) => true,
            (AwaitingApproval, Approved) => true,
            (AwaitingApproval, Rejected) => true,
            (Pending, Pinning) => true,
            (Approved, Pinning) => true,
            (Pinning, Pinned) => true,
            (Pinning, PinFailed) => true,
            (Pinned, Claiming) => true,
            (Claiming, Claimed) => true,
            (Claiming, ClaimFailed) => true,
            (ClaimFailed, Claiming) => true,
            (Pinned, Filled) => true,
            (Claimed, Filled) => true,
            (_, Expired) => !matches!(self, Claimed | Filled),
            _ => false,
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OfferStatus::Pending => "pending",
            OfferStatus::AwaitingApproval => "awaiting_approval",
            OfferStatus::Approved => "approved",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Pinning => "pinning",
            OfferStatus::Pinned => "pinned",
            OfferStatus::Claiming => "claiming",
            OfferStatus::Claimed => "claimed",
            OfferStatus::PinFailed => "pin_failed",
            OfferStatus::ClaimFailed => "claim_failed",
            OfferStatus::Expired => "expired",
            OfferStatus::Filled => "filled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for OfferStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => OfferStatus::Pending,
            "awaiting_approval" => OfferStatus::AwaitingApproval,
            "approved" => OfferStatus::Approved,
            "rejected" => OfferStatus::Rejected,
            "pinning" => OfferStatus::Pinning,
            "pinned" => OfferStatus::Pinned,
            "claiming" => OfferStatus::Claiming,
            "claimed" => OfferStatus::Claimed,
            "pin_failed" => OfferStatus::PinFailed,
            "claim_failed" => OfferStatus::ClaimFailed,
            "expired" => OfferStatus::Expired,
            "filled" => OfferStatus::Filled,
            _ => return Err("unrecognised offer status"),
        })
    }
}

/// Exhaustive rejection reasons, checked in this order by the filter (first wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadySeenClaimed,
    CidAlreadyPinned,
    PriceTooLow,
    SlotNotActive,
    ContentTooLarge,
    InsufficientXlm,
    Unprofitable,
    OperatorRejected,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::AlreadySeenClaimed => "already_seen_claimed",
            RejectReason::CidAlreadyPinned => "cid_already_pinned",
            RejectReason::PriceTooLow => "price_too_low",
            RejectReason::SlotNotActive => "slot_not_active",
            RejectReason::ContentTooLarge => "content_too_large",
            RejectReason::InsufficientXlm => "insufficient_xlm",
            RejectReason::Unprofitable => "unprofitable",
            RejectReason::OperatorRejected => "operator_rejected",
        };
        write!(f, "{}", s)
    }
}

/// A pin offer, keyed by `slot_id`, unique for the life of the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub slot_id: u64,
    pub cid: String,
    /// Display only; never affects the content id.
    pub filename: String,
    pub gateway: String,
    pub offer_price: i64,
    pub pin_qty: u32,
    pub pins_remaining: u32,
    pub publisher: String,
    pub ledger_sequence_seen: u64,
    pub status: OfferStatus,
    pub reject_reason: Option<RejectReason>,
    pub net_profit: Option<i64>,
    pub estimated_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_never_transition() {
        for terminal in [
            OfferStatus::Rejected,
            OfferStatus::Claimed,
            OfferStatus::PinFailed,
            OfferStatus::Expired,
            OfferStatus::Filled,
        ] {
            for next in [
                OfferStatus::Pending,
                OfferStatus::Pinning,
                OfferStatus::Claimed,
                OfferStatus::Expired,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }

    #[test]
    fn happy_path_sequence_is_legal() {
        let mut s = OfferStatus::Pending;
        for next in [
            OfferStatus::Pinning,
            OfferStatus::Pinned,
            OfferStatus::Claiming,
            OfferStatus::Claimed,
        ] {
            assert!(s.can_transition(next), "{:?} -> {:?}", s, next);
            s = next;
        }
    }

    #[test]
    fn approval_path_is_legal() {
        assert!(OfferStatus::Pending.can_transition(OfferStatus::AwaitingApproval));
        assert!(OfferStatus::AwaitingApproval.can_transition(OfferStatus::Approved));
        assert!(OfferStatus::AwaitingApproval.can_transition(OfferStatus::Rejected));
        assert!(!OfferStatus::Approved.can_transition(OfferStatus::AwaitingApproval));
    }

    #[test]
    fn claim_failed_is_retryable_but_claimed_filled_cannot_expire() {
        assert!(OfferStatus::Claiming.can_transition(OfferStatus::ClaimFailed));
        assert!(OfferStatus::ClaimFailed.can_transition(OfferStatus::Claiming));
        assert!(!OfferStatus::ClaimFailed.is_terminal());
        assert!(!OfferStatus::Claimed.can_transition(OfferStatus::Expired));
        assert!(!OfferStatus::Filled.can_transition(OfferStatus::Expired));
        assert!(OfferStatus::Pinning.can_transition(OfferStatus::Expired));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for status in [
            OfferStatus::Pending,
            OfferStatus::AwaitingApproval,
            OfferStatus::Approved,
            OfferStatus::Rejected,
            OfferStatus::Pinning,
            OfferStatus::Pinned,
            OfferStatus::Claiming,
            OfferStatus::Claimed,
            OfferStatus::PinFailed,
            OfferStatus::ClaimFailed,
            OfferStatus::Expired,
            OfferStatus::Filled,
        ] {
            let s = status.to_string();
            assert_eq!(OfferStatus::from_str(&s).unwrap(), status);
        }
    }
}
