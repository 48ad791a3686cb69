//! The execute-and-claim routine shared by the mode controller's AUTO path,
//! the daemon loop's approved-offer intake, and startup crash recovery
//! (SPEC_FULL.md §4.6, §4.7).

use crate::claim_submitter::{ClaimOutcome, ClaimSubmitter};
use crate::error::{FatalError, StoreError};
use crate::executor::PinExecutor;
use crate::store::StateStore;
use crate::types::{ActivityEntry, ActivityEventType, Claim, Offer, OfferStatus};
use chrono::Utc;
use std::sync::Arc;

pub struct Pipeline {
    pub store: Arc<dyn StateStore>,
    pub executor: Arc<dyn PinExecutor>,
    pub claim_submitter: Arc<dyn ClaimSubmitter>,
    pub operator_address: String,
}

impl Pipeline {
    /// Runs pin-then-claim for `offer`, driving every status transition
    /// through the store. Returns `Err(FatalError::NotPinner)` when the
    /// operator identity needs to stop processing entirely.
    pub async fn execute_and_claim(&self, offer: &Offer, max_content_size: i64) -> Result<(), FatalError> {
        if matches!(offer.status, OfferStatus::Pending | OfferStatus::Approved) {
            self.transition(offer.slot_id, OfferStatus::Pinning, None).await;
            self.log(ActivityEventType::PinStarted, Some(offer.slot_id), Some(&offer.cid), None, "pin started").await;
            self.run_pin(offer, max_content_size).await?;
        } else if offer.status == OfferStatus::Pinning {
            self.run_pin(offer, max_content_size).await?;
        }

        let offer = match self.store.get_offer(offer.slot_id).await {
            Ok(Some(o)) => o,
            _ => return Ok(()),
        };

        if matches!(offer.status, OfferStatus::Pinned | OfferStatus::Claiming) {
            self.run_claim(&offer).await?;
        }

        Ok(())
    }

    async fn run_pin(&self, offer: &Offer, max_content_size: i64) -> Result<(), FatalError> {
        let _ = max_content_size;
        let result = self.executor.pin(&offer.cid, &offer.gateway, i64::MAX as u64).await;

        if result.success {
            let _ = self.store.save_pin(&offer.cid, Some(offer.slot_id), result.bytes_pinned).await;
            self.transition(offer.slot_id, OfferStatus::Pinned, None).await;
            self.log(
                ActivityEventType::PinSuccess,
                Some(offer.slot_id),
                Some(&offer.cid),
                Some(result.bytes_pinned),
                "pin succeeded",
            )
            .await;
            self.transition(offer.slot_id, OfferStatus::Claiming, None).await;
        } else {
            self.transition(offer.slot_id, OfferStatus::PinFailed, None).await;
            let message = result.error.unwrap_or_else(|| "unknown pin failure".into());
            self.log(ActivityEventType::PinFailed, Some(offer.slot_id), Some(&offer.cid), None, &message).await;
        }
        Ok(())
    }

    async fn run_claim(&self, offer: &Offer) -> Result<(), FatalError> {
        if offer.status == OfferStatus::Pinned {
            self.transition(offer.slot_id, OfferStatus::Claiming, None).await;
        }

        self.log(ActivityEventType::ClaimSubmitted, Some(offer.slot_id), Some(&offer.cid), None, "claim submitted").await;
        let result = self.claim_submitter.submit_claim(&self.operator_address, offer.slot_id).await;

        match result.outcome {
            ClaimOutcome::Success { amount_earned, tx_hash } => {
                let claim = Claim {
                    slot_id: offer.slot_id,
                    cid: offer.cid.clone(),
                    amount_earned,
                    tx_hash: tx_hash.clone(),
                    claimed_at: Utc::now(),
                };
                match self.store.save_claim(&claim).await {
                    Ok(()) | Err(StoreError::DuplicateClaim(_)) => {}
                    Err(e) => log::error!(target: "pipeline", "failed to persist claim for slot {}: {e}", offer.slot_id),
                }
                self.transition(offer.slot_id, OfferStatus::Claimed, None).await;
                self.log(
                    ActivityEventType::ClaimSuccess,
                    Some(offer.slot_id),
                    Some(&offer.cid),
                    Some(amount_earned),
                    &format!("claimed {amount_earned} (tx {tx_hash})"),
                )
                .await;
            }
            ClaimOutcome::AlreadyClaimed => {
                self.transition(offer.slot_id, OfferStatus::ClaimFailed, None).await;
                self.log(ActivityEventType::ClaimFailed, Some(offer.slot_id), Some(&offer.cid), None, "slot already claimed")
                    .await;
            }
            ClaimOutcome::SlotNoLongerActive => {
                self.transition(offer.slot_id, OfferStatus::Expired, None).await;
                self.log(ActivityEventType::ClaimFailed, Some(offer.slot_id), Some(&offer.cid), None, "slot no longer active")
                    .await;
            }
            ClaimOutcome::NotPinner => {
                self.log(
                    ActivityEventType::Error,
                    Some(offer.slot_id),
                    Some(&offer.cid),
                    None,
                    "operator identity is not a registered pinner",
                )
                .await;
                return Err(FatalError::NotPinner);
            }
            ClaimOutcome::Transient(message) => {
                self.log(ActivityEventType::ClaimFailed, Some(offer.slot_id), Some(&offer.cid), None, &message).await;
            }
        }
        Ok(())
    }

    async fn transition(&self, slot_id: u64, status: OfferStatus, reject_reason: Option<crate::types::RejectReason>) {
        if let Err(e) = self.store.update_offer_status(slot_id, status, reject_reason).await {
            log::error!(target: "pipeline", "illegal transition for slot {slot_id} -> {status}: {e}");
        }
    }

    async fn log(
        &self,
        event_type: ActivityEventType,
        slot_id: Option<u64>,
        cid: Option<&str>,
        amount: Option<i64>,
        message: &str,
    ) {
        let entry = ActivityEntry {
            event_type,
            slot_id,
            cid: cid.map(String::from),
            amount,
            message: message.to_string(),
            created_at: Utc::now(),
        };
        let _ = self.store.log_activity(entry).await;
    }
}
