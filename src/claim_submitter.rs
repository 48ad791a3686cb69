//! Builds, simulates, signs and submits the `collect_pin` transaction
//! (SPEC_FULL.md §4.5). Exhaustive error mapping from contract codes to
//! lifecycle outcomes; idempotent on resubmission.

use crate::error::{ContractError, LedgerError};
use crate::ledger::LedgerClient;
use async_trait::async_trait;
use std::sync::Arc;

/// The exhaustive set of outcomes §4.5 maps contract/transport results to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Success { amount_earned: i64, tx_hash: String },
    /// Non-retryable; offer transitions to `claim_failed`.
    AlreadyClaimed,
    /// Non-retryable; offer transitions to `expired`.
    SlotNoLongerActive,
    /// Non-retryable and fatal: the operator identity isn't registered.
    NotPinner,
    /// Network/RPC/simulate transient error; caller retries with backoff.
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimResult {
    pub outcome: ClaimOutcome,
}

#[async_trait]
pub trait ClaimSubmitter: Send + Sync {
    async fn submit_claim(&self, caller: &str, slot_id: u64) -> ClaimResult;
}

pub struct DefaultClaimSubmitter {
    ledger: Arc<dyn LedgerClient>,
}

impl DefaultClaimSubmitter {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        DefaultClaimSubmitter { ledger }
    }
}

#[async_trait]
impl ClaimSubmitter for DefaultClaimSubmitter {
    async fn submit_claim(&self, caller: &str, slot_id: u64) -> ClaimResult {
        let outcome = match self.ledger.collect_pin(caller, slot_id).await {
            Ok(result) => ClaimOutcome::Success { amount_earned: result.amount_earned, tx_hash: result.tx_hash },
            Err(LedgerError::Contract(ContractError::AlreadyClaimed)) => {
                log::warn!(target: "claim_submitter", "slot {slot_id} already claimed");
                ClaimOutcome::AlreadyClaimed
            }
            Err(LedgerError::Contract(ContractError::SlotExpired))
            | Err(LedgerError::Contract(ContractError::SlotNotActive)) => ClaimOutcome::SlotNoLongerActive,
            Err(LedgerError::Contract(ContractError::NotPinner)) => {
                log::error!(target: "claim_submitter", "operator identity is not a registered pinner");
                ClaimOutcome::NotPinner
            }
            Err(e) => ClaimOutcome::Transient(e.to_string()),
        };
        ClaimResult { outcome }
    }
}
