//! Flag submission with duplicate-flag suppression (SPEC_FULL.md §4.8.4).

use crate::error::{ContractError, LedgerError};
use crate::ledger::LedgerClient;
use crate::store::StateStore;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagOutcome {
    Submitted { tx_hash: String, flag_count_after: Option<u32>, bounty_earned: Option<i64> },
    /// Non-error: the pinner was already flagged, locally or by the contract.
    AlreadyFlagged,
    Transient(String),
}

#[async_trait]
pub trait FlagSubmitter: Send + Sync {
    async fn submit_flag(&self, pinner_address: &str) -> FlagOutcome;
}

pub struct DefaultFlagSubmitter {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn StateStore>,
    operator_address: String,
}

impl DefaultFlagSubmitter {
    pub fn new(ledger: Arc<dyn LedgerClient>, store: Arc<dyn StateStore>, operator_address: String) -> Self {
        DefaultFlagSubmitter { ledger, store, operator_address }
    }
}

#[async_trait]
impl FlagSubmitter for DefaultFlagSubmitter {
    async fn submit_flag(&self, pinner_address: &str) -> FlagOutcome {
        match self.store.has_already_flagged(pinner_address).await {
            Ok(true) => return FlagOutcome::AlreadyFlagged,
            Ok(false) => {}
            Err(e) => {
                log::warn!(target: "hunter::flag", "has_already_flagged({pinner_address}) failed: {e}");
            }
        }

        match self.ledger.flag_pinner(&self.operator_address, pinner_address).await {
            Ok(result) => FlagOutcome::Submitted {
                tx_hash: result.tx_hash,
                flag_count_after: result.flag_count_after,
                bounty_earned: result.bounty_earned,
            },
            Err(LedgerError::Contract(ContractError::AlreadyFlagged)) => FlagOutcome::AlreadyFlagged,
            Err(e) => FlagOutcome::Transient(e.to_string()),
        }
    }
}
