//! Routes an accepted offer either inline (AUTO) or into the approval queue
//! (APPROVE), and owns the durable mode switch (SPEC_FULL.md §4.6).

use crate::error::{FatalError, StoreError};
use crate::pipeline::Pipeline;
use crate::store::StateStore;
use crate::types::{Mode, Offer, OfferStatus};
use std::sync::Arc;

pub struct ModeController {
    store: Arc<dyn StateStore>,
    pipeline: Arc<Pipeline>,
}

impl ModeController {
    pub fn new(store: Arc<dyn StateStore>, pipeline: Arc<Pipeline>) -> Self {
        ModeController { store, pipeline }
    }

    pub async fn get_mode(&self) -> Result<Mode, StoreError> {
        Ok(self.store.get_daemon_config().await?.mode)
    }

    /// Durable. Switching APPROVE -> AUTO does not auto-execute offers
    /// already sitting in the approval queue (SPEC_FULL.md §9).
    pub async fn set_mode(&self, mode: Mode) -> Result<(), StoreError> {
        self.store
            .set_daemon_config(crate::types::DaemonConfigUpdate { mode: Some(mode), ..Default::default() })
            .await?;
        Ok(())
    }

    /// Called once per accepted PIN offer. In AUTO, runs execute-and-claim
    /// inline; in APPROVE, parks the offer in `awaiting_approval`.
    pub async fn handle_accepted_offer(&self, offer: &Offer, max_content_size: i64) -> Result<(), FatalError> {
        match self.get_mode().await {
            Ok(Mode::Auto) => self.pipeline.execute_and_claim(offer, max_content_size).await,
            Ok(Mode::Approve) => {
                if let Err(e) = self.store.update_offer_status(offer.slot_id, OfferStatus::AwaitingApproval, None).await {
                    log::error!(target: "mode", "failed to queue slot {} for approval: {e}", offer.slot_id);
                }
                Ok(())
            }
            Err(e) => {
                log::error!(target: "mode", "failed to read daemon config: {e}");
                Ok(())
            }
        }
    }
}
