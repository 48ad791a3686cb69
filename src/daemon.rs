//! The supervisory loop: drains the poller, routes events, runs approved
//! offers, expires stale approval-queue entries, and performs crash recovery
//! on startup (SPEC_FULL.md §4.7).

use crate::error::FatalError;
use crate::filter::OfferFilter;
use crate::hunter::Hunter;
use crate::mode::ModeController;
use crate::pipeline::Pipeline;
use crate::poller::EventPoller;
use crate::store::StateStore;
use crate::types::{ActivityEntry, ActivityEventType, LedgerEvent, OfferStatus};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Daemon {
    store: Arc<dyn StateStore>,
    poller: Arc<dyn EventPoller>,
    filter: Arc<dyn OfferFilter>,
    mode_controller: Arc<ModeController>,
    pipeline: Arc<Pipeline>,
    hunter: Hunter,
    operator_address: String,
    poll_interval: Duration,
    unpin_on_unpin_event: bool,
    storage_node: Arc<dyn crate::storage_node::StorageNode>,
}

impl Daemon {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn StateStore>,
        poller: Arc<dyn EventPoller>,
        filter: Arc<dyn OfferFilter>,
        mode_controller: Arc<ModeController>,
        pipeline: Arc<Pipeline>,
        hunter: Hunter,
        operator_address: String,
        poll_interval: Duration,
        unpin_on_unpin_event: bool,
        storage_node: Arc<dyn crate::storage_node::StorageNode>,
    ) -> Self {
        Daemon {
            store,
            poller,
            filter,
            mode_controller,
            pipeline,
            hunter,
            operator_address,
            poll_interval,
            unpin_on_unpin_event,
            storage_node,
        }
    }

    /// Runs crash recovery once, then loops until `cancel` fires, sleeping
    /// `poll_interval` between iterations. Exits after the current offer
    /// completes or reaches a safe persisted state (SPEC_FULL.md §5).
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), FatalError> {
        self.recover_on_startup().await?;

        loop {
            self.run_iteration().await?;

            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!(target: "daemon", "shutdown signal received, exiting after this iteration");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn run_iteration(&self) -> Result<(), FatalError> {
        let cursor = self.store.get_cursor().await.unwrap_or(0);
        let events = match self.poller.poll().await {
            Ok(events) => events,
            Err(e) => {
                log::warn!(target: "daemon", "event poll exhausted its retry budget, will retry next iteration: {e}");
                return Ok(());
            }
        };

        let mut max_sequence = cursor;
        for event in &events {
            self.dispatch_event(event).await?;
            max_sequence = max_sequence.max(event.ledger_sequence());
        }
        if max_sequence > cursor {
            if let Err(e) = self.store.set_cursor(max_sequence).await {
                log::error!(target: "daemon", "failed to advance cursor to {max_sequence}: {e}");
            }
        }

        let config = self.store.get_daemon_config().await.unwrap_or_default();
        let approved = self.store.get_offers_by_status(OfferStatus::Approved).await.unwrap_or_default();
        for offer in approved {
            self.pipeline.execute_and_claim(&offer, config.max_content_size).await?;
        }

        self.expire_stale_approval_queue().await;

        Ok(())
    }

    async fn dispatch_event(&self, event: &LedgerEvent) -> Result<(), FatalError> {
        match event {
            LedgerEvent::Pin(pin_event) => {
                let inserted = self.store.save_offer(pin_event, OfferStatus::Pending).await.unwrap_or(false);
                if inserted {
                    self.log(ActivityEventType::OfferSeen, Some(pin_event.slot_id), Some(&pin_event.cid), None, "offer seen").await;
                }
                self.hunter.on_pin_event(pin_event).await;

                if let Ok(Some(offer)) = self.store.get_offer(pin_event.slot_id).await {
                    if offer.status != OfferStatus::Pending {
                        return Ok(());
                    }
                    let config = self.store.get_daemon_config().await.unwrap_or_default();
                    let verdict = self.filter.evaluate(pin_event, &config).await;
                    if verdict.accepted {
                        self.log(ActivityEventType::OfferAccepted, Some(offer.slot_id), Some(&offer.cid), None, "offer accepted").await;
                        self.mode_controller.handle_accepted_offer(&offer, config.max_content_size).await?;
                    } else {
                        let reason = verdict.reason.unwrap();
                        let _ = self.store.update_offer_status(offer.slot_id, OfferStatus::Rejected, Some(reason)).await;
                        self.log(
                            ActivityEventType::OfferRejected,
                            Some(offer.slot_id),
                            Some(&offer.cid),
                            None,
                            &format!("rejected: {reason}"),
                        )
                        .await;
                    }
                }
            }
            LedgerEvent::Pinned(pinned_event) => {
                if pinned_event.pinner == self.operator_address && pinned_event.pins_remaining == 0 {
                    let _ = self.store.update_offer_status(pinned_event.slot_id, OfferStatus::Filled, None).await;
                } else {
                    let _ = self.store.update_offer_pins_remaining(pinned_event.slot_id, pinned_event.pins_remaining).await;
                }
                self.hunter.on_pinned_event(pinned_event).await;
            }
            LedgerEvent::Unpin(unpin_event) => {
                let _ = self.store.update_offer_status(unpin_event.slot_id, OfferStatus::Expired, None).await;
                self.hunter.on_unpin_event(unpin_event).await;

                if self.unpin_on_unpin_event {
                    if let Ok(Some(offer)) = self.store.get_offer(unpin_event.slot_id).await {
                        self.storage_node.pin_rm(&offer.cid).await.ok();
                    }
                }
            }
        }
        Ok(())
    }

    async fn expire_stale_approval_queue(&self) {
        let queue = self.store.get_approval_queue().await.unwrap_or_default();
        let now = Utc::now();
        for offer in queue {
            if let Some(expiry) = offer.estimated_expiry {
                if expiry <= now {
                    let _ = self.store.update_offer_status(offer.slot_id, OfferStatus::Expired, None).await;
                    self.log(ActivityEventType::Error, Some(offer.slot_id), Some(&offer.cid), None, "approval-queue entry expired").await;
                }
            }
        }
    }

    /// By status: `pinning` re-runs the executor; `pinned` with no `Claim`
    /// row runs the claim submitter; `claiming` re-runs it (idempotent via
    /// error mapping). `awaiting_approval`/`approved` and terminal statuses
    /// need no action (SPEC_FULL.md §4.7).
    async fn recover_on_startup(&self) -> Result<(), FatalError> {
        for status in [OfferStatus::Pinning, OfferStatus::Pinned, OfferStatus::Claiming] {
            let offers = self.store.get_offers_by_status(status).await.unwrap_or_default();
            for offer in offers {
                log::info!(target: "daemon", "crash recovery: re-running pipeline for slot {} ({status})", offer.slot_id);
                self.pipeline.execute_and_claim(&offer, i64::MAX).await?;
            }
        }
        Ok(())
    }

    async fn log(&self, event_type: ActivityEventType, slot_id: Option<u64>, cid: Option<&str>, amount: Option<i64>, message: &str) {
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
