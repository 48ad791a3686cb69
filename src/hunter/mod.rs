//! The audit subsystem: tracks other pinners' claims on our own publications,
//! verifies their possession, and flags those who fail (SPEC_FULL.md §4.8).
//! Constructed after the store, held by value by the supervisor — no
//! back-pointer to the daemon (SPEC_FULL.md §9).

pub mod flag;
pub mod registry_cache;
pub mod scheduler;
pub mod verifier;

pub use flag::{DefaultFlagSubmitter, FlagOutcome, FlagSubmitter};
pub use registry_cache::PinnerRegistryCache;
pub use scheduler::HunterScheduler;
pub use verifier::{DefaultVerifier, PinVerifier, VerificationResult};

use crate::store::StateStore;
use crate::types::{cid_hash_hex, PinEvent, PinnedEvent, TrackedCid, TrackedPin, TrackedPinStatus, UnpinEvent};
use chrono::Utc;
use std::sync::Arc;

pub struct Hunter {
    store: Arc<dyn StateStore>,
    registry_cache: Arc<PinnerRegistryCache>,
    operator_address: String,
}

impl Hunter {
    pub fn new(store: Arc<dyn StateStore>, registry_cache: Arc<PinnerRegistryCache>, operator_address: String) -> Self {
        Hunter { store, registry_cache, operator_address }
    }

    /// Starts auditing a cid we published (SPEC_FULL.md §4.8.1).
    pub async fn on_pin_event(&self, event: &PinEvent) {
        if event.publisher != self.operator_address {
            return;
        }
        let tracked = TrackedCid {
            cid: event.cid.clone(),
            cid_hash: cid_hash_hex(&event.cid),
            slot_id: event.slot_id,
            publisher: event.publisher.clone(),
            gateway: Some(event.gateway.clone()),
            pin_qty: event.pin_qty,
        };
        if let Err(e) = self.store.add_tracked_cid(&tracked).await {
            log::error!(target: "hunter", "failed to add tracked cid {}: {e}", event.cid);
        }
    }

    /// Begins tracking a pinner's claim on one of our tracked cids.
    pub async fn on_pinned_event(&self, event: &PinnedEvent) {
        if event.pinner == self.operator_address {
            return;
        }
        let tracked_cid = match self.store.find_tracked_cid_by_hash(&event.cid_hash).await {
            Ok(Some(cid)) => cid,
            Ok(None) => return,
            Err(e) => {
                log::error!(target: "hunter", "failed to look up tracked cid by hash {}: {e}", event.cid_hash);
                return;
            }
        };

        let pinner_info = match self.registry_cache.get_pinner_info(&event.pinner).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                log::warn!(target: "hunter", "pinner {} claimed a slot but isn't registered on-chain", event.pinner);
                return;
            }
            Err(e) => {
                log::error!(target: "hunter", "failed to look up pinner {}: {e}", event.pinner);
                return;
            }
        };

        let tracked_pin = TrackedPin {
            cid: tracked_cid.cid.clone(),
            pinner_address: event.pinner.clone(),
            pinner_node_id: pinner_info.node_id,
            pinner_multiaddr: pinner_info.multiaddr,
            slot_id: event.slot_id,
            claimed_at: Utc::now(),
            last_verified_at: None,
            last_checked_at: None,
            consecutive_failures: 0,
            total_checks: 0,
            total_failures: 0,
            status: TrackedPinStatus::Tracking,
            flagged_at: None,
            flag_tx_hash: None,
        };
        if let Err(e) = self.store.add_tracked_pin(&tracked_pin).await {
            log::error!(target: "hunter", "failed to add tracked pin {}/{}: {e}", tracked_cid.cid, event.pinner);
        }
    }

    /// Releases every tracked pin for a cid that was withdrawn or unpinned.
    pub async fn on_unpin_event(&self, event: &UnpinEvent) {
        let tracked_cid = match self.store.find_tracked_cid_by_hash(&event.cid_hash).await {
            Ok(Some(cid)) => cid,
            Ok(None) => return,
            Err(e) => {
                log::error!(target: "hunter", "failed to look up tracked cid by hash {}: {e}", event.cid_hash);
                return;
            }
        };
        if let Err(e) = self.store.mark_slot_freed_for_cid(&tracked_cid.cid).await {
            log::error!(target: "hunter", "failed to free tracked pins for {}: {e}", tracked_cid.cid);
        }
    }
}
