//! Offer policy evaluation (SPEC_FULL.md §4.3): seven ordered rejection
//! checks, first failure wins. All amounts are integer base units; no
//! floating-point arithmetic anywhere in the accept/reject decision.

use crate::gateway::PublisherGateway;
use crate::ledger::LedgerClient;
use crate::store::StateStore;
use crate::types::{DaemonConfig, PinEvent, RejectReason};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub wallet_balance: i64,
    pub estimated_tx_fee: i64,
    pub net_profit: i64,
}

#[async_trait]
pub trait OfferFilter: Send + Sync {
    async fn evaluate(&self, event: &PinEvent, config: &DaemonConfig) -> FilterResult;
}

#[derive(Clone, Copy)]
struct CachedSlot {
    pins_remaining: u32,
    expired: bool,
    fetched_at: Instant,
}

/// Bounded TTL cache avoiding one `is_slot_expired` round-trip per offer
/// within a single poll batch (SPEC_FULL.md §1b, §3 `[ADD] SlotLivenessCache`).
/// Never consulted by the approve-flow re-check, which always re-queries.
pub struct SlotLivenessCache {
    entries: Mutex<HashMap<u64, CachedSlot>>,
    ttl: Duration,
    capacity: usize,
}

impl SlotLivenessCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        SlotLivenessCache { entries: Mutex::new(HashMap::new()), ttl, capacity }
    }

    async fn get(&self, slot_id: u64) -> Option<(u32, bool)> {
        let mut entries = self.entries.lock().await;
        match entries.get(&slot_id) {
            Some(cached) if cached.fetched_at.elapsed() < self.ttl => {
                Some((cached.pins_remaining, cached.expired))
            }
            Some(_) => {
                entries.remove(&slot_id);
                None
            }
            None => None,
        }
    }

    async fn put(&self, slot_id: u64, pins_remaining: u32, expired: bool) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity && !entries.contains_key(&slot_id) {
            if let Some(oldest) = entries.iter().min_by_key(|(_, v)| v.fetched_at).map(|(k, _)| *k) {
                entries.remove(&oldest);
            }
        }
        entries.insert(slot_id, CachedSlot { pins_remaining, expired, fetched_at: Instant::now() });
    }
}

pub struct DefaultFilter {
    store: Arc<dyn StateStore>,
    ledger: Arc<dyn LedgerClient>,
    gateway: Arc<dyn PublisherGateway>,
    liveness_cache: SlotLivenessCache,
    safety_factor: i64,
    fallback_tx_fee: i64,
    operator_address: String,
}

impl DefaultFilter {
    pub fn new(
        store: Arc<dyn StateStore>,
        ledger: Arc<dyn LedgerClient>,
        gateway: Arc<dyn PublisherGateway>,
        safety_factor: i64,
        fallback_tx_fee: i64,
        operator_address: String,
    ) -> Self {
        DefaultFilter {
            store,
            ledger,
            gateway,
            liveness_cache: SlotLivenessCache::new(Duration::from_secs(30), 4096),
            safety_factor,
            fallback_tx_fee,
            operator_address,
        }
    }

    async fn slot_liveness(&self, slot_id: u64) -> (u32, bool) {
        if let Some(cached) = self.liveness_cache.get(slot_id).await {
            return cached;
        }
        match self.ledger.get_slot(slot_id).await {
            Ok(slot) => {
                self.liveness_cache.put(slot_id, slot.pins_remaining, slot.expired).await;
                (slot.pins_remaining, slot.expired)
            }
            Err(e) => {
                log::warn!(target: "filter", "get_slot({slot_id}) failed, treating as inactive: {e}");
                (0, true)
            }
        }
    }

    fn reject(reason: RejectReason, wallet_balance: i64, estimated_tx_fee: i64, net_profit: i64) -> FilterResult {
        FilterResult { accepted: false, reason: Some(reason), wallet_balance, estimated_tx_fee, net_profit }
    }
}

#[async_trait]
impl OfferFilter for DefaultFilter {
    async fn evaluate(&self, event: &PinEvent, config: &DaemonConfig) -> FilterResult {
        use RejectReason::*;

        if let Ok(Some(offer)) = self.store.get_offer(event.slot_id).await {
            if matches!(
                offer.status,
                crate::types::OfferStatus::Claimed | crate::types::OfferStatus::Filled
            ) {
                return Self::reject(AlreadySeenClaimed, 0, 0, 0);
            }
        }

        if self.store.is_cid_pinned(&event.cid).await.unwrap_or(false) {
            return Self::reject(CidAlreadyPinned, 0, 0, 0);
        }

        if event.offer_price < config.min_price {
            return Self::reject(PriceTooLow, 0, 0, 0);
        }

        let (pins_remaining, expired) = self.slot_liveness(event.slot_id).await;
        if expired || pins_remaining == 0 {
            return Self::reject(SlotNotActive, 0, 0, 0);
        }

        if let Ok(Some(len)) = self.gateway.content_length(&event.gateway, &event.cid).await {
            if len as i64 > config.max_content_size {
                return Self::reject(ContentTooLarge, 0, 0, 0);
            }
        }

        let wallet_balance = self.ledger.get_balance(&self.operator_address).await.unwrap_or(0);
        let estimated_tx_fee = self
            .ledger
            .simulate_fee("collect_pin")
            .await
            .unwrap_or(self.fallback_tx_fee);

        if wallet_balance < estimated_tx_fee * self.safety_factor {
            return Self::reject(InsufficientXlm, wallet_balance, estimated_tx_fee, 0);
        }

        let net_profit = event.offer_price - estimated_tx_fee;
        if net_profit <= 0 {
            return Self::reject(Unprofitable, wallet_balance, estimated_tx_fee, net_profit);
        }

        FilterResult { accepted: true, reason: None, wallet_balance, estimated_tx_fee, net_profit }
    }
}
