//! Pinner-registry cache: lazy, read-time TTL eviction over the store's
//! `pinner_cache` table (SPEC_FULL.md §4.8.5).

use crate::error::LedgerError;
use crate::ledger::LedgerClient;
use crate::store::StateStore;
use crate::types::PinnerInfo;
use chrono::Utc;
use std::sync::Arc;

pub struct PinnerRegistryCache {
    store: Arc<dyn StateStore>,
    ledger: Arc<dyn LedgerClient>,
    ttl_secs: i64,
}

impl PinnerRegistryCache {
    pub fn new(store: Arc<dyn StateStore>, ledger: Arc<dyn LedgerClient>, ttl_secs: i64) -> Self {
        PinnerRegistryCache { store, ledger, ttl_secs }
    }

    pub async fn get_pinner_info(&self, address: &str) -> Result<Option<PinnerInfo>, LedgerError> {
        if let Ok(Some(cached)) = self.store.pinner_cache_get(address).await {
            let age = Utc::now().signed_duration_since(cached.cached_at).num_seconds();
            if age < self.ttl_secs {
                return Ok(Some(cached));
            }
        }

        let fresh = self.ledger.get_pinner(address).await?;
        if let Some(ref info) = fresh {
            if let Err(e) = self.store.pinner_cache_set(info).await {
                log::warn!(target: "hunter::registry_cache", "failed to cache pinner {address}: {e}");
            }
        }
        Ok(fresh)
    }
}
