//! Drains new ledger events since the durable cursor, retrying transport
//! errors under a bounded backoff and never advancing the cursor on failure
//! (SPEC_FULL.md §4.2).

use crate::backoff::{bounded, retry_transient};
use crate::error::LedgerError;
use crate::ledger::LedgerClient;
use crate::store::StateStore;
use crate::types::LedgerEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait EventPoller: Send + Sync {
    /// Returns events since the store's current cursor, in ledger order.
    /// Does not advance the cursor; the caller does so only after the batch
    /// has been durably processed.
    async fn poll(&self) -> Result<Vec<LedgerEvent>, LedgerError>;
}

pub struct DefaultPoller {
    store: Arc<dyn StateStore>,
    ledger: Arc<dyn LedgerClient>,
    retry_initial: Duration,
    retry_max_interval: Duration,
    retry_max_elapsed: Duration,
}

impl DefaultPoller {
    pub fn new(
        store: Arc<dyn StateStore>,
        ledger: Arc<dyn LedgerClient>,
        retry_initial: Duration,
        retry_max_interval: Duration,
        retry_max_elapsed: Duration,
    ) -> Self {
        DefaultPoller { store, ledger, retry_initial, retry_max_interval, retry_max_elapsed }
    }

    fn is_transient(e: &LedgerError) -> bool {
        matches!(e, LedgerError::Transport(_) | LedgerError::Rpc { .. })
    }
}

#[async_trait]
impl EventPoller for DefaultPoller {
    async fn poll(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        let cursor = self.store.get_cursor().await.unwrap_or(0);
        let policy = bounded(self.retry_initial, self.retry_max_interval, self.retry_max_elapsed);
        let ledger = self.ledger.clone();

        retry_transient(policy, Self::is_transient, || {
            let ledger = ledger.clone();
            async move { ledger.poll_events(cursor).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{PinEvent, UnpinEvent};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyLedger {
        attempts: AtomicU32,
        fail_first_n: u32,
        events: Vec<LedgerEvent>,
    }

    #[async_trait]
    impl LedgerClient for FlakyLedger {
        async fn poll_events(&self, _since: u64) -> Result<Vec<LedgerEvent>, LedgerError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first_n {
                return Err(LedgerError::Transport(
                    reqwest::Client::new().get("http://127.0.0.1:1").build().unwrap_err().into(),
                ));
            }
            Ok(self.events.clone())
        }
        async fn get_slot(&self, _slot_id: u64) -> Result<crate::ledger::SlotInfo, LedgerError> {
            unimplemented!()
        }
        async fn is_slot_expired(&self, _slot_id: u64) -> Result<bool, LedgerError> {
            unimplemented!()
        }
        async fn get_pinner(&self, _address: &str) -> Result<Option<crate::types::PinnerInfo>, LedgerError> {
            unimplemented!()
        }
        async fn current_epoch(&self) -> Result<u64, LedgerError> {
            unimplemented!()
        }
        async fn get_balance(&self, _address: &str) -> Result<i64, LedgerError> {
            unimplemented!()
        }
        async fn simulate_fee(&self, _operation: &str) -> Result<i64, LedgerError> {
            unimplemented!()
        }
        async fn collect_pin(&self, _caller: &str, _slot_id: u64) -> Result<crate::ledger::CollectResult, LedgerError> {
            unimplemented!()
        }
        async fn flag_pinner(&self, _caller: &str, _pinner: &str) -> Result<crate::ledger::FlagResult, LedgerError> {
            unimplemented!()
        }
    }

    fn make_store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn returns_events_in_ledger_order_without_touching_cursor() {
        let store = make_store();
        let events = vec![
            LedgerEvent::Pin(PinEvent {
                slot_id: 1,
                cid: "Qm1".into(),
                filename: "a".into(),
                gateway: "https://gw".into(),
                offer_price: 10,
                pin_qty: 1,
                publisher: "pub1".into(),
                ledger_sequence: 5,
            }),
            LedgerEvent::Unpin(UnpinEvent { slot_id: 1, cid_hash: "abc".into(), ledger_sequence: 6 }),
        ];
        let ledger = Arc::new(FlakyLedger { attempts: AtomicU32::new(0), fail_first_n: 0, events: events.clone() });
        let poller = DefaultPoller::new(store.clone(), ledger, Duration::from_millis(1), Duration::from_millis(5), Duration::from_secs(1));

        let got = poller.poll().await.unwrap();
        assert_eq!(got, events);
        assert_eq!(store.get_cursor().await.unwrap(), 0, "poller never advances the cursor itself");
    }

    #[tokio::test]
    async fn retries_transient_transport_errors() {
        let store = make_store();
        let ledger = Arc::new(FlakyLedger { attempts: AtomicU32::new(0), fail_first_n: 2, events: vec![] });
        let poller = DefaultPoller::new(store, ledger.clone(), Duration::from_millis(1), Duration::from_millis(5), Duration::from_secs(1));

        let got = poller.poll().await.unwrap();
        assert!(got.is_empty());
        assert!(ledger.attempts.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_elapsed_and_returns_error() {
        let store = make_store();
        let ledger = Arc::new(FlakyLedger { attempts: AtomicU32::new(0), fail_first_n: u32::MAX, events: vec![] });
        let poller = DefaultPoller::new(store, ledger, Duration::from_millis(1), Duration::from_millis(2), Duration::from_millis(20));

        let result = poller.poll().await;
        assert!(result.is_err());
    }
}
