//! Periodic verification cycles, bounded by a semaphore, with no overlap
//! between cycles (SPEC_FULL.md §4.8.3, §5).

use super::flag::{FlagOutcome, FlagSubmitter};
use super::verifier::PinVerifier;
use crate::store::{StateStore, VerificationOutcome};
use crate::types::{ActivityEntry, ActivityEventType, TrackedPinStatus, VerificationCycle};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub struct HunterScheduler {
    store: Arc<dyn StateStore>,
    verifier: Arc<dyn PinVerifier>,
    flag_submitter: Arc<dyn FlagSubmitter>,
    max_concurrent_checks: usize,
    failure_threshold: u32,
    cooldown_after_flag_secs: i64,
    running: AtomicBool,
}

impl HunterScheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        verifier: Arc<dyn PinVerifier>,
        flag_submitter: Arc<dyn FlagSubmitter>,
        max_concurrent_checks: usize,
        failure_threshold: u32,
        cooldown_after_flag_secs: i64,
    ) -> Self {
        HunterScheduler {
            store,
            verifier,
            flag_submitter,
            max_concurrent_checks,
            failure_threshold,
            cooldown_after_flag_secs,
            running: AtomicBool::new(false),
        }
    }

    /// Runs cycles every `cycle_interval` until `cancel` fires. A cycle never
    /// starts if the previous one is still running.
    pub async fn run_forever(&self, cycle_interval: std::time::Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(cycle_interval) => {
                    if self.running.swap(true, Ordering::SeqCst) {
                        log::warn!(target: "hunter::scheduler", "previous cycle still running, skipping tick");
                        continue;
                    }
                    self.run_cycle().await;
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }
    }

    pub async fn run_cycle(&self) -> VerificationCycle {
        let started_at = Utc::now();
        let due = self.store.get_due_tracked_pins(started_at, self.cooldown_after_flag_secs).await.unwrap_or_default();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_checks.max(1)));
        let mut handles = Vec::with_capacity(due.len());

        for pin in due {
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let verifier = self.verifier.clone();
            let flag_submitter = self.flag_submitter.clone();
            let failure_threshold = self.failure_threshold;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                check_one(&pin.cid, &pin.pinner_address, &pin.pinner_node_id, &pin.pinner_multiaddr, store, verifier, flag_submitter, failure_threshold)
                    .await
            }));
        }

        let mut passed = 0u32;
        let mut failed = 0u32;
        let mut flagged = 0u32;
        let mut errors = 0u32;

        for handle in handles {
            match handle.await {
                Ok(CheckOutcome::Passed) => passed += 1,
                Ok(CheckOutcome::Failed) => failed += 1,
                Ok(CheckOutcome::Flagged) => {
                    failed += 1;
                    flagged += 1;
                }
                Ok(CheckOutcome::Errored) => errors += 1,
                Err(e) => {
                    log::error!(target: "hunter::scheduler", "verification task panicked: {e}");
                    errors += 1;
                }
            }
        }

        let completed_at = Utc::now();
        let cycle = VerificationCycle {
            started_at,
            completed_at,
            total_checked: passed + failed + errors,
            passed,
            failed,
            flagged,
            skipped: 0,
            errors,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
        };

        if let Err(e) = self.store.append_cycle(cycle.clone()).await {
            log::error!(target: "hunter::scheduler", "failed to append verification cycle: {e}");
        }
        let _ = self
            .store
            .log_activity(ActivityEntry {
                event_type: ActivityEventType::HunterCycle,
                slot_id: None,
                cid: None,
                amount: None,
                message: format!(
                    "cycle: {} checked, {} passed, {} failed, {} flagged, {} errors",
                    cycle.total_checked, cycle.passed, cycle.failed, cycle.flagged, cycle.errors
                ),
                created_at: completed_at,
            })
            .await;

        cycle
    }
}

pub(crate) enum CheckOutcome {
    Passed,
    Failed,
    Flagged,
    Errored,
}

/// Shared by the scheduler's periodic cycles and the IPC `verify_now` handler.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn check_one(
    cid: &str,
    pinner: &str,
    node_id: &str,
    multiaddr: &str,
    store: Arc<dyn StateStore>,
    verifier: Arc<dyn PinVerifier>,
    flag_submitter: Arc<dyn FlagSubmitter>,
    failure_threshold: u32,
) -> CheckOutcome {
    let result = verifier.verify(cid, node_id, multiaddr).await;
    let checked_at = Utc::now();

    let outcome = VerificationOutcome {
        passed: result.passed,
        method_used: result.method_used,
        methods_attempted: result.methods_attempted,
        duration_ms: result.duration_ms,
    };

    let tracked_pin = match store.record_verification_result(cid, pinner, outcome, checked_at).await {
        Ok(p) => p,
        Err(e) => {
            log::error!(target: "hunter::scheduler", "failed to record verification for {pinner}/{cid}: {e}");
            return CheckOutcome::Errored;
        }
    };

    match result.passed {
        None => CheckOutcome::Errored,
        Some(true) => CheckOutcome::Passed,
        Some(false) => {
            if tracked_pin.status == TrackedPinStatus::Suspect && tracked_pin.consecutive_failures >= failure_threshold {
                match flag_submitter.submit_flag(pinner).await {
                    FlagOutcome::Submitted { tx_hash, flag_count_after, bounty_earned } => {
                        let record = crate::types::FlagRecord {
                            pinner_address: pinner.to_string(),
                            tx_hash,
                            flag_count_after,
                            bounty_earned,
                            submitted_at: Utc::now(),
                        };
                        if let Err(e) = store.mark_flagged(cid, pinner, record).await {
                            log::error!(target: "hunter::scheduler", "failed to record flag for {pinner}: {e}");
                        }
                        let _ = store
                            .log_activity(ActivityEntry {
                                event_type: ActivityEventType::HunterFlag,
                                slot_id: None,
                                cid: Some(cid.to_string()),
                                amount: None,
                                message: format!("flagged pinner {pinner}"),
                                created_at: Utc::now(),
                            })
                            .await;
                        CheckOutcome::Flagged
                    }
                    FlagOutcome::AlreadyFlagged => CheckOutcome::Failed,
                    FlagOutcome::Transient(message) => {
                        log::warn!(target: "hunter::scheduler", "flag_pinner({pinner}) transient failure: {message}");
                        CheckOutcome::Failed
                    }
                }
            } else {
                CheckOutcome::Failed
            }
        }
    }
}
