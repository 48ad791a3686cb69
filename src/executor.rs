//! The pin pipeline: fetch → add → verify cid → pin (SPEC_FULL.md §4.4).
//! The publisher's content lives on a private swarm the local storage node
//! cannot discover by peer-routing alone, so it must be injected by
//! fetch-then-add; `add`'s parameters must exactly reproduce the publisher's
//! to make the resulting hash comparable to the offered cid.

use crate::backoff::{bounded, retry_transient};
use crate::error::{ExecutorError, GatewayError, StorageNodeError};
use crate::gateway::PublisherGateway;
use crate::storage_node::StorageNode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PinResult {
    pub success: bool,
    pub cid: String,
    pub bytes_pinned: i64,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait PinExecutor: Send + Sync {
    async fn pin(&self, cid: &str, gateway: &str, max_bytes: u64) -> PinResult;
    async fn verify_pinned(&self, cid: &str) -> bool;
    async fn unpin(&self, cid: &str) -> bool;
}

pub struct DefaultExecutor {
    gateway: Arc<dyn PublisherGateway>,
    storage_node: Arc<dyn StorageNode>,
    max_retries: u32,
    backoff_initial: Duration,
    backoff_max: Duration,
    pin_timeout: Duration,
}

impl DefaultExecutor {
    pub fn new(
        gateway: Arc<dyn PublisherGateway>,
        storage_node: Arc<dyn StorageNode>,
        max_retries: u32,
        backoff_initial: Duration,
        backoff_max: Duration,
        pin_timeout: Duration,
    ) -> Self {
        DefaultExecutor { gateway, storage_node, max_retries, backoff_initial, backoff_max, pin_timeout }
    }

    fn policy(&self) -> backoff::ExponentialBackoff {
        bounded(self.backoff_initial, self.backoff_max, self.backoff_max * self.max_retries.max(1))
    }

    fn failed(cid: &str, started: Instant, message: impl Into<String>) -> PinResult {
        PinResult {
            success: false,
            cid: cid.to_string(),
            bytes_pinned: 0,
            error: Some(message.into()),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
impl PinExecutor for DefaultExecutor {
    async fn pin(&self, cid: &str, gateway: &str, max_bytes: u64) -> PinResult {
        let started = Instant::now();

        let fetch_result = tokio::time::timeout(
            self.pin_timeout,
            retry_transient(self.policy(), |e: &GatewayError| matches!(e, GatewayError::Transport(_)), || {
                self.gateway.fetch(gateway, cid, max_bytes)
            }),
        )
        .await;

        let bytes = match fetch_result {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Self::failed(cid, started, format!("fetch failed: {e}")),
            Err(_) => return Self::failed(cid, started, "fetch timed out"),
        };

        let add_result = retry_transient(
            self.policy(),
            |e: &StorageNodeError| matches!(e, StorageNodeError::Transport(_)),
            || self.storage_node.add(&bytes),
        )
        .await;

        let computed_hash = match add_result {
            Ok(hash) => hash,
            Err(e) => return Self::failed(cid, started, format!("add failed: {e}")),
        };

        if computed_hash != cid {
            log::error!(target: "executor", "cid mismatch: offered {cid}, computed {computed_hash}");
            return Self::failed(
                cid,
                started,
                ExecutorError::from(StorageNodeError::CidMismatch { offered: cid.to_string(), computed: computed_hash })
                    .to_string(),
            );
        }

        if let Err(e) = self.storage_node.pin_add(cid).await {
            return Self::failed(cid, started, format!("pin/add failed: {e}"));
        }

        match self.storage_node.pin_ls(cid).await {
            Ok(true) => {}
            Ok(false) => return Self::failed(cid, started, "pin/ls did not confirm pin after pin/add"),
            Err(e) => return Self::failed(cid, started, format!("pin/ls failed: {e}")),
        }

        PinResult {
            success: true,
            cid: cid.to_string(),
            bytes_pinned: bytes.len() as i64,
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn verify_pinned(&self, cid: &str) -> bool {
        self.storage_node.pin_ls(cid).await.unwrap_or(false)
    }

    async fn unpin(&self, cid: &str) -> bool {
        self.storage_node.pin_rm(cid).await.is_ok()
    }
}
