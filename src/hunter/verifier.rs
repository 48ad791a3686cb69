//! Three-tier possession verifier (SPEC_FULL.md §4.8.2): DHT presence is
//! cheap but not proof; bitswap is always attempted for a definitive result;
//! retrieval is reserved for high-value cids.

use crate::error::StorageNodeError;
use crate::storage_node::StorageNode;
use crate::types::{MethodOutcome, VerificationMethod};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub passed: Option<bool>,
    pub method_used: Option<VerificationMethod>,
    pub methods_attempted: Vec<(VerificationMethod, MethodOutcome)>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait PinVerifier: Send + Sync {
    async fn verify(&self, cid: &str, node_id: &str, multiaddr: &str) -> VerificationResult;
}

pub struct DefaultVerifier {
    storage_node: Arc<dyn StorageNode>,
    check_timeout: Duration,
    retrieval_enabled: bool,
}

impl DefaultVerifier {
    pub fn new(storage_node: Arc<dyn StorageNode>, check_timeout: Duration, retrieval_enabled: bool) -> Self {
        DefaultVerifier { storage_node, check_timeout, retrieval_enabled }
    }

    /// A timeout means the peer didn't produce the block in time: that's
    /// evidence against possession, not a local network problem.
    fn classify(e: &StorageNodeError) -> MethodOutcome {
        match e {
            StorageNodeError::Transport(inner) if inner.is_timeout() => MethodOutcome::Fail,
            StorageNodeError::Rpc(_) => MethodOutcome::Fail,
            _ => MethodOutcome::Error,
        }
    }
}

#[async_trait]
impl PinVerifier for DefaultVerifier {
    async fn verify(&self, cid: &str, node_id: &str, multiaddr: &str) -> VerificationResult {
        let started = Instant::now();
        let mut methods_attempted = Vec::new();

        let dht_outcome = match self.storage_node.findprovs(cid, 20).await {
            Ok(providers) => {
                if providers.iter().any(|p| p == node_id) {
                    MethodOutcome::Pass
                } else {
                    MethodOutcome::Fail
                }
            }
            Err(e) => Self::classify(&e),
        };
        methods_attempted.push((VerificationMethod::DhtProvider, dht_outcome));

        if let Err(e) = self.storage_node.swarm_connect(multiaddr).await {
            log::debug!(target: "hunter::verifier", "swarm_connect({multiaddr}) failed: {e}");
        }

        let bitswap_outcome = match self.storage_node.block_get(cid, self.check_timeout).await {
            Ok(bytes) if !bytes.is_empty() => MethodOutcome::Pass,
            Ok(_) => MethodOutcome::Fail,
            Err(e) => Self::classify(&e),
        };
        methods_attempted.push((VerificationMethod::Bitswap, bitswap_outcome));

        // Bitswap is the definitive channel: a Pass there short-circuits
        // retrieval entirely. Overall `passed` is the OR of both channels,
        // never an override by the optional, lower-priority retrieval check.
        let (passed, method_used) = if bitswap_outcome == MethodOutcome::Pass {
            (Some(true), Some(VerificationMethod::Bitswap))
        } else if self.retrieval_enabled {
            let retrieval_outcome = match self.storage_node.cat(cid, 1024).await {
                Ok(bytes) if !bytes.is_empty() => MethodOutcome::Pass,
                Ok(_) => MethodOutcome::Fail,
                Err(e) => Self::classify(&e),
            };
            methods_attempted.push((VerificationMethod::Retrieval, retrieval_outcome));
            match retrieval_outcome {
                MethodOutcome::Pass => (Some(true), Some(VerificationMethod::Retrieval)),
                MethodOutcome::Fail => (Some(false), Some(VerificationMethod::Retrieval)),
                // bitswap already definitively failed: that's still evidence
                // even though retrieval itself was inconclusive.
                MethodOutcome::Error if bitswap_outcome == MethodOutcome::Fail => {
                    (Some(false), Some(VerificationMethod::Bitswap))
                }
                MethodOutcome::Error => (None, Some(VerificationMethod::Retrieval)),
            }
        } else {
            (outcome_to_passed(bitswap_outcome), Some(VerificationMethod::Bitswap))
        };

        VerificationResult {
            passed,
            method_used,
            methods_attempted,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn outcome_to_passed(outcome: MethodOutcome) -> Option<bool> {
    match outcome {
        MethodOutcome::Pass => Some(true),
        MethodOutcome::Fail => Some(false),
        MethodOutcome::Error => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeStorageNode {
        providers: Vec<String>,
        block: Option<Vec<u8>>,
        cat: Option<Vec<u8>>,
    }

    #[async_trait]
    impl StorageNode for FakeStorageNode {
        async fn add(&self, _bytes: &[u8]) -> Result<String, StorageNodeError> {
            unimplemented!()
        }
        async fn pin_add(&self, _cid: &str) -> Result<(), StorageNodeError> {
            unimplemented!()
        }
        async fn pin_ls(&self, _cid: &str) -> Result<bool, StorageNodeError> {
            unimplemented!()
        }
        async fn pin_rm(&self, _cid: &str) -> Result<(), StorageNodeError> {
            unimplemented!()
        }
        async fn findprovs(&self, _cid: &str, _num_providers: u32) -> Result<Vec<String>, StorageNodeError> {
            Ok(self.providers.clone())
        }
        async fn swarm_connect(&self, _multiaddr: &str) -> Result<(), StorageNodeError> {
            Ok(())
        }
        async fn block_get(&self, _cid: &str, _timeout: Duration) -> Result<Vec<u8>, StorageNodeError> {
            match &self.block {
                Some(bytes) => Ok(bytes.clone()),
                None => Ok(vec![]),
            }
        }
        async fn cat(&self, _cid: &str, _length: u64) -> Result<Vec<u8>, StorageNodeError> {
            match &self.cat {
                Some(bytes) => Ok(bytes.clone()),
                None => Ok(vec![]),
            }
        }
        async fn id(&self) -> Result<String, StorageNodeError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn bitswap_success_passes_even_when_dht_misses() {
        let node = FakeStorageNode { providers: vec![], block: Some(b"hi".to_vec()), cat: None };
        let verifier = DefaultVerifier::new(Arc::new(node), Duration::from_secs(1), false);
        let result = verifier.verify("Qm1", "node1", "/ip4/1.2.3.4/tcp/4001").await;
        assert_eq!(result.passed, Some(true));
        assert_eq!(result.method_used, Some(VerificationMethod::Bitswap));
        assert_eq!(result.methods_attempted.len(), 2);
    }

    #[tokio::test]
    async fn empty_block_fails_regardless_of_dht() {
        let node = FakeStorageNode { providers: vec!["node1".into()], block: None, cat: None };
        let verifier = DefaultVerifier::new(Arc::new(node), Duration::from_secs(1), false);
        let result = verifier.verify("Qm1", "node1", "/ip4/1.2.3.4/tcp/4001").await;
        assert_eq!(result.passed, Some(false));
    }

    #[tokio::test]
    async fn bitswap_pass_short_circuits_retrieval() {
        let node = FakeStorageNode { providers: vec![], block: Some(b"hi".to_vec()), cat: None };
        let verifier = DefaultVerifier::new(Arc::new(node), Duration::from_secs(1), true);
        let result = verifier.verify("Qm1", "node1", "/ip4/1.2.3.4/tcp/4001").await;
        assert_eq!(result.passed, Some(true));
        assert_eq!(result.method_used, Some(VerificationMethod::Bitswap));
        assert_eq!(result.methods_attempted.len(), 2, "retrieval must not be attempted once bitswap passes");
    }

    #[tokio::test]
    async fn retrieval_pass_rescues_a_failed_bitswap() {
        let node = FakeStorageNode { providers: vec![], block: None, cat: Some(b"hi".to_vec()) };
        let verifier = DefaultVerifier::new(Arc::new(node), Duration::from_secs(1), true);
        let result = verifier.verify("Qm1", "node1", "/ip4/1.2.3.4/tcp/4001").await;
        assert_eq!(result.passed, Some(true));
        assert_eq!(result.method_used, Some(VerificationMethod::Retrieval));
        assert_eq!(result.methods_attempted.len(), 3);
    }

    #[tokio::test]
    async fn both_channels_failing_is_an_overall_fail() {
        let node = FakeStorageNode { providers: vec![], block: None, cat: None };
        let verifier = DefaultVerifier::new(Arc::new(node), Duration::from_secs(1), true);
        let result = verifier.verify("Qm1", "node1", "/ip4/1.2.3.4/tcp/4001").await;
        assert_eq!(result.passed, Some(false));
    }
}
