//! The local storage-node (Kubo-compatible) RPC capability (SPEC_FULL.md §6).
//! Every call is a bare `POST` with query-string arguments, matching Kubo's
//! own RPC convention.

use crate::error::StorageNodeError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// The exact `add` parameters the publisher used; reproducing them is what
/// makes the resulting hash comparable to the offered cid (SPEC_FULL.md §4.4).
pub const WRAP_WITH_DIRECTORY: bool = false;
pub const CHUNKER: &str = "size-262144";
pub const RAW_LEAVES: bool = false;
pub const CID_VERSION: u32 = 0;
pub const HASH_ALGO: &str = "sha2-256";

#[async_trait]
pub trait StorageNode: Send + Sync {
    /// Adds `bytes` under the fixed chunking parameters; returns the resulting hash.
    async fn add(&self, bytes: &[u8]) -> Result<String, StorageNodeError>;
    async fn pin_add(&self, cid: &str) -> Result<(), StorageNodeError>;
    async fn pin_ls(&self, cid: &str) -> Result<bool, StorageNodeError>;
    async fn pin_rm(&self, cid: &str) -> Result<(), StorageNodeError>;
    async fn findprovs(&self, cid: &str, num_providers: u32) -> Result<Vec<String>, StorageNodeError>;
    async fn swarm_connect(&self, multiaddr: &str) -> Result<(), StorageNodeError>;
    async fn block_get(&self, cid: &str, timeout: Duration) -> Result<Vec<u8>, StorageNodeError>;
    async fn cat(&self, cid: &str, length: u64) -> Result<Vec<u8>, StorageNodeError>;
    /// Liveness probe; returns the node's peer id.
    async fn id(&self) -> Result<String, StorageNodeError>;
}

pub struct KuboClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl KuboClient {
    pub fn new(rpc_url: String) -> Self {
        KuboClient { http: reqwest::Client::new(), rpc_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.rpc_url.trim_end_matches('/'), path)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, StorageNodeError> {
        let response = self.http.post(self.url(path)).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageNodeError::Rpc(format!("{status}: {body}")));
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| StorageNodeError::Malformed(e.to_string()))
    }

    async fn post_with_timeout(&self, path: &str, timeout: Duration) -> Result<reqwest::Response, StorageNodeError> {
        let response = self.http.post(self.url(path)).timeout(timeout).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageNodeError::Rpc(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FindProvsResponse {
    #[serde(rename = "Type")]
    r#type: u32,
    #[serde(rename = "Responses", default)]
    responses: Vec<FindProvsPeer>,
}

#[derive(Debug, Deserialize)]
struct FindProvsPeer {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

#[async_trait]
impl StorageNode for KuboClient {
    async fn add(&self, bytes: &[u8]) -> Result<String, StorageNodeError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name("content");
        let form = reqwest::multipart::Form::new().part("file", part);

        let path = format!(
            "/api/v0/add?wrap-with-directory={}&chunker={}&raw-leaves={}&cid-version={}&hash={}",
            WRAP_WITH_DIRECTORY, CHUNKER, RAW_LEAVES, CID_VERSION, HASH_ALGO
        );
        let response = self.http.post(self.url(&path)).multipart(form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageNodeError::Rpc(format!("{status}: {body}")));
        }
        let text = response.text().await?;
        let parsed: AddResponse = serde_json::from_str(&text).map_err(|e| StorageNodeError::Malformed(e.to_string()))?;
        Ok(parsed.hash)
    }

    async fn pin_add(&self, cid: &str) -> Result<(), StorageNodeError> {
        let _: serde_json::Value = self.post_json(&format!("/api/v0/pin/add?arg={cid}")).await?;
        Ok(())
    }

    async fn pin_ls(&self, cid: &str) -> Result<bool, StorageNodeError> {
        match self.post_json::<PinLsResponse>(&format!("/api/v0/pin/ls?arg={cid}")).await {
            Ok(resp) => Ok(resp.keys.contains_key(cid)),
            Err(StorageNodeError::Rpc(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pin_rm(&self, cid: &str) -> Result<(), StorageNodeError> {
        let _: serde_json::Value = self.post_json(&format!("/api/v0/pin/rm?arg={cid}")).await?;
        Ok(())
    }

    async fn findprovs(&self, cid: &str, num_providers: u32) -> Result<Vec<String>, StorageNodeError> {
        let response = self
            .post_with_timeout(
                &format!("/api/v0/routing/findprovs?arg={cid}&num-providers={num_providers}"),
                Duration::from_secs(5),
            )
            .await?;
        let text = response.text().await?;
        let mut providers = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if let Ok(parsed) = serde_json::from_str::<FindProvsResponse>(line) {
                if parsed.r#type == 4 {
                    providers.extend(parsed.responses.into_iter().map(|p| p.id));
                }
            }
        }
        Ok(providers)
    }

    async fn swarm_connect(&self, multiaddr: &str) -> Result<(), StorageNodeError> {
        let _: serde_json::Value = self.post_json(&format!("/api/v0/swarm/connect?arg={multiaddr}")).await?;
        Ok(())
    }

    async fn block_get(&self, cid: &str, timeout: Duration) -> Result<Vec<u8>, StorageNodeError> {
        let response = self.post_with_timeout(&format!("/api/v0/block/get?arg={cid}"), timeout).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn cat(&self, cid: &str, length: u64) -> Result<Vec<u8>, StorageNodeError> {
        let response = self
            .post_with_timeout(&format!("/api/v0/cat?arg={cid}&length={length}"), Duration::from_secs(10))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn id(&self) -> Result<String, StorageNodeError> {
        let resp: IdResponse = self.post_json("/api/v0/id").await?;
        Ok(resp.id)
    }
}
