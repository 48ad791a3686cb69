//! The publisher gateway fetch step (SPEC_FULL.md §4.4 step 1, §6).

use crate::error::GatewayError;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

#[async_trait]
pub trait PublisherGateway: Send + Sync {
    /// Streams `{gateway}/ipfs/{cid}`, aborting as soon as either the
    /// declared `Content-Length` or the actual stream exceeds `max_bytes`.
    async fn fetch(&self, gateway: &str, cid: &str, max_bytes: u64) -> Result<Vec<u8>, GatewayError>;

    /// Optional `HEAD` probe used by the filter's `content_too_large` check
    /// (SPEC_FULL.md §4.3); `None` when the gateway omits `Content-Length`.
    async fn content_length(&self, gateway: &str, cid: &str) -> Result<Option<u64>, GatewayError>;
}

pub struct ReqwestGateway {
    http: reqwest::Client,
}

impl ReqwestGateway {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("could not build gateway http client");
        ReqwestGateway { http }
    }
}

#[async_trait]
impl PublisherGateway for ReqwestGateway {
    async fn fetch(&self, gateway: &str, cid: &str, max_bytes: u64) -> Result<Vec<u8>, GatewayError> {
        let url = format!("{}/ipfs/{}", gateway.trim_end_matches('/'), cid);
        let response = self.http.get(&url).send().await?;

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(GatewayError::TooLarge(len, max_bytes));
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            body.extend_from_slice(&chunk);
            if body.len() as u64 > max_bytes {
                return Err(GatewayError::StreamTooLarge(max_bytes));
            }
        }

        Ok(body)
    }

    async fn content_length(&self, gateway: &str, cid: &str) -> Result<Option<u64>, GatewayError> {
        let url = format!("{}/ipfs/{}", gateway.trim_end_matches('/'), cid);
        let response = self.http.head(&url).send().await?;
        Ok(response.content_length())
    }
}
