//! The ledger RPC capability: event polling plus the four contract methods
//! the daemon invokes (SPEC_FULL.md §6). The wire shape is a JSON-RPC-style
//! request/response envelope, in the shape of the teacher's
//! `BtcSPVClient::send_req_inner` (`vault/blockchain_connection/btc/spv.rs`).

use crate::error::{ContractError, LedgerError};
use crate::identity::OperatorIdentity;
use crate::types::{LedgerEvent, PinEvent, PinnedEvent, PinnerInfo, UnpinEvent};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub pin_qty: u32,
    pub pins_remaining: u32,
    pub expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectResult {
    pub amount_earned: i64,
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagResult {
    pub tx_hash: String,
    pub flag_count_after: Option<u32>,
    pub bounty_earned: Option<i64>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Events with `ledger_sequence > since`, in ledger order. Event names
    /// other than `PIN`/`PINNED`/`UNPIN` are dropped before returning.
    async fn poll_events(&self, since: u64) -> Result<Vec<LedgerEvent>, LedgerError>;
    async fn get_slot(&self, slot_id: u64) -> Result<SlotInfo, LedgerError>;
    async fn is_slot_expired(&self, slot_id: u64) -> Result<bool, LedgerError>;
    async fn get_pinner(&self, address: &str) -> Result<Option<PinnerInfo>, LedgerError>;
    async fn current_epoch(&self) -> Result<u64, LedgerError>;
    async fn get_balance(&self, address: &str) -> Result<i64, LedgerError>;
    /// Simulated fee for the named operation, in base units. Callers fall
    /// back to a conservative constant when this errors (§4.3).
    async fn simulate_fee(&self, operation: &str) -> Result<i64, LedgerError>;
    async fn collect_pin(&self, caller: &str, slot_id: u64) -> Result<CollectResult, LedgerError>;
    async fn flag_pinner(&self, caller: &str, pinner_address: &str) -> Result<FlagResult, LedgerError>;
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    error: Option<RpcError>,
    result: Option<serde_json::Value>,
}

fn contract_error_from_code(code: i64, message: &str) -> ContractError {
    match code {
        1 => ContractError::AlreadyClaimed,
        2 => ContractError::SlotExpired,
        3 => ContractError::SlotNotActive,
        4 => ContractError::NotPinner,
        5 => ContractError::AlreadyFlagged,
        _ => {
            log::debug!(target: "ledger", "unmapped contract error {code}: {message}");
            ContractError::Other(code as u32)
        }
    }
}

pub struct RpcLedgerClient {
    http: reqwest::Client,
    rpc_url: String,
    contract_id: String,
    identity: Arc<OperatorIdentity>,
}

impl RpcLedgerClient {
    pub fn new(rpc_url: String, contract_id: String, identity: Arc<OperatorIdentity>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("could not build ledger http client");
        RpcLedgerClient { http, rpc_url, contract_id, identity }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, LedgerError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": method,
            "method": method,
            "params": params,
        });

        let text = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .text()
            .await?;

        let parsed: RpcResponse = serde_json::from_str(&text)
            .map_err(|e| LedgerError::Malformed(format!("invalid rpc envelope: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(LedgerError::Contract(contract_error_from_code(err.code, &err.message)));
        }

        parsed.result.ok_or_else(|| LedgerError::Malformed("rpc response had neither result nor error".into()))
    }

    async fn signed_call(&self, method: &str, mut params: serde_json::Value) -> Result<serde_json::Value, LedgerError> {
        let to_sign = serde_json::to_vec(&params)
            .map_err(|e| LedgerError::Malformed(format!("cannot canonicalize params: {e}")))?;
        let signature = hex::encode(self.identity.sign(&to_sign));
        if let serde_json::Value::Object(ref mut map) = params {
            map.insert("signature".into(), serde_json::Value::String(signature));
        }
        self.call(method, params).await
    }

    fn parse_raw_event(&self, raw: &serde_json::Value) -> Option<LedgerEvent> {
        let kind = raw.get("event")?.as_str()?;
        match kind {
            "PIN" => serde_json::from_value::<PinEvent>(raw.clone()).ok().map(LedgerEvent::Pin),
            "PINNED" => serde_json::from_value::<PinnedEvent>(raw.clone()).ok().map(LedgerEvent::Pinned),
            "UNPIN" => serde_json::from_value::<UnpinEvent>(raw.clone()).ok().map(LedgerEvent::Unpin),
            other => {
                log::trace!(target: "ledger", "ignoring unrecognised event kind {other}");
                None
            }
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn poll_events(&self, since: u64) -> Result<Vec<LedgerEvent>, LedgerError> {
        let result = self
            .call(
                "get_events",
                serde_json::json!({ "contract_id": self.contract_id, "start_sequence": since + 1 }),
            )
            .await?;

        let raw_events = result
            .as_array()
            .ok_or_else(|| LedgerError::Malformed("get_events result was not an array".into()))?;

        Ok(raw_events.iter().filter_map(|raw| self.parse_raw_event(raw)).collect())
    }

    async fn get_slot(&self, slot_id: u64) -> Result<SlotInfo, LedgerError> {
        let result = self.call("get_slot", serde_json::json!({ "slot_id": slot_id })).await?;
        serde_json::from_value(result).map_err(|e| LedgerError::Malformed(e.to_string()))
    }

    async fn is_slot_expired(&self, slot_id: u64) -> Result<bool, LedgerError> {
        let result = self.call("is_slot_expired", serde_json::json!({ "slot_id": slot_id })).await?;
        result.as_bool().ok_or_else(|| LedgerError::Malformed("is_slot_expired result was not a bool".into()))
    }

    async fn get_pinner(&self, address: &str) -> Result<Option<PinnerInfo>, LedgerError> {
        let result = self.call("get_pinner", serde_json::json!({ "address": address })).await?;
        if result.is_null() {
            return Ok(None);
        }
        #[derive(Deserialize)]
        struct Raw {
            node_id: String,
            multiaddr: String,
            active: bool,
        }
        let raw: Raw = serde_json::from_value(result).map_err(|e| LedgerError::Malformed(e.to_string()))?;
        Ok(Some(PinnerInfo {
            address: address.to_string(),
            node_id: raw.node_id,
            multiaddr: raw.multiaddr,
            active: raw.active,
            cached_at: Utc::now(),
        }))
    }

    async fn current_epoch(&self) -> Result<u64, LedgerError> {
        let result = self.call("current_epoch", serde_json::json!({})).await?;
        result.as_u64().ok_or_else(|| LedgerError::Malformed("current_epoch result was not a u64".into()))
    }

    async fn get_balance(&self, address: &str) -> Result<i64, LedgerError> {
        let result = self.call("get_balance", serde_json::json!({ "address": address })).await?;
        result.as_i64().ok_or_else(|| LedgerError::Malformed("get_balance result was not an i64".into()))
    }

    async fn simulate_fee(&self, operation: &str) -> Result<i64, LedgerError> {
        let result = self.call("simulate", serde_json::json!({ "operation": operation })).await?;
        result.as_i64().ok_or_else(|| LedgerError::Malformed("simulate result was not an i64".into()))
    }

    async fn collect_pin(&self, caller: &str, slot_id: u64) -> Result<CollectResult, LedgerError> {
        let result = self
            .signed_call("collect_pin", serde_json::json!({ "caller": caller, "slot_id": slot_id }))
            .await?;
        #[derive(Deserialize)]
        struct Raw {
            amount: i64,
            tx_hash: String,
        }
        let raw: Raw = serde_json::from_value(result).map_err(|e| LedgerError::Malformed(e.to_string()))?;
        Ok(CollectResult { amount_earned: raw.amount, tx_hash: raw.tx_hash })
    }

    async fn flag_pinner(&self, caller: &str, pinner_address: &str) -> Result<FlagResult, LedgerError> {
        let result = self
            .signed_call(
                "flag_pinner",
                serde_json::json!({ "caller": caller, "pinner_address": pinner_address }),
            )
            .await?;
        #[derive(Deserialize)]
        struct Raw {
            tx_hash: String,
            flag_count_after: Option<u32>,
            bounty_earned: Option<i64>,
        }
        let raw: Raw = serde_json::from_value(result).map_err(|e| LedgerError::Malformed(e.to_string()))?;
        Ok(FlagResult { tx_hash: raw.tx_hash, flag_count_after: raw.flag_count_after, bounty_earned: raw.bounty_earned })
    }
}
