//! Wire shapes for the localhost IPC surface (SPEC_FULL.md §6). Closed enums
//! stay closed internally; only this boundary stringifies them.

use crate::types::{Mode, VerificationMethod};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub slot_ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResultDto {
    pub slot_id: u64,
    pub approved: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub slot_ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct RejectResultDto {
    pub slot_id: u64,
    pub rejected: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: Mode,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdatePolicyRequest {
    pub min_price: Option<i64>,
    pub max_content_size: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct VerifyNowRequest {
    pub cid: Option<String>,
    pub pinner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResultDto {
    pub cid: String,
    pub pinner: String,
    pub passed: Option<bool>,
    pub method_used: Option<VerificationMethod>,
}

#[derive(Debug, Deserialize)]
pub struct FlagNowRequest {
    pub pinner_address: String,
}

#[derive(Debug, Serialize)]
pub struct FlagNowResponseDto {
    pub pinner_address: String,
    pub outcome: String,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponseDto {
    pub error: String,
}
