use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A pin offer newly created on-chain. Only this variant carries the raw `cid` —
/// `Pinned`/`Unpin` only carry its hash, so consumers that need the cid must look
/// it up via `slot_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinEvent {
    pub slot_id: u64,
    pub cid: String,
    pub filename: String,
    pub gateway: String,
    pub offer_price: i64,
    pub pin_qty: u32,
    pub publisher: String,
    pub ledger_sequence: u64,
}

/// A pinner claimed a slot. `cid_hash` is the lowercase-hex SHA-256 of the cid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedEvent {
    pub slot_id: u64,
    pub cid_hash: String,
    pub pinner: String,
    pub amount: i64,
    pub pins_remaining: u32,
    pub ledger_sequence: u64,
}

/// A slot or cid was unpinned / withdrawn on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpinEvent {
    pub slot_id: u64,
    pub cid_hash: String,
    pub ledger_sequence: u64,
}

/// The three contract event variants the daemon acts on. Other event names
/// emitted by the contract are dropped by the poller before reaching here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LedgerEvent {
    Pin(PinEvent),
    Pinned(PinnedEvent),
    Unpin(UnpinEvent),
}

impl LedgerEvent {
    pub fn ledger_sequence(&self) -> u64 {
        match self {
            LedgerEvent::Pin(e) => e.ledger_sequence,
            LedgerEvent::Pinned(e) => e.ledger_sequence,
            LedgerEvent::Unpin(e) => e.ledger_sequence,
        }
    }

    pub fn slot_id(&self) -> u64 {
        match self {
            LedgerEvent::Pin(e) => e.slot_id,
            LedgerEvent::Pinned(e) => e.slot_id,
            LedgerEvent::Unpin(e) => e.slot_id,
        }
    }
}

/// Lowercase-hex SHA-256 of a cid string, as carried by `Pinned`/`Unpin` events.
pub fn cid_hash_hex(cid: &str) -> String {
    let digest = Sha256::digest(cid.as_bytes());
    hex::encode(digest)
}
