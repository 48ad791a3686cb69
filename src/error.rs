use thiserror::Error;

/// Errors surfaced by the state store. Every operation either succeeds
/// atomically or returns one of these without partial effect.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("illegal offer transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
    #[error("duplicate claim for slot {0}")]
    DuplicateClaim(u64),
    #[error("offer {0} not found")]
    OfferNotFound(u64),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the ledger RPC capability.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Exhaustive contract-level error codes the ledger maps transaction results to
/// (SPEC_FULL.md §4.5, §4.8.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("already claimed")]
    AlreadyClaimed,
    #[error("slot expired")]
    SlotExpired,
    #[error("slot not active")]
    SlotNotActive,
    #[error("caller is not a registered pinner")]
    NotPinner,
    #[error("pinner already flagged")]
    AlreadyFlagged,
    #[error("other contract error: {0}")]
    Other(u32),
}

/// Errors from the gateway fetch step.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("content length {0} exceeds max_content_size {1}")]
    TooLarge(u64, u64),
    #[error("stream exceeded max_content_size {0} bytes")]
    StreamTooLarge(u64),
}

/// Errors from the local storage-node RPC capability.
#[derive(Debug, Error)]
pub enum StorageNodeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage node returned an error: {0}")]
    Rpc(String),
    #[error("cid mismatch: offered {offered}, storage node computed {computed}")]
    CidMismatch { offered: String, computed: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Errors from the pin pipeline executor, wrapping its collaborators.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    StorageNode(#[from] StorageNodeError),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A fatal identity/configuration problem that must stop the daemon.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("operator identity is not registered as a pinner on-chain")]
    NotPinner,
    #[error("configuration error: {0}")]
    Config(String),
}
