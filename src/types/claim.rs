use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An append-only record of a successful `collect_pin` transaction. At most one
/// per `slot_id` (enforced by the store's primary key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub slot_id: u64,
    pub cid: String,
    pub amount_earned: i64,
    pub tx_hash: String,
    pub claimed_at: DateTime<Utc>,
}
