use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cid the local storage node holds in the daemon's own ownership. Exists iff
/// the storage node has it pinned on our behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub cid: String,
    pub slot_id: Option<u64>,
    pub bytes_pinned: i64,
    pub pinned_at: DateTime<Utc>,
}
