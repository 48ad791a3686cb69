use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Routing mode for accepted pin offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Execute and claim inline as soon as an offer is accepted.
    Auto,
    /// Park accepted offers in the approval queue until the operator acts.
    Approve,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => write!(f, "auto"),
            Mode::Approve => write!(f, "approve"),
        }
    }
}

impl FromStr for Mode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Mode::Auto),
            "approve" => Ok(Mode::Approve),
            _ => Err("mode must be \"auto\" or \"approve\""),
        }
    }
}

/// The persisted, runtime-mutable daemon configuration singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub mode: Mode,
    /// Minimum offer price, in base units, to accept.
    pub min_price: i64,
    /// Maximum content size, in bytes, to accept.
    pub max_content_size: i64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            mode: Mode::Approve,
            min_price: 0,
            max_content_size: i64::MAX,
        }
    }
}

/// A partial update applied to `DaemonConfig`; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfigUpdate {
    pub mode: Option<Mode>,
    pub min_price: Option<i64>,
    pub max_content_size: Option<i64>,
}
