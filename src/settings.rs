//! The typed configuration record the daemon runs from. Parsing a config
//! file and environment overrides into this shape is in scope; the file
//! format and CLI front door are not (spec.md §1) — callers construct a
//! `Settings` however they like and pass it to `Daemon::new`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    pub rpc_url: String,
    pub contract_id: String,
    /// Conservative fallback fee (base units) when a simulate call fails.
    pub fallback_tx_fee: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageNodeSettings {
    pub rpc_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSettings {
    pub fetch_timeout_secs: u64,
    pub add_timeout_secs: u64,
    pub pin_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HunterSettings {
    pub enabled: bool,
    pub cycle_interval_secs: u64,
    pub max_concurrent_checks: usize,
    pub failure_threshold: u32,
    pub cooldown_after_flag_secs: i64,
    pub pinner_cache_ttl_secs: i64,
    pub check_timeout_secs: u64,
    pub retrieval_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpcSettings {
    pub bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: String,
    pub poll_interval_secs: u64,
    pub safety_factor: i64,
    /// Whether to unpin local content on UNPIN events. Default: keep (false).
    #[serde(default)]
    pub unpin_on_unpin_event: bool,
    pub ledger: LedgerSettings,
    pub storage_node: StorageNodeSettings,
    pub executor: ExecutorSettings,
    pub hunter: HunterSettings,
    pub ipc: IpcSettings,
}

impl Settings {
    /// Load configuration by layering `config/default.toml`, an optional
    /// `config/{run_mode}.toml`, and `PINWARDEN_*` environment variables, in
    /// the shape of the teacher's `Settings::new()` (`engine/src/settings.rs`).
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("PINWARDEN_RUN_MODE").unwrap_or_else(|_| "default".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("pinwarden").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be > 0".into());
        }
        if self.safety_factor < 1 {
            return Err("safety_factor must be >= 1".into());
        }
        if self.hunter.max_concurrent_checks == 0 {
            return Err("hunter.max_concurrent_checks must be > 0".into());
        }
        if self.hunter.failure_threshold == 0 {
            return Err("hunter.failure_threshold must be > 0".into());
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.fetch_timeout_secs)
    }

    pub fn add_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.add_timeout_secs)
    }

    pub fn pin_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.pin_timeout_secs)
    }
}
