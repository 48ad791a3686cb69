//! SQLite-backed `StateStore`. A single `rusqlite::Connection` behind a
//! `tokio::sync::Mutex` gives one writer at a time and transactional
//! operations, matching SPEC_FULL.md §5's locking discipline. Schema creation
//! uses `CREATE TABLE IF NOT EXISTS` so reopening an existing database file is
//! idempotent, the same approach as the teacher's `common/store` KVS table.

use super::{Earnings, StateStore, VerificationOutcome};
use crate::error::StoreError;
use crate::types::{
    ActivityEntry, ActivityEventType, Claim, DaemonConfig, DaemonConfigUpdate, FlagRecord,
    MethodOutcome, Mode, Offer, OfferStatus, PinnerInfo, RejectReason, TrackedCid, TrackedPin,
    TrackedPinStatus, VerificationCycle, VerificationMethod,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use tokio::sync::Mutex;

/// Small scalar key-value helper, in the shape of the teacher's `SQLite`
/// struct in `common/store/utils.rs`.
struct Kvs;

impl Kvs {
    fn create_table(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS data_kvs (key TEXT PRIMARY KEY, value TEXT);",
            [],
        )?;
        Ok(())
    }

    fn get<T: FromStr>(conn: &Connection, key: &str) -> Option<T> {
        let mut stmt = conn.prepare("SELECT value FROM data_kvs WHERE key = ?1;").ok()?;
        let value: String = stmt.query_row(params![key], |row| row.get(0)).ok()?;
        value.parse().ok()
    }

    fn set<T: ToString>(conn: &Connection, key: &str, value: T) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO data_kvs (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![key, value.to_string()],
        )?;
        Ok(())
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        create_schema(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    Kvs::create_table(conn)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS offers (
            slot_id INTEGER PRIMARY KEY,
            cid TEXT NOT NULL,
            filename TEXT NOT NULL,
            gateway TEXT NOT NULL,
            offer_price INTEGER NOT NULL,
            pin_qty INTEGER NOT NULL,
            pins_remaining INTEGER NOT NULL,
            publisher TEXT NOT NULL,
            ledger_sequence_seen INTEGER NOT NULL,
            status TEXT NOT NULL,
            reject_reason TEXT,
            net_profit INTEGER,
            estimated_expiry TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS claims (
            slot_id INTEGER PRIMARY KEY,
            cid TEXT NOT NULL,
            amount_earned INTEGER NOT NULL,
            tx_hash TEXT NOT NULL,
            claimed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pins (
            cid TEXT PRIMARY KEY,
            slot_id INTEGER,
            bytes_pinned INTEGER NOT NULL,
            pinned_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            slot_id INTEGER,
            cid TEXT,
            amount INTEGER,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tracked_cids (
            cid TEXT PRIMARY KEY,
            cid_hash TEXT NOT NULL UNIQUE,
            slot_id INTEGER NOT NULL,
            publisher TEXT NOT NULL,
            gateway TEXT,
            pin_qty INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tracked_pins (
            cid TEXT NOT NULL,
            pinner_address TEXT NOT NULL,
            pinner_node_id TEXT NOT NULL,
            pinner_multiaddr TEXT NOT NULL,
            slot_id INTEGER NOT NULL,
            claimed_at TEXT NOT NULL,
            last_verified_at TEXT,
            last_checked_at TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            total_checks INTEGER NOT NULL DEFAULT 0,
            total_failures INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            flagged_at TEXT,
            flag_tx_hash TEXT,
            PRIMARY KEY (cid, pinner_address)
        );

        CREATE TABLE IF NOT EXISTS verification_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cid TEXT NOT NULL,
            pinner TEXT NOT NULL,
            passed INTEGER,
            method_used TEXT,
            methods_attempted TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            checked_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS verification_cycles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            total_checked INTEGER NOT NULL,
            passed INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            flagged INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            errors INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS flag_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pinner_address TEXT NOT NULL,
            tx_hash TEXT NOT NULL,
            flag_count_after INTEGER,
            bounty_earned INTEGER,
            submitted_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pinner_cache (
            address TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            multiaddr TEXT NOT NULL,
            active INTEGER NOT NULL,
            cached_at TEXT NOT NULL
        );
        ",
    )
}

fn fmt_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn parse_time(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text))
}

fn row_to_offer(row: &Row) -> rusqlite::Result<Offer> {
    let status_str: String = row.get("status")?;
    let reject_reason_str: Option<String> = row.get("reject_reason")?;
    let estimated_expiry_str: Option<String> = row.get("estimated_expiry")?;
    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;

    Ok(Offer {
        slot_id: row.get::<_, i64>("slot_id")? as u64,
        cid: row.get("cid")?,
        filename: row.get("filename")?,
        gateway: row.get("gateway")?,
        offer_price: row.get("offer_price")?,
        pin_qty: row.get::<_, i64>("pin_qty")? as u32,
        pins_remaining: row.get::<_, i64>("pins_remaining")? as u32,
        publisher: row.get("publisher")?,
        ledger_sequence_seen: row.get::<_, i64>("ledger_sequence_seen")? as u64,
        status: OfferStatus::from_str(&status_str).unwrap_or(OfferStatus::Pending),
        reject_reason: reject_reason_str.and_then(|s| reject_reason_from_str(&s)),
        net_profit: row.get("net_profit")?,
        estimated_expiry: estimated_expiry_str.map(|s| parse_time(&s)).transpose()?,
        created_at: parse_time(&created_at_str)?,
        updated_at: parse_time(&updated_at_str)?,
    })
}

fn reject_reason_from_str(s: &str) -> Option<RejectReason> {
    Some(match s {
        "already_seen_claimed" => RejectReason::AlreadySeenClaimed,
        "cid_already_pinned" => RejectReason::CidAlreadyPinned,
        "price_too_low" => RejectReason::PriceTooLow,
        "slot_not_active" => RejectReason::SlotNotActive,
        "content_too_large" => RejectReason::ContentTooLarge,
        "insufficient_xlm" => RejectReason::InsufficientXlm,
        "unprofitable" => RejectReason::Unprofitable,
        "operator_rejected" => RejectReason::OperatorRejected,
        _ => return None,
    })
}

fn row_to_tracked_pin(row: &Row) -> rusqlite::Result<TrackedPin> {
    let status_str: String = row.get("status")?;
    let claimed_at_str: String = row.get("claimed_at")?;
    let last_verified_at_str: Option<String> = row.get("last_verified_at")?;
    let last_checked_at_str: Option<String> = row.get("last_checked_at")?;
    let flagged_at_str: Option<String> = row.get("flagged_at")?;

    Ok(TrackedPin {
        cid: row.get("cid")?,
        pinner_address: row.get("pinner_address")?,
        pinner_node_id: row.get("pinner_node_id")?,
        pinner_multiaddr: row.get("pinner_multiaddr")?,
        slot_id: row.get::<_, i64>("slot_id")? as u64,
        claimed_at: parse_time(&claimed_at_str)?,
        last_verified_at: last_verified_at_str.map(|s| parse_time(&s)).transpose()?,
        last_checked_at: last_checked_at_str.map(|s| parse_time(&s)).transpose()?,
        consecutive_failures: row.get::<_, i64>("consecutive_failures")? as u32,
        total_checks: row.get::<_, i64>("total_checks")? as u32,
        total_failures: row.get::<_, i64>("total_failures")? as u32,
        status: TrackedPinStatus::from_str(&status_str).unwrap_or(TrackedPinStatus::Tracking),
        flagged_at: flagged_at_str.map(|s| parse_time(&s)).transpose()?,
        flag_tx_hash: row.get("flag_tx_hash")?,
    })
}

fn method_to_str(m: VerificationMethod) -> &'static str {
    match m {
        VerificationMethod::DhtProvider => "dht_provider",
        VerificationMethod::Bitswap => "bitswap",
        VerificationMethod::Retrieval => "retrieval",
    }
}

fn method_from_str(s: &str) -> Option<VerificationMethod> {
    Some(match s {
        "dht_provider" => VerificationMethod::DhtProvider,
        "bitswap" => VerificationMethod::Bitswap,
        "retrieval" => VerificationMethod::Retrieval,
        _ => return None,
    })
}

fn outcome_to_str(o: MethodOutcome) -> &'static str {
    match o {
        MethodOutcome::Pass => "pass",
        MethodOutcome::Fail => "fail",
        MethodOutcome::Error => "error",
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get_cursor(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().await;
        Ok(Kvs::get::<u64>(&conn, "cursor").unwrap_or(0))
    }

    async fn set_cursor(&self, ledger: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        Kvs::set(&conn, "cursor", ledger)?;
        Ok(())
    }

    async fn get_daemon_config(&self) -> Result<DaemonConfig, StoreError> {
        let conn = self.conn.lock().await;
        let mode = Kvs::get::<String>(&conn, "config_mode")
            .and_then(|s| Mode::from_str(&s).ok())
            .unwrap_or(Mode::Approve);
        let min_price = Kvs::get::<i64>(&conn, "config_min_price").unwrap_or(0);
        let max_content_size = Kvs::get::<i64>(&conn, "config_max_content_size").unwrap_or(i64::MAX);
        Ok(DaemonConfig { mode, min_price, max_content_size })
    }

    async fn set_daemon_config(&self, update: DaemonConfigUpdate) -> Result<DaemonConfig, StoreError> {
        let conn = self.conn.lock().await;
        if let Some(mode) = update.mode {
            Kvs::set(&conn, "config_mode", mode.to_string())?;
        }
        if let Some(min_price) = update.min_price {
            Kvs::set(&conn, "config_min_price", min_price)?;
        }
        if let Some(max_content_size) = update.max_content_size {
            Kvs::set(&conn, "config_max_content_size", max_content_size)?;
        }
        let mode = Kvs::get::<String>(&conn, "config_mode")
            .and_then(|s| Mode::from_str(&s).ok())
            .unwrap_or(Mode::Approve);
        let min_price = Kvs::get::<i64>(&conn, "config_min_price").unwrap_or(0);
        let max_content_size = Kvs::get::<i64>(&conn, "config_max_content_size").unwrap_or(i64::MAX);
        Ok(DaemonConfig { mode, min_price, max_content_size })
    }

    async fn save_offer(&self, event: &PinEvent, initial_status: OfferStatus) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let now = fmt_time(Utc::now());
        let changed = conn.execute(
            "INSERT OR IGNORE INTO offers
                (slot_id, cid, filename, gateway, offer_price, pin_qty, pins_remaining,
                 publisher, ledger_sequence_seen, status, reject_reason, net_profit,
                 estimated_expiry, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8, ?9, NULL, NULL, NULL, ?10, ?10);",
            params![
                event.slot_id as i64,
                event.cid,
                event.filename,
                event.gateway,
                event.offer_price,
                event.pin_qty as i64,
                event.publisher,
                event.ledger_sequence as i64,
                initial_status.to_string(),
                now,
            ],
        )?;
        Ok(changed > 0)
    }

    async fn get_offer(&self, slot_id: u64) -> Result<Option<Offer>, StoreError> {
        let conn = self.conn.lock().await;
        let offer = conn
            .query_row(
                "SELECT * FROM offers WHERE slot_id = ?1;",
                params![slot_id as i64],
                row_to_offer,
            )
            .optional()?;
        Ok(offer)
    }

    async fn update_offer_status(
        &self,
        slot_id: u64,
        status: OfferStatus,
        reject_reason: Option<RejectReason>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM offers WHERE slot_id = ?1;",
                params![slot_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.ok_or(StoreError::OfferNotFound(slot_id))?;
        let current_status = OfferStatus::from_str(&current).unwrap_or(OfferStatus::Pending);
        if !current_status.can_transition(status) {
            return Err(StoreError::IllegalTransition {
                from: current_status.to_string(),
                to: status.to_string(),
            });
        }
        conn.execute(
            "UPDATE offers SET status = ?1, reject_reason = ?2, updated_at = ?3 WHERE slot_id = ?4;",
            params![
                status.to_string(),
                reject_reason.map(|r| r.to_string()),
                fmt_time(Utc::now()),
                slot_id as i64,
            ],
        )?;
        Ok(())
    }

    async fn update_offer_pins_remaining(&self, slot_id: u64, pins_remaining: u32) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE offers SET pins_remaining = ?1, updated_at = ?2 WHERE slot_id = ?3;",
            params![pins_remaining as i64, fmt_time(Utc::now()), slot_id as i64],
        )?;
        Ok(())
    }

    async fn get_offers_by_status(&self, status: OfferStatus) -> Result<Vec<Offer>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM offers WHERE status = ?1 ORDER BY slot_id ASC;")?;
        let rows = stmt
            .query_map(params![status.to_string()], row_to_offer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn save_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM claims WHERE slot_id = ?1;",
                params![claim.slot_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::DuplicateClaim(claim.slot_id));
        }
        conn.execute(
            "INSERT INTO claims (slot_id, cid, amount_earned, tx_hash, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                claim.slot_id as i64,
                claim.cid,
                claim.amount_earned,
                claim.tx_hash,
                fmt_time(claim.claimed_at),
            ],
        )?;
        Ok(())
    }

    async fn get_claim(&self, slot_id: u64) -> Result<Option<Claim>, StoreError> {
        let conn = self.conn.lock().await;
        let claim = conn
            .query_row(
                "SELECT slot_id, cid, amount_earned, tx_hash, claimed_at FROM claims WHERE slot_id = ?1;",
                params![slot_id as i64],
                |row| {
                    let claimed_at_str: String = row.get(4)?;
                    Ok(Claim {
                        slot_id: row.get::<_, i64>(0)? as u64,
                        cid: row.get(1)?,
                        amount_earned: row.get(2)?,
                        tx_hash: row.get(3)?,
                        claimed_at: parse_time(&claimed_at_str)?,
                    })
                },
            )
            .optional()?;
        Ok(claim)
    }

    async fn save_pin(&self, cid: &str, slot_id: Option<u64>, bytes: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO pins (cid, slot_id, bytes_pinned, pinned_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(cid) DO UPDATE SET slot_id = excluded.slot_id, bytes_pinned = excluded.bytes_pinned;",
            params![cid, slot_id.map(|s| s as i64), bytes, fmt_time(Utc::now())],
        )?;
        Ok(())
    }

    async fn is_cid_pinned(&self, cid: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM pins WHERE cid = ?1;", params![cid], |row| row.get(0))
            .optional()?;
        Ok(exists.is_some())
    }

    async fn log_activity(&self, entry: ActivityEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO activity_log (event_type, slot_id, cid, amount, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                entry.event_type.to_string(),
                entry.slot_id.map(|s| s as i64),
                entry.cid,
                entry.amount,
                entry.message,
                fmt_time(entry.created_at),
            ],
        )?;
        Ok(())
    }

    async fn get_recent_activity(&self, limit: u32) -> Result<Vec<ActivityEntry>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT event_type, slot_id, cid, amount, message, created_at
             FROM activity_log ORDER BY id DESC LIMIT ?1;",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let event_type_str: String = row.get(0)?;
                let created_at_str: String = row.get(5)?;
                Ok(ActivityEntry {
                    event_type: activity_event_type_from_str(&event_type_str),
                    slot_id: row.get::<_, Option<i64>>(1)?.map(|v| v as u64),
                    cid: row.get(2)?,
                    amount: row.get(3)?,
                    message: row.get(4)?,
                    created_at: parse_time(&created_at_str)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn add_tracked_cid(&self, tracked: &TrackedCid) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO tracked_cids (cid, cid_hash, slot_id, publisher, gateway, pin_qty)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                tracked.cid,
                tracked.cid_hash,
                tracked.slot_id as i64,
                tracked.publisher,
                tracked.gateway,
                tracked.pin_qty as i64,
            ],
        )?;
        Ok(changed > 0)
    }

    async fn find_tracked_cid_by_hash(&self, cid_hash: &str) -> Result<Option<TrackedCid>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT cid, cid_hash, slot_id, publisher, gateway, pin_qty
                 FROM tracked_cids WHERE cid_hash = ?1;",
                params![cid_hash],
                |row| {
                    Ok(TrackedCid {
                        cid: row.get(0)?,
                        cid_hash: row.get(1)?,
                        slot_id: row.get::<_, i64>(2)? as u64,
                        publisher: row.get(3)?,
                        gateway: row.get(4)?,
                        pin_qty: row.get::<_, i64>(5)? as u32,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    async fn add_tracked_pin(&self, pin: &TrackedPin) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO tracked_pins
                (cid, pinner_address, pinner_node_id, pinner_multiaddr, slot_id, claimed_at,
                 last_verified_at, last_checked_at, consecutive_failures, total_checks,
                 total_failures, status, flagged_at, flag_tx_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, 0, 0, 0, ?7, NULL, NULL);",
            params![
                pin.cid,
                pin.pinner_address,
                pin.pinner_node_id,
                pin.pinner_multiaddr,
                pin.slot_id as i64,
                fmt_time(pin.claimed_at),
                pin.status.to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    async fn get_tracked_pin(&self, cid: &str, pinner: &str) -> Result<Option<TrackedPin>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT * FROM tracked_pins WHERE cid = ?1 AND pinner_address = ?2;",
                params![cid, pinner],
                row_to_tracked_pin,
            )
            .optional()?;
        Ok(row)
    }

    async fn get_tracked_pins(&self, status_filter: Option<TrackedPinStatus>) -> Result<Vec<TrackedPin>, StoreError> {
        let conn = self.conn.lock().await;
        let rows = match status_filter {
            Some(status) => {
                let mut stmt = conn.prepare("SELECT * FROM tracked_pins WHERE status = ?1;")?;
                stmt.query_map(params![status.to_string()], row_to_tracked_pin)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT * FROM tracked_pins;")?;
                stmt.query_map([], row_to_tracked_pin)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    async fn get_due_tracked_pins(
        &self,
        now: DateTime<Utc>,
        cooldown_after_flag_secs: i64,
    ) -> Result<Vec<TrackedPin>, StoreError> {
        let conn = self.conn.lock().await;
        let cutoff = fmt_time(now - chrono::Duration::seconds(cooldown_after_flag_secs));
        let mut stmt = conn.prepare(
            "SELECT * FROM tracked_pins
             WHERE status IN ('tracking', 'verified', 'suspect')
               AND (flagged_at IS NULL OR flagged_at < ?1)
             ORDER BY consecutive_failures DESC, COALESCE(last_checked_at, '') ASC;",
        )?;
        let rows = stmt
            .query_map(params![cutoff], row_to_tracked_pin)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn mark_slot_freed_for_cid(&self, cid: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "UPDATE tracked_pins SET status = ?1 WHERE cid = ?2;",
            params![TrackedPinStatus::SlotFreed.to_string(), cid],
        )?;
        Ok(affected as u64)
    }

    async fn record_verification_result(
        &self,
        cid: &str,
        pinner: &str,
        outcome: VerificationOutcome,
        checked_at: DateTime<Utc>,
    ) -> Result<TrackedPin, StoreError> {
        let conn = self.conn.lock().await;

        let methods_json = serde_json::to_string(
            &outcome
                .methods_attempted
                .iter()
                .map(|(m, o)| (method_to_str(*m), outcome_to_str(*o)))
                .collect::<Vec<_>>(),
        )?;

        conn.execute(
            "INSERT INTO verification_log (cid, pinner, passed, method_used, methods_attempted, duration_ms, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                cid,
                pinner,
                outcome.passed.map(|p| p as i64),
                outcome.method_used.map(method_to_str),
                methods_json,
                outcome.duration_ms as i64,
                fmt_time(checked_at),
            ],
        )?;

        let checked_at_str = fmt_time(checked_at);
        match outcome.passed {
            Some(true) => {
                conn.execute(
                    "UPDATE tracked_pins
                     SET last_checked_at = ?1, last_verified_at = ?1, consecutive_failures = 0,
                         total_checks = total_checks + 1,
                         status = CASE WHEN status IN ('flag_submitted', 'slot_freed') THEN status ELSE 'verified' END
                     WHERE cid = ?2 AND pinner_address = ?3;",
                    params![checked_at_str, cid, pinner],
                )?;
            }
            Some(false) => {
                conn.execute(
                    "UPDATE tracked_pins
                     SET last_checked_at = ?1, consecutive_failures = consecutive_failures + 1,
                         total_checks = total_checks + 1, total_failures = total_failures + 1,
                         status = CASE WHEN status IN ('flag_submitted', 'slot_freed') THEN status ELSE 'suspect' END
                     WHERE cid = ?2 AND pinner_address = ?3;",
                    params![checked_at_str, cid, pinner],
                )?;
            }
            None => {
                conn.execute(
                    "UPDATE tracked_pins SET last_checked_at = ?1, total_checks = total_checks + 1
                     WHERE cid = ?2 AND pinner_address = ?3;",
                    params![checked_at_str, cid, pinner],
                )?;
            }
        }

        conn.query_row(
            "SELECT * FROM tracked_pins WHERE cid = ?1 AND pinner_address = ?2;",
            params![cid, pinner],
            row_to_tracked_pin,
        )
        .map_err(StoreError::from)
    }

    async fn append_cycle(&self, cycle: VerificationCycle) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO verification_cycles
                (started_at, completed_at, total_checked, passed, failed, flagged, skipped, errors, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                fmt_time(cycle.started_at),
                fmt_time(cycle.completed_at),
                cycle.total_checked,
                cycle.passed,
                cycle.failed,
                cycle.flagged,
                cycle.skipped,
                cycle.errors,
                cycle.duration_ms as i64,
            ],
        )?;
        Ok(())
    }

    async fn mark_flagged(&self, cid: &str, pinner: &str, record: FlagRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO flag_history (pinner_address, tx_hash, flag_count_after, bounty_earned, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                record.pinner_address,
                record.tx_hash,
                record.flag_count_after,
                record.bounty_earned,
                fmt_time(record.submitted_at),
            ],
        )?;
        conn.execute(
            "UPDATE tracked_pins SET status = 'flag_submitted', flagged_at = ?1, flag_tx_hash = ?2
             WHERE cid = ?3 AND pinner_address = ?4;",
            params![fmt_time(record.submitted_at), record.tx_hash, cid, pinner],
        )?;
        Ok(())
    }

    async fn has_already_flagged(&self, pinner: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM flag_history WHERE pinner_address = ?1 LIMIT 1;",
                params![pinner],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    async fn get_flag_history(&self) -> Result<Vec<FlagRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT pinner_address, tx_hash, flag_count_after, bounty_earned, submitted_at
             FROM flag_history ORDER BY id DESC;",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let submitted_at_str: String = row.get(4)?;
                Ok(FlagRecord {
                    pinner_address: row.get(0)?,
                    tx_hash: row.get(1)?,
                    flag_count_after: row.get(2)?,
                    bounty_earned: row.get(3)?,
                    submitted_at: parse_time(&submitted_at_str)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn pinner_cache_get(&self, address: &str) -> Result<Option<PinnerInfo>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT address, node_id, multiaddr, active, cached_at FROM pinner_cache WHERE address = ?1;",
                params![address],
                |row| {
                    let cached_at_str: String = row.get(4)?;
                    Ok(PinnerInfo {
                        address: row.get(0)?,
                        node_id: row.get(1)?,
                        multiaddr: row.get(2)?,
                        active: row.get::<_, i64>(3)? != 0,
                        cached_at: parse_time(&cached_at_str)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    async fn pinner_cache_set(&self, info: &PinnerInfo) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO pinner_cache (address, node_id, multiaddr, active, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(address) DO UPDATE SET
                node_id = excluded.node_id, multiaddr = excluded.multiaddr,
                active = excluded.active, cached_at = excluded.cached_at;",
            params![info.address, info.node_id, info.multiaddr, info.active as i64, fmt_time(info.cached_at)],
        )?;
        Ok(())
    }

    async fn get_earnings(&self, since: Option<DateTime<Utc>>) -> Result<Earnings, StoreError> {
        let conn = self.conn.lock().await;
        let (total, count): (Option<i64>, i64) = match since {
            Some(since) => conn.query_row(
                "SELECT SUM(amount_earned), COUNT(*) FROM claims WHERE claimed_at >= ?1;",
                params![fmt_time(since)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
            None => conn.query_row(
                "SELECT SUM(amount_earned), COUNT(*) FROM claims;",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
        };

        let mut stmt = match since {
            Some(_) => conn.prepare(
                "SELECT substr(claimed_at, 1, 10) AS day, SUM(amount_earned)
                 FROM claims WHERE claimed_at >= ?1 GROUP BY day ORDER BY day ASC;",
            )?,
            None => conn.prepare(
                "SELECT substr(claimed_at, 1, 10) AS day, SUM(amount_earned)
                 FROM claims GROUP BY day ORDER BY day ASC;",
            )?,
        };
        let by_day_rows: Vec<(String, i64)> = match since {
            Some(since) => stmt
                .query_map(params![fmt_time(since)], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?,
        };
        let by_day = by_day_rows
            .into_iter()
            .filter_map(|(day, amount)| {
                NaiveDate::parse_from_str(&day, "%Y-%m-%d").ok().map(|d| (d, amount))
            })
            .collect();

        Ok(Earnings { total: total.unwrap_or(0), claim_count: count as u64, by_day })
    }
}

fn activity_event_type_from_str(s: &str) -> ActivityEventType {
    match s {
        "offer_seen" => ActivityEventType::OfferSeen,
        "offer_accepted" => ActivityEventType::OfferAccepted,
        "offer_rejected" => ActivityEventType::OfferRejected,
        "pin_started" => ActivityEventType::PinStarted,
        "pin_success" => ActivityEventType::PinSuccess,
        "pin_failed" => ActivityEventType::PinFailed,
        "claim_submitted" => ActivityEventType::ClaimSubmitted,
        "claim_success" => ActivityEventType::ClaimSuccess,
        "claim_failed" => ActivityEventType::ClaimFailed,
        "hunter_cycle" => ActivityEventType::HunterCycle,
        "hunter_flag" => ActivityEventType::HunterFlag,
        _ => ActivityEventType::Error,
    }
}
