//! Core domain types shared across the daemon: tagged event variants, the
//! offer/claim/pin records persisted by the store, and the hunter's tracking
//! records. Kept free of any component-specific logic so every component can
//! depend on it without a cycle.

pub mod activity;
pub mod claim;
pub mod config;
pub mod event;
pub mod hunter;
pub mod offer;
pub mod pin;

pub use activity::{ActivityEntry, ActivityEventType};
pub use claim::Claim;
pub use config::{DaemonConfig, DaemonConfigUpdate, Mode};
pub use event::{cid_hash_hex, LedgerEvent, PinEvent, PinnedEvent, UnpinEvent};
pub use hunter::{
    FlagRecord, MethodOutcome, PinnerInfo, TrackedCid, TrackedPin, TrackedPinStatus,
    VerificationCycle, VerificationLogEntry, VerificationMethod,
};
pub use offer::{Offer, OfferStatus, RejectReason};
pub use pin::Pin;
