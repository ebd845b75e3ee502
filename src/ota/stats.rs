//! Transfer decision counters.
//!
//! Shared between the session and whatever reports on it (the GATT status
//! characteristic on ESP32, the JSON summary of the host tool). All fields
//! are atomics so readers never lock the session.
//!
//! # Example Snapshot
//!
//! ```json
//! {
//!   "accepted": 120,
//!   "duplicates": 3,
//!   "rejected": 1,
//!   "aborted": 0,
//!   "restarts": 0,
//!   "completed": 1,
//!   "bytes_written": 1444
//! }
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters for one receiver.
#[derive(Debug, Default)]
pub struct TransferStats {
    /// Chunks that advanced a transfer.
    pub accepted: AtomicUsize,
    /// Retransmissions accepted idempotently.
    pub duplicates: AtomicUsize,
    /// Packets rejected without aborting a transfer.
    pub rejected: AtomicUsize,
    /// Sessions aborted.
    pub aborted: AtomicUsize,
    /// Sessions discarded by a new offset-0 packet.
    pub restarts: AtomicUsize,
    /// Sessions that reached `Complete`.
    pub completed: AtomicUsize,
    /// Image bytes written across all sessions (duplicates excluded).
    pub bytes_written: AtomicU64,
}

/// Point-in-time copy of [`TransferStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub aborted: usize,
    pub restarts: usize,
    pub completed: usize,
    pub bytes_written: u64,
}

impl TransferStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self, bytes: usize) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}
