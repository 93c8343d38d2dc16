//! Process-wide atomic counters.
//!
//! Incremented silently at the call site; [`Metrics::flush`] emits the
//! current values as one `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    turns_executed: AtomicU64,
    malformed_outputs: AtomicU64,
    ledger_appends: AtomicU64,
    turn_timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            turns_executed: AtomicU64::new(0),
            malformed_outputs: AtomicU64::new(0),
            ledger_appends: AtomicU64::new(0),
            turn_timeouts: AtomicU64::new(0),
        }
    }

    pub fn inc_turns(&self) {
        self.turns_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "turns_executed", "counter incremented");
    }

    pub fn inc_malformed(&self) {
        self.malformed_outputs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "malformed_outputs", "counter incremented");
    }

    pub fn inc_appends(&self) {
        self.ledger_appends.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "ledger_appends", "counter incremented");
    }

    pub fn inc_timeouts(&self) {
        self.turn_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "turn_timeouts", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            turns_executed = self.turns_executed(),
            malformed_outputs = self.malformed_outputs(),
            ledger_appends = self.ledger_appends(),
            turn_timeouts = self.turn_timeouts(),
        );
    }

    pub fn turns_executed(&self) -> u64 {
        self.turns_executed.load(Ordering::Relaxed)
    }

    pub fn malformed_outputs(&self) -> u64 {
        self.malformed_outputs.load(Ordering::Relaxed)
    }

    pub fn ledger_appends(&self) -> u64 {
        self.ledger_appends.load(Ordering::Relaxed)
    }

    pub fn turn_timeouts(&self) -> u64 {
        self.turn_timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.turns_executed.store(0, Ordering::Relaxed);
        self.malformed_outputs.store(0, Ordering::Relaxed);
        self.ledger_appends.store(0, Ordering::Relaxed);
        self.turn_timeouts.store(0, Ordering::Relaxed);
    }
}
