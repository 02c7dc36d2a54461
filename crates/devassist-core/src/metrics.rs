//! Process-wide atomic counters for DevAssist runs.
//!
//! Counters are bumped by the [`obs`](crate::obs) emitters. Call
//! [`Metrics::flush`] at the end of a run to log them as one event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    connectors_loaded: AtomicU64,
    load_failures: AtomicU64,
    collections_ok: AtomicU64,
    collection_failures: AtomicU64,
    backend_calls: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            connectors_loaded: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            collections_ok: AtomicU64::new(0),
            collection_failures: AtomicU64::new(0),
            backend_calls: AtomicU64::new(0),
        }
    }

    pub fn inc_connectors_loaded(&self) {
        self.connectors_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_load_failures(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_collections_ok(&self) {
        self.collections_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_collection_failures(&self) {
        self.collection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_backend_calls(&self) {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            connectors_loaded = self.connectors_loaded(),
            load_failures = self.load_failures(),
            collections_ok = self.collections_ok(),
            collection_failures = self.collection_failures(),
            backend_calls = self.backend_calls(),
        );
    }

    pub fn connectors_loaded(&self) -> u64 {
        self.connectors_loaded.load(Ordering::Relaxed)
    }

    pub fn load_failures(&self) -> u64 {
        self.load_failures.load(Ordering::Relaxed)
    }

    pub fn collections_ok(&self) -> u64 {
        self.collections_ok.load(Ordering::Relaxed)
    }

    pub fn collection_failures(&self) -> u64 {
        self.collection_failures.load(Ordering::Relaxed)
    }

    pub fn backend_calls(&self) -> u64 {
        self.backend_calls.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn reset(&self) {
        self.connectors_loaded.store(0, Ordering::Relaxed);
        self.load_failures.store(0, Ordering::Relaxed);
        self.collections_ok.store(0, Ordering::Relaxed);
        self.collection_failures.store(0, Ordering::Relaxed);
        self.backend_calls.store(0, Ordering::Relaxed);
    }
}
