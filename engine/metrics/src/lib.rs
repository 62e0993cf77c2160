//! Minimal observability counters, modeled on the shape of
//! `ic-crypto-internal-logmon`'s `CryptoMetrics` but without a Prometheus
//! exporter: no metrics surface is named by the spec, so this is an
//! in-process counter bag a caller can inspect, not a scrape endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct EngineMetrics {
    searches: AtomicU64,
    updates: AtomicU64,
    integrity_warnings: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A metrics instance that is never read; cheap to construct for tests
    /// that do not care about counts.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn observe_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_integrity_warning(&self) {
        self.integrity_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn searches(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn integrity_warnings(&self) -> u64 {
        self.integrity_warnings.load(Ordering::Relaxed)
    }
}
