//! Per-interval query counters for the periodic stats line.
//!
//! Every answered query lands in exactly one bucket: served from the cache,
//! relayed from an upstream, or failed (SERVFAIL, FORMERR).

use std::sync::atomic::{AtomicU64, Ordering};

pub struct Stats {
    requests: AtomicU64,
    forwarded: AtomicU64,
    cached: AtomicU64,
    failed: AtomicU64,
    /// Sum of handling times in microseconds since the last snapshot.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_forwarded(&self, response_time_ms: f64) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.record(response_time_ms);
    }

    pub fn record_cached(&self, response_time_ms: f64) {
        self.cached.fetch_add(1, Ordering::Relaxed);
        self.record(response_time_ms);
    }

    pub fn record_failed(&self, response_time_ms: f64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record(response_time_ms);
    }

    fn record(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    /// Take the counts for the interval that just ended and start a new one.
    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let cached = self.cached.swap(0, Ordering::Relaxed);
        let failed = self.failed.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            requests,
            forwarded,
            cached,
            failed,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts for one reporting interval.
#[derive(Debug)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub forwarded: u64,
    pub cached: u64,
    pub failed: u64,
    /// Mean handling time, 0 for an idle interval.
    pub avg_response_ms: f64,
}
