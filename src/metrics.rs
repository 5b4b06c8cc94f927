/*
 * Copyright 2024 lsm-store contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Operation counters: reads, writes, removes, transactions, rollbacks,
//! vacuums, evictions, broadcasts, lock failures, corruption, and a flag
//! for when confidentiality is degraded (the real AEAD is unavailable).
//! A plain atomic-counter struct with a point-in-time snapshot, not a
//! registration into a global metrics facade.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic operation counters for one [`crate::Engine`] instance.
#[derive(Debug, Default)]
pub struct Metrics {
    reads: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
    transactions: AtomicU64,
    rollbacks: AtomicU64,
    vacuums: AtomicU64,
    evictions: AtomicU64,
    broadcasts: AtomicU64,
    lock_failures: AtomicU64,
    corruptions: AtomicU64,
    degraded_confidentiality: AtomicU64,
}

/// A point-in-time snapshot of a [`Metrics`] instance's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub removes: u64,
    pub transactions: u64,
    pub rollbacks: u64,
    pub vacuums: u64,
    pub evictions: u64,
    pub broadcasts: u64,
    pub lock_failures: u64,
    pub corruptions: u64,
    pub degraded_confidentiality: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transaction(&self) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_vacuum(&self) {
        self.vacuums.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_failure(&self) {
        self.lock_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corruption(&self) {
        self.corruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded_confidentiality(&self) {
        self.degraded_confidentiality.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            transactions: self.transactions.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            vacuums: self.vacuums.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            lock_failures: self.lock_failures.load(Ordering::Relaxed),
            corruptions: self.corruptions.load(Ordering::Relaxed),
            degraded_confidentiality: self.degraded_confidentiality.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_read();
        metrics.record_read();
        metrics.record_write();
        let snap = metrics.snapshot();
        assert_eq!(snap.reads, 2);
        assert_eq!(snap.writes, 1);
        assert_eq!(snap.removes, 0);
    }
}
