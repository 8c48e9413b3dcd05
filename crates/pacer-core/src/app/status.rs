//! Status - 実行中の集計
//!
//! worker と scheduler が同時に書くのでカウンタはすべて atomic。
//! `snapshot()` で serialize 可能な `RunSummary` を取り出します。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct RunStats {
    dispatched: AtomicU64,
    deferred: AtomicU64,
    parks: AtomicU64,
    processed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    discarded: AtomicU64,
    unrouted: AtomicU64,
    discovered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub dispatched: u64,
    pub deferred: u64,
    pub parks: u64,
    pub processed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub discarded: u64,
    pub unrouted: u64,
    pub discovered: u64,
}

impl RunSummary {
    /// Tasks that reached a terminal state.
    pub fn finished(&self) -> u64 {
        self.processed + self.dead_lettered + self.discarded
    }
}

impl RunStats {
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_park(&self) {
        self.parks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted(&self) {
        self.unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discovered(&self, count: u64) {
        self.discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            parks: self.parks.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
        }
    }
}
