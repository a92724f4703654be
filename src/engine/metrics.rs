//! REVINDEX - Index Metrics & Observability
//! Provides atomic counters for tracking index operations
//! in a lock-free, thread-safe manner using `AtomicU64`.
//!
//! Counters are bumped while the index lock is held, readers included,
//! so they must never need the lock themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic operation counters for the revision index.
///
/// All counters use `Ordering::Relaxed` since we only need
/// eventual consistency for observability, not synchronization.
#[derive(Debug)]
pub struct IndexMetrics {
    /// Total number of `put` operations.
    pub puts: AtomicU64,
    /// Total number of `restore` operations.
    pub restores: AtomicU64,
    /// Total number of successful `tombstone` operations.
    pub tombstones: AtomicU64,
    /// Total number of point lookups.
    pub gets: AtomicU64,
    /// Total number of range scans.
    pub ranges: AtomicU64,
    /// Total number of compactions.
    pub compactions: AtomicU64,
    /// Revisions handed back as reclaimable by compaction.
    pub revisions_reclaimed: AtomicU64,
    /// Keys removed because compaction emptied their history.
    pub keys_reclaimed: AtomicU64,
    /// Timestamp when the index was created.
    created_at: Instant,
}

impl IndexMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            puts: AtomicU64::new(0),
            restores: AtomicU64::new(0),
            tombstones: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            ranges: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
            revisions_reclaimed: AtomicU64::new(0),
            keys_reclaimed: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restore(&self) {
        self.restores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tombstone(&self) {
        self.tombstones.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_range(&self) {
        self.ranges.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished compaction and what it reclaimed.
    pub fn record_compaction(&self, revisions: usize, keys: usize) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.revisions_reclaimed
            .fetch_add(revisions as u64, Ordering::Relaxed);
        self.keys_reclaimed.fetch_add(keys as u64, Ordering::Relaxed);
    }

    /// Get index uptime in seconds.
    pub fn uptime_secs(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }

    /// Get total number of operations, compactions excluded.
    pub fn total_ops(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
            + self.restores.load(Ordering::Relaxed)
            + self.tombstones.load(Ordering::Relaxed)
            + self.gets.load(Ordering::Relaxed)
            + self.ranges.load(Ordering::Relaxed)
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        format!(
            "\n═══ REVINDEX Index Metrics ═══\n\
             Writes:\n\
               puts:       {}\n\
               restores:   {}\n\
               tombstones: {}\n\
             Reads:\n\
               gets:       {}\n\
               ranges:     {}\n\
             Compaction:\n\
               runs:       {}\n\
               revisions:  {}\n\
               keys:       {}\n\
             Total ops: {}\n\
             Uptime: {:.2}s",
            self.puts.load(Ordering::Relaxed),
            self.restores.load(Ordering::Relaxed),
            self.tombstones.load(Ordering::Relaxed),
            self.gets.load(Ordering::Relaxed),
            self.ranges.load(Ordering::Relaxed),
            self.compactions.load(Ordering::Relaxed),
            self.revisions_reclaimed.load(Ordering::Relaxed),
            self.keys_reclaimed.load(Ordering::Relaxed),
            self.total_ops(),
            self.uptime_secs(),
        )
    }
}

impl Default for IndexMetrics {
    fn default() -> Self {
        Self::new()
    }
}
