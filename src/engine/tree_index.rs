//! REVINDEX - Concurrent Ordered Revision Index
//! Maps every key to its [`KeyIndex`] in a `BTreeMap` behind a `RwLock`.
//!
//! ## Concurrency Model
//! - **Read operations** (`get`, `range`, `equal`, `len`) acquire a **read lock** (shared)
//! - **Write operations** (`put`, `restore`, `tombstone`, `compact`) acquire a **write lock** (exclusive)
//! - Multiple concurrent readers allowed, writers block all
//!
//! `compact` holds the write lock while it walks every key. Compacting
//! millions of keys takes tens of milliseconds, which is accepted as a
//! latency spike. Callers needing tighter tails shard the index or
//! schedule compaction off the serving path.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, RevIndexError};
use crate::types::{Key, Revision, RevisionInfo};

use super::key_index::KeyIndex;
use super::metrics::IndexMetrics;

/// Call surface the store uses to track key revisions.
pub trait Index: Send + Sync {
    /// State of `key` as of main revision `at_rev`.
    fn get(&self, key: &[u8], at_rev: i64) -> Result<RevisionInfo>;

    /// Keys in `[key, end)` that are visible at `at_rev`, ascending, with
    /// the revision each one had then. With no `end` (or an empty one) this
    /// is a single-key lookup of `key`.
    fn range(&self, key: &[u8], end: Option<&[u8]>, at_rev: i64) -> Vec<(Key, Revision)>;

    /// Record a new revision of `key`.
    fn put(&self, key: &[u8], rev: Revision);

    /// Rebuild-only: seed `key` with its state as read back from the log.
    fn restore(&self, key: &[u8], created: Revision, modified: Revision, ver: i64);

    /// End the live generation of `key` at `rev`.
    fn tombstone(&self, key: &[u8], rev: Revision) -> Result<()>;

    /// Discard history unreachable from reads at or after `rev`.
    /// Returns the revisions the backing store may now reclaim.
    fn compact(&self, rev: i64) -> Result<BTreeSet<Revision>>;

    /// Same keys with structurally equal histories.
    fn equal(&self, other: &Self) -> bool
    where
        Self: Sized;
}

/// Ordered, thread-safe revision index.
///
/// ## Example
/// ```
/// use revindex::engine::tree_index::{Index, TreeIndex};
/// use revindex::types::Revision;
///
/// let index = TreeIndex::new();
/// index.put(b"foo", Revision::new(1, 0));
/// index.put(b"foo", Revision::new(2, 0));
///
/// let info = index.get(b"foo", 1).unwrap();
/// assert_eq!(info.modified, Revision::new(1, 0));
/// assert_eq!(info.version, 1);
/// ```
#[derive(Debug, Default)]
pub struct TreeIndex {
    tree: RwLock<BTreeMap<Key, KeyIndex>>,
    metrics: IndexMetrics,
}

impl TreeIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with surviving history, deleted ones included.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn metrics(&self) -> &IndexMetrics {
        &self.metrics
    }

    /// Copy of the full history of `key`, if it has any.
    pub fn key_index(&self, key: &[u8]) -> Option<KeyIndex> {
        self.read().get(key).cloned()
    }

    // A panicking writer cannot leave a KeyIndex half-updated in a way
    // later readers would misinterpret, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Key, KeyIndex>> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Key, KeyIndex>> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Index for TreeIndex {
    fn get(&self, key: &[u8], at_rev: i64) -> Result<RevisionInfo> {
        self.metrics.record_get();
        let tree = self.read();
        tree.get(key)
            .ok_or(RevIndexError::RevisionNotFound)?
            .get(at_rev)
    }

    fn range(&self, key: &[u8], end: Option<&[u8]>, at_rev: i64) -> Vec<(Key, Revision)> {
        self.metrics.record_range();
        let tree = self.read();
        let end = match end {
            Some(end) if !end.is_empty() => end,
            _ => {
                return tree
                    .get(key)
                    .and_then(|ki| ki.get(at_rev).ok())
                    .map(|info| vec![(key.to_vec(), info.modified)])
                    .unwrap_or_default();
            }
        };

        if key >= end {
            return Vec::new();
        }

        tree.range::<[u8], _>((Bound::Included(key), Bound::Excluded(end)))
            .filter_map(|(k, ki)| ki.get(at_rev).ok().map(|info| (k.clone(), info.modified)))
            .collect()
    }

    fn put(&self, key: &[u8], rev: Revision) {
        log::debug!("revindex: put {:?} at {}", String::from_utf8_lossy(key), rev);
        self.metrics.record_put();
        let mut tree = self.write();
        tree.entry(key.to_vec())
            .or_insert_with(|| KeyIndex::new(key.to_vec()))
            .put(rev);
    }

    fn restore(&self, key: &[u8], created: Revision, modified: Revision, ver: i64) {
        self.metrics.record_restore();
        let mut tree = self.write();
        tree.entry(key.to_vec())
            .or_insert_with(|| KeyIndex::new(key.to_vec()))
            .restore(created, modified, ver);
    }

    fn tombstone(&self, key: &[u8], rev: Revision) -> Result<()> {
        log::debug!(
            "revindex: tombstone {:?} at {}",
            String::from_utf8_lossy(key),
            rev
        );
        let mut tree = self.write();
        tree.get_mut(key)
            .ok_or(RevIndexError::RevisionNotFound)?
            .tombstone(rev)?;
        self.metrics.record_tombstone();
        Ok(())
    }

    fn compact(&self, rev: i64) -> Result<BTreeSet<Revision>> {
        log::info!("revindex: compact {}", rev);
        let mut removed = BTreeSet::new();
        let mut emptied = Vec::new();

        let mut tree = self.write();
        for (key, ki) in tree.iter_mut() {
            if let Err(err) = ki.compact(rev, &mut removed) {
                log::error!("revindex: {}", err);
                return Err(err);
            }
            if ki.is_empty() {
                emptied.push(key.clone());
            }
        }

        for key in &emptied {
            if tree.remove(key).is_none() {
                let err = RevIndexError::CompactionInvariant(format!(
                    "unexpected delete failure for key {:?}",
                    key
                ));
                log::error!("revindex: {}", err);
                return Err(err);
            }
        }

        self.metrics.record_compaction(removed.len(), emptied.len());
        log::info!(
            "revindex: compact {} reclaimed {} revisions, {} keys",
            rev,
            removed.len(),
            emptied.len()
        );
        Ok(removed)
    }

    fn equal(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        // Lock in address order so a.equal(b) racing b.equal(a) cannot
        // deadlock behind queued writers.
        let (a, b) = if (self as *const Self) < (other as *const Self) {
            let a = self.read();
            (a, other.read())
        } else {
            let b = other.read();
            (self.read(), b)
        };
        a.len() == b.len()
            && a.iter()
                .all(|(key, ki)| b.get(key).map_or(false, |other| ki.equal(other)))
    }
}
