//! REVINDEX - Revision Store Module
//! Top-level module tying the revision index to its log.

pub mod key_index;
pub mod metrics;
pub mod retention;
pub mod tree_index;
pub mod wal;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, RevIndexError};
use crate::types::{Key, Revision, RevisionInfo};

use self::retention::{KeepLastRevisions, RetentionPolicy};
use self::tree_index::{Index, TreeIndex};
use self::wal::{replay, LogRecord, RevisionLog};

/// A single mutation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put(Key),
    Delete(Key),
}

/// Revision store.
/// Allocates revisions, logs every change, and keeps the
/// [`TreeIndex`] answering as-of reads over the surviving history.
pub struct RevStore {
    /// Shared so readers on other threads can query while the store writes.
    index: Arc<TreeIndex>,
    /// Revision log the index is rebuilt from.
    log: RevisionLog,
    /// Store configuration.
    config: Config,
    /// Last allocated revision.
    current: Revision,
    /// Compaction boundary, 0 before the first compaction.
    compacted: i64,
    /// Revisions already dropped from the index but still in the log,
    /// left over from a rewrite that failed.
    unreclaimed: BTreeSet<Revision>,
    policy: Option<Box<dyn RetentionPolicy>>,
}

impl RevStore {
    /// Open or create a store at the configured path, rebuilding the index
    /// from the revision log.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        let log_path = config.data_dir.join("revindex.log");
        let (log, records) = RevisionLog::open(log_path, config.sync_writes)?;
        let index = TreeIndex::new();
        let state = replay(&records, &index)?;

        // Revisions above the boundary always survive compaction, so the
        // only way to lose the newest revision is for it to sit at or
        // below the boundary.
        let current = if state.last.main >= state.compacted {
            state.last
        } else {
            Revision::new(state.compacted, 0)
        };

        let policy = config
            .retain_revisions
            .map(|n| Box::new(KeepLastRevisions::new(n)) as Box<dyn RetentionPolicy>);

        log::info!(
            "revindex store opened at {:?} ({} keys, revision {}, compacted {})",
            config.data_dir,
            index.len(),
            current.main,
            state.compacted
        );

        Ok(Self {
            index: Arc::new(index),
            log,
            config,
            current,
            compacted: state.compacted,
            unreclaimed: BTreeSet::new(),
            policy,
        })
    }

    /// Replace the retention policy used by [`RevStore::maybe_compact`].
    pub fn set_retention_policy(&mut self, policy: Box<dyn RetentionPolicy>) {
        self.policy = Some(policy);
    }

    /// Record a new revision of `key`.
    pub fn put(&mut self, key: Key) -> Result<Revision> {
        let main = self.txn(vec![Op::Put(key)])?;
        Ok(Revision::new(main, 0))
    }

    /// Delete `key`. Fails with `RevisionNotFound` if it is not live.
    pub fn delete(&mut self, key: Key) -> Result<Revision> {
        let main = self.txn(vec![Op::Delete(key)])?;
        Ok(Revision::new(main, 0))
    }

    /// Apply `ops` atomically under one new main revision, numbering them
    /// with increasing sub revisions. Returns the main revision.
    ///
    /// Every op is validated before anything is logged, so a failed
    /// delete leaves the store untouched.
    pub fn txn(&mut self, ops: Vec<Op>) -> Result<i64> {
        if ops.is_empty() {
            return Ok(self.current.main);
        }
        let main = self.current.main + 1;

        // Generation state per key as the batch progresses:
        // Some((created, version)) while live, None once deleted.
        let mut pending: HashMap<Key, Option<(Revision, i64)>> = HashMap::new();
        let mut records = Vec::with_capacity(ops.len());

        for (sub, op) in ops.into_iter().enumerate() {
            let rev = Revision::new(main, sub as i64);
            let key = match &op {
                Op::Put(key) | Op::Delete(key) => key,
            };
            let state = match pending.get(key) {
                Some(state) => *state,
                None => self.live_state(&key),
            };

            match op {
                Op::Put(key) => {
                    let (created, version) = match state {
                        Some((created, version)) => (created, version + 1),
                        None => (rev, 1),
                    };
                    pending.insert(key.clone(), Some((created, version)));
                    records.push(LogRecord::Put {
                        key,
                        rev,
                        created,
                        version,
                    });
                }
                Op::Delete(key) => {
                    if state.is_none() {
                        return Err(RevIndexError::RevisionNotFound);
                    }
                    pending.insert(key.clone(), None);
                    records.push(LogRecord::Tombstone { key, rev });
                }
            }
        }

        // Write to the log first (durability), then to the index.
        self.log.append_batch(&records)?;
        for record in &records {
            match record {
                LogRecord::Put { key, rev, .. } => self.index.put(key, *rev),
                LogRecord::Tombstone { key, rev } => self.index.tombstone(key, *rev)?,
                LogRecord::Compact { .. } => {}
            }
        }
        self.current = Revision::new(main, records.len() as i64 - 1);
        Ok(main)
    }

    /// State of `key` as of `at`, or of the current revision if `None`.
    pub fn get(&self, key: &[u8], at: Option<i64>) -> Result<RevisionInfo> {
        let at = self.check_read_rev(at)?;
        self.index.get(key, at)
    }

    /// Keys in `[start, end)` visible at `at`, with their revisions.
    pub fn range(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        at: Option<i64>,
    ) -> Result<Vec<(Key, Revision)>> {
        let at = self.check_read_rev(at)?;
        Ok(self.index.range(start, end, at))
    }

    /// Compact history below main revision `rev` and reclaim the dropped
    /// revisions from the log. Returns the revisions dropped from the index.
    ///
    /// The boundary takes effect as soon as the index is compacted. If the
    /// log rewrite then fails, the error is returned and the dropped
    /// revisions are reclaimed by the next successful compaction.
    pub fn compact(&mut self, rev: i64) -> Result<BTreeSet<Revision>> {
        if rev <= self.compacted {
            return Err(RevIndexError::Compacted {
                requested: rev,
                compacted: self.compacted,
            });
        }
        if rev > self.current.main {
            return Err(RevIndexError::FutureRevision {
                requested: rev,
                current: self.current.main,
            });
        }

        let removed = self.index.compact(rev)?;
        self.compacted = rev;

        self.unreclaimed.extend(removed.iter().copied());
        if let Err(err) = self.log.rewrite(&self.unreclaimed, rev) {
            log::error!(
                "revindex: log rewrite at {} failed, {} revisions left unreclaimed: {}",
                rev,
                self.unreclaimed.len(),
                err
            );
            return Err(err);
        }
        self.unreclaimed.clear();
        Ok(removed)
    }

    /// Compact to the boundary the retention policy asks for, if it moved.
    pub fn maybe_compact(&mut self) -> Result<Option<BTreeSet<Revision>>> {
        let boundary = match &self.policy {
            Some(policy) => policy.boundary(self.current.main),
            None => None,
        };
        match boundary {
            Some(rev) if rev > self.compacted => {
                if let Some(policy) = &self.policy {
                    log::debug!("revindex: {} picked boundary {}", policy.name(), rev);
                }
                self.compact(rev).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Last allocated main revision.
    pub fn current_revision(&self) -> i64 {
        self.current.main
    }

    /// Current compaction boundary, 0 if never compacted.
    pub fn compacted_revision(&self) -> i64 {
        self.compacted
    }

    /// Handle to the index for concurrent readers.
    pub fn index(&self) -> Arc<TreeIndex> {
        Arc::clone(&self.index)
    }

    /// Number of keys with surviving history.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn live_state(&self, key: &[u8]) -> Option<(Revision, i64)> {
        self.index
            .get(key, self.current.main)
            .ok()
            .map(|info| (info.created, info.version))
    }

    fn check_read_rev(&self, at: Option<i64>) -> Result<i64> {
        let at = at.unwrap_or(self.current.main);
        if at > self.current.main {
            return Err(RevIndexError::FutureRevision {
                requested: at,
                current: self.current.main,
            });
        }
        if at < self.compacted {
            return Err(RevIndexError::Compacted {
                requested: at,
                compacted: self.compacted,
            });
        }
        Ok(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, RevStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RevStore::open(Config::new(dir.path()).with_sync_writes(false)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_revisions_allocated_in_order() {
        let (_dir, mut store) = temp_store();
        assert_eq!(store.current_revision(), 0);
        assert_eq!(store.put(b"a".to_vec()).unwrap(), Revision::new(1, 0));
        assert_eq!(store.put(b"b".to_vec()).unwrap(), Revision::new(2, 0));
        assert_eq!(store.delete(b"a".to_vec()).unwrap(), Revision::new(3, 0));
        assert_eq!(store.current_revision(), 3);
    }

    #[test]
    fn test_txn_uses_sub_revisions() {
        let (_dir, mut store) = temp_store();
        let main = store
            .txn(vec![
                Op::Put(b"a".to_vec()),
                Op::Put(b"a".to_vec()),
                Op::Put(b"b".to_vec()),
            ])
            .unwrap();
        assert_eq!(main, 1);

        let info = store.get(b"a", None).unwrap();
        assert_eq!(info.modified, Revision::new(1, 1));
        assert_eq!(info.created, Revision::new(1, 0));
        assert_eq!(info.version, 2);
        assert_eq!(store.get(b"b", None).unwrap().modified, Revision::new(1, 2));
    }

    #[test]
    fn test_txn_delete_then_recreate() {
        let (_dir, mut store) = temp_store();
        store.put(b"k".to_vec()).unwrap();
        store
            .txn(vec![Op::Delete(b"k".to_vec()), Op::Put(b"k".to_vec())])
            .unwrap();

        let info = store.get(b"k", None).unwrap();
        assert_eq!(info.created, Revision::new(2, 1));
        assert_eq!(info.version, 1);
    }

    #[test]
    fn test_failed_delete_leaves_store_untouched() {
        let (_dir, mut store) = temp_store();
        store.put(b"a".to_vec()).unwrap();

        let err = store
            .txn(vec![Op::Put(b"a".to_vec()), Op::Delete(b"missing".to_vec())])
            .unwrap_err();
        assert!(matches!(err, RevIndexError::RevisionNotFound));
        assert_eq!(store.current_revision(), 1);
        assert_eq!(store.get(b"a", None).unwrap().version, 1);
    }

    #[test]
    fn test_empty_txn_allocates_nothing() {
        let (_dir, mut store) = temp_store();
        assert_eq!(store.txn(Vec::new()).unwrap(), 0);
        assert_eq!(store.current_revision(), 0);
    }

    #[test]
    fn test_read_revision_bounds() {
        let (_dir, mut store) = temp_store();
        for _ in 0..5 {
            store.put(b"a".to_vec()).unwrap();
        }
        assert!(matches!(
            store.get(b"a", Some(6)),
            Err(RevIndexError::FutureRevision { requested: 6, current: 5 })
        ));

        store.compact(3).unwrap();
        assert!(matches!(
            store.get(b"a", Some(2)),
            Err(RevIndexError::Compacted { requested: 2, compacted: 3 })
        ));
        assert_eq!(store.get(b"a", Some(3)).unwrap().version, 3);
    }

    #[test]
    fn test_compact_rejects_stale_and_future() {
        let (_dir, mut store) = temp_store();
        store.put(b"a".to_vec()).unwrap();
        store.put(b"a".to_vec()).unwrap();

        assert!(matches!(
            store.compact(3),
            Err(RevIndexError::FutureRevision { .. })
        ));
        store.compact(2).unwrap();
        assert!(matches!(
            store.compact(2),
            Err(RevIndexError::Compacted { .. })
        ));
    }

    #[test]
    fn test_maybe_compact_follows_policy() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path())
            .with_sync_writes(false)
            .with_retain_revisions(2);
        let mut store = RevStore::open(config).unwrap();

        store.put(b"a".to_vec()).unwrap();
        store.put(b"a".to_vec()).unwrap();
        assert!(store.maybe_compact().unwrap().is_none());

        store.put(b"a".to_vec()).unwrap();
        store.put(b"a".to_vec()).unwrap();
        let removed = store.maybe_compact().unwrap().unwrap();
        assert_eq!(removed, BTreeSet::from([Revision::new(1, 0)]));
        assert_eq!(store.compacted_revision(), 2);
        assert!(store.maybe_compact().unwrap().is_none());
    }

    #[test]
    fn test_failed_log_rewrite_keeps_boundary() {
        let (dir, mut store) = temp_store();
        // A directory where the rewrite wants its scratch file.
        let scratch = dir.path().join("revindex.compact");
        std::fs::create_dir(&scratch).unwrap();
        for _ in 0..3 {
            store.put(b"a".to_vec()).unwrap();
        }

        assert!(matches!(store.compact(3), Err(RevIndexError::Io(_))));
        assert_eq!(store.compacted_revision(), 3);
        assert!(matches!(
            store.get(b"a", Some(1)),
            Err(RevIndexError::Compacted { requested: 1, compacted: 3 })
        ));
        assert_eq!(store.get(b"a", Some(3)).unwrap().version, 3);
        assert!(matches!(
            store.compact(3),
            Err(RevIndexError::Compacted { .. })
        ));

        std::fs::remove_dir(&scratch).unwrap();
        store.put(b"a".to_vec()).unwrap();
        let removed = store.compact(4).unwrap();
        assert_eq!(removed, BTreeSet::from([Revision::new(3, 0)]));

        let records = RevisionLog::recover(&dir.path().join("revindex.log")).unwrap();
        assert!(records
            .iter()
            .filter_map(LogRecord::revision)
            .all(|rev| rev.main > 3));

        let index = store.index();
        drop(store);
        let reopened =
            RevStore::open(Config::new(dir.path()).with_sync_writes(false)).unwrap();
        assert_eq!(reopened.compacted_revision(), 4);
        assert!(reopened.index().equal(&index));
    }
}
