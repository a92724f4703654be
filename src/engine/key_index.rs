//! REVINDEX - Per-Key Revision History
//! Tracks every revision of a single key, split into generations.
//!
//! ## Generations
//! A generation is one lifetime of the key: it starts at the revision
//! that created the key and, unless it is the live generation, ends with
//! the tombstone revision that deleted it. Recreating a deleted key opens
//! a new generation.
//!
//! ```text
//! put(1) put(2) tombstone(3) put(4)
//!
//! generations: [ {1.0, 2.0, 3.0(t)}, {4.0} ]
//!                      ended              live
//! ```
//!
//! After a tombstone the history ends with an empty placeholder
//! generation, which the next `put` fills.

use std::collections::BTreeSet;

use crate::error::{Result, RevIndexError};
use crate::types::{Key, Revision, RevisionInfo};

/// One lifetime of a key, oldest revision first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    /// Number of puts made in this generation, tombstone included.
    /// Survives compaction, so versions stay stable after trimming.
    ver: i64,
    /// Revision that created the key in this generation.
    created: Revision,
    revs: Vec<Revision>,
}

impl Generation {
    pub fn is_empty(&self) -> bool {
        self.revs.is_empty()
    }

    pub fn created(&self) -> Revision {
        self.created
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revs
    }

    /// Position of the greatest revision whose main is `<= at_rev`.
    fn position_at(&self, at_rev: i64) -> Option<usize> {
        self.revs.iter().rposition(|rev| rev.main <= at_rev)
    }
}

/// Complete revision history of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIndex {
    key: Key,
    /// Latest revision applied to this key, tombstones included.
    modified: Revision,
    generations: Vec<Generation>,
}

impl KeyIndex {
    /// Create an index entry with no history.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modified: Revision::default(),
            generations: Vec::new(),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn modified(&self) -> Revision {
        self.modified
    }

    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// Append `rev` to the live generation, creating one if needed.
    ///
    /// # Panics
    /// If `rev` is not newer than the last revision applied to this key.
    /// Revisions are allocated monotonically by the caller, so this is a bug.
    pub fn put(&mut self, rev: Revision) {
        if !self.generations.is_empty() && rev <= self.modified {
            panic!(
                "revindex: put with unexpected smaller revision [{} / {}] for key {:?}",
                rev, self.modified, self.key
            );
        }

        if self.generations.is_empty() {
            self.generations.push(Generation::default());
        }
        let g = self.live_mut();
        if g.revs.is_empty() {
            g.created = rev;
        }
        g.revs.push(rev);
        g.ver += 1;
        self.modified = rev;
    }

    /// Seed the history from a log record without replaying the revisions
    /// before `modified`. On a key that already has history this is a plain
    /// `put(modified)`.
    pub fn restore(&mut self, created: Revision, modified: Revision, ver: i64) {
        if !self.generations.is_empty() {
            self.put(modified);
            return;
        }
        self.modified = modified;
        self.generations.push(Generation {
            ver,
            created,
            revs: vec![modified],
        });
    }

    /// End the live generation at `rev`.
    pub fn tombstone(&mut self, rev: Revision) -> Result<()> {
        match self.generations.last() {
            Some(g) if !g.is_empty() => {}
            _ => return Err(RevIndexError::RevisionNotFound),
        }
        self.put(rev);
        self.generations.push(Generation::default());
        Ok(())
    }

    /// Look up the state of the key as of main revision `at_rev`.
    pub fn get(&self, at_rev: i64) -> Result<RevisionInfo> {
        let g = self
            .find_generation(at_rev)
            .ok_or(RevIndexError::RevisionNotFound)?;
        let n = g.position_at(at_rev).ok_or(RevIndexError::RevisionNotFound)?;
        Ok(RevisionInfo {
            modified: g.revs[n],
            created: g.created,
            version: g.ver - (g.revs.len() - n - 1) as i64,
        })
    }

    /// Drop every revision that no read at or after `at_rev` can reach,
    /// adding each dropped revision to `removed`.
    ///
    /// Generations that were tombstoned at or before `at_rev` go entirely.
    /// In the first surviving generation, the greatest revision `<= at_rev`
    /// stays as the anchor and everything older goes.
    pub fn compact(&mut self, at_rev: i64, removed: &mut BTreeSet<Revision>) -> Result<()> {
        if self.generations.is_empty() {
            return Err(RevIndexError::CompactionInvariant(format!(
                "key {:?} has no history to compact",
                self.key
            )));
        }

        let last = self.generations.len() - 1;
        let mut i = 0;
        while i < last {
            let tomb = self.generations[i].revs.last().ok_or_else(|| {
                RevIndexError::CompactionInvariant(format!(
                    "empty generation {} before the live one for key {:?}",
                    i, self.key
                ))
            })?;
            if tomb.main > at_rev {
                break;
            }
            i += 1;
        }

        for g in self.generations.drain(..i) {
            removed.extend(g.revs);
        }

        let g = &mut self.generations[0];
        if let Some(n) = g.position_at(at_rev) {
            removed.extend(g.revs.drain(..n));
        }

        if self.generations.len() == 1 && self.generations[0].is_empty() {
            self.generations.clear();
        }
        Ok(())
    }

    /// True once compaction has removed every generation.
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn equal(&self, other: &KeyIndex) -> bool {
        self == other
    }

    fn live_mut(&mut self) -> &mut Generation {
        let last = self.generations.len() - 1;
        &mut self.generations[last]
    }

    /// Newest generation whose lifetime covers `at_rev`. `None` if the key
    /// did not exist yet, or had been deleted, at that revision.
    fn find_generation(&self, at_rev: i64) -> Option<&Generation> {
        let last = self.generations.len().checked_sub(1)?;
        for (i, g) in self.generations.iter().enumerate().rev() {
            let (first, tomb) = match (g.revs.first(), g.revs.last()) {
                (Some(first), Some(tomb)) => (first, tomb),
                _ => continue,
            };
            if i != last && tomb.main <= at_rev {
                return None;
            }
            if first.main <= at_rev {
                return Some(g);
            }
        }
        None
    }
}
