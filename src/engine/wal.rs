//! REVINDEX - Revision Log
//! Append-only record of every revision applied to the index.
//! The index has no persisted form of its own; on startup it is
//! rebuilt by replaying this log.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RevIndexError};
use crate::types::{Key, Revision};

use super::tree_index::Index;

const LEN_BYTES: usize = 4;
const CRC_BYTES: usize = 4;

/// One entry of the revision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    /// `key` was written at `rev`. `created` and `version` describe the
    /// key's generation as of this write.
    Put {
        key: Key,
        rev: Revision,
        created: Revision,
        version: i64,
    },
    /// `key` was deleted at `rev`.
    Tombstone { key: Key, rev: Revision },
    /// History below main revision `rev` was compacted away.
    Compact { rev: i64 },
}

impl LogRecord {
    /// Revision this record occupies, `None` for compaction markers.
    pub fn revision(&self) -> Option<Revision> {
        match self {
            LogRecord::Put { rev, .. } | LogRecord::Tombstone { rev, .. } => Some(*rev),
            LogRecord::Compact { .. } => None,
        }
    }
}

/// State recovered by [`replay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayState {
    /// Greatest revision found in the log.
    pub last: Revision,
    /// Latest compaction boundary found in the log, 0 if none.
    pub compacted: i64,
}

/// Append-only revision log.
///
/// ## Binary Format (per record)
/// ```text
/// [payload_len: 4 bytes (LE)][payload: bincode LogRecord][crc32 of len+payload: 4 bytes (LE)]
/// ```
pub struct RevisionLog {
    /// Path to the log file on disk.
    path: PathBuf,
    /// File handle opened for appending.
    file: File,
    /// Whether every append is followed by fsync.
    sync_writes: bool,
}

impl RevisionLog {
    /// Open or create the log at `path`, returning every intact record.
    /// A torn trailing record left by a crash is truncated away.
    pub fn open(path: PathBuf, sync_writes: bool) -> Result<(Self, Vec<LogRecord>)> {
        let (records, valid_len) = Self::read_records(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            log::warn!(
                "revision log {:?}: truncating {} bytes of torn tail",
                path,
                file_len - valid_len
            );
            file.set_len(valid_len)?;
        }

        Ok((
            Self {
                path,
                file,
                sync_writes,
            },
            records,
        ))
    }

    /// Read every intact record from the log at `path` without opening it
    /// for writing. A missing file reads as empty.
    pub fn recover(path: &Path) -> Result<Vec<LogRecord>> {
        Self::read_records(path).map(|(records, _)| records)
    }

    /// Append records with one write and at most one fsync, so a batch
    /// sharing a main revision lands together.
    ///
    /// A failed write is cut back to the length the log had before it, so
    /// no partial frame is left for later appends to land behind.
    pub fn append_batch(&mut self, records: &[LogRecord]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            buf.extend_from_slice(&Self::encode(record)?);
        }

        let start = self.file.metadata()?.len();
        let written = match self.file.write_all(&buf) {
            Ok(()) if self.sync_writes => self.file.sync_all(),
            other => other,
        };
        if let Err(err) = written {
            if let Err(rollback) = self.truncate_to(start) {
                log::error!(
                    "revision log {:?}: could not roll back failed append: {}",
                    self.path,
                    rollback
                );
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Cut the log back to `len` bytes and reopen the append handle.
    fn truncate_to(&mut self, len: u64) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.set_len(len)?;
        self.file = file;
        Ok(())
    }

    /// Rewrite the log without the `removed` revisions, recording `boundary`
    /// as the new compaction point. Returns how many records were dropped.
    ///
    /// The new log is written beside the old one and renamed over it.
    pub fn rewrite(&mut self, removed: &BTreeSet<Revision>, boundary: i64) -> Result<usize> {
        let (records, _) = Self::read_records(&self.path)?;
        let tmp_path = self.path.with_extension("compact");

        let mut buf = Self::encode(&LogRecord::Compact { rev: boundary })?;
        let mut dropped = 0;
        for record in &records {
            match record.revision() {
                Some(rev) if !removed.contains(&rev) => {
                    buf.extend_from_slice(&Self::encode(record)?);
                }
                Some(_) => dropped += 1,
                None => {}
            }
        }

        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        log::info!(
            "revision log {:?}: rewritten at boundary {}, {} records dropped",
            self.path,
            boundary,
            dropped
        );
        Ok(dropped)
    }

    fn encode(record: &LogRecord) -> Result<Vec<u8>> {
        let payload = bincode::serialize(record)?;
        let mut buf = Vec::with_capacity(LEN_BYTES + payload.len() + CRC_BYTES);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decode all complete records. Returns them with the byte length they
    /// span; anything after that is an incomplete trailing record.
    fn read_records(path: &Path) -> Result<(Vec<LogRecord>, u64)> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let rest = &data[offset..];
            if rest.len() < LEN_BYTES {
                break;
            }
            let mut len_bytes = [0u8; LEN_BYTES];
            len_bytes.copy_from_slice(&rest[..LEN_BYTES]);
            let payload_len = u32::from_le_bytes(len_bytes) as usize;
            let frame_len = LEN_BYTES + payload_len + CRC_BYTES;
            if rest.len() < frame_len {
                break;
            }

            let body = &rest[..LEN_BYTES + payload_len];
            let mut crc_bytes = [0u8; CRC_BYTES];
            crc_bytes.copy_from_slice(&rest[LEN_BYTES + payload_len..frame_len]);
            if crc32fast::hash(body) != u32::from_le_bytes(crc_bytes) {
                return Err(RevIndexError::Corruption(format!(
                    "CRC mismatch in revision log {:?} at offset {}",
                    path, offset
                )));
            }

            records.push(bincode::deserialize(&body[LEN_BYTES..])?);
            offset += frame_len;
        }

        if offset < data.len() {
            log::warn!(
                "revision log {:?}: ignoring incomplete record at offset {}",
                path,
                offset
            );
        }
        Ok((records, offset as u64))
    }
}

/// Rebuild `index` from log records in log order.
///
/// The first put seen for a key seeds it through `restore` with the
/// creation revision and version the record carries, since compaction may
/// have removed the revisions before it. Later records replay as plain
/// puts and tombstones, and must carry a revision newer than the key's
/// previous record; anything else is `Corruption`.
pub fn replay<I: Index>(records: &[LogRecord], index: &I) -> Result<ReplayState> {
    let mut state = ReplayState::default();
    // Last revision replayed per key, mirroring each KeyIndex's `modified`.
    let mut modified: HashMap<&[u8], Revision> = HashMap::new();

    for record in records {
        match record {
            LogRecord::Put {
                key,
                rev,
                created,
                version,
            } => match modified.insert(key.as_slice(), *rev) {
                None => index.restore(key, *created, *rev, *version),
                Some(prev) if prev < *rev => index.put(key, *rev),
                Some(prev) => {
                    return Err(RevIndexError::Corruption(format!(
                        "put at {} for key {:?} does not follow {}",
                        rev, key, prev
                    )));
                }
            },
            LogRecord::Tombstone { key, rev } => {
                if let Some(prev) = modified.insert(key.as_slice(), *rev) {
                    if prev >= *rev {
                        return Err(RevIndexError::Corruption(format!(
                            "tombstone at {} for key {:?} does not follow {}",
                            rev, key, prev
                        )));
                    }
                }
                index.tombstone(key, *rev).map_err(|_| {
                    RevIndexError::Corruption(format!(
                        "tombstone at {} for key {:?} with no live generation",
                        rev, key
                    ))
                })?;
            }
            LogRecord::Compact { rev } => {
                state.compacted = state.compacted.max(*rev);
            }
        }
        if let Some(rev) = record.revision() {
            state.last = state.last.max(rev);
        }
    }

    log::info!(
        "revision log replayed: {} records, last revision {}, compacted at {}",
        records.len(),
        state.last,
        state.compacted
    );
    Ok(state)
}
