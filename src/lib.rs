//! REVINDEX - Multi-Version Revision Index
//!
//! An in-memory, ordered index mapping every key to its complete revision
//! history, answering point and range lookups as of any retained revision.
//! Values live elsewhere; the index only tracks which revision of a key a
//! read at a given revision should see.
//!
//! ## Features
//! - **Generational history**: each key keeps one generation per
//!   create/delete lifetime
//! - **As-of reads**: point and half-open range lookups at any retained revision
//! - **Compaction**: drops unreachable history and reports reclaimable revisions
//! - **Concurrency**: `RwLock`-guarded `BTreeMap`, readers run in parallel
//! - **Revision Log**: CRC32-framed append-only log the index is rebuilt from
//! - **Retention**: pluggable policy choosing the compaction boundary
//! - **Metrics**: lock-free atomic counters for observability
//!
//! ## Example
//! ```no_run
//! use revindex::{config::Config, engine::RevStore};
//!
//! let mut store = RevStore::open(Config::default()).unwrap();
//!
//! store.put(b"key".to_vec()).unwrap();
//! store.put(b"key".to_vec()).unwrap();
//! assert_eq!(store.get(b"key", Some(1)).unwrap().version, 1);
//! assert_eq!(store.get(b"key", None).unwrap().version, 2);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod types;
