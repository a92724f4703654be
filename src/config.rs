//! REVINDEX - Store Configuration
//! Defines tunable parameters for the revision store.

use std::path::PathBuf;

use crate::error::{Result, RevIndexError};

/// Configuration for the revision store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for the revision log.
    pub data_dir: PathBuf,

    /// Whether to sync log writes to disk immediately (fsync).
    pub sync_writes: bool,

    /// Number of most recent main revisions kept by automatic compaction.
    /// `None` disables it.
    pub retain_revisions: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            sync_writes: true,
            retain_revisions: None,
        }
    }
}

impl Config {
    /// Create a new Config with a custom data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Enable or disable fsync on every log append.
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Keep only the last `n` main revisions when compacting automatically.
    pub fn with_retain_revisions(mut self, n: u64) -> Self {
        self.retain_revisions = Some(n);
        self
    }

    /// Reject settings the store cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.retain_revisions == Some(0) {
            return Err(RevIndexError::Config(
                "retain_revisions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = Config::new("/tmp/revs")
            .with_sync_writes(false)
            .with_retain_revisions(10);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/revs"));
        assert!(!config.sync_writes);
        assert_eq!(config.retain_revisions, Some(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retention_rejected() {
        let config = Config::default().with_retain_revisions(0);
        assert!(matches!(config.validate(), Err(RevIndexError::Config(_))));
    }
}
