//! REVINDEX - Core Type Definitions
//! Defines fundamental types used across the index and the store.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RevIndexError};

/// Key type for the index.
/// Using Vec<u8> allows arbitrary binary keys, ordered bytewise.
pub type Key = Vec<u8>;

/// Length of an encoded revision: 8 bytes main, a `_` separator, 8 bytes sub.
pub const REV_BYTES_LEN: usize = 8 + 1 + 8;

const REV_SEPARATOR: u8 = b'_';

/// A point in the store's global modification history.
///
/// `main` is shared by every change of one transaction, `sub` orders the
/// changes inside it. The derived ordering compares `main` first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision {
    pub main: i64,
    pub sub: i64,
}

impl Revision {
    pub const fn new(main: i64, sub: i64) -> Self {
        Self { main, sub }
    }

    /// Encode as 17 bytes whose bytewise order matches revision order
    /// for non-negative revisions.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REV_BYTES_LEN);
        buf.put_i64(self.main);
        buf.put_u8(REV_SEPARATOR);
        buf.put_i64(self.sub);
        buf
    }

    /// Decode the form produced by [`Revision::to_bytes`].
    pub fn from_bytes(mut raw: &[u8]) -> Result<Self> {
        if raw.len() != REV_BYTES_LEN {
            return Err(RevIndexError::Corruption(format!(
                "revision must be {} bytes, got {}",
                REV_BYTES_LEN,
                raw.len()
            )));
        }
        let main = raw.get_i64();
        if raw.get_u8() != REV_SEPARATOR {
            return Err(RevIndexError::Corruption(
                "missing revision separator".to_string(),
            ));
        }
        let sub = raw.get_i64();
        Ok(Self { main, sub })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.main, self.sub)
    }
}

/// Result of an as-of lookup on a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionInfo {
    /// Greatest revision of the key not exceeding the requested revision.
    pub modified: Revision,
    /// Creation revision of the generation `modified` belongs to.
    pub created: Revision,
    /// 1-based position of `modified` within its generation.
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_main_then_sub() {
        assert!(Revision::new(1, 5) < Revision::new(2, 0));
        assert!(Revision::new(2, 0) < Revision::new(2, 1));
        assert_eq!(Revision::new(3, 3), Revision::new(3, 3));
    }

    #[test]
    fn test_bytes_layout() {
        let raw = Revision::new(1, 2).to_bytes();
        assert_eq!(raw.len(), REV_BYTES_LEN);
        assert_eq!(raw[8], b'_');
        assert_eq!(raw[7], 1);
        assert_eq!(raw[16], 2);
        assert_eq!(Revision::from_bytes(&raw).unwrap(), Revision::new(1, 2));
    }

    #[test]
    fn test_bytes_preserve_order() {
        let a = Revision::new(1, 300).to_bytes();
        let b = Revision::new(2, 0).to_bytes();
        let c = Revision::new(2, 1).to_bytes();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_from_bytes_rejects_malformed() {
        assert!(matches!(
            Revision::from_bytes(&[0u8; 5]),
            Err(RevIndexError::Corruption(_))
        ));

        let mut raw = Revision::new(4, 0).to_bytes();
        raw[8] = b'-';
        assert!(matches!(
            Revision::from_bytes(&raw),
            Err(RevIndexError::Corruption(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Revision::new(7, 2).to_string(), "7.2");
    }
}
