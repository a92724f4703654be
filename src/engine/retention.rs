//! REVINDEX - Retention Policy
//! Decides where the compaction boundary lies. The index never picks
//! a boundary itself; the store asks its policy.

/// Trait defining a retention policy.
pub trait RetentionPolicy: Send + Sync {
    /// Compaction boundary for a store whose newest main revision is
    /// `current`, or `None` if nothing should be compacted yet.
    fn boundary(&self, current: i64) -> Option<i64>;

    /// Returns the human-readable name of this policy.
    fn name(&self) -> &str;
}

/// Keep the newest `n` main revisions readable.
///
/// ## Example
/// ```
/// use revindex::engine::retention::{KeepLastRevisions, RetentionPolicy};
///
/// let policy = KeepLastRevisions::new(10);
/// assert_eq!(policy.boundary(25), Some(15));
/// assert_eq!(policy.boundary(10), None);
/// ```
pub struct KeepLastRevisions {
    retain: u64,
}

impl KeepLastRevisions {
    pub fn new(retain: u64) -> Self {
        Self { retain }
    }
}

impl RetentionPolicy for KeepLastRevisions {
    fn boundary(&self, current: i64) -> Option<i64> {
        let retain = i64::try_from(self.retain).ok()?;
        let boundary = current.checked_sub(retain)?;
        (boundary > 0).then_some(boundary)
    }

    fn name(&self) -> &str {
        "KeepLastRevisions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_trails_current() {
        let policy = KeepLastRevisions::new(5);
        assert_eq!(policy.boundary(0), None);
        assert_eq!(policy.boundary(5), None);
        assert_eq!(policy.boundary(6), Some(1));
        assert_eq!(policy.boundary(100), Some(95));
    }

    #[test]
    fn test_huge_retention_never_compacts() {
        let policy = KeepLastRevisions::new(u64::MAX);
        assert_eq!(policy.boundary(i64::MAX), None);
    }

    #[test]
    fn test_name() {
        assert_eq!(KeepLastRevisions::new(1).name(), "KeepLastRevisions");
    }
}
