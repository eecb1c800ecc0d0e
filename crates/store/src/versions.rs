//! Logical version numbers.
//!
//! Versions come from a single process-wide counter rather than file
//! modification times, so two commits inside one clock tick still get
//! distinct, ordered versions. The counter is seeded from the wall clock so
//! versions issued after a restart stay above the ones issued before it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use common::Version;

#[derive(Debug)]
pub struct VersionClock {
    next: AtomicU64,
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionClock {
    pub fn new() -> Self {
        let seed = chrono::Utc::now().timestamp_micros().max(1) as u64;
        Self::starting_at(seed)
    }

    pub fn starting_at(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed.max(1)),
        }
    }

    /// Issue a version strictly greater than every one issued before.
    pub fn issue(&self) -> Version {
        Version(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// The version a path was last seen at, plus the on-disk facts it was
/// issued for. A stamp whose facts no longer match the file is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub version: Version,
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl Stamp {
    pub fn matches(&self, modified: Option<SystemTime>, len: u64) -> bool {
        self.modified == modified && self.len == len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_is_strictly_increasing() {
        let clock = VersionClock::starting_at(10);
        let a = clock.issue();
        let b = clock.issue();
        let c = clock.issue();
        assert_eq!(a, Version(10));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_never_issues_none() {
        let clock = VersionClock::starting_at(0);
        assert!(!clock.issue().is_none());
    }

    #[test]
    fn test_wall_clock_seed() {
        let clock = VersionClock::new();
        assert!(clock.issue().get() > 1_600_000_000_000_000);
    }

    #[test]
    fn test_stamp_matching() {
        let now = SystemTime::now();
        let stamp = Stamp {
            version: Version(3),
            modified: Some(now),
            len: 12,
        };
        assert!(stamp.matches(Some(now), 12));
        assert!(!stamp.matches(Some(now), 13));
        assert!(!stamp.matches(None, 12));
    }
}
