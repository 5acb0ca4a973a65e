//! Append-only operation log used to replay counter updates.
//!
//! Each origin node owns exactly one log and is the only writer to it. Every
//! other node holds a copy that is, at any instant, a prefix of the origin's
//! log; catching up is a matter of appending the missing tail.

/// One accepted `add` operation: the signed delta it contributed.
pub type OplogEntry = i64;

/// The part of a remote log that was missing locally and has now been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedTail {
    /// Number of entries appended
    pub appended: usize,
    /// Sum of the appended entries
    pub sum: i64,
}

/// Ordered, index-addressable sequence of [`OplogEntry`] values.
///
/// An entry's index is its position and is never reused or reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Oplog {
    entries: Vec<OplogEntry>,
}

impl Oplog {
    /// Creates an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in the log
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in append order
    pub fn entries(&self) -> &[OplogEntry] {
        &self.entries
    }

    /// Entry at `index`, if present
    pub fn get(&self, index: usize) -> Option<OplogEntry> {
        self.entries.get(index).copied()
    }

    /// Appends a single entry
    pub fn push(&mut self, delta: OplogEntry) {
        self.entries.push(delta);
    }

    /// Sum of every entry, wrapping on overflow
    pub fn sum(&self) -> i64 {
        wrapping_sum(&self.entries)
    }

    /// Catches this log up with a remote copy of the same origin's log.
    ///
    /// Entries at positions beyond the local length are appended. A remote log
    /// that is not longer than the local one carries nothing new and yields
    /// `None`.
    pub fn catch_up(&mut self, remote: &[OplogEntry]) -> Option<AppliedTail> {
        if remote.len() <= self.entries.len() {
            return None;
        }

        let tail = &remote[self.entries.len()..];
        let sum = wrapping_sum(tail);
        self.entries.extend_from_slice(tail);

        Some(AppliedTail {
            appended: tail.len(),
            sum,
        })
    }
}

fn wrapping_sum(entries: &[OplogEntry]) -> i64 {
    entries.iter().fold(0, |acc, &delta| acc.wrapping_add(delta))
}

impl From<Vec<OplogEntry>> for Oplog {
    fn from(entries: Vec<OplogEntry>) -> Self {
        Oplog { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_sum() {
        let mut log = Oplog::new();
        assert!(log.is_empty());
        assert_eq!(log.sum(), 0);

        log.push(5);
        log.push(-2);

        assert_eq!(log.len(), 2);
        assert_eq!(log.sum(), 3);
        assert_eq!(log.get(0), Some(5));
        assert_eq!(log.get(1), Some(-2));
        assert_eq!(log.get(2), None);
    }

    #[test]
    fn test_catch_up_appends_missing_tail() {
        let mut log = Oplog::from(vec![1, 2]);

        let applied = log.catch_up(&[1, 2, 3, 4]).unwrap();

        assert_eq!(applied.appended, 2);
        assert_eq!(applied.sum, 7);
        assert_eq!(log.entries(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_catch_up_with_shorter_or_equal_log_is_noop() {
        let mut log = Oplog::from(vec![1, 2, 3]);

        assert_eq!(log.catch_up(&[1, 2]), None);
        assert_eq!(log.catch_up(&[1, 2, 3]), None);
        assert_eq!(log.catch_up(&[]), None);
        assert_eq!(log.entries(), &[1, 2, 3]);
    }

    #[test]
    fn test_catch_up_is_idempotent() {
        let mut log = Oplog::new();
        let remote = [10, -4, 6];

        assert!(log.catch_up(&remote).is_some());
        assert!(log.catch_up(&remote).is_none());
        assert_eq!(log.sum(), 12);
    }

    #[test]
    fn test_tail_sum_wraps_instead_of_panicking() {
        let mut log = Oplog::new();

        let applied = log.catch_up(&[i64::MAX, 1]).unwrap();

        assert_eq!(applied.sum, i64::MIN);
        assert_eq!(log.sum(), i64::MIN);
    }
}
