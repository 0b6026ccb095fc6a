//! Latest known revision per document.

use couch_client::Revision;
use std::collections::HashMap;

/// Mainline revision of every document a worker has written.
///
/// Owned by a single worker; partitions never share ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionTracker {
    revisions: HashMap<String, Revision>,
}

impl RevisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `rev` as the latest revision of `id`, returning the previous one.
    pub fn record(&mut self, id: impl Into<String>, rev: Revision) -> Option<Revision> {
        self.revisions.insert(id.into(), rev)
    }

    pub fn get(&self, id: &str) -> Option<&Revision> {
        self.revisions.get(id)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_replaces_previous() {
        let mut tracker = RevisionTracker::new();
        assert!(tracker.is_empty());
        assert_eq!(tracker.record("a", Revision::new(1, "x")), None);
        assert_eq!(
            tracker.record("a", Revision::new(2, "y")),
            Some(Revision::new(1, "x"))
        );
        assert_eq!(tracker.get("a"), Some(&Revision::new(2, "y")));
        assert_eq!(tracker.get("b"), None);
        assert_eq!(tracker.len(), 1);
    }
}
