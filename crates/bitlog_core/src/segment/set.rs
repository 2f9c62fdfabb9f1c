//! The engine's table of open segments.

use crate::segment::file::Segment;
use crate::types::SegmentId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every open segment, by id: the sealed ones plus the single active one.
#[derive(Debug)]
pub struct SegmentSet {
    /// Sealed segments in ascending id order.
    pub sealed: BTreeMap<SegmentId, Arc<Segment>>,
    /// The segment accepting appends.
    pub active: Arc<Segment>,
}

impl SegmentSet {
    /// Creates a set with no sealed segments.
    #[must_use]
    pub fn new(active: Arc<Segment>) -> Self {
        Self {
            sealed: BTreeMap::new(),
            active,
        }
    }

    /// Resolves an id to an open segment.
    #[must_use]
    pub fn get(&self, id: SegmentId) -> Option<Arc<Segment>> {
        if self.active.id() == id {
            Some(Arc::clone(&self.active))
        } else {
            self.sealed.get(&id).cloned()
        }
    }

    /// Sealed segments in ascending id order.
    #[must_use]
    pub fn sealed_snapshot(&self) -> Vec<Arc<Segment>> {
        self.sealed.values().cloned().collect()
    }

    /// Every segment, sealed first, in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Segment>> {
        self.sealed.values().chain(std::iter::once(&self.active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitlog_storage::InMemoryBackend;

    fn segment(id: u64, sealed: bool) -> Arc<Segment> {
        Arc::new(Segment::from_backend(
            SegmentId::new(id),
            Box::new(InMemoryBackend::new()),
            sealed,
        ))
    }

    #[test]
    fn resolves_sealed_and_active() {
        let mut set = SegmentSet::new(segment(12, false));
        set.sealed.insert(SegmentId::new(10), segment(10, true));
        set.sealed.insert(SegmentId::new(2), segment(2, true));

        assert!(set.get(SegmentId::new(12)).is_some());
        assert!(set.get(SegmentId::new(2)).is_some());
        assert!(set.get(SegmentId::new(4)).is_none());

        let ids: Vec<_> = set.iter().map(|s| s.id().as_u64()).collect();
        assert_eq!(ids, vec![2, 10, 12]);
    }
}
