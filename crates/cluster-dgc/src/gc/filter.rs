//! Traversal filters.

use std::sync::Arc;

use crate::object_id::{ObjectId, ObjectIdSet};

/// Decides which referenced objects a traversal expands.
///
/// Roots are always marked; the filter only restricts the edges followed
/// from them.
#[derive(Debug, Clone, Default)]
pub enum TraversalFilter {
    /// Follow every edge.
    #[default]
    AcceptAll,
    /// Follow only edges into the given set.
    Within(Arc<ObjectIdSet>),
}

impl TraversalFilter {
    /// Filter restricted to `candidates`.
    #[must_use]
    pub const fn within(candidates: Arc<ObjectIdSet>) -> Self {
        Self::Within(candidates)
    }

    /// Whether the traversal should visit `referenced`.
    #[must_use]
    pub fn should_visit(&self, referenced: ObjectId) -> bool {
        match self {
            Self::AcceptAll => true,
            Self::Within(candidates) => candidates.contains(referenced),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all() {
        assert!(TraversalFilter::AcceptAll.should_visit(ObjectId::new(u64::MAX)));
    }

    #[test]
    fn test_within_candidates() {
        let candidates: ObjectIdSet = [101u64, 102, 103].into_iter().collect();
        let filter = TraversalFilter::within(Arc::new(candidates));
        assert!(filter.should_visit(ObjectId::new(102)));
        assert!(!filter.should_visit(ObjectId::new(5)));
    }
}
