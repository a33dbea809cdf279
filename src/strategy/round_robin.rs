//! Round-robin selection strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::provider::{ProviderInstance, SelectionContext};
use crate::strategy::SelectionStrategy;

/// Round-robin selector.
/// Stores an internal counter to rotate through candidates.
///
/// The cursor belongs to the selector, not to a candidate set: it advances on
/// every call and is reduced modulo the current candidate count, so filtered
/// or removed providers shift the cycle.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobin {
    fn select<'a>(
        &self,
        candidates: &'a [ProviderInstance],
        _context: &SelectionContext,
    ) -> Option<&'a ProviderInstance> {
        if candidates.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::candidate;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let ctx = SelectionContext::new("r");
        let candidates = vec![candidate("a", 1, 0, 0.0), candidate("b", 1, 0, 0.0)];

        let s1 = lb.select(&candidates, &ctx).unwrap();
        assert_eq!(s1.id, "a");

        let s2 = lb.select(&candidates, &ctx).unwrap();
        assert_eq!(s2.id, "b");

        let s3 = lb.select(&candidates, &ctx).unwrap();
        assert_eq!(s3.id, "a");
    }

    #[test]
    fn test_cursor_shifts_when_set_shrinks() {
        let lb = RoundRobin::new();
        let ctx = SelectionContext::new("r");
        let three = vec![
            candidate("a", 1, 0, 0.0),
            candidate("b", 1, 0, 0.0),
            candidate("c", 1, 0, 0.0),
        ];
        assert_eq!(lb.select(&three, &ctx).unwrap().id, "a");
        assert_eq!(lb.select(&three, &ctx).unwrap().id, "b");

        // Cursor is now 2; with two candidates that wraps to index 0.
        let two = vec![candidate("a", 1, 0, 0.0), candidate("c", 1, 0, 0.0)];
        assert_eq!(lb.select(&two, &ctx).unwrap().id, "a");
        assert_eq!(lb.select(&two, &ctx).unwrap().id, "c");
    }

    #[test]
    fn test_empty() {
        let lb = RoundRobin::new();
        assert!(lb.select(&[], &SelectionContext::new("r")).is_none());
    }
}
