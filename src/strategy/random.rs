//! Uniform random selection.

use crate::provider::{ProviderInstance, SelectionContext};
use crate::strategy::SelectionStrategy;

#[derive(Debug, Default)]
pub struct RandomChoice;

impl RandomChoice {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for RandomChoice {
    fn select<'a>(
        &self,
        candidates: &'a [ProviderInstance],
        _context: &SelectionContext,
    ) -> Option<&'a ProviderInstance> {
        if candidates.is_empty() {
            return None;
        }
        candidates.get(fastrand::usize(..candidates.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::candidate;
    use std::collections::HashSet;

    #[test]
    fn test_random_covers_all_candidates() {
        let lb = RandomChoice::new();
        let ctx = SelectionContext::new("r");
        let candidates = vec![
            candidate("a", 1, 0, 0.0),
            candidate("b", 1, 0, 0.0),
            candidate("c", 1, 0, 0.0),
        ];
        let seen: HashSet<_> = (0..500)
            .map(|_| lb.select(&candidates, &ctx).unwrap().id.clone())
            .collect();
        assert_eq!(seen.len(), 3);
    }
}
