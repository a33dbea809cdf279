//! Provider selection strategies.
//!
//! # Data Flow
//! ```text
//! Admitted candidates (ordered snapshot)
//!     → StrategyEngine::select(strategy)
//!         - round_robin.rs (cursor over candidates)
//!         - weighted.rs (weight-proportional random draw)
//!         - least_conn.rs (fewest connections / fastest / connections per weight)
//!         - random.rs (uniform draw)
//!         - hash.rs (stable hash of the affinity key)
//!         - adaptive.rs (pick one of the above from pool-wide load signals)
//!     → chosen candidate + the concrete strategy that chose it
//! ```
//!
//! # Design Decisions
//! - Strategies are pure functions of the candidate list, except the
//!   round-robin cursor
//! - Ties resolve to the first candidate in registration order
//! - Degenerate weights fall back to the first candidate, never divide by zero

pub mod adaptive;
pub mod hash;
pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod weighted;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BalancerError, Result};
use crate::provider::{ProviderInstance, SelectionContext};

use adaptive::Adaptive;
use hash::HashAffinity;
use least_conn::{LeastConnections, LeastResponseTime, WeightedLeastConnections};
use random::RandomChoice;
use round_robin::RoundRobin;
use weighted::WeightedRandom;

/// Selection strategy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    WeightedRoundRobin,
    WeightedRandom,
    LeastConnections,
    LeastResponseTime,
    #[default]
    WeightedLeastConnections,
    Random,
    Hash,
    Adaptive,
}

impl Strategy {
    pub const ALL: [Strategy; 9] = [
        Strategy::RoundRobin,
        Strategy::WeightedRoundRobin,
        Strategy::WeightedRandom,
        Strategy::LeastConnections,
        Strategy::LeastResponseTime,
        Strategy::WeightedLeastConnections,
        Strategy::Random,
        Strategy::Hash,
        Strategy::Adaptive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::WeightedRoundRobin => "weighted_round_robin",
            Strategy::WeightedRandom => "weighted_random",
            Strategy::LeastConnections => "least_connections",
            Strategy::LeastResponseTime => "least_response_time",
            Strategy::WeightedLeastConnections => "weighted_least_connections",
            Strategy::Random => "random",
            Strategy::Hash => "hash",
            Strategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| format!("unknown strategy: {}", s))
    }
}

/// A concrete selection rule over a non-empty candidate list.
pub trait SelectionStrategy: Send + Sync + fmt::Debug {
    /// Pick one candidate. Returns `None` only when `candidates` is empty.
    fn select<'a>(
        &self,
        candidates: &'a [ProviderInstance],
        context: &SelectionContext,
    ) -> Option<&'a ProviderInstance>;
}

/// One instance of every strategy, dispatched by `Strategy` key.
#[derive(Debug)]
pub struct StrategyEngine {
    round_robin: RoundRobin,
    weighted: WeightedRandom,
    least_connections: LeastConnections,
    least_response_time: LeastResponseTime,
    weighted_least_connections: WeightedLeastConnections,
    random: RandomChoice,
    hash: HashAffinity,
    adaptive: Adaptive,
}

impl StrategyEngine {
    /// Create an engine whose adaptive rule uses `load_threshold`.
    pub fn new(load_threshold: f64) -> Self {
        Self {
            round_robin: RoundRobin::new(),
            weighted: WeightedRandom::new(),
            least_connections: LeastConnections::new(),
            least_response_time: LeastResponseTime::new(),
            weighted_least_connections: WeightedLeastConnections::new(),
            random: RandomChoice::new(),
            hash: HashAffinity::new(),
            adaptive: Adaptive::new(load_threshold),
        }
    }

    /// Map `Adaptive` onto a concrete strategy for this candidate set.
    pub fn resolve(&self, strategy: Strategy, candidates: &[ProviderInstance]) -> Strategy {
        match strategy {
            Strategy::Adaptive => self.adaptive.resolve(candidates),
            other => other,
        }
    }

    fn implementation(&self, strategy: Strategy) -> &dyn SelectionStrategy {
        match strategy {
            Strategy::RoundRobin => &self.round_robin,
            Strategy::WeightedRoundRobin | Strategy::WeightedRandom => &self.weighted,
            Strategy::LeastConnections => &self.least_connections,
            Strategy::LeastResponseTime => &self.least_response_time,
            Strategy::WeightedLeastConnections => &self.weighted_least_connections,
            Strategy::Random => &self.random,
            Strategy::Hash => &self.hash,
            // `resolve` never yields Adaptive; keep the table total anyway.
            Strategy::Adaptive => &self.weighted_least_connections,
        }
    }

    /// Select a candidate, returning it with the concrete strategy used.
    pub fn select<'a>(
        &self,
        strategy: Strategy,
        candidates: &'a [ProviderInstance],
        context: &SelectionContext,
    ) -> Result<(Strategy, &'a ProviderInstance)> {
        let effective = self.resolve(strategy, candidates);
        self.implementation(effective)
            .select(candidates, context)
            .map(|chosen| (effective, chosen))
            .ok_or_else(|| BalancerError::NoProvidersAvailable {
                request_id: context.request_id.clone(),
            })
    }
}

/// Index of the first candidate minimising `key` (NaN sorts last).
pub(crate) fn first_min_by<F>(candidates: &[ProviderInstance], key: F) -> Option<&ProviderInstance>
where
    F: Fn(&ProviderInstance) -> f64,
{
    candidates
        .iter()
        .map(|c| (c, key(c)))
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(c, _)| c)
}


#[cfg(test)]
mod tests {
    use super::test_support::candidate;
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("round_robin".parse::<Strategy>().unwrap(), Strategy::RoundRobin);
        assert_eq!(
            "Weighted-Least-Connections".parse::<Strategy>().unwrap(),
            Strategy::WeightedLeastConnections
        );
        assert!("fastest".parse::<Strategy>().is_err());
        assert_eq!(Strategy::default(), Strategy::WeightedLeastConnections);
    }

    #[test]
    fn test_engine_rejects_empty_candidates() {
        let engine = StrategyEngine::new(0.8);
        let ctx = SelectionContext::new("req-empty");
        for strategy in Strategy::ALL {
            let err = engine.select(strategy, &[], &ctx).unwrap_err();
            assert_eq!(
                err,
                BalancerError::NoProvidersAvailable {
                    request_id: "req-empty".into()
                }
            );
        }
    }

    #[test]
    fn test_every_strategy_returns_a_candidate() {
        let engine = StrategyEngine::new(0.8);
        let candidates = vec![candidate("a", 10, 3, 200.0), candidate("b", 20, 1, 100.0)];
        let ctx = SelectionContext::new("req");
        for strategy in Strategy::ALL {
            let (effective, chosen) = engine.select(strategy, &candidates, &ctx).unwrap();
            assert_ne!(effective, Strategy::Adaptive);
            assert!(candidates.iter().any(|c| c.id == chosen.id));
        }
    }

    #[test]
    fn test_first_min_by_prefers_earliest_tie() {
        let candidates = vec![candidate("a", 1, 2, 0.0), candidate("b", 1, 2, 0.0)];
        let chosen = first_min_by(&candidates, |c| c.current_connections as f64).unwrap();
        assert_eq!(chosen.id, "a");
    }
}
