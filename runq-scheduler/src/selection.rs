//! Runner selection strategies
//!
//! Given runners that all have enough memory and disk for a task, a strategy
//! picks the one to start it on.

use runq_core::domain::runner::RunnerState;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::pool::RunnerHandle;

/// A runner that passed the capacity checks, with the state it reported
#[derive(Debug, Clone)]
pub struct Candidate {
    pub handle: RunnerHandle,
    pub state: RunnerState,
}

/// Tie-break policy among qualifying runners
pub trait SelectionStrategy: Send + Sync {
    /// Pick one candidate; `None` only when `candidates` is empty
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate>;
}

/// Prefers the runner that started an application most recently
///
/// Warm runners have images and caches at hand; cold ones are left for when
/// the warm ones run out of capacity.
#[derive(Debug, Default)]
pub struct LastUsedStrategy;

impl SelectionStrategy for LastUsedStrategy {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates
            .iter()
            .max_by_key(|candidate| candidate.handle.last_usage_time())
    }
}

/// Cycles through candidates in order
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    next: AtomicUsize,
}

impl SelectionStrategy for RoundRobinStrategy {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    LastUsed,
    RoundRobin,
}

impl StrategyKind {
    pub fn build(self) -> Arc<dyn SelectionStrategy> {
        match self {
            StrategyKind::LastUsed => Arc::new(LastUsedStrategy),
            StrategyKind::RoundRobin => Arc::new(RoundRobinStrategy::default()),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-used" | "last_used" => Ok(StrategyKind::LastUsed),
            "round-robin" | "round_robin" => Ok(StrategyKind::RoundRobin),
            other => Err(format!("Unknown selection strategy '{}'", other)),
        }
    }
}
