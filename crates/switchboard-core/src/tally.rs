//! Per-tool success/failure tallies
//!
//! Volatile, process-local counters that bias ranking toward tools that have
//! recently produced accepted answers. Counters are atomics so concurrent
//! routes never lose increments; a slightly stale read during ranking is
//! acceptable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::ToolRegistry;

#[derive(Debug, Default)]
struct Counter {
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of one tool's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub successes: u64,
    pub failures: u64,
}

impl Tally {
    /// Multiplicative ranking bias in `[-max_bias, max_bias]`.
    ///
    /// `learning_rate * (s - f) / (s + f + 1)`: zero for an unused tool,
    /// approaching `learning_rate` as successes dominate.
    pub fn bias(&self, learning_rate: f64, max_bias: f64) -> f64 {
        let s = self.successes as f64;
        let f = self.failures as f64;
        let max_bias = max_bias.abs();
        (learning_rate * (s - f) / (s + f + 1.0)).clamp(-max_bias, max_bias)
    }
}

/// Success/failure counters for every registered tool
#[derive(Debug, Default)]
pub struct ToolTallies {
    counters: HashMap<String, Counter>,
}

impl ToolTallies {
    /// Fresh zeroed counters for every tool in the registry
    pub fn for_registry(registry: &ToolRegistry) -> Self {
        Self {
            counters: registry
                .iter()
                .map(|t| (t.name.clone(), Counter::default()))
                .collect(),
        }
    }

    pub fn record_success(&self, tool: &str) {
        match self.counters.get(tool) {
            Some(c) => {
                c.successes.fetch_add(1, Ordering::Relaxed);
            }
            None => debug!("Ignoring success for unknown tool {}", tool),
        }
    }

    pub fn record_failure(&self, tool: &str) {
        match self.counters.get(tool) {
            Some(c) => {
                c.failures.fetch_add(1, Ordering::Relaxed);
            }
            None => debug!("Ignoring failure for unknown tool {}", tool),
        }
    }

    /// Current counters; unknown tools read as zero
    pub fn get(&self, tool: &str) -> Tally {
        self.counters
            .get(tool)
            .map(|c| Tally {
                successes: c.successes.load(Ordering::Relaxed),
                failures: c.failures.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        for c in self.counters.values() {
            c.successes.store(0, Ordering::Relaxed);
            c.failures.store(0, Ordering::Relaxed);
        }
    }
}
