//! Confidence ranking
//!
//! Turns raw match scores into confidences in [0, 1] and orders candidates
//! best-first. Each tool is normalized against its own maximum score, so a
//! tool with five keywords that all matched scores 1.0 no matter how many
//! keywords other tools carry.

use std::cmp::Ordering;

use tracing::debug;

use crate::config::RouterConfig;
use crate::matcher::Candidate;
use crate::tally::ToolTallies;

/// Normalize, bias, flag viability and sort.
///
/// Order: confidence descending, then learning bias descending, then
/// registration order. Identical input with unchanged tallies always yields
/// the same order.
pub fn rank(
    mut candidates: Vec<Candidate>,
    tallies: &ToolTallies,
    config: &RouterConfig,
) -> Vec<Candidate> {
    for c in &mut candidates {
        let base = if c.max_score > 0.0 {
            c.raw_score / c.max_score
        } else {
            0.0
        };
        c.bias = if config.enable_learning {
            tallies
                .get(&c.tool)
                .bias(config.learning_rate, config.max_bias)
        } else {
            0.0
        };
        c.confidence = (base * (1.0 + c.bias)).clamp(0.0, 1.0);
        c.viable = c.confidence >= config.viability_threshold;
    }

    candidates.sort_by(rank_order);

    if let Some(best) = candidates.first() {
        debug!(
            "Best candidate {} at {:.2} ({} of {} viable)",
            best.tool,
            best.confidence,
            candidates.iter().filter(|c| c.viable).count(),
            candidates.len()
        );
    }
    candidates
}

/// Compare two ranked candidates the way `rank` orders them
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.bias.total_cmp(&a.bias))
        .then_with(|| a.index.cmp(&b.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StaticCapability;
    use crate::registry::{ToolDescriptor, ToolRegistry};
    use std::sync::Arc;

    fn candidate(tool: &str, index: usize, raw: f64, max: f64) -> Candidate {
        Candidate {
            tool: tool.to_string(),
            index,
            raw_score: raw,
            max_score: max,
            confidence: 0.0,
            bias: 0.0,
            matched_keywords: vec![],
            viable: false,
        }
    }

    fn tallies(names: &[&str]) -> ToolTallies {
        let mut registry = ToolRegistry::new();
        for name in names {
            registry
                .register(ToolDescriptor::new(*name, "", Arc::new(StaticCapability::new("x"))))
                .unwrap();
        }
        ToolTallies::for_registry(&registry)
    }

    #[test]
    fn test_normalizes_per_tool() {
        let t = tallies(&["small", "big"]);
        let ranked = rank(
            vec![candidate("big", 1, 5.0, 50.0), candidate("small", 0, 5.0, 5.0)],
            &t,
            &RouterConfig::default(),
        );
        assert_eq!(ranked[0].tool, "small");
        assert_eq!(ranked[0].confidence, 1.0);
        assert!((ranked[1].confidence - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_flags_but_keeps() {
        let t = tallies(&["a", "b"]);
        let ranked = rank(
            vec![candidate("a", 0, 1.0, 10.0), candidate("b", 1, 4.0, 10.0)],
            &t,
            &RouterConfig::default(),
        );
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].viable);
        assert!(!ranked[1].viable);
    }

    #[test]
    fn test_ties_broken_by_registration_order() {
        let t = tallies(&["first", "second"]);
        let ranked = rank(
            vec![candidate("second", 1, 1.0, 2.0), candidate("first", 0, 1.0, 2.0)],
            &t,
            &RouterConfig::default(),
        );
        assert_eq!(ranked[0].tool, "first");
        assert_eq!(ranked[1].tool, "second");
    }

    #[test]
    fn test_success_bias_wins_ties() {
        let t = tallies(&["first", "second"]);
        t.record_success("second");
        let ranked = rank(
            vec![candidate("first", 0, 2.0, 2.0), candidate("second", 1, 2.0, 2.0)],
            &t,
            &RouterConfig::default(),
        );
        // Both clamp to 1.0; bias decides.
        assert_eq!(ranked[0].confidence, 1.0);
        assert_eq!(ranked[1].confidence, 1.0);
        assert_eq!(ranked[0].tool, "second");
    }

    #[test]
    fn test_learning_disabled_ignores_tallies() {
        let t = tallies(&["first", "second"]);
        t.record_success("second");
        let config = RouterConfig {
            enable_learning: false,
            ..Default::default()
        };
        let ranked = rank(
            vec![candidate("first", 0, 1.0, 2.0), candidate("second", 1, 1.0, 2.0)],
            &t,
            &config,
        );
        assert_eq!(ranked[0].tool, "first");
        assert_eq!(ranked[0].bias, 0.0);
    }

    #[test]
    fn test_failures_lower_confidence() {
        let t = tallies(&["a"]);
        for _ in 0..5 {
            t.record_failure("a");
        }
        let ranked = rank(vec![candidate("a", 0, 1.0, 2.0)], &t, &RouterConfig::default());
        assert!(ranked[0].confidence < 0.5);
        assert!(ranked[0].confidence >= 0.0);
    }

    #[test]
    fn test_deterministic() {
        let t = tallies(&["a", "b", "c"]);
        let input = vec![
            candidate("c", 2, 1.0, 3.0),
            candidate("a", 0, 1.0, 3.0),
            candidate("b", 1, 2.0, 3.0),
        ];
        let one = rank(input.clone(), &t, &RouterConfig::default());
        let two = rank(input, &t, &RouterConfig::default());
        assert_eq!(one, two);
        let order: Vec<&str> = one.iter().map(|c| c.tool.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rank_order_matches_sort() {
        let a = Candidate { confidence: 0.9, ..candidate("a", 1, 0.0, 1.0) };
        let b = Candidate { confidence: 0.9, ..candidate("b", 0, 0.0, 1.0) };
        assert_eq!(rank_order(&b, &a), Ordering::Less);
    }
}
