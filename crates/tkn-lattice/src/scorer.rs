//! Hub-scoring strategies.
//!
//! A scorer recomputes every node's hub score from the graph's current
//! adjacency. Scores are derived data: nothing maintains them between
//! calls, and every call starts from scratch.

use tkn_types::{ScorerStrategy, TknError};
use tracing::debug;

use crate::context::GraphContext;

/// Pluggable algorithm that rewrites hub scores.
pub trait HubScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recompute the hub score of every node in `ctx`.
    fn compute(&self, ctx: &mut GraphContext);
}

/// Build the scorer selected by a strategy.
pub fn from_strategy(strategy: ScorerStrategy) -> Result<Box<dyn HubScorer>, TknError> {
    match strategy {
        ScorerStrategy::Degree => Ok(Box::new(DegreeScorer)),
        ScorerStrategy::PageRank { alpha, iterations } => {
            Ok(Box::new(PageRankScorer::new(alpha, iterations)?))
        }
    }
}

/// Local importance: `ln(1 + sum of outgoing weights)`.
///
/// The log keeps very busy nodes from dominating. O(E) per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegreeScorer;

impl HubScorer for DegreeScorer {
    fn name(&self) -> &'static str {
        "degree"
    }

    fn compute(&self, ctx: &mut GraphContext) {
        let degrees: Vec<u64> = ctx
            .adjacency()
            .iter()
            .map(|edges| edges.values().sum())
            .collect();
        for (position, degree) in degrees.into_iter().enumerate() {
            ctx.set_hub_score(position, (degree as f64).ln_1p());
        }
    }
}

/// Weighted PageRank with a fixed number of power iterations.
///
/// ```text
/// PR'(v) = (1 - alpha) / N + alpha * sum over u->v of PR(u) * w(u->v) / out(u)
/// ```
///
/// Ranks start uniform at `1/N`. Nodes without outgoing edges pass no rank
/// on. After the last iteration ranks are divided by the maximum, so the
/// top node scores 1.
#[derive(Debug, Clone, Copy)]
pub struct PageRankScorer {
    alpha: f64,
    iterations: usize,
}

impl Default for PageRankScorer {
    fn default() -> Self {
        Self {
            alpha: tkn_types::DEFAULT_ALPHA,
            iterations: tkn_types::DEFAULT_ITERATIONS,
        }
    }
}

impl PageRankScorer {
    /// # Errors
    ///
    /// Returns `TknError::Config` unless `0 < alpha < 1` and `iterations > 0`.
    pub fn new(alpha: f64, iterations: usize) -> Result<Self, TknError> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(TknError::Config(format!(
                "PageRank alpha must be in (0, 1), got {}",
                alpha
            )));
        }
        if iterations == 0 {
            return Err(TknError::Config(
                "PageRank iterations must be > 0".to_string(),
            ));
        }
        Ok(Self { alpha, iterations })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl HubScorer for PageRankScorer {
    fn name(&self) -> &'static str {
        "page_rank"
    }

    fn compute(&self, ctx: &mut GraphContext) {
        let n = ctx.node_count();
        if n == 0 {
            return;
        }

        // Resolve targets to positions once.
        let edges: Vec<Vec<(usize, f64)>> = ctx
            .adjacency()
            .iter()
            .map(|out| {
                out.iter()
                    .filter_map(|(to, w)| ctx.position(*to).map(|pos| (pos, *w as f64)))
                    .collect()
            })
            .collect();
        let out_weight: Vec<f64> = edges
            .iter()
            .map(|out| out.iter().map(|(_, w)| w).sum())
            .collect();

        let base = (1.0 - self.alpha) / n as f64;
        let mut rank = vec![1.0 / n as f64; n];
        let mut next = vec![0.0; n];

        for _ in 0..self.iterations {
            next.iter_mut().for_each(|r| *r = base);
            for (from, out) in edges.iter().enumerate() {
                if out_weight[from] == 0.0 {
                    continue;
                }
                let share = self.alpha * rank[from] / out_weight[from];
                for (to, weight) in out {
                    next[*to] += share * weight;
                }
            }
            std::mem::swap(&mut rank, &mut next);
        }

        let max = rank.iter().copied().fold(0.0_f64, f64::max);
        for (position, score) in rank.into_iter().enumerate() {
            let normalized = if max > 0.0 { score / max } else { score };
            ctx.set_hub_score(position, normalized);
        }
        debug!(nodes = n, iterations = self.iterations, "PageRank computed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> GraphContext {
        // a -> b -> c, a -> c
        let mut ctx = GraphContext::new();
        let a = ctx.add_node("a");
        let b = ctx.add_node("b");
        let c = ctx.add_node("c");
        ctx.add_weight(a, b, 1).unwrap();
        ctx.add_weight(b, c, 1).unwrap();
        ctx.add_weight(a, c, 3).unwrap();
        ctx
    }

    fn scores(ctx: &GraphContext) -> Vec<f64> {
        ctx.nodes().iter().map(|n| n.hub_score).collect()
    }

    #[test]
    fn test_degree_scores() {
        let mut ctx = chain();
        DegreeScorer.compute(&mut ctx);
        let s = scores(&ctx);
        assert!((s[0] - 4f64.ln_1p()).abs() < 1e-12);
        assert!((s[1] - 1f64.ln_1p()).abs() < 1e-12);
        assert_eq!(s[2], 0.0);
    }

    #[test]
    fn test_degree_prefers_heavy_hub() {
        let mut ctx = GraphContext::new();
        let ing = ctx.add_node("ing");
        let a = ctx.add_node("a");
        let x = ctx.add_node("x");
        ctx.add_weight(a, x, 1).unwrap();
        ctx.add_weight(ing, x, 100).unwrap();
        DegreeScorer.compute(&mut ctx);
        assert_eq!(ctx.ranked(1)[0].pattern, "ing");
    }

    #[test]
    fn test_pagerank_normalizes_to_one() {
        let mut ctx = chain();
        PageRankScorer::default().compute(&mut ctx);
        let s = scores(&ctx);
        let max = s.iter().copied().fold(f64::MIN, f64::max);
        assert!((max - 1.0).abs() < 1e-12);
        // c collects rank from both a and b
        assert_eq!(ctx.ranked(1)[0].pattern, "c");
        assert!(s.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_pagerank_cycle_is_uniform() {
        let mut ctx = GraphContext::new();
        let ids: Vec<u64> = ["x", "y", "z"].iter().map(|t| ctx.add_node(*t)).collect();
        for i in 0..3 {
            ctx.add_weight(ids[i], ids[(i + 1) % 3], 2).unwrap();
        }
        PageRankScorer::new(0.85, 30).unwrap().compute(&mut ctx);
        for score in scores(&ctx) {
            assert!((score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pagerank_recomputes_from_scratch() {
        let mut ctx = chain();
        let scorer = PageRankScorer::default();
        scorer.compute(&mut ctx);
        let first = scores(&ctx);
        scorer.compute(&mut ctx);
        assert_eq!(first, scores(&ctx));
    }

    #[test]
    fn test_pagerank_empty_graph() {
        let mut ctx = GraphContext::new();
        PageRankScorer::default().compute(&mut ctx);
        assert_eq!(ctx.node_count(), 0);
    }

    #[test]
    fn test_pagerank_validation() {
        assert!(PageRankScorer::new(0.0, 15).is_err());
        assert!(PageRankScorer::new(1.0, 15).is_err());
        assert!(PageRankScorer::new(0.5, 0).is_err());
        let scorer = PageRankScorer::new(0.5, 3).unwrap();
        assert_eq!(scorer.alpha(), 0.5);
        assert_eq!(scorer.iterations(), 3);
    }

    #[test]
    fn test_from_strategy() {
        assert_eq!(from_strategy(ScorerStrategy::Degree).unwrap().name(), "degree");
        let scorer = from_strategy(ScorerStrategy::PageRank {
            alpha: 0.85,
            iterations: 15,
        })
        .unwrap();
        assert_eq!(scorer.name(), "page_rank");
        assert!(from_strategy(ScorerStrategy::PageRank {
            alpha: 2.0,
            iterations: 15
        })
        .is_err());
    }
}
