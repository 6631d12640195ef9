// Equivalence scoring between two dependency graphs
//
// Per category (file, library, network):
// 1. identical identities count as matches (Jaccard numerator)
// 2. resources present on one side only are paired by maximum-weight
//    bipartite matching on identity similarity, keeping pairs at or above
//    the match threshold
// 3. score = (identical + matched) / (union - matched), 1.0 when both sides
//    are empty
//
// The aggregate is the weight-normalized sum of category scores, so the
// same graph on both sides scores exactly 1.0. Every step is symmetric in
// its two inputs.

mod config;
mod matching;
mod verdict;

pub use config::{CategoryWeights, ScoreConfig};
pub use matching::{best_matching, Assignment};
pub use verdict::{EquivalenceScore, MatchedPair, Verdict};

use crate::error::ConfigError;
use crate::graph::{DependencyGraph, ResourceCategory, ResourceIdentity};
use crate::similarity::identity_similarity;
use std::collections::{BTreeMap, BTreeSet};
use std::panic;
use tracing::{debug, info};

/// Resources per comparison above which categories are scored on threads
const PARALLEL_MIN_RESOURCES: usize = 64;

/// Scores pairs of graphs with a validated configuration
#[derive(Debug, Clone)]
pub struct EquivalenceScorer {
    config: ScoreConfig,
}

impl EquivalenceScorer {
    pub fn new(config: ScoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    pub fn score(&self, left: &DependencyGraph, right: &DependencyGraph) -> EquivalenceScore {
        let size = left.len() + right.len();
        let outcomes: Vec<CategoryOutcome> = if size >= PARALLEL_MIN_RESOURCES {
            self.score_categories_parallel(left, right)
        } else {
            ResourceCategory::ALL
                .iter()
                .map(|&category| self.score_category(category, left, right))
                .collect()
        };

        let mut per_category_score = BTreeMap::new();
        let mut exact_matches = BTreeMap::new();
        let mut matched_pairs = Vec::new();
        let mut unmatched_left = Vec::new();
        let mut unmatched_right = Vec::new();
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for outcome in outcomes {
            let weight = self.config.weights.get(outcome.category);
            weighted += weight * outcome.score;
            total_weight += weight;
            per_category_score.insert(outcome.category, outcome.score);
            exact_matches.insert(outcome.category, outcome.exact);
            matched_pairs.extend(outcome.matched);
            unmatched_left.extend(outcome.unmatched_left);
            unmatched_right.extend(outcome.unmatched_right);
        }

        let aggregate_score = if total_weight > 0.0 {
            (weighted / total_weight).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let verdict = if aggregate_score >= self.config.threshold {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        info!(
            aggregate = aggregate_score,
            threshold = self.config.threshold,
            %verdict,
            "equivalence scored"
        );

        EquivalenceScore {
            per_category_score,
            aggregate_score,
            exact_matches,
            matched_pairs,
            unmatched_left,
            unmatched_right,
            threshold: self.config.threshold,
            verdict,
        }
    }

    fn score_categories_parallel(
        &self,
        left: &DependencyGraph,
        right: &DependencyGraph,
    ) -> Vec<CategoryOutcome> {
        crossbeam::scope(|scope| {
            let handles: Vec<_> = ResourceCategory::ALL
                .iter()
                .map(|&category| scope.spawn(move |_| self.score_category(category, left, right)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|p| panic::resume_unwind(p)))
                .collect()
        })
        .unwrap_or_else(|p| panic::resume_unwind(p))
    }

    fn score_category(
        &self,
        category: ResourceCategory,
        left: &DependencyGraph,
        right: &DependencyGraph,
    ) -> CategoryOutcome {
        let a = left.comparable_identities(category);
        let b = right.comparable_identities(category);

        let exact = a.intersection(&b).count();
        let union = a.union(&b).count();
        let only_left: Vec<&ResourceIdentity> = a.difference(&b).copied().collect();
        let only_right: Vec<&ResourceIdentity> = b.difference(&a).copied().collect();

        let similarity: Vec<Vec<f64>> = only_left
            .iter()
            .map(|l| only_right.iter().map(|r| identity_similarity(l, r)).collect())
            .collect();
        let assignments = best_matching(&similarity, self.config.match_threshold);

        let matched_left: BTreeSet<usize> = assignments.iter().map(|a| a.row).collect();
        let matched_right: BTreeSet<usize> = assignments.iter().map(|a| a.col).collect();
        let matched: Vec<MatchedPair> = assignments
            .iter()
            .map(|a| MatchedPair {
                category,
                left: only_left[a.row].clone(),
                right: only_right[a.col].clone(),
                similarity: a.similarity,
            })
            .collect();

        let m = matched.len();
        let score = if union == 0 {
            1.0
        } else {
            (exact + m) as f64 / (union - m) as f64
        };
        debug!(%category, exact, matched = m, union, score, "category scored");

        CategoryOutcome {
            category,
            score,
            exact,
            matched,
            unmatched_left: unmatched(&only_left, &matched_left),
            unmatched_right: unmatched(&only_right, &matched_right),
        }
    }
}

fn unmatched(side: &[&ResourceIdentity], matched: &BTreeSet<usize>) -> Vec<ResourceIdentity> {
    side.iter()
        .enumerate()
        .filter(|(i, _)| !matched.contains(i))
        .map(|(_, identity)| (*identity).clone())
        .collect()
}

struct CategoryOutcome {
    category: ResourceCategory,
    score: f64,
    exact: usize,
    matched: Vec<MatchedPair>,
    unmatched_left: Vec<ResourceIdentity>,
    unmatched_right: Vec<ResourceIdentity>,
}

/// Score two graphs with `config`
///
/// # Example
/// ```
/// use dozer::equivalence::{score, ScoreConfig, Verdict};
/// use dozer::graph::DependencyGraph;
///
/// let empty = DependencyGraph::default();
/// let result = score(&empty, &empty, &ScoreConfig::default()).unwrap();
/// assert_eq!(result.aggregate_score, 1.0);
/// assert_eq!(result.verdict, Verdict::Pass);
/// ```
pub fn score(
    left: &DependencyGraph,
    right: &DependencyGraph,
    config: &ScoreConfig,
) -> Result<EquivalenceScore, ConfigError> {
    Ok(EquivalenceScorer::new(config.clone())?.score(left, right))
}

#[cfg(test)]
mod tests;
