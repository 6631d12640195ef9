// Equivalence result and its human-readable report

use crate::graph::{ResourceCategory, ResourceIdentity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pass iff the aggregate score reaches the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Resources paired by fuzzy matching rather than identical identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub category: ResourceCategory,
    pub left: ResourceIdentity,
    pub right: ResourceIdentity,
    pub similarity: f64,
}

/// Structured comparison of two dependency graphs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceScore {
    pub per_category_score: BTreeMap<ResourceCategory, f64>,
    pub aggregate_score: f64,
    /// Identities present on both sides, per category
    pub exact_matches: BTreeMap<ResourceCategory, usize>,
    pub matched_pairs: Vec<MatchedPair>,
    pub unmatched_left: Vec<ResourceIdentity>,
    pub unmatched_right: Vec<ResourceIdentity>,
    pub threshold: f64,
    pub verdict: Verdict,
}

impl EquivalenceScore {
    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn category_score(&self, category: ResourceCategory) -> f64 {
        self.per_category_score.get(&category).copied().unwrap_or(1.0)
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        match self.verdict {
            Verdict::Pass => report.push_str(&format!(
                "✅ EQUIVALENT (aggregate {:.4} >= threshold {:.2})\n",
                self.aggregate_score, self.threshold
            )),
            Verdict::Fail => report.push_str(&format!(
                "❌ NOT EQUIVALENT (aggregate {:.4} < threshold {:.2})\n",
                self.aggregate_score, self.threshold
            )),
        }

        report.push_str("\n📊 Category Scores:\n");
        for (category, score) in &self.per_category_score {
            let exact = self.exact_matches.get(category).copied().unwrap_or(0);
            let fuzzy = self
                .matched_pairs
                .iter()
                .filter(|p| p.category == *category)
                .count();
            report.push_str(&format!(
                "  {:<8} {:.4}  ({} identical, {} matched)\n",
                category, score, exact, fuzzy
            ));
        }

        if !self.matched_pairs.is_empty() {
            report.push_str(&format!(
                "\n🔗 Matched pairs ({}):\n",
                self.matched_pairs.len()
            ));
            for pair in &self.matched_pairs {
                report.push_str(&format!(
                    "  {} ~ {} ({:.2})\n",
                    pair.left, pair.right, pair.similarity
                ));
            }
        }

        for (label, side) in [
            ("Only in left", &self.unmatched_left),
            ("Only in right", &self.unmatched_right),
        ] {
            if side.is_empty() {
                continue;
            }
            report.push_str(&format!("\n⚠️  {} ({}):\n", label, side.len()));
            for identity in side {
                report.push_str(&format!("  - {}\n", identity));
            }
        }

        report
    }
}
