//! JSON output format for analysis results
//!
//! `--format json` views of graphs, resolutions and comparisons. These are
//! presentation structures built from the library types; the graph itself
//! stays the canonical data.

use crate::diagnostics::Diagnostic;
use crate::equivalence::EquivalenceScore;
use crate::graph::ResourceNode;
use crate::parse::{ParseStats, Pid};
use crate::pipeline::TraceAnalysis;
use crate::resolver::ResolutionReport;
use serde::Serialize;

/// One resource node
#[derive(Debug, Clone, Serialize)]
pub struct JsonNode {
    /// Display form of the identity (`/etc/hosts`, `libssl.so.3`, `tcp://1.2.3.4:443`)
    pub identity: String,
    pub category: String,
    pub access_types: Vec<String>,
    pub first_access: f64,
    pub last_access: f64,
    pub frequency: u64,
    pub pids: Vec<Pid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ambiguous: bool,
    /// Package mapping (only with `--resolve`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<JsonMapping>,
}

impl From<&ResourceNode> for JsonNode {
    fn from(node: &ResourceNode) -> Self {
        Self {
            identity: node.identity.to_string(),
            category: node.category.to_string(),
            access_types: node.access_types.iter().map(ToString::to_string).collect(),
            first_access: node.first_access,
            last_access: node.last_access,
            frequency: node.frequency,
            pids: node.accessing_pids.iter().copied().collect(),
            paths: node.paths.iter().cloned().collect(),
            ambiguous: node.identity.is_ambiguous(),
            package: None,
        }
    }
}

/// Child → parent process edge
#[derive(Debug, Clone, Serialize)]
pub struct JsonLineageEdge {
    pub child: Pid,
    pub parent: Pid,
}

/// Resolved package for a resource
#[derive(Debug, Clone, Serialize)]
pub struct JsonMapping {
    pub identity: String,
    pub package: String,
    /// 1 = exact, 2 = indexed, 3 = heuristic
    pub tier: u8,
    pub confidence: f64,
}

/// Resource no package could be found for
#[derive(Debug, Clone, Serialize)]
pub struct JsonUnresolved {
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_candidate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
}

/// Root structure for `dozer graph --format json`
#[derive(Debug, Clone, Serialize)]
pub struct JsonGraphOutput {
    pub version: String,
    pub format: String,
    pub source: String,
    pub fingerprint: String,
    pub stats: ParseStats,
    pub nodes: Vec<JsonNode>,
    pub lineage: Vec<JsonLineageEdge>,
    pub diagnostics: Vec<Diagnostic>,
}

impl JsonGraphOutput {
    pub fn new(source: impl Into<String>, analysis: &TraceAnalysis) -> anyhow::Result<Self> {
        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "dozer-graph-v1".to_string(),
            source: source.into(),
            fingerprint: analysis.graph.fingerprint()?,
            stats: analysis.stats.clone(),
            nodes: analysis.graph.nodes().iter().map(JsonNode::from).collect(),
            lineage: analysis
                .graph
                .lineage()
                .iter()
                .map(|(&child, &parent)| JsonLineageEdge { child, parent })
                .collect(),
            diagnostics: analysis.diagnostics.clone(),
        })
    }

    /// Attach package mappings and resolver diagnostics
    pub fn set_resolution(&mut self, report: &ResolutionReport) {
        for node in &mut self.nodes {
            node.package = report
                .mappings
                .iter()
                .find(|m| m.identity.to_string() == node.identity)
                .map(JsonMapping::from_mapping);
        }
        self.diagnostics.extend(report.diagnostics.iter().cloned());
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl JsonMapping {
    fn from_mapping(mapping: &crate::resolver::PackageMapping) -> Self {
        Self {
            identity: mapping.identity.to_string(),
            package: mapping.package.clone(),
            tier: mapping.tier.level(),
            confidence: mapping.confidence,
        }
    }
}

/// Root structure for `dozer resolve --format json`
#[derive(Debug, Clone, Serialize)]
pub struct JsonResolveOutput {
    pub version: String,
    pub format: String,
    pub mappings: Vec<JsonMapping>,
    pub unresolved: Vec<JsonUnresolved>,
    pub skipped: usize,
}

impl JsonResolveOutput {
    pub fn new(report: &ResolutionReport) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "dozer-resolve-v1".to_string(),
            mappings: report.mappings.iter().map(JsonMapping::from_mapping).collect(),
            unresolved: report
                .unresolved
                .iter()
                .map(|err| JsonUnresolved {
                    identity: err.identity.clone(),
                    best_candidate: err.best_candidate.as_ref().map(|(name, _)| name.clone()),
                    best_score: err.best_candidate.as_ref().map(|(_, score)| *score),
                })
                .collect(),
            skipped: report.skipped,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One side of a comparison
#[derive(Debug, Clone, Serialize)]
pub struct JsonTraceSummary {
    pub source: String,
    pub fingerprint: String,
    pub resources: usize,
    pub diagnostics: usize,
}

impl JsonTraceSummary {
    pub fn new(source: impl Into<String>, analysis: &TraceAnalysis) -> anyhow::Result<Self> {
        Ok(Self {
            source: source.into(),
            fingerprint: analysis.graph.fingerprint()?,
            resources: analysis.graph.len(),
            diagnostics: analysis.diagnostics.len(),
        })
    }
}

/// Root structure for `dozer compare --format json`
#[derive(Debug, Clone, Serialize)]
pub struct JsonCompareOutput {
    pub version: String,
    pub format: String,
    pub left: JsonTraceSummary,
    pub right: JsonTraceSummary,
    pub score: EquivalenceScore,
}

impl JsonCompareOutput {
    pub fn new(left: JsonTraceSummary, right: JsonTraceSummary, score: EquivalenceScore) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "dozer-compare-v1".to_string(),
            left,
            right,
            score,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
