// Dependency graph
//
// Canonical set of resources a traced execution touched, plus process
// lineage. Nodes are kept sorted by identity and every collection is ordered,
// so the same event stream always serializes to the same bytes.

mod builder;
mod identity;
mod node;

pub use builder::{access_for, GraphBuilder};
pub use identity::{
    split_soname, AccessType, Endpoint, Protocol, ResourceCategory, ResourceIdentity,
};
pub use node::ResourceNode;

use crate::parse::Pid;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Resources of one trace plus child → parent lineage edges
///
/// Immutable once built; consumers (resolver, scorer, document generators)
/// only ever read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: Vec<ResourceNode>,
    lineage: BTreeMap<Pid, Pid>,
}

impl DependencyGraph {
    pub fn new(mut nodes: Vec<ResourceNode>, lineage: BTreeMap<Pid, Pid>) -> Self {
        nodes.sort_by(|a, b| a.identity.cmp(&b.identity));
        nodes.dedup_by(|a, b| a.identity == b.identity);
        Self { nodes, lineage }
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn lineage(&self) -> &BTreeMap<Pid, Pid> {
        &self.lineage
    }

    pub fn node(&self, identity: &ResourceIdentity) -> Option<&ResourceNode> {
        self.nodes
            .binary_search_by(|n| n.identity.cmp(identity))
            .ok()
            .map(|i| &self.nodes[i])
    }

    /// Convenience lookup for path identities
    pub fn path_node(&self, path: &str) -> Option<&ResourceNode> {
        self.node(&ResourceIdentity::Path(path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes_in(&self, category: ResourceCategory) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.category == category)
    }

    /// Identities that take part in equivalence scoring (ambiguous ones don't)
    pub fn comparable_identities(&self, category: ResourceCategory) -> BTreeSet<&ResourceIdentity> {
        self.nodes_in(category)
            .map(|n| &n.identity)
            .filter(|identity| !identity.is_ambiguous())
            .collect()
    }

    pub fn ambiguous_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.identity.is_ambiguous()).count()
    }

    /// Canonical JSON form
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// SHA-256 (hex) over the canonical JSON form
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
