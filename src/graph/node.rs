//! Graph vertices

use super::identity::{AccessType, ResourceCategory, ResourceIdentity};
use crate::parse::Pid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One resource touched by the traced execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub identity: ResourceIdentity,
    pub category: ResourceCategory,
    pub access_types: BTreeSet<AccessType>,
    pub first_access: f64,
    pub last_access: f64,
    pub accessing_pids: BTreeSet<Pid>,
    /// Number of access events folded into this node
    pub frequency: u64,
    /// Concrete paths observed for this identity (libraries can have several)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub paths: BTreeSet<String>,
}

impl ResourceNode {
    pub fn new(identity: ResourceIdentity, timestamp: f64) -> Self {
        let category = identity.category();
        Self {
            identity,
            category,
            access_types: BTreeSet::new(),
            first_access: timestamp,
            last_access: timestamp,
            accessing_pids: BTreeSet::new(),
            frequency: 0,
            paths: BTreeSet::new(),
        }
    }

    /// Fold one access event into the node
    pub fn record(&mut self, access: &[AccessType], timestamp: f64, pid: Pid, path: Option<&str>) {
        self.access_types.extend(access.iter().copied());
        self.first_access = self.first_access.min(timestamp);
        self.last_access = self.last_access.max(timestamp);
        self.accessing_pids.insert(pid);
        self.frequency += 1;
        if let Some(path) = path {
            if !self.paths.contains(path) {
                self.paths.insert(path.to_string());
            }
        }
    }

    pub fn has_access(&self, access: AccessType) -> bool {
        self.access_types.contains(&access)
    }
}
