//! Folds resolved events into a dependency graph

use super::identity::AccessType;
use super::node::ResourceNode;
use super::{DependencyGraph, ResourceIdentity};
use crate::config::GraphConfig;
use crate::filter::IgnoreSet;
use crate::parse::{CallResult, Pid, SyscallEvent};
use crate::process_state::ResolvedEvent;
use crate::syscalls::SyscallClass;
use std::collections::BTreeMap;
use tracing::trace;

/// Incremental graph builder for one trace
///
/// Feed it resolved events in stream order, then call [`GraphBuilder::finish`].
#[derive(Debug)]
pub struct GraphBuilder {
    ignore: IgnoreSet,
    record_failed: bool,
    nodes: BTreeMap<ResourceIdentity, ResourceNode>,
    consumed: usize,
    ignored: usize,
}

impl GraphBuilder {
    pub fn new(ignore: IgnoreSet) -> Self {
        Self {
            ignore,
            record_failed: false,
            nodes: BTreeMap::new(),
            consumed: 0,
            ignored: 0,
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(config.ignore.clone()).record_failed(config.record_failed)
    }

    /// Let failed and never-completed calls create nodes too
    pub fn record_failed(mut self, record: bool) -> Self {
        self.record_failed = record;
        self
    }

    pub fn consume(&mut self, resolved: &ResolvedEvent) {
        let event = &resolved.event;
        self.consumed += 1;

        if self.ignore.should_skip(&event.name) {
            self.ignored += 1;
            return;
        }
        if !self.record_failed && !completed_access(event, resolved.class) {
            return;
        }

        let access = access_for(resolved.class, event);
        if access.is_empty() {
            return;
        }

        let last = resolved.targets.len().saturating_sub(1);
        for (i, target) in resolved.targets.iter().enumerate() {
            // link looks up its source and writes only the new name
            let access = if resolved.class == SyscallClass::Link && i < last {
                &[AccessType::Read][..]
            } else {
                access
            };
            trace!(call = %event.name, resource = %target.identity, "access");
            self.nodes
                .entry(target.identity.clone())
                .or_insert_with(|| ResourceNode::new(target.identity.clone(), event.timestamp))
                .record(access, event.timestamp, event.pid, target.path.as_deref());
        }
    }

    /// Events seen and events dropped by the ignore set
    pub fn counts(&self) -> (usize, usize) {
        (self.consumed, self.ignored)
    }

    pub fn finish(self, lineage: BTreeMap<Pid, Pid>) -> DependencyGraph {
        DependencyGraph::new(self.nodes.into_values().collect(), lineage)
    }
}

/// Successful calls count; so do `= ?` returns and in-progress connects
fn completed_access(event: &SyscallEvent, class: SyscallClass) -> bool {
    match &event.result {
        CallResult::Success { .. } | CallResult::Unknown => true,
        CallResult::Error { code, .. } => class == SyscallClass::Connect && code == "EINPROGRESS",
        CallResult::Incomplete => false,
    }
}

/// Access types a call implies; empty for pure state changes
pub fn access_for(class: SyscallClass, event: &SyscallEvent) -> &'static [AccessType] {
    use AccessType::{Connect, Execute, Listen, Read, Write};
    match class {
        SyscallClass::Open => {
            if event.has_flag("O_RDWR") {
                &[Read, Write]
            } else if event.has_flag("O_WRONLY")
                || event.has_flag("O_CREAT")
                || event.has_flag("O_TRUNC")
            {
                &[Write]
            } else {
                &[Read]
            }
        }
        SyscallClass::Creat | SyscallClass::Write | SyscallClass::Modify | SyscallClass::Link => {
            &[Write]
        }
        SyscallClass::Read | SyscallClass::Recv | SyscallClass::Stat => &[Read],
        SyscallClass::Exec => &[Execute],
        SyscallClass::Connect => &[Connect],
        SyscallClass::Send if event.sockaddr().is_some() => &[Connect],
        SyscallClass::Send => &[Write],
        SyscallClass::Bind | SyscallClass::Listen | SyscallClass::Accept => &[Listen],
        _ => &[],
    }
}
