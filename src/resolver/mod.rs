// Resource resolver
//
// Maps resource identities to declarative package names with a three-tier
// fallback: exact path table, basename index lookup, then fuzzy heuristic
// matching. Resolution is read-only over the graph; results are memoized per
// identity for the lifetime of the resolver.

mod heuristic;
mod index;

pub use heuristic::{extract_token, rank_candidates, RankedCandidate};
pub use index::{ExactEntry, ExactTable, PackageEntry, PackageIndex, StaticIndex};

use crate::config::ResolverConfig;
use crate::diagnostics::Diagnostic;
use crate::error::UnresolvedResourceError;
use crate::graph::{DependencyGraph, ResourceCategory, ResourceIdentity, ResourceNode};
use anyhow::{anyhow, Result};
use crossbeam::channel;
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Confidence reported for basename index hits
const INDEXED_CONFIDENCE: f64 = 0.95;

/// Fallback stage that produced a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    Exact,
    Indexed,
    Heuristic,
}

impl ResolutionTier {
    /// 1 = exact, 2 = indexed, 3 = heuristic
    pub fn level(self) -> u8 {
        match self {
            ResolutionTier::Exact => 1,
            ResolutionTier::Indexed => 2,
            ResolutionTier::Heuristic => 3,
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionTier::Exact => "exact",
            ResolutionTier::Indexed => "indexed",
            ResolutionTier::Heuristic => "heuristic",
        };
        f.write_str(name)
    }
}

/// Resource → package mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMapping {
    pub identity: ResourceIdentity,
    pub package: String,
    /// 1.0 for exact hits, similarity for heuristic ones
    pub confidence: f64,
    pub tier: ResolutionTier,
}

type Resolution = std::result::Result<PackageMapping, UnresolvedResourceError>;

/// Outcome of resolving every file and library node of a graph
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    /// Sorted by identity
    pub mappings: Vec<PackageMapping>,
    pub unresolved: Vec<UnresolvedResourceError>,
    /// One `UnresolvedResource` record per unresolved identity
    pub diagnostics: Vec<Diagnostic>,
    /// Network and ambiguous nodes, which are never resolved
    pub skipped: usize,
}

impl ResolutionReport {
    pub fn get(&self, identity: &ResourceIdentity) -> Option<&PackageMapping> {
        self.mappings
            .binary_search_by(|m| m.identity.cmp(identity))
            .ok()
            .map(|i| &self.mappings[i])
    }

    /// Distinct package names, sorted
    pub fn packages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mappings.iter().map(|m| m.package.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Three-tier resource resolver
pub struct ResourceResolver {
    exact: ExactTable,
    index: Arc<dyn PackageIndex>,
    config: ResolverConfig,
    memo: Mutex<HashMap<ResourceIdentity, Resolution>>,
    timeouts: AtomicUsize,
    /// Remote queries whose threads have not returned yet, timed out or not
    in_flight: Arc<AtomicUsize>,
}

/// Releases an in-flight slot when the query thread finishes
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for ResourceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceResolver")
            .field("exact", &self.exact.len())
            .field("remote", &self.index.is_remote())
            .field("config", &self.config)
            .finish()
    }
}

impl ResourceResolver {
    pub fn new(exact: ExactTable, index: Arc<dyn PackageIndex>, config: ResolverConfig) -> Self {
        Self {
            exact,
            index,
            config,
            memo: Mutex::new(HashMap::new()),
            timeouts: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use a static index for all three tiers
    pub fn with_static(index: StaticIndex, config: ResolverConfig) -> Self {
        let exact = index.exact_table();
        Self::new(exact, Arc::new(index), config)
    }

    /// Resolver over the embedded package index
    pub fn builtin(config: ResolverConfig) -> Result<Self> {
        Ok(Self::with_static(StaticIndex::builtin()?, config))
    }

    /// Load `config.index` if set, otherwise the embedded index
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let index = match &config.index {
            Some(path) => StaticIndex::from_toml(path)?,
            None => StaticIndex::builtin()?,
        };
        Ok(Self::with_static(index, config.clone()))
    }

    /// Index queries abandoned so far: timed out, or skipped while
    /// `workers` earlier queries were still stalled
    pub fn timeouts(&self) -> usize {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Remote query threads still running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolve a bare identity; path identities use their own path
    pub fn resolve(&self, identity: &ResourceIdentity) -> Resolution {
        let paths: Vec<&str> = identity.as_path().into_iter().collect();
        self.resolve_with_paths(identity, &paths)
    }

    /// Resolve a concrete path observed in a trace
    pub fn resolve_path(&self, path: &str) -> Resolution {
        let identity = ResourceIdentity::from_path(path);
        self.resolve_with_paths(&identity, &[path])
    }

    /// Resolve a graph node using every path observed for it
    pub fn resolve_node(&self, node: &ResourceNode) -> Resolution {
        let mut paths: Vec<&str> = node.paths.iter().map(String::as_str).collect();
        if let Some(path) = node.identity.as_path() {
            if !paths.contains(&path) {
                paths.insert(0, path);
            }
        }
        self.resolve_with_paths(&node.identity, &paths)
    }

    fn resolve_with_paths(&self, identity: &ResourceIdentity, paths: &[&str]) -> Resolution {
        if let Some(cached) = self.lock_memo().get(identity) {
            return cached.clone();
        }
        let outcome = self.resolve_uncached(identity, paths);
        match &outcome {
            Ok(mapping) => debug!(
                resource = %identity,
                package = %mapping.package,
                tier = mapping.tier.level(),
                confidence = mapping.confidence,
                "resolved"
            ),
            Err(err) => debug!(resource = %identity, "{}", err),
        }
        self.lock_memo().insert(identity.clone(), outcome.clone());
        outcome
    }

    fn lock_memo(&self) -> std::sync::MutexGuard<'_, HashMap<ResourceIdentity, Resolution>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_uncached(&self, identity: &ResourceIdentity, paths: &[&str]) -> Resolution {
        if matches!(
            identity,
            ResourceIdentity::Endpoint(_) | ResourceIdentity::Ambiguous { .. }
        ) {
            return Err(UnresolvedResourceError {
                identity: identity.to_string(),
                best_candidate: None,
            });
        }

        // Tier 1: exact path table
        for path in paths {
            if let Some(package) = self.exact.get(path) {
                return Ok(self.mapping(identity, package, 1.0, ResolutionTier::Exact));
            }
        }

        let token = paths
            .iter()
            .find_map(|p| extract_token(p))
            .or_else(|| extract_token(&identity.to_string()));

        // Tier 2: basename lookup
        for basename in basenames(identity, paths) {
            let query = basename.clone();
            let Some(found) = self.query("by_basename", move |index| index.by_basename(&query))
            else {
                // Timed out; skip straight to the heuristic
                break;
            };
            if found.is_empty() {
                continue;
            }
            let package = match (found.len(), token.as_deref()) {
                (1, _) | (_, None) => found[0].clone(),
                (_, Some(token)) => {
                    let entries = found.into_iter().map(PackageEntry::new).collect();
                    match rank_candidates(token, paths, entries).into_iter().next() {
                        Some(best) => best.name,
                        None => continue,
                    }
                }
            };
            return Ok(self.mapping(identity, &package, INDEXED_CONFIDENCE, ResolutionTier::Indexed));
        }

        // Tier 3: heuristic token match
        let unresolved = |best_candidate| UnresolvedResourceError {
            identity: identity.to_string(),
            best_candidate,
        };
        let Some(token) = token else {
            return Err(unresolved(None));
        };
        let query_token = token.clone();
        let candidates = self
            .query("candidates", move |index| index.candidates(&query_token))
            .unwrap_or_default();
        let Some(best) = rank_candidates(&token, paths, candidates).into_iter().next() else {
            return Err(unresolved(None));
        };
        if best.score >= self.config.min_confidence && best.score > 0.0 {
            Ok(self.mapping(identity, &best.name, best.score, ResolutionTier::Heuristic))
        } else {
            Err(unresolved(Some((best.name, best.score))))
        }
    }

    fn mapping(
        &self,
        identity: &ResourceIdentity,
        package: &str,
        confidence: f64,
        tier: ResolutionTier,
    ) -> PackageMapping {
        PackageMapping {
            identity: identity.clone(),
            package: package.to_string(),
            confidence,
            tier,
        }
    }

    /// Run an index query, bounded by the timeout when the index is remote
    ///
    /// A timed-out query thread keeps running until the index answers. At
    /// most `workers` such threads exist at once; past that, queries degrade
    /// immediately instead of spawning.
    fn query<T, F>(&self, what: &'static str, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PackageIndex) -> T + Send + 'static,
    {
        if !self.index.is_remote() {
            return Some(f(self.index.as_ref()));
        }

        let limit = self.config.workers.max(1);
        if self.in_flight.fetch_add(1, Ordering::SeqCst) >= limit {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(
                query = what,
                in_flight = limit,
                "package index saturated by stalled queries, degrading to heuristic matching"
            );
            return None;
        }
        let slot = InFlightSlot(Arc::clone(&self.in_flight));

        let index = Arc::clone(&self.index);
        let (tx, rx) = channel::bounded(1);
        std::thread::spawn(move || {
            let result = f(index.as_ref());
            drop(slot);
            // Receiver may be gone after a timeout
            let _ = tx.send(result);
        });
        let timeout = Duration::from_millis(self.config.query_timeout_ms);
        match rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    query = what,
                    timeout_ms = self.config.query_timeout_ms,
                    "package index query timed out, degrading to heuristic matching"
                );
                None
            }
        }
    }

    /// Resolve every file and library node of `graph` on a worker pool
    ///
    /// Network endpoints and ambiguous placeholders are skipped. Unresolved
    /// resources stay in the graph and are reported as diagnostics.
    pub fn resolve_graph(&self, graph: &DependencyGraph) -> Result<ResolutionReport> {
        let nodes: Vec<&ResourceNode> = graph
            .nodes()
            .iter()
            .filter(|n| n.category != ResourceCategory::Network && !n.identity.is_ambiguous())
            .collect();
        let skipped = graph.len() - nodes.len();

        let queue = ArrayQueue::new(nodes.len().max(1));
        for i in 0..nodes.len() {
            queue
                .push(i)
                .map_err(|_| anyhow!("resolver work queue overflow"))?;
        }

        let results = Mutex::new(Vec::with_capacity(nodes.len()));
        let workers = self.config.workers.clamp(1, nodes.len().max(1));
        crossbeam::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| {
                    while let Some(i) = queue.pop() {
                        let outcome = self.resolve_node(nodes[i]);
                        results
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((i, outcome));
                    }
                });
            }
        })
        .map_err(|_| anyhow!("resolver worker panicked"))?;

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_by_key(|(i, _)| *i);

        let mut report = ResolutionReport {
            skipped,
            ..ResolutionReport::default()
        };
        for (_, outcome) in results {
            match outcome {
                Ok(mapping) => report.mappings.push(mapping),
                Err(err) => {
                    report.diagnostics.push(Diagnostic::from(&err));
                    report.unresolved.push(err);
                }
            }
        }
        debug!(
            resolved = report.mappings.len(),
            unresolved = report.unresolved.len(),
            skipped,
            "graph resolution finished"
        );
        Ok(report)
    }
}

/// Basenames to try in tier 2, most specific first
fn basenames(identity: &ResourceIdentity, paths: &[&str]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };
    for path in paths {
        push(path.rsplit('/').next().unwrap_or(path));
    }
    if let ResourceIdentity::Library { soname, .. } = identity {
        push(&identity.to_string());
        push(soname);
    }
    names
}
