//! End-to-end trace analysis
//!
//! One trace runs strictly in order through parser, process tracker and
//! graph builder. Independent traces can be analyzed on parallel workers;
//! each worker owns its own parser, tracker and builder.

use crate::config::AnalysisConfig;
use crate::diagnostics::Diagnostic;
use crate::error::TraceError;
use crate::graph::{DependencyGraph, GraphBuilder};
use crate::parse::{EventParser, ParseStats};
use crate::process_state::ProcessTracker;
use crossbeam::queue::ArrayQueue;
use std::fs;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Graph, diagnostics and counters for one trace
#[derive(Debug, Clone)]
pub struct TraceAnalysis {
    pub graph: DependencyGraph,
    /// Parser diagnostics followed by tracker diagnostics
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ParseStats,
}

/// Cooperative cancellation shared by every worker of a batch
///
/// Traces already finished keep their results; traces not yet started
/// report [`TraceError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Analyze trace text already in memory
///
/// # Errors
/// [`TraceError::EmptyTrace`] when no line yields a syscall event.
///
/// # Example
/// ```
/// use dozer::config::AnalysisConfig;
/// use dozer::pipeline::analyze_str;
///
/// let trace = "openat(AT_FDCWD, \"/etc/hosts\", O_RDONLY) = 3\n";
/// let analysis = analyze_str(trace, &AnalysisConfig::default()).unwrap();
/// assert_eq!(analysis.graph.len(), 1);
/// ```
pub fn analyze_str(text: &str, config: &AnalysisConfig) -> Result<TraceAnalysis, TraceError> {
    let mut parser = EventParser::new(config.parse.default_pid);
    for (index, line) in text.lines().enumerate() {
        parser.feed_line(index + 1, line);
    }
    let parsed = parser.finish();

    if parsed.stats.events == 0 {
        warn!(
            lines = parsed.stats.lines,
            skipped = parsed.stats.skipped,
            "trace produced no events"
        );
        return Err(TraceError::EmptyTrace {
            lines: parsed.stats.lines,
            skipped: parsed.stats.skipped,
        });
    }

    let mut tracker = ProcessTracker::new(&config.parse.initial_cwd);
    let mut builder = GraphBuilder::from_config(&config.graph);
    for entry in parsed.entries {
        if let Some(resolved) = tracker.apply(entry) {
            builder.consume(&resolved);
        }
    }
    let (consumed, ignored) = builder.counts();
    let (lineage, tracker_diagnostics) = tracker.into_parts();
    let graph = builder.finish(lineage);

    let mut diagnostics = parsed.diagnostics;
    diagnostics.extend(tracker_diagnostics);

    info!(
        events = parsed.stats.events,
        consumed,
        ignored,
        nodes = graph.len(),
        diagnostics = diagnostics.len(),
        "trace analyzed"
    );

    Ok(TraceAnalysis {
        graph,
        diagnostics,
        stats: parsed.stats,
    })
}

/// Read and analyze a trace file
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected; tracer
/// output escapes binary data but truncated writes can still leave stray
/// bytes behind.
pub fn analyze_file<P: AsRef<Path>>(
    path: P,
    config: &AnalysisConfig,
) -> Result<TraceAnalysis, TraceError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading trace");
    let bytes = fs::read(path).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    analyze_str(&String::from_utf8_lossy(&bytes), config)
}

/// Analyze several trace files on up to `workers` threads
///
/// Results come back in input order. Once `cancel` fires, workers stop
/// picking up new traces.
pub fn analyze_many(
    paths: &[PathBuf],
    config: &AnalysisConfig,
    workers: usize,
    cancel: &CancelToken,
) -> Vec<(PathBuf, Result<TraceAnalysis, TraceError>)> {
    if paths.is_empty() {
        return Vec::new();
    }

    let queue = ArrayQueue::new(paths.len());
    for index in 0..paths.len() {
        // Capacity equals the number of pushes
        let _ = queue.push(index);
    }
    let results: Mutex<Vec<(usize, Result<TraceAnalysis, TraceError>)>> =
        Mutex::new(Vec::with_capacity(paths.len()));
    let workers = workers.clamp(1, paths.len());

    crossbeam::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| {
                while let Some(index) = queue.pop() {
                    let path = &paths[index];
                    let outcome = if cancel.is_cancelled() {
                        Err(TraceError::Cancelled(path.display().to_string()))
                    } else {
                        analyze_file(path, config)
                    };
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, outcome));
                }
            });
        }
    })
    .unwrap_or_else(|p| panic::resume_unwind(p));

    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    results.sort_by_key(|(index, _)| *index);
    results
        .into_iter()
        .map(|(index, outcome)| (paths[index].clone(), outcome))
        .collect()
}
