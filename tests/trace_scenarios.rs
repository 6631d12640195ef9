//! End-to-end trace scenarios through the public library API
//!
//! Each test feeds a small trace through parse → process tracking → graph
//! and checks the resulting graph, resolution or equivalence score.

use dozer::config::{AnalysisConfig, ResolverConfig};
use dozer::diagnostics::{count_kind, DiagnosticKind};
use dozer::equivalence::{score, ScoreConfig, Verdict};
use dozer::error::TraceError;
use dozer::graph::{AccessType, ResourceCategory, ResourceIdentity};
use dozer::parse::{parse_trace, CallResult, CallState};
use dozer::pipeline::{analyze_file, analyze_str};
use dozer::resolver::{PackageEntry, ResolutionTier, ResourceResolver, StaticIndex};
use std::collections::BTreeSet;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_open_read_close_folds_into_one_node() {
    let trace = r#"[pid 100] openat(AT_FDCWD, "/etc/nginx.conf", O_RDONLY) = 3
[pid 100] read(3, "...", 4096) = 128
[pid 100] close(3) = 0
"#;
    let analysis = analyze_str(trace, &AnalysisConfig::default()).unwrap();
    assert_eq!(analysis.graph.len(), 1);

    let node = analysis.graph.path_node("/etc/nginx.conf").unwrap();
    assert_eq!(node.access_types, BTreeSet::from([AccessType::Read]));
    assert_eq!(node.frequency, 2);
    assert_eq!(node.accessing_pids, BTreeSet::from([100]));
    assert!(analysis.diagnostics.is_empty());
}

#[test]
fn test_write_through_descriptor_is_write_access() {
    let trace = r#"openat(AT_FDCWD, "/tmp/x", O_WRONLY|O_CREAT|O_TRUNC, 0644) = 4
write(4, "data", 4) = 4
"#;
    let analysis = analyze_str(trace, &AnalysisConfig::default()).unwrap();
    let node = analysis.graph.path_node("/tmp/x").unwrap();
    assert_eq!(node.access_types, BTreeSet::from([AccessType::Write]));
    assert_eq!(node.frequency, 2);
}

#[test]
fn test_unfinished_call_without_resume_is_incomplete() {
    let trace = "[pid 100] write(1, \"ok\\n\", 3 <unfinished ...>\n";
    let parsed = parse_trace(trace, 0);
    let events: Vec<_> = parsed.events().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].pid, 100);
    assert_eq!(events[0].result, CallResult::Incomplete);
    assert_eq!(events[0].state, CallState::Incomplete);
    assert_eq!(count_kind(&parsed.diagnostics, DiagnosticKind::IncompleteCall), 1);

    // Incomplete calls never become resource accesses
    let analysis = analyze_str(trace, &AnalysisConfig::default()).unwrap();
    assert!(analysis.graph.is_empty());
}

#[test]
fn test_multiprocess_fixture() {
    let analysis = analyze_file(fixture("multiprocess.strace"), &AnalysisConfig::default()).unwrap();
    let graph = &analysis.graph;

    assert_eq!(graph.lineage().get(&101), Some(&100));

    let conf = graph.path_node("/etc/nginx.conf").unwrap();
    assert_eq!(conf.frequency, 2);
    assert_eq!(conf.accessing_pids, BTreeSet::from([100]));
    assert_eq!(conf.first_access, 1_700_000_000.0001);

    let out = graph.path_node("/tmp/x").unwrap();
    assert!(out.has_access(AccessType::Write));
    assert_eq!(out.accessing_pids, BTreeSet::from([101]));

    // write(1, ...) resumed on a descriptor opened before the trace began
    let stdout = ResourceIdentity::Ambiguous { pid: 100, fd: 1 };
    assert!(graph.node(&stdout).is_some());
    assert_eq!(
        count_kind(&analysis.diagnostics, DiagnosticKind::AmbiguousDescriptor),
        1
    );
    assert_eq!(analysis.stats.reassembled, 1);
}

#[test]
fn test_multiprocess_timestamps_never_decrease() {
    let text = std::fs::read_to_string(fixture("multiprocess.strace")).unwrap();
    let parsed = parse_trace(&text, 0);
    let events: Vec<_> = parsed.events().collect();
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    // pid 100's write started before pid 101's write but completed after it
    let resumed = events
        .iter()
        .find(|e| e.pid == 100 && e.name == "write")
        .unwrap();
    assert_eq!(resumed.started_at, 1_700_000_000.0005);
    assert_eq!(resumed.timestamp, 1_700_000_000.0007);
    assert!(parsed
        .entries
        .windows(2)
        .all(|w| w[0].effective_at() <= w[1].effective_at()));
}

#[test]
fn test_graph_fingerprint_is_stable_across_runs() {
    let config = AnalysisConfig::default();
    let a = analyze_file(fixture("nginx_fhs.strace"), &config).unwrap();
    let b = analyze_file(fixture("nginx_fhs.strace"), &config).unwrap();
    assert_eq!(
        a.graph.to_canonical_json().unwrap(),
        b.graph.to_canonical_json().unwrap()
    );
    assert_eq!(a.graph.fingerprint().unwrap(), b.graph.fingerprint().unwrap());
}

#[test]
fn test_fixture_categories() {
    let analysis = analyze_file(fixture("nginx_fhs.strace"), &AnalysisConfig::default()).unwrap();
    let graph = &analysis.graph;
    assert_eq!(graph.nodes_in(ResourceCategory::Library).count(), 1);
    assert_eq!(graph.nodes_in(ResourceCategory::Network).count(), 1);
    let nginx = graph.path_node("/usr/sbin/nginx").unwrap();
    assert!(nginx.has_access(AccessType::Execute));
}

#[test]
fn test_store_library_resolves_to_openssl() {
    let index = StaticIndex::from_entries(vec![PackageEntry::new("openssl")], Vec::new());
    let resolver = ResourceResolver::with_static(index, ResolverConfig::default());
    let mapping = resolver
        .resolve_path("/nix/store/abcd-openssl-3.1.2/lib/libssl.so.3")
        .unwrap();
    assert_eq!(mapping.package, "openssl");
    assert_eq!(mapping.tier, ResolutionTier::Heuristic);
    assert!(mapping.confidence > 0.0 && mapping.confidence <= 1.0);
}

#[test]
fn test_builtin_resolver_on_fixture() {
    let analysis = analyze_file(fixture("nginx_fhs.strace"), &AnalysisConfig::default()).unwrap();
    let resolver = ResourceResolver::builtin(ResolverConfig::default()).unwrap();
    let report = resolver.resolve_graph(&analysis.graph).unwrap();
    let packages = report.packages();
    assert!(packages.contains(&"nginx"));
    assert!(packages.contains(&"openssl"));
    // The listening socket is never looked up
    assert_eq!(report.skipped, 1);
}

#[test]
fn test_identical_traces_are_equivalent() {
    let analysis = analyze_file(fixture("nginx_fhs.strace"), &AnalysisConfig::default()).unwrap();
    let result = score(&analysis.graph, &analysis.graph, &ScoreConfig::default()).unwrap();
    assert_eq!(result.aggregate_score, 1.0);
    assert_eq!(result.verdict, Verdict::Pass);
}

#[test]
fn test_disjoint_traces_are_not_equivalent() {
    let config = AnalysisConfig::default();
    let nginx = analyze_file(fixture("nginx_fhs.strace"), &config).unwrap();
    let postgres = analyze_file(fixture("postgres.strace"), &config).unwrap();
    let result = score(&nginx.graph, &postgres.graph, &ScoreConfig::default()).unwrap();
    assert_eq!(result.aggregate_score, 0.0);
    assert_eq!(result.verdict, Verdict::Fail);
}

#[test]
fn test_layout_change_keeps_equivalence() {
    let config = AnalysisConfig::default();
    let fhs = analyze_file(fixture("nginx_fhs.strace"), &config).unwrap();
    let nix = analyze_file(fixture("nginx_nix.strace"), &config).unwrap();
    let result = score(&fhs.graph, &nix.graph, &ScoreConfig::default()).unwrap();
    assert!(result.is_pass());
    assert_eq!(result.matched_pairs.len(), 1);
}

#[test]
fn test_garbage_trace_is_rejected() {
    let err = analyze_str("not a trace\n", &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, TraceError::EmptyTrace { .. }));
}
