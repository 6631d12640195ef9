// Equivalence scorer tests: identity, disjointness, fuzzy matching, symmetry

use super::*;
use crate::filter::IgnoreSet;
use crate::graph::GraphBuilder;
use crate::parse::parse_trace;
use crate::process_state::ProcessTracker;

fn graph(trace: &str) -> DependencyGraph {
    let parsed = parse_trace(trace, 1);
    let mut tracker = ProcessTracker::new("/");
    let mut builder = GraphBuilder::new(IgnoreSet::default());
    for entry in parsed.entries {
        if let Some(resolved) = tracker.apply(entry) {
            builder.consume(&resolved);
        }
    }
    let (lineage, _) = tracker.into_parts();
    builder.finish(lineage)
}

const NGINX_FHS: &str = r#"execve("/usr/sbin/nginx", ["nginx"], 0x7ffc /* 12 vars */) = 0
openat(AT_FDCWD, "/usr/lib/libssl.so.3", O_RDONLY|O_CLOEXEC) = 3
close(3) = 0
openat(AT_FDCWD, "/etc/nginx/nginx.conf", O_RDONLY) = 3
read(3, "worker_processes 1;\n", 4096) = 20
close(3) = 0
socket(AF_INET, SOCK_STREAM, IPPROTO_TCP) = 4
bind(4, {sa_family=AF_INET, sin_port=htons(80), sin_addr=inet_addr("0.0.0.0")}, 16) = 0
listen(4, 511) = 0
"#;

const NGINX_NIX: &str = r#"execve("/nix/store/abcd-nginx-1.24.0/bin/nginx", ["nginx"], 0x7ffc /* 9 vars */) = 0
openat(AT_FDCWD, "/nix/store/efgh-openssl-3.1.2/lib/libssl.so.3", O_RDONLY|O_CLOEXEC) = 3
close(3) = 0
openat(AT_FDCWD, "/etc/nginx/nginx.conf", O_RDONLY) = 3
read(3, "worker_processes 1;\n", 4096) = 20
close(3) = 0
socket(AF_INET, SOCK_STREAM, IPPROTO_TCP) = 4
bind(4, {sa_family=AF_INET, sin_port=htons(80), sin_addr=inet_addr("0.0.0.0")}, 16) = 0
listen(4, 511) = 0
"#;

const POSTGRES: &str = r#"openat(AT_FDCWD, "/var/lib/postgresql/data/PG_VERSION", O_RDONLY) = 3
openat(AT_FDCWD, "/usr/lib/libz.so.1", O_RDONLY|O_CLOEXEC) = 4
socket(AF_INET, SOCK_DGRAM, IPPROTO_UDP) = 5
connect(5, {sa_family=AF_INET, sin_port=htons(53), sin_addr=inet_addr("8.8.8.8")}, 16) = 0
"#;

fn default_score(a: &DependencyGraph, b: &DependencyGraph) -> EquivalenceScore {
    score(a, b, &ScoreConfig::default()).unwrap()
}

#[test]
fn test_identical_graphs_pass_with_perfect_score() {
    let a = graph(NGINX_FHS);
    let result = default_score(&a, &a);
    assert_eq!(result.aggregate_score, 1.0);
    assert_eq!(result.verdict, Verdict::Pass);
    assert!(result.matched_pairs.is_empty());
    assert!(result.unmatched_left.is_empty());
    assert!(result.unmatched_right.is_empty());
}

#[test]
fn test_disjoint_graphs_fail_with_zero() {
    let a = graph(NGINX_FHS);
    let b = graph(POSTGRES);
    let result = default_score(&a, &b);
    assert_eq!(result.aggregate_score, 0.0);
    assert_eq!(result.verdict, Verdict::Fail);
    for category in ResourceCategory::ALL {
        assert_eq!(result.category_score(category), 0.0);
    }
    assert!(!result.unmatched_left.is_empty());
    assert!(!result.unmatched_right.is_empty());
}

#[test]
fn test_layout_differences_are_absorbed() {
    let a = graph(NGINX_FHS);
    let b = graph(NGINX_NIX);
    let result = default_score(&a, &b);

    // Store path vs /usr/sbin binary is a fuzzy match; libssl is identical
    assert_eq!(result.matched_pairs.len(), 1);
    let pair = &result.matched_pairs[0];
    assert_eq!(pair.category, ResourceCategory::File);
    assert_eq!(pair.left, ResourceIdentity::Path("/usr/sbin/nginx".to_string()));
    assert!(pair.similarity >= 0.7);

    assert_eq!(result.category_score(ResourceCategory::File), 1.0);
    assert_eq!(result.category_score(ResourceCategory::Library), 1.0);
    assert_eq!(result.aggregate_score, 1.0);
    assert!(result.is_pass());
}

#[test]
fn test_score_is_symmetric() {
    let pairs = [(NGINX_FHS, NGINX_NIX), (NGINX_FHS, POSTGRES), (NGINX_NIX, POSTGRES)];
    for (x, y) in pairs {
        let a = graph(x);
        let b = graph(y);
        let ab = default_score(&a, &b);
        let ba = default_score(&b, &a);
        assert_eq!(ab.aggregate_score, ba.aggregate_score);
        assert_eq!(ab.per_category_score, ba.per_category_score);
        assert_eq!(ab.unmatched_left, ba.unmatched_right);
        assert_eq!(ab.matched_pairs.len(), ba.matched_pairs.len());
    }
}

#[test]
fn test_versioned_library_matches_unversioned() {
    let a = graph("openat(AT_FDCWD, \"/nix/store/x-openssl-3.1.2/lib/libssl.so\", O_RDONLY) = 3\n");
    let b = graph("openat(AT_FDCWD, \"/usr/lib/libssl.so.3\", O_RDONLY) = 3\n");
    let result = default_score(&a, &b);
    assert_eq!(result.matched_pairs.len(), 1);
    assert!((result.matched_pairs[0].similarity - 0.9).abs() < 1e-9);
    assert_eq!(result.category_score(ResourceCategory::Library), 1.0);
}

#[test]
fn test_partial_overlap() {
    let a = graph(
        r#"openat(AT_FDCWD, "/etc/hosts", O_RDONLY) = 3
openat(AT_FDCWD, "/etc/passwd", O_RDONLY) = 4
"#,
    );
    let b = graph(
        r#"openat(AT_FDCWD, "/etc/hosts", O_RDONLY) = 3
openat(AT_FDCWD, "/srv/www/index.html", O_RDONLY) = 4
"#,
    );
    let result = default_score(&a, &b);
    // 1 identical out of 3; libraries and network are empty on both sides
    assert!((result.category_score(ResourceCategory::File) - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(result.category_score(ResourceCategory::Library), 1.0);
    assert!((result.aggregate_score - (0.4 / 3.0 + 0.6)).abs() < 1e-9);
    assert_eq!(result.verdict, Verdict::Fail);
}

#[test]
fn test_ambiguous_resources_are_excluded() {
    let a = graph("write(2, \"warning\\n\", 8) = 8\nopenat(AT_FDCWD, \"/etc/hosts\", O_RDONLY) = 3\n");
    let b = graph("openat(AT_FDCWD, \"/etc/hosts\", O_RDONLY) = 3\n");
    let result = default_score(&a, &b);
    assert_eq!(result.aggregate_score, 1.0);
    assert!(result.unmatched_left.is_empty());
}

#[test]
fn test_empty_graphs_are_equivalent() {
    let empty = DependencyGraph::default();
    let result = default_score(&empty, &empty);
    assert_eq!(result.aggregate_score, 1.0);
    assert_eq!(result.verdict, Verdict::Pass);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = ScoreConfig {
        weights: CategoryWeights::new(0.9, 0.9, 0.9),
        ..ScoreConfig::default()
    };
    assert!(EquivalenceScorer::new(config.clone()).is_err());
    let empty = DependencyGraph::default();
    assert!(score(&empty, &empty, &config).is_err());
}

#[test]
fn test_threshold_decides_verdict() {
    let a = graph(
        r#"openat(AT_FDCWD, "/etc/hosts", O_RDONLY) = 3
openat(AT_FDCWD, "/etc/passwd", O_RDONLY) = 4
"#,
    );
    let b = graph("openat(AT_FDCWD, \"/etc/hosts\", O_RDONLY) = 3\n");
    // file = 0.5, others 1.0 → aggregate 0.8
    let permissive = score(&a, &b, &ScoreConfig::permissive()).unwrap();
    assert!((permissive.aggregate_score - 0.8).abs() < 1e-9);
    assert_eq!(permissive.verdict, Verdict::Pass);
    let strict = score(&a, &b, &ScoreConfig::strict()).unwrap();
    assert_eq!(strict.verdict, Verdict::Fail);
}

#[test]
fn test_large_graphs_use_parallel_path_deterministically() {
    let mut left = String::new();
    let mut right = String::new();
    for i in 0..40 {
        left.push_str(&format!(
            "openat(AT_FDCWD, \"/srv/data/file{}.dat\", O_RDONLY) = 3\n",
            i
        ));
        right.push_str(&format!(
            "openat(AT_FDCWD, \"/srv/data/file{}.dat\", O_RDONLY) = 3\n",
            i + 20
        ));
    }
    let a = graph(&left);
    let b = graph(&right);
    assert!(a.len() + b.len() >= 64);

    let first = default_score(&a, &b);
    let second = default_score(&a, &b);
    assert_eq!(first, second);
    assert_eq!(first.aggregate_score, default_score(&b, &a).aggregate_score);
    assert!(first.aggregate_score > 0.0 && first.aggregate_score <= 1.0);
}

#[test]
fn test_report_string() {
    let a = graph(NGINX_FHS);
    let b = graph(NGINX_NIX);
    let report = default_score(&a, &b).to_report_string();
    assert!(report.contains("EQUIVALENT"));
    assert!(report.contains("Category Scores"));
    assert!(report.contains("/usr/sbin/nginx ~ /nix/store/abcd-nginx-1.24.0/bin/nginx"));

    let report = default_score(&a, &graph(POSTGRES)).to_report_string();
    assert!(report.contains("NOT EQUIVALENT"));
    assert!(report.contains("Only in left"));
}
