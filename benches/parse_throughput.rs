//! Trace parsing and graph construction throughput
//!
//! Measures lines/second for the parse → track → graph pipeline on a
//! synthetic multi-process trace.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dozer::config::AnalysisConfig;
use dozer::parse::parse_trace;
use dozer::pipeline::analyze_str;
use std::fmt::Write;

/// Build a trace with `processes` workers, each opening, reading and
/// closing files, with every tenth call split across two lines
fn synthetic_trace(lines: usize, processes: u32) -> String {
    let mut trace = String::with_capacity(lines * 80);
    let mut ts = 1_700_000_000.0_f64;
    for i in 0..lines / 3 {
        let pid = 100 + (i as u32 % processes);
        ts += 0.000_01;
        let path = format!("/usr/share/app/data/file{}.dat", i % 512);
        if i % 10 == 0 {
            let _ = writeln!(
                trace,
                "[pid {}] {:.6} openat(AT_FDCWD, \"{}\", O_RDONLY <unfinished ...>",
                pid, ts, path
            );
            let _ = writeln!(trace, "[pid {}] {:.6} <... openat resumed>) = 3", pid, ts);
        } else {
            let _ = writeln!(
                trace,
                "[pid {}] {:.6} openat(AT_FDCWD, \"{}\", O_RDONLY|O_CLOEXEC) = 3",
                pid, ts, path
            );
        }
        let _ = writeln!(trace, "[pid {}] {:.6} read(3, \"abc\", 4096) = 3", pid, ts);
        let _ = writeln!(trace, "[pid {}] {:.6} close(3) = 0", pid, ts);
    }
    trace
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for lines in [1_000usize, 10_000, 100_000] {
        let trace = synthetic_trace(lines, 4);
        group.throughput(Throughput::Elements(trace.lines().count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &trace, |b, trace| {
            b.iter(|| black_box(parse_trace(trace, 0)));
        });
    }
    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    let config = AnalysisConfig::default();
    for lines in [1_000usize, 10_000, 100_000] {
        let trace = synthetic_trace(lines, 4);
        group.throughput(Throughput::Elements(trace.lines().count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &trace, |b, trace| {
            b.iter(|| black_box(analyze_str(trace, &config).expect("synthetic trace parses")));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_analyze);
criterion_main!(benches);
