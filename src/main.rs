use anyhow::{Context, Result};
use clap::Parser;
use dozer::cli::{parse_weights, Cli, Command, OutputFormat};
use dozer::config::AnalysisConfig;
use dozer::equivalence::{CategoryWeights, EquivalenceScorer};
use dozer::filter::IgnoreSet;
use dozer::json_output::{JsonCompareOutput, JsonGraphOutput, JsonResolveOutput, JsonTraceSummary};
use dozer::pipeline::{analyze_file, analyze_many, CancelToken, TraceAnalysis};
use dozer::resolver::{ResolutionReport, ResourceResolver};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    } else {
        // RUST_LOG still works without --debug
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_toml(path),
        None => Ok(AnalysisConfig::default()),
    }
}

fn analyze(path: &Path, config: &AnalysisConfig) -> Result<TraceAnalysis> {
    analyze_file(path, config).with_context(|| format!("Failed to analyze {}", path.display()))
}

fn print_graph(source: &Path, analysis: &TraceAnalysis, resolution: Option<&ResolutionReport>) -> Result<()> {
    let stats = &analysis.stats;
    println!("Trace: {}", source.display());
    println!(
        "Events: {} ({} lines, {} skipped, {} incomplete, {} reassembled)",
        stats.events, stats.lines, stats.skipped, stats.incomplete, stats.reassembled
    );
    println!("Fingerprint: {}", analysis.graph.fingerprint()?);

    println!("\nResources ({}):", analysis.graph.len());
    for node in analysis.graph.nodes() {
        let access: Vec<String> = node.access_types.iter().map(ToString::to_string).collect();
        let package = resolution
            .and_then(|report| report.get(&node.identity))
            .map(|m| format!("  -> {} ({}, {:.2})", m.package, m.tier, m.confidence))
            .unwrap_or_default();
        println!(
            "  [{:<7}] {:<16} x{:<4} {}{}",
            node.category.to_string(),
            access.join("|"),
            node.frequency,
            node.identity,
            package
        );
    }

    if !analysis.graph.lineage().is_empty() {
        println!("\nLineage:");
        for (child, parent) in analysis.graph.lineage() {
            println!("  {} <- {}", child, parent);
        }
    }

    let resolver_diagnostics = resolution.map_or(&[][..], |r| r.diagnostics.as_slice());
    let total = analysis.diagnostics.len() + resolver_diagnostics.len();
    if total > 0 {
        println!("\nDiagnostics ({}):", total);
        for diagnostic in analysis.diagnostics.iter().chain(resolver_diagnostics) {
            println!("  {}", diagnostic);
        }
    }
    Ok(())
}

fn run_graph(
    cli: &Cli,
    mut config: AnalysisConfig,
    trace: &Path,
    resolve: bool,
    record_failed: bool,
    ignore: Option<&str>,
) -> Result<ExitCode> {
    if record_failed {
        config.graph.record_failed = true;
    }
    if let Some(list) = ignore {
        config.graph.ignore = IgnoreSet::from_list(list)?;
    }

    let analysis = analyze(trace, &config)?;
    let resolution = if resolve {
        let resolver = ResourceResolver::from_config(&config.resolver)?;
        Some(resolver.resolve_graph(&analysis.graph)?)
    } else {
        None
    };

    match cli.format {
        OutputFormat::Json => {
            let mut output = JsonGraphOutput::new(trace.display().to_string(), &analysis)?;
            if let Some(report) = &resolution {
                output.set_resolution(report);
            }
            println!("{}", output.to_json()?);
        }
        OutputFormat::Text => print_graph(trace, &analysis, resolution.as_ref())?,
    }
    Ok(ExitCode::SUCCESS)
}

fn run_compare(
    cli: &Cli,
    mut config: AnalysisConfig,
    left: &Path,
    right: &Path,
    threshold: Option<f64>,
    match_threshold: Option<f64>,
    weights: Option<&str>,
) -> Result<ExitCode> {
    if let Some(threshold) = threshold {
        config.score.threshold = threshold;
    }
    if let Some(match_threshold) = match_threshold {
        config.score.match_threshold = match_threshold;
    }
    if let Some(weights) = weights {
        let (file, library, network) = parse_weights(weights)?;
        config.score.weights = CategoryWeights::new(file, library, network);
    }
    let scorer = EquivalenceScorer::new(config.score.clone())?;

    let paths = vec![left.to_path_buf(), right.to_path_buf()];
    let mut results = analyze_many(&paths, &config, 2, &CancelToken::new()).into_iter();
    let mut next = || -> Result<(PathBuf, TraceAnalysis)> {
        let (path, outcome) = results
            .next()
            .context("Missing analysis result")?;
        let analysis = outcome.with_context(|| format!("Failed to analyze {}", path.display()))?;
        Ok((path, analysis))
    };
    let (left_path, left_analysis) = next()?;
    let (right_path, right_analysis) = next()?;

    let score = scorer.score(&left_analysis.graph, &right_analysis.graph);
    let code = if score.is_pass() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    };

    match cli.format {
        OutputFormat::Json => {
            let output = JsonCompareOutput::new(
                JsonTraceSummary::new(left_path.display().to_string(), &left_analysis)?,
                JsonTraceSummary::new(right_path.display().to_string(), &right_analysis)?,
                score,
            );
            println!("{}", output.to_json()?);
        }
        OutputFormat::Text => {
            println!("Left:  {} ({} resources)", left_path.display(), left_analysis.graph.len());
            println!("Right: {} ({} resources)", right_path.display(), right_analysis.graph.len());
            println!();
            print!("{}", score.to_report_string());
        }
    }
    Ok(code)
}

fn run_resolve(
    cli: &Cli,
    mut config: AnalysisConfig,
    traces: &[PathBuf],
    paths: &[String],
    index: Option<&Path>,
    jobs: usize,
) -> Result<ExitCode> {
    if let Some(index) = index {
        config.resolver.index = Some(index.to_path_buf());
    }
    let resolver = ResourceResolver::from_config(&config.resolver)?;

    let mut report = ResolutionReport::default();
    for path in paths {
        match resolver.resolve_path(path) {
            Ok(mapping) => report.mappings.push(mapping),
            Err(err) => {
                report.diagnostics.push((&err).into());
                report.unresolved.push(err);
            }
        }
    }

    for (path, outcome) in analyze_many(traces, &config, jobs, &CancelToken::new()) {
        let analysis = outcome.with_context(|| format!("Failed to analyze {}", path.display()))?;
        let partial = resolver.resolve_graph(&analysis.graph)?;
        report.mappings.extend(partial.mappings);
        report.unresolved.extend(partial.unresolved);
        report.diagnostics.extend(partial.diagnostics);
        report.skipped += partial.skipped;
    }
    report.mappings.sort_by(|a, b| a.identity.cmp(&b.identity));
    report.mappings.dedup_by(|a, b| a.identity == b.identity);

    match cli.format {
        OutputFormat::Json => println!("{}", JsonResolveOutput::new(&report).to_json()?),
        OutputFormat::Text => {
            for mapping in &report.mappings {
                println!(
                    "{} -> {} (tier {} {}, confidence {:.2})",
                    mapping.identity,
                    mapping.package,
                    mapping.tier.level(),
                    mapping.tier,
                    mapping.confidence
                );
            }
            for err in &report.unresolved {
                println!("{}", err);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Command::Graph {
            trace,
            resolve,
            record_failed,
            ignore,
        } => run_graph(cli, config, trace, *resolve, *record_failed, ignore.as_deref()),
        Command::Compare {
            left,
            right,
            threshold,
            match_threshold,
            weights,
        } => run_compare(
            cli,
            config,
            left,
            right,
            *threshold,
            *match_threshold,
            weights.as_deref(),
        ),
        Command::Resolve {
            traces,
            paths,
            index,
            jobs,
        } => run_resolve(cli, config, traces, paths, index.as_deref(), *jobs),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(cli.debug);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(2)
        }
    }
}
