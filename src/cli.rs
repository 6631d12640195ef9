//! CLI argument parsing for dozer

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "dozer")]
#[command(version)]
#[command(
    about = "Dependency graphs and equivalence scores from syscall traces",
    long_about = None
)]
pub struct Cli {
    /// Analysis configuration (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the dependency graph of a trace
    Graph {
        /// Trace file (strace text output)
        trace: PathBuf,

        /// Map resources to packages
        #[arg(short = 'r', long = "resolve")]
        resolve: bool,

        /// Let failed calls create resource nodes
        #[arg(long = "record-failed")]
        record_failed: bool,

        /// Calls or classes to ignore (e.g. "memory,timing,futex")
        #[arg(short = 'i', long = "ignore", value_name = "LIST")]
        ignore: Option<String>,
    },

    /// Score whether two traces depend on the same resources
    ///
    /// Exits with status 1 when the verdict is FAIL.
    Compare {
        /// Reference trace
        left: PathBuf,

        /// Candidate trace
        right: PathBuf,

        /// Aggregate score needed for PASS
        #[arg(short = 't', long = "threshold", value_name = "SCORE")]
        threshold: Option<f64>,

        /// Minimum similarity for fuzzy resource matches
        #[arg(long = "match-threshold", value_name = "SCORE")]
        match_threshold: Option<f64>,

        /// Category weights as FILE,LIBRARY,NETWORK (must sum to 1.0)
        #[arg(short = 'w', long = "weights", value_name = "F,L,N")]
        weights: Option<String>,
    },

    /// Map the resources of one or more traces to packages
    Resolve {
        /// Trace files
        #[arg(required_unless_present = "paths")]
        traces: Vec<PathBuf>,

        /// Resolve individual paths instead of traces
        #[arg(short = 'p', long = "path", value_name = "PATH")]
        paths: Vec<String>,

        /// Package index (TOML) replacing the embedded one
        #[arg(long = "index", value_name = "FILE")]
        index: Option<PathBuf>,

        /// Parallel trace workers
        #[arg(short = 'j', long = "jobs", value_name = "N", default_value = "4")]
        jobs: usize,
    },
}

/// Parse `0.4,0.3,0.3` into category weights
pub fn parse_weights(text: &str) -> anyhow::Result<(f64, f64, f64)> {
    let parts: Vec<f64> = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| anyhow::anyhow!("Invalid weight '{}'", part.trim()))
        })
        .collect::<anyhow::Result<_>>()?;
    match parts.as_slice() {
        [file, library, network] => Ok((*file, *library, *network)),
        _ => anyhow::bail!(
            "Expected three weights FILE,LIBRARY,NETWORK, got {}",
            parts.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_graph_command() {
        let cli = Cli::parse_from(["dozer", "graph", "trace.txt", "--resolve"]);
        match cli.command {
            Command::Graph {
                trace,
                resolve,
                record_failed,
                ignore,
            } => {
                assert_eq!(trace, PathBuf::from("trace.txt"));
                assert!(resolve);
                assert!(!record_failed);
                assert!(ignore.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "dozer", "compare", "a.txt", "b.txt", "--format", "json", "--debug", "-c", "dozer.toml",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("dozer.toml")));
    }

    #[test]
    fn test_cli_compare_overrides() {
        let cli = Cli::parse_from([
            "dozer",
            "compare",
            "a.txt",
            "b.txt",
            "--threshold",
            "0.9",
            "--weights",
            "0.5,0.25,0.25",
        ]);
        match cli.command {
            Command::Compare {
                threshold, weights, ..
            } => {
                assert_eq!(threshold, Some(0.9));
                assert_eq!(weights.as_deref(), Some("0.5,0.25,0.25"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_resolve_paths_without_traces() {
        let cli = Cli::parse_from(["dozer", "resolve", "--path", "/usr/sbin/nginx"]);
        match cli.command {
            Command::Resolve {
                traces, paths, jobs, ..
            } => {
                assert!(traces.is_empty());
                assert_eq!(paths, vec!["/usr/sbin/nginx".to_string()]);
                assert_eq!(jobs, 4);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_resolve_requires_input() {
        assert!(Cli::try_parse_from(["dozer", "resolve"]).is_err());
    }

    #[test]
    fn test_parse_weights() {
        assert_eq!(parse_weights("0.4,0.3,0.3").unwrap(), (0.4, 0.3, 0.3));
        assert_eq!(parse_weights(" 1, 0 ,0").unwrap(), (1.0, 0.0, 0.0));
        assert!(parse_weights("0.5,0.5").is_err());
        assert!(parse_weights("a,b,c").is_err());
    }
}
