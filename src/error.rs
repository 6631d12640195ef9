//! Error taxonomy
//!
//! Only [`TraceError::EmptyTrace`] stops a trace. Malformed lines and
//! unresolved resources are recoverable and end up in the diagnostics channel;
//! ambiguous descriptors and incomplete calls are warnings and only ever exist
//! as [`DiagnosticKind`] values.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Location};
use std::path::PathBuf;
use thiserror::Error;

/// A trace line that does not match the tracer grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed trace line {line}: {reason}")]
pub struct MalformedLineError {
    /// 1-based line number
    pub line: usize,
    pub reason: String,
}

impl MalformedLineError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

impl From<MalformedLineError> for Diagnostic {
    fn from(err: MalformedLineError) -> Self {
        Diagnostic::new(
            DiagnosticKind::MalformedLine,
            Location::line(err.line),
            err.reason,
        )
    }
}

/// No package cleared the resolver's confidence floor
#[derive(Error, Debug, Clone, PartialEq)]
#[error("unresolved resource {identity}{}", best_candidate_suffix(.best_candidate))]
pub struct UnresolvedResourceError {
    pub identity: String,
    /// Best heuristic candidate and its similarity, if any was scored
    pub best_candidate: Option<(String, f64)>,
}

fn best_candidate_suffix(best: &Option<(String, f64)>) -> String {
    match best {
        Some((name, score)) => format!(" (best candidate '{}' at {:.2})", name, score),
        None => String::new(),
    }
}

impl From<&UnresolvedResourceError> for Diagnostic {
    fn from(err: &UnresolvedResourceError) -> Self {
        Diagnostic::new(
            DiagnosticKind::UnresolvedResource,
            Location::resource(err.identity.clone()),
            err.to_string(),
        )
    }
}

/// Structural failures that stop processing of one trace
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("trace is empty or entirely unparseable ({lines} lines, {skipped} skipped)")]
    EmptyTrace { lines: usize, skipped: usize },

    #[error("trace processing cancelled before {0} was started")]
    Cancelled(String),

    #[error("failed to read trace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid scoring or resolver configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("category weights must each be in [0, 1] and sum to 1.0, got file={file}, library={library}, network={network}")]
    InvalidWeights { file: f64, library: f64, network: f64 },

    #[error("{name} must be in [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        min: u64,
        value: u64,
    },

    #[error("initial_cwd must be an absolute path, got '{0}'")]
    RelativeCwd(String),
}
