//! Structured diagnostics channel
//!
//! Every recoverable condition met while parsing, tracking or resolving is
//! recorded here instead of failing the pipeline. Callers decide whether any
//! kind is fatal for their use case.

use crate::parse::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a diagnostic record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Line did not match the trace grammar and was skipped
    MalformedLine,
    /// `<unfinished ...>` call never resumed before end of input
    IncompleteCall,
    /// `<... name resumed>` seen with no pending partial call
    OrphanResume,
    /// Descriptor referenced but never observed being opened
    AmbiguousDescriptor,
    /// Resource could not be mapped to a package
    UnresolvedResource,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticKind::MalformedLine => "malformed-line",
            DiagnosticKind::IncompleteCall => "incomplete-call",
            DiagnosticKind::OrphanResume => "orphan-resume",
            DiagnosticKind::AmbiguousDescriptor => "ambiguous-descriptor",
            DiagnosticKind::UnresolvedResource => "unresolved-resource",
        };
        f.write_str(label)
    }
}

/// Where a diagnostic originated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based trace line number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<Pid>,
    /// Resource identity (resolver diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Location {
    pub fn line(line: usize) -> Self {
        Self {
            line: Some(line),
            ..Self::default()
        }
    }

    pub fn event(line: usize, pid: Pid) -> Self {
        Self {
            line: Some(line),
            pid: Some(pid),
            resource: None,
        }
    }

    pub fn resource(identity: impl Into<String>) -> Self {
        Self {
            resource: Some(identity.into()),
            ..Self::default()
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(line) = self.line {
            parts.push(format!("line {}", line));
        }
        if let Some(pid) = self.pid {
            parts.push(format!("pid {}", pid));
        }
        if let Some(resource) = &self.resource {
            parts.push(resource.clone());
        }
        if parts.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// A single diagnostic record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// Count diagnostics of one kind
pub fn count_kind(diagnostics: &[Diagnostic], kind: DiagnosticKind) -> usize {
    diagnostics.iter().filter(|d| d.kind == kind).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_location() {
        let diag = Diagnostic::new(
            DiagnosticKind::IncompleteCall,
            Location::event(12, 100),
            "read never resumed",
        );
        let text = diag.to_string();
        assert!(text.contains("incomplete-call"));
        assert!(text.contains("line 12"));
        assert!(text.contains("pid 100"));
        assert!(text.contains("read never resumed"));
    }

    #[test]
    fn test_empty_location_display() {
        assert_eq!(Location::default().to_string(), "-");
    }

    #[test]
    fn test_count_kind() {
        let diags = vec![
            Diagnostic::new(DiagnosticKind::MalformedLine, Location::line(1), "x"),
            Diagnostic::new(DiagnosticKind::MalformedLine, Location::line(2), "y"),
            Diagnostic::new(DiagnosticKind::OrphanResume, Location::line(3), "z"),
        ];
        assert_eq!(count_kind(&diags, DiagnosticKind::MalformedLine), 2);
        assert_eq!(count_kind(&diags, DiagnosticKind::IncompleteCall), 0);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&DiagnosticKind::AmbiguousDescriptor).unwrap();
        assert_eq!(json, "\"ambiguous_descriptor\"");
    }
}
