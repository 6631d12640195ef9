//! Analysis configuration
//!
//! One TOML document drives every stage. All sections and fields are
//! optional; missing ones take the defaults below.
//!
//! ```toml
//! [parse]
//! default_pid = 0
//! initial_cwd = "/"
//!
//! [graph]
//! ignore = ["memory", "timing", "sync", "signal", "process-info"]
//! record_failed = false
//!
//! [score]
//! threshold = 0.85
//! match_threshold = 0.7
//! weights = { file = 0.4, library = 0.3, network = 0.3 }
//!
//! [resolver]
//! min_confidence = 0.6
//! query_timeout_ms = 2000
//! workers = 4
//! # index = "packages.toml"
//! ```

use crate::equivalence::ScoreConfig;
use crate::error::ConfigError;
use crate::filter::IgnoreSet;
use crate::parse::Pid;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Parser settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Pid assigned to lines without a pid prefix
    pub default_pid: Pid,
    /// Working directory assumed for processes whose cwd was never observed
    pub initial_cwd: String,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            default_pid: 0,
            initial_cwd: "/".to_string(),
        }
    }
}

impl ParseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_cwd.starts_with('/') {
            return Err(ConfigError::RelativeCwd(self.initial_cwd.clone()));
        }
        Ok(())
    }
}

/// Graph builder settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Calls (or call classes) that never create resource nodes
    pub ignore: IgnoreSet,
    /// Let failed and never-completed calls create nodes
    pub record_failed: bool,
}

/// Resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Heuristic matches below this similarity are reported unresolved
    pub min_confidence: f64,
    /// Upper bound on any remote index query
    pub query_timeout_ms: u64,
    /// Parallel resolution workers
    pub workers: usize,
    /// Package index file; the embedded index is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            query_timeout_ms: 2000,
            workers: 4,
            index: None,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::OutOfRange {
                name: "min_confidence",
                value: self.min_confidence,
            });
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::TooSmall {
                name: "query_timeout_ms",
                min: 1,
                value: 0,
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::TooSmall {
                name: "workers",
                min: 1,
                value: 0,
            });
        }
        Ok(())
    }
}

/// Complete analysis configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub parse: ParseConfig,
    pub graph: GraphConfig,
    pub score: ScoreConfig,
    pub resolver: ResolverConfig,
}

impl AnalysisConfig {
    /// Load and validate a TOML configuration file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, is not valid TOML, or holds
    /// out-of-range values.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read configuration: {}", path.as_ref().display())
        })?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration: {}", path.as_ref().display()))?;

        // Relative index paths are relative to the configuration file
        if let (Some(index), Some(dir)) = (&config.resolver.index, path.as_ref().parent()) {
            if index.is_relative() {
                config.resolver.index = Some(dir.join(index));
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parse.validate()?;
        self.score.validate()?;
        self.resolver.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.parse.default_pid, 0);
        assert_eq!(config.parse.initial_cwd, "/");
        assert_eq!(config.graph.ignore, IgnoreSet::default());
        assert!(!config.graph.record_failed);
        assert_eq!(config.score.threshold, 0.85);
        assert_eq!(config.resolver.workers, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document() -> Result<()> {
        let config = AnalysisConfig::from_toml_str(
            r#"
[graph]
ignore = ["futex", "timing"]
record_failed = true

[score]
threshold = 0.9
"#,
        )?;
        assert!(config.graph.record_failed);
        assert!(config.graph.ignore.should_skip("futex"));
        assert!(config.graph.ignore.should_skip("clock_gettime"));
        assert!(!config.graph.ignore.should_skip("mmap"));
        assert_eq!(config.score.threshold, 0.9);
        assert_eq!(config.score.match_threshold, 0.7);
        assert_eq!(config.resolver, ResolverConfig::default());
        Ok(())
    }

    #[test]
    fn test_empty_document_is_default() -> Result<()> {
        assert_eq!(AnalysisConfig::from_toml_str("")?, AnalysisConfig::default());
        Ok(())
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let err = AnalysisConfig::from_toml_str(
            "[score]\nweights = { file = 0.5, library = 0.5, network = 0.5 }\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("weights"));
    }

    #[test]
    fn test_relative_cwd_rejected() {
        assert!(AnalysisConfig::from_toml_str("[parse]\ninitial_cwd = \"srv\"\n").is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ResolverConfig {
            workers: 0,
            ..ResolverConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooSmall {
                name: "workers",
                min: 1,
                value: 0
            })
        );
    }

    #[test]
    fn test_from_file_resolves_index_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dozer.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "[resolver]\nindex = \"packages.toml\"\nworkers = 2")?;

        let config = AnalysisConfig::from_toml(&path)?;
        assert_eq!(config.resolver.workers, 2);
        assert_eq!(config.resolver.index, Some(dir.path().join("packages.toml")));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        assert!(AnalysisConfig::from_toml("/nonexistent/dozer.toml").is_err());
    }

    #[test]
    fn test_round_trip_through_toml() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        let text = toml::to_string(&AnalysisConfig::default())?;
        file.write_all(text.as_bytes())?;
        let back = AnalysisConfig::from_toml(file.path())?;
        assert_eq!(back, AnalysisConfig::default());
        Ok(())
    }
}
