//! Package indexes consulted by the resolver

use crate::similarity::trigrams;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// One package of the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    /// Declarative package attribute (`openssl`, `python3Packages.pip`)
    pub name: String,
    /// File basenames the package ships
    #[serde(default)]
    pub provides: Vec<String>,
    /// Well-known absolute paths owned by the package
    #[serde(default)]
    pub paths: Vec<String>,
}

impl PackageEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provides: Vec::new(),
            paths: Vec::new(),
        }
    }

    pub fn with_provides<I, S>(mut self, basenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.extend(basenames.into_iter().map(Into::into));
        self
    }

    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// Exact path → package pair outside any `[[package]]` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactEntry {
    pub path: String,
    pub package: String,
}

/// Source of package candidates for tiers 2 and 3
///
/// Implementations must be safe to query from several resolver workers at
/// once. A remote index (`is_remote() == true`) has every query bounded by
/// the resolver's timeout.
pub trait PackageIndex: Send + Sync {
    /// Names of packages shipping a file with this basename, sorted
    fn by_basename(&self, basename: &str) -> Vec<String>;

    /// Packages whose name plausibly matches a heuristic token
    fn candidates(&self, token: &str) -> Vec<PackageEntry>;

    fn is_remote(&self) -> bool {
        false
    }
}

/// Tier-1 table of exact, well-known paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExactTable {
    entries: BTreeMap<String, String>,
}

impl ExactTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, package: impl Into<String>) {
        self.entries.insert(path.into(), package.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Deserialize)]
struct IndexFile {
    #[serde(default)]
    package: Vec<PackageEntry>,
    #[serde(default)]
    exact: Vec<ExactEntry>,
}

/// In-memory index loaded from TOML
///
/// # Example TOML
/// ```toml
/// [[package]]
/// name = "openssl"
/// provides = ["libssl.so.3", "libcrypto.so.3"]
/// paths = ["/usr/bin/openssl"]
///
/// [[exact]]
/// path = "/etc/hosts"
/// package = "iana-etc"
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticIndex {
    packages: BTreeMap<String, PackageEntry>,
    exact: Vec<ExactEntry>,
    /// basename → package names
    basenames: BTreeMap<String, BTreeSet<String>>,
    /// package name → trigrams of the lowercased name
    name_trigrams: BTreeMap<String, BTreeSet<String>>,
}

/// Minimum trigram Jaccard overlap for a package to become a candidate
const TRIGRAM_OVERLAP: f64 = 0.25;

impl StaticIndex {
    /// Load an index from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a valid index.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read package index: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid package index: {}", path.as_ref().display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: IndexFile =
            toml::from_str(content).context("Failed to parse TOML package index")?;
        Ok(Self::from_entries(file.package, file.exact))
    }

    /// Index compiled into the binary from `resolver-default.toml`
    pub fn builtin() -> Result<Self> {
        const DEFAULT_TOML: &str = include_str!("../../resolver-default.toml");
        Self::from_toml_str(DEFAULT_TOML).context("Failed to parse embedded resolver-default.toml")
    }

    pub fn from_entries(packages: Vec<PackageEntry>, exact: Vec<ExactEntry>) -> Self {
        let mut index = Self {
            exact,
            ..Self::default()
        };
        for package in packages {
            for basename in &package.provides {
                index
                    .basenames
                    .entry(basename.clone())
                    .or_default()
                    .insert(package.name.clone());
            }
            index
                .name_trigrams
                .insert(package.name.clone(), trigrams(&package.name));
            // Later duplicates extend the earlier entry
            match index.packages.get_mut(&package.name) {
                Some(existing) => {
                    existing.provides.extend(package.provides);
                    existing.paths.extend(package.paths);
                }
                None => {
                    index.packages.insert(package.name.clone(), package);
                }
            }
        }
        index
    }

    /// Tier-1 table: every `paths` entry plus the `[[exact]]` pairs
    pub fn exact_table(&self) -> ExactTable {
        let mut table = ExactTable::new();
        for package in self.packages.values() {
            for path in &package.paths {
                table.insert(path.clone(), package.name.clone());
            }
        }
        for entry in &self.exact {
            table.insert(entry.path.clone(), entry.package.clone());
        }
        table
    }

    pub fn package(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.get(name)
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageIndex for StaticIndex {
    fn by_basename(&self, basename: &str) -> Vec<String> {
        self.basenames
            .get(basename)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn candidates(&self, token: &str) -> Vec<PackageEntry> {
        if token.is_empty() {
            return Vec::new();
        }
        let token = token.to_lowercase();
        let token_grams = trigrams(&token);
        self.packages
            .values()
            .filter(|package| {
                let name = package.name.to_lowercase();
                if name.contains(&token) || token.contains(&name) {
                    return true;
                }
                let Some(grams) = self.name_trigrams.get(&package.name) else {
                    return false;
                };
                let shared = grams.intersection(&token_grams).count();
                let union = grams.union(&token_grams).count();
                union > 0 && shared as f64 / union as f64 >= TRIGRAM_OVERLAP
            })
            .cloned()
            .collect()
    }
}
