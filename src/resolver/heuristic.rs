//! Tier-3 heuristics: package-name tokens and candidate ranking

use super::index::PackageEntry;
use crate::similarity::{common_prefix_len, normalized_similarity, strip_version};
use std::cmp::Ordering;

/// Directories whose first child names the owning package
const PACKAGE_DIRS: &[&str] = &[
    "/usr/share/",
    "/usr/lib/",
    "/usr/libexec/",
    "/usr/include/",
    "/etc/",
    "/var/lib/",
    "/var/cache/",
    "/var/log/",
    "/opt/",
];

/// Guess a package-name token from an absolute path
///
/// - `/nix/store/<hash>-openssl-3.1.2/...` → `openssl`
/// - `/etc/nginx/nginx.conf` → `nginx`
/// - `/usr/lib/libssl.so.3` → `ssl`
/// - `/usr/bin/python3.11` → `python`
pub fn extract_token(path: &str) -> Option<String> {
    if let Some(name) = store_package_name(path) {
        return Some(name.to_lowercase());
    }

    let file_name = path.rsplit('/').next().unwrap_or(path);
    if let Some(stem) = library_stem(file_name) {
        return non_empty(stem);
    }

    for dir in PACKAGE_DIRS {
        if let Some(rest) = path.strip_prefix(dir) {
            // Only when the path goes below the package directory
            if let Some((first, _)) = rest.split_once('/') {
                return non_empty(strip_version(first));
            }
        }
    }

    let stem = match file_name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    non_empty(strip_version(stem))
}

fn non_empty(token: &str) -> Option<String> {
    let token = token.trim_matches(|c: char| c == '-' || c == '_' || c == '.');
    (!token.is_empty()).then(|| token.to_lowercase())
}

/// `<hash>-<name>-<version>` store component → `<name>`
fn store_package_name(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/nix/store/")?;
    let component = rest.split('/').next()?;
    let (_hash, name_version) = component.split_once('-')?;

    // Name parts run until the first part that starts with a digit
    let mut end = 0;
    for part in name_version.split('-') {
        if part.starts_with(|c: char| c.is_ascii_digit()) {
            break;
        }
        end += part.len() + 1;
    }
    let name = name_version.get(..end.saturating_sub(1))?;
    (!name.is_empty()).then_some(name)
}

/// `libssl.so.3` → `ssl`, `libz.so` → `z`
fn library_stem(file_name: &str) -> Option<&str> {
    let idx = file_name.find(".so")?;
    let after = &file_name[idx + 3..];
    if !(after.is_empty() || after.starts_with('.')) {
        return None;
    }
    let stem = &file_name[..idx];
    Some(stem.strip_prefix("lib").unwrap_or(stem))
}

/// A scored tier-3 candidate
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub name: String,
    pub score: f64,
    /// Longest shared path prefix (in components) with any known package path
    pub prefix: usize,
}

/// Score candidates against `token` and sort best first
///
/// Ties on similarity are broken by the longest common path prefix with the
/// resource's own paths, then by name so ranking is deterministic.
pub fn rank_candidates(
    token: &str,
    resource_paths: &[&str],
    candidates: Vec<PackageEntry>,
) -> Vec<RankedCandidate> {
    let token = token.to_lowercase();
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|package| {
            let score = normalized_similarity(&token, &package.name.to_lowercase());
            let prefix = package
                .paths
                .iter()
                .flat_map(|known| resource_paths.iter().map(move |p| common_prefix_len(p, known)))
                .max()
                .unwrap_or(0);
            RankedCandidate {
                name: package.name,
                score,
                prefix,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.prefix.cmp(&a.prefix))
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.dedup_by(|a, b| a.name == b.name);
    ranked
}
