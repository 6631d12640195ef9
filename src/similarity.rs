//! Deterministic, symmetric similarity functions
//!
//! All scores are in `[0, 1]` and `f(a, b) == f(b, a)`. Used by the
//! equivalence scorer to pair near-identical resources across traces and by
//! the resolver to rank package candidates.

use crate::graph::{Endpoint, Protocol, ResourceIdentity};
use std::collections::BTreeSet;

/// Levenshtein edit distance over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / longer length`; two empty strings are identical
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Character trigrams of `text` (padded so short strings still have some)
pub fn trigrams(text: &str) -> BTreeSet<String> {
    let padded: Vec<char> = format!("  {} ", text.to_lowercase()).chars().collect();
    padded
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// Number of leading path components shared by `a` and `b`
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    a.split('/')
        .filter(|s| !s.is_empty())
        .zip(b.split('/').filter(|s| !s.is_empty()))
        .take_while(|(x, y)| x == y)
        .count()
}

const ROOT_PREFIXES: &[&str] = &["/run/current-system/sw", "/usr/local", "/usr"];

/// Fold distribution-specific layout into a common shape
///
/// `/nix/store/<hash>-openssl-3.1.2/lib/libssl.so` and
/// `/usr/lib/libssl.so` both become `/lib/libssl.so`.
pub fn canonical_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/nix/store/") {
        return match rest.find('/') {
            Some(slash) => rest[slash..].to_string(),
            None => "/".to_string(),
        };
    }
    for prefix in ROOT_PREFIXES {
        if let Some(rest) = path.strip_prefix(prefix) {
            if rest.is_empty() || rest.starts_with('/') {
                return if rest.is_empty() { "/".to_string() } else { rest.to_string() };
            }
        }
    }
    path.to_string()
}

/// Drop trailing version noise from a file name: `python3.11` → `python`,
/// `libfoo.so.1.2` → `libfoo.so`, `nginx-1.24` → `nginx`
pub fn strip_version(name: &str) -> &str {
    let mut end = name.len();
    loop {
        let head = &name[..end];
        let trimmed = head.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        let trimmed = trimmed.trim_end_matches(['-', '_', '.']);
        if trimmed.len() == end || trimmed.is_empty() {
            break;
        }
        end = trimmed.len();
    }
    &name[..end]
}

/// Similarity of two absolute paths after layout canonicalization
///
/// Weighted 0.7 on the (version-stripped) file name and 0.3 on the directory.
pub fn path_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a = canonical_path(a);
    let b = canonical_path(b);
    if a == b {
        return 1.0;
    }
    let (dir_a, base_a) = split_dir(&a);
    let (dir_b, base_b) = split_dir(&b);

    let base = if base_a == base_b {
        1.0
    } else {
        normalized_similarity(strip_version(base_a), strip_version(base_b)) * 0.95
    };
    let dir = normalized_similarity(dir_a, dir_b);
    0.7 * base + 0.3 * dir
}

fn split_dir(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

/// Soname similarity weighted 0.8, version agreement 0.2
pub fn library_similarity(
    soname_a: &str,
    version_a: Option<&str>,
    soname_b: &str,
    version_b: Option<&str>,
) -> f64 {
    let soname = if soname_a == soname_b {
        1.0
    } else {
        normalized_similarity(strip_version(soname_a), strip_version(soname_b))
    };
    let version = match (version_a, version_b) {
        (Some(x), Some(y)) if x == y => 1.0,
        (Some(x), Some(y)) => {
            // Same major version still counts for something
            let major = |v: &str| v.split('.').next().map(str::to_string);
            if major(x) == major(y) {
                0.75
            } else {
                0.0
            }
        }
        (None, None) => 1.0,
        _ => 0.5,
    };
    0.8 * soname + 0.2 * version
}

fn is_loopback(address: &str) -> bool {
    address.starts_with("127.") || address == "::1" || address == "localhost"
}

fn is_any(address: &str) -> bool {
    address == "0.0.0.0" || address == "::"
}

pub fn endpoint_similarity(a: &Endpoint, b: &Endpoint) -> f64 {
    let compatible = a.protocol == b.protocol
        || (a.protocol == Protocol::Ip && b.protocol != Protocol::Unix)
        || (b.protocol == Protocol::Ip && a.protocol != Protocol::Unix);
    if !compatible {
        return 0.0;
    }
    if a.protocol == Protocol::Unix {
        return path_similarity(&a.address, &b.address);
    }
    if a.port != b.port {
        return 0.0;
    }
    let same_address = a.address == b.address
        || (is_loopback(&a.address) && is_loopback(&b.address))
        || (is_any(&a.address) && is_any(&b.address));
    match (same_address, a.protocol == b.protocol) {
        (true, true) => 1.0,
        (true, false) => 0.9,
        (false, _) => 0.6,
    }
}

/// Similarity of two identities; different kinds never match
pub fn identity_similarity(a: &ResourceIdentity, b: &ResourceIdentity) -> f64 {
    match (a, b) {
        (ResourceIdentity::Path(x), ResourceIdentity::Path(y)) => path_similarity(x, y),
        (
            ResourceIdentity::Library {
                soname: sa,
                version: va,
            },
            ResourceIdentity::Library {
                soname: sb,
                version: vb,
            },
        ) => library_similarity(sa, va.as_deref(), sb, vb.as_deref()),
        (ResourceIdentity::Endpoint(x), ResourceIdentity::Endpoint(y)) => endpoint_similarity(x, y),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_normalized_bounds() {
        assert_eq!(normalized_similarity("", ""), 1.0);
        assert_eq!(normalized_similarity("abc", ""), 0.0);
        assert_eq!(normalized_similarity("openssl", "openssl"), 1.0);
        let s = normalized_similarity("openssl", "libressl");
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_common_prefix_len() {
        assert_eq!(common_prefix_len("/usr/lib/x", "/usr/lib/y"), 2);
        assert_eq!(common_prefix_len("/usr/libexec", "/usr/lib"), 1);
        assert_eq!(common_prefix_len("/a", "/b"), 0);
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(
            canonical_path("/nix/store/abcd-openssl-3.1.2/lib/libssl.so"),
            "/lib/libssl.so"
        );
        assert_eq!(canonical_path("/usr/lib/libssl.so"), "/lib/libssl.so");
        assert_eq!(canonical_path("/usr/local/bin/tool"), "/bin/tool");
        assert_eq!(canonical_path("/usrx/thing"), "/usrx/thing");
        assert_eq!(canonical_path("/etc/hosts"), "/etc/hosts");
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("python3.11"), "python");
        assert_eq!(strip_version("nginx-1.24.0"), "nginx");
        assert_eq!(strip_version("libfoo.so.1.2"), "libfoo.so");
        assert_eq!(strip_version("hosts"), "hosts");
        assert_eq!(strip_version("123"), "123");
    }

    #[test]
    fn test_store_and_fhs_paths_match() {
        let s = path_similarity("/nix/store/abcd-nginx-1.24.0/bin/nginx", "/usr/sbin/nginx");
        assert!(s >= 0.7, "similarity was {}", s);
        assert!(path_similarity("/etc/passwd", "/var/cache/xyz") < 0.5);
    }

    #[test]
    fn test_library_versions() {
        assert_eq!(library_similarity("libssl.so", None, "libssl.so", Some("3")), 0.9);
        assert_eq!(library_similarity("libssl.so", Some("3"), "libssl.so", Some("3")), 1.0);
        assert!(library_similarity("libssl.so", Some("3"), "libz.so", Some("1")) < 0.7);
    }

    #[test]
    fn test_endpoints() {
        let ep = |protocol, address: &str, port| Endpoint {
            protocol,
            address: address.to_string(),
            port,
        };
        let a = ep(Protocol::Tcp, "127.0.0.1", Some(5432));
        let b = ep(Protocol::Tcp, "::1", Some(5432));
        assert_eq!(endpoint_similarity(&a, &b), 1.0);
        let c = ep(Protocol::Tcp, "10.0.0.9", Some(5432));
        assert_eq!(endpoint_similarity(&a, &c), 0.6);
        let d = ep(Protocol::Udp, "127.0.0.1", Some(5432));
        assert_eq!(endpoint_similarity(&a, &d), 0.0);
        let e = ep(Protocol::Tcp, "127.0.0.1", Some(80));
        assert_eq!(endpoint_similarity(&a, &e), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            ("/usr/lib/libc.so.6", "/nix/store/x-glibc-2.38/lib/libc.so.6"),
            ("/etc/nginx/nginx.conf", "/etc/nginx.conf"),
            ("/a", "/bbbbbbbb/c"),
        ];
        for (a, b) in pairs {
            assert_eq!(path_similarity(a, b), path_similarity(b, a));
        }
    }

    #[test]
    fn test_different_kinds_never_match() {
        let path = ResourceIdentity::Path("/lib/libssl.so".to_string());
        let lib = ResourceIdentity::Library {
            soname: "libssl.so".to_string(),
            version: None,
        };
        assert_eq!(identity_similarity(&path, &lib), 0.0);
    }
}
