//! Resource identities and access vocabulary

use crate::parse::{Pid, SockAddr};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport of a network endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Unix,
    /// Socket whose type was never observed
    Ip,
}

impl Protocol {
    /// Derive from `socket(domain, type, ...)` flag names
    pub fn from_socket_args(domain: &[String], kind: &[String]) -> Self {
        if domain.iter().any(|d| d == "AF_UNIX" || d == "AF_LOCAL") {
            return Protocol::Unix;
        }
        if kind.iter().any(|k| k == "SOCK_STREAM") {
            Protocol::Tcp
        } else if kind.iter().any(|k| k == "SOCK_DGRAM") {
            Protocol::Udp
        } else {
            Protocol::Ip
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Unix => "unix",
            Protocol::Ip => "ip",
        };
        f.write_str(name)
    }
}

/// Network endpoint tuple
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: Protocol,
    /// IP address, or socket path for unix sockets
    pub address: String,
    pub port: Option<u16>,
}

impl Endpoint {
    /// Build from a decoded socket address; `protocol` comes from the socket
    /// entry when known
    pub fn from_sockaddr(addr: &SockAddr, protocol: Option<Protocol>) -> Option<Self> {
        match addr {
            SockAddr::Inet { address, port } | SockAddr::Inet6 { address, port } => Some(Self {
                protocol: protocol
                    .filter(|p| *p != Protocol::Unix)
                    .unwrap_or(Protocol::Ip),
                address: address.clone(),
                port: Some(*port),
            }),
            SockAddr::Unix { path } => Some(Self {
                protocol: Protocol::Unix,
                address: path.clone(),
                port: None,
            }),
            SockAddr::Other { .. } => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.address.contains(':') => {
                write!(f, "{}://[{}]:{}", self.protocol, self.address, port)
            }
            Some(port) => write!(f, "{}://{}:{}", self.protocol, self.address, port),
            None => write!(f, "{}:{}", self.protocol, self.address),
        }
    }
}

/// Canonical key of a dependency
///
/// Ordering is derived so graphs built from the same events always list
/// nodes in the same order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResourceIdentity {
    /// Absolute, lexically normalized path
    Path(String),
    Library {
        soname: String,
        version: Option<String>,
    },
    Endpoint(Endpoint),
    /// Descriptor inherited from before tracing began
    Ambiguous { pid: Pid, fd: i32 },
}

impl ResourceIdentity {
    /// Classify an absolute path: shared objects become library identities
    pub fn from_path(path: &str) -> Self {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match split_soname(file_name) {
            Some((soname, version)) => ResourceIdentity::Library {
                soname: soname.to_string(),
                version: version.map(str::to_string),
            },
            None => ResourceIdentity::Path(path.to_string()),
        }
    }

    pub fn category(&self) -> ResourceCategory {
        match self {
            ResourceIdentity::Path(_) | ResourceIdentity::Ambiguous { .. } => ResourceCategory::File,
            ResourceIdentity::Library { .. } => ResourceCategory::Library,
            ResourceIdentity::Endpoint(_) => ResourceCategory::Network,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, ResourceIdentity::Ambiguous { .. })
    }

    /// Path for path identities
    pub fn as_path(&self) -> Option<&str> {
        match self {
            ResourceIdentity::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceIdentity::Path(p) => f.write_str(p),
            ResourceIdentity::Library {
                soname,
                version: Some(v),
            } => write!(f, "{}.{}", soname, v),
            ResourceIdentity::Library {
                soname,
                version: None,
            } => f.write_str(soname),
            ResourceIdentity::Endpoint(e) => write!(f, "{}", e),
            ResourceIdentity::Ambiguous { pid, fd } => write!(f, "<ambiguous pid={} fd={}>", pid, fd),
        }
    }
}

/// Split `libssl.so.3` into (`libssl.so`, `3`); `None` if not a shared object
///
/// Matches `lib*.so*`, `ld-*.so*` and any `*.so`.
pub fn split_soname(file_name: &str) -> Option<(&str, Option<&str>)> {
    let idx = file_name.find(".so")?;
    let soname = &file_name[..idx + 3];
    let rest = &file_name[idx + 3..];
    let stem = &file_name[..idx];
    if stem.is_empty() {
        return None;
    }

    if rest.is_empty() {
        return Some((soname, None));
    }
    let version = rest.strip_prefix('.')?;
    let is_version = !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    let is_library_name = file_name.starts_with("lib") || file_name.starts_with("ld-");
    (is_version && is_library_name).then_some((soname, Some(version)))
}

/// Coarse resource class used for partitioning and weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    File,
    Library,
    Network,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 3] = [
        ResourceCategory::File,
        ResourceCategory::Library,
        ResourceCategory::Network,
    ];
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceCategory::File => "file",
            ResourceCategory::Library => "library",
            ResourceCategory::Network => "network",
        };
        f.write_str(name)
    }
}

/// Kind of access a call performed on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    Read,
    Write,
    Execute,
    Connect,
    Listen,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessType::Read => "READ",
            AccessType::Write => "WRITE",
            AccessType::Execute => "EXECUTE",
            AccessType::Connect => "CONNECT",
            AccessType::Listen => "LISTEN",
        };
        f.write_str(name)
    }
}
