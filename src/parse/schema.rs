//! Per-call argument schemas
//!
//! Each known call name maps to a slice of [`ArgKind`]s used to decode its raw
//! argument list into [`ArgValue`]s. Unknown calls use the opaque schema, which
//! still decodes quoted strings and integers but never fails.

use super::event::{ArgValue, SockAddr};
use super::tokenizer::parse_int;
use once_cell::sync::Lazy;
use regex::Regex;

/// How a positional argument is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Fd,
    /// Directory descriptor or `AT_FDCWD`
    DirFd,
    Path,
    Flags,
    /// Permission bits, printed in octal
    Mode,
    Int,
    SockAddr,
    Buffer,
    Raw,
}

use ArgKind::{Buffer, DirFd, Fd, Flags, Int, Mode, Path, Raw};

const OPAQUE: &[ArgKind] = &[];

/// Argument schema for a call name
pub fn schema_for(name: &str) -> &'static [ArgKind] {
    match name {
        "open" => &[Path, Flags, Mode],
        "openat" => &[DirFd, Path, Flags, Mode],
        "openat2" => &[DirFd, Path, Raw, Int],
        "creat" => &[Path, Mode],
        "name_to_handle_at" => &[DirFd, Path, Raw, Raw, Flags],

        "read" | "write" | "pread64" | "pwrite64" => &[Fd, Buffer, Int, Int],
        "readv" | "writev" | "preadv" | "pwritev" | "preadv2" | "pwritev2" => &[Fd, Raw, Int],
        "getdents" | "getdents64" => &[Fd, Raw, Int],
        "sendfile" | "sendfile64" => &[Fd, Fd, Raw, Int],
        "copy_file_range" => &[Fd, Raw, Fd, Raw, Int, Flags],
        "lseek" => &[Fd, Int, Flags],
        "ftruncate" => &[Fd, Int],
        "fsync" | "fdatasync" | "close" | "dup" | "fchdir" | "syncfs" => &[Fd],
        "fchmod" => &[Fd, Mode],
        "fchown" => &[Fd, Int, Int],
        "fstat" | "fstatfs" => &[Fd, Raw],
        "flock" => &[Fd, Flags],
        "ioctl" => &[Fd, Flags, Raw],
        "dup2" => &[Fd, Fd],
        "dup3" => &[Fd, Fd, Flags],
        "fcntl" | "fcntl64" => &[Fd, Flags, Flags],

        "chdir" | "chroot" | "rmdir" | "unlink" | "acct" => &[Path],
        "getcwd" => &[Path, Int],
        "mkdir" | "chmod" => &[Path, Mode],
        "mkdirat" | "fchmodat" => &[DirFd, Path, Mode],
        "mknod" => &[Path, Mode, Int],
        "mknodat" => &[DirFd, Path, Mode, Int],
        "unlinkat" => &[DirFd, Path, Flags],
        "rename" | "link" | "symlink" => &[Path, Path],
        "renameat" => &[DirFd, Path, DirFd, Path],
        "renameat2" | "linkat" => &[DirFd, Path, DirFd, Path, Flags],
        "symlinkat" => &[Path, DirFd, Path],
        "chown" | "lchown" => &[Path, Int, Int],
        "fchownat" => &[DirFd, Path, Int, Int, Flags],
        "truncate" => &[Path, Int],
        "utimensat" => &[DirFd, Path, Raw, Flags],
        "utime" | "utimes" => &[Path, Raw],
        "setxattr" | "lsetxattr" => &[Path, Buffer, Buffer, Int, Flags],
        "removexattr" | "lremovexattr" => &[Path, Buffer],
        "inotify_add_watch" => &[Fd, Path, Flags],

        "stat" | "lstat" | "stat64" | "lstat64" | "statfs" => &[Path, Raw],
        "newfstatat" | "fstatat64" => &[DirFd, Path, Raw, Flags],
        "statx" => &[DirFd, Path, Flags, Flags, Raw],
        "access" => &[Path, Flags],
        "faccessat" | "faccessat2" => &[DirFd, Path, Flags, Flags],
        "readlink" => &[Path, Buffer, Int],
        "readlinkat" => &[DirFd, Path, Buffer, Int],
        "getxattr" | "lgetxattr" => &[Path, Buffer, Raw, Int],
        "listxattr" | "llistxattr" => &[Path, Raw, Int],

        "execve" => &[Path, Raw, Raw],
        "execveat" => &[DirFd, Path, Raw, Raw, Flags],

        "socket" => &[Flags, Flags, Int],
        "socketpair" => &[Flags, Flags, Int, Raw],
        "connect" | "bind" => &[Fd, ArgKind::SockAddr, Int],
        "listen" => &[Fd, Int],
        "accept" => &[Fd, ArgKind::SockAddr, Raw],
        "accept4" => &[Fd, ArgKind::SockAddr, Raw, Flags],
        "getsockname" | "getpeername" => &[Fd, ArgKind::SockAddr, Raw],
        "sendto" => &[Fd, Buffer, Int, Flags, ArgKind::SockAddr, Int],
        "recvfrom" => &[Fd, Buffer, Int, Flags, ArgKind::SockAddr, Raw],
        "sendmsg" | "recvmsg" => &[Fd, Raw, Flags],
        "sendmmsg" | "recvmmsg" => &[Fd, Raw, Int, Flags],
        "shutdown" => &[Fd, Flags],
        "setsockopt" | "getsockopt" => &[Fd, Flags, Flags, Raw, Raw],

        "pipe" => &[Raw],
        "pipe2" => &[Raw, Flags],
        "eventfd" => &[Int],
        "eventfd2" => &[Int, Flags],
        "epoll_create" => &[Int],
        "epoll_create1" | "inotify_init1" => &[Flags],
        "timerfd_create" => &[Flags, Flags],
        "signalfd" => &[Fd, Raw, Int],
        "signalfd4" => &[Fd, Raw, Int, Flags],
        "memfd_create" => &[Buffer, Flags],

        _ => OPAQUE,
    }
}

/// Decode a raw argument list using the call's schema
pub fn decode_args(name: &str, raw: &str) -> Vec<ArgValue> {
    let schema = schema_for(name);
    split_top_level(raw)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| decode(schema.get(i).copied().unwrap_or(Raw), piece))
        .collect()
}

fn decode(kind: ArgKind, piece: &str) -> ArgValue {
    match kind {
        ArgKind::Fd | ArgKind::DirFd => decode_descriptor(piece).unwrap_or_else(|| generic(piece)),
        ArgKind::Path => match unquote(piece) {
            Some((value, truncated)) => ArgValue::Path { value, truncated },
            None => generic(piece),
        },
        ArgKind::Flags => decode_flags(piece),
        ArgKind::Mode => match parse_mode(piece) {
            Some(mode) => ArgValue::Int(mode),
            None => decode_flags(piece),
        },
        ArgKind::Int => parse_int(piece).map_or_else(|| generic(piece), ArgValue::Int),
        ArgKind::SockAddr => decode_sockaddr(piece).map_or_else(|| generic(piece), ArgValue::SockAddr),
        ArgKind::Buffer | ArgKind::Raw => generic(piece),
    }
}

/// Quoted strings and integers, everything else raw
fn generic(piece: &str) -> ArgValue {
    if let Some((value, truncated)) = unquote(piece) {
        return ArgValue::Str { value, truncated };
    }
    match parse_int(piece) {
        Some(v) => ArgValue::Int(v),
        None => ArgValue::Raw(piece.to_string()),
    }
}

fn decode_descriptor(piece: &str) -> Option<ArgValue> {
    if piece == "AT_FDCWD" {
        return Some(ArgValue::AtCwd);
    }
    let digits = piece
        .bytes()
        .take_while(|b| b.is_ascii_digit() || *b == b'-')
        .count();
    let fd = piece[..digits].parse::<i32>().ok()?;
    let decoration = &piece[digits..];
    if decoration.is_empty() {
        return Some(ArgValue::Descriptor { fd, path: None });
    }
    let path = decoration.strip_prefix('<')?.strip_suffix('>')?;
    Some(ArgValue::Descriptor {
        fd,
        path: Some(path.to_string()),
    })
}

fn decode_flags(piece: &str) -> ArgValue {
    if let Some(v) = parse_int(piece) {
        return ArgValue::Int(v);
    }
    let is_flag_set = !piece.is_empty()
        && piece
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_' || b == b'|');
    if is_flag_set {
        ArgValue::Flags(piece.split('|').map(str::to_string).collect())
    } else {
        generic(piece)
    }
}

/// `0644` style octal, falling back to plain integers
fn parse_mode(piece: &str) -> Option<i64> {
    if piece.len() > 1 && piece.starts_with('0') && !piece.starts_with("0x") {
        return i64::from_str_radix(&piece[1..], 8).ok();
    }
    parse_int(piece)
}

static SA_FAMILY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sa_family=(\w+)").expect("valid family regex"));
static INET_PORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sin6?_port=htons\((\d+)\)").expect("valid port regex"));
static INET_ADDR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"inet_addr\("([^"]*)"\)"#).expect("valid inet regex"));
static INET6_ADDR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"inet_pton\(AF_INET6,\s*"([^"]*)""#).expect("valid inet6 regex")
});
static UNIX_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"sun_path=(@?)"((?:[^"\\]|\\.)*)""#).expect("valid unix regex"));

fn decode_sockaddr(piece: &str) -> Option<SockAddr> {
    if !piece.starts_with('{') {
        return None;
    }
    let family = SA_FAMILY.captures(piece)?.get(1)?.as_str();
    let port = || {
        INET_PORT
            .captures(piece)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .unwrap_or(0)
    };
    let capture = |re: &Regex, group: usize| {
        re.captures(piece)
            .and_then(|c| c.get(group))
            .map(|m| m.as_str().to_string())
    };

    let addr = match family {
        "AF_INET" => SockAddr::Inet {
            address: capture(&INET_ADDR, 1).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: port(),
        },
        "AF_INET6" => SockAddr::Inet6 {
            address: capture(&INET6_ADDR, 1).unwrap_or_else(|| "::".to_string()),
            port: port(),
        },
        "AF_UNIX" | "AF_LOCAL" => {
            let abstract_prefix = capture(&UNIX_PATH, 1).unwrap_or_default();
            let path = capture(&UNIX_PATH, 2)
                .map(|p| unescape(&p))
                .unwrap_or_default();
            SockAddr::Unix {
                path: format!("{}{}", abstract_prefix, path),
            }
        }
        other => SockAddr::Other {
            name: other.to_string(),
        },
    };
    Some(addr)
}

/// Split on commas that are outside strings, brackets and comments
pub fn split_top_level(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            match b {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'/' if bytes.get(i + 1) == Some(&b'*') => match raw[i + 2..].find("*/") {
                    Some(end) => i += 2 + end + 1,
                    None => i = bytes.len(),
                },
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => {
                    pieces.push(raw[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }

    let last = raw.get(start..).unwrap_or("").trim();
    if !last.is_empty() || !pieces.is_empty() {
        pieces.push(last);
    }
    pieces
}

/// Parse `"..."` or `"..."...`, returning the unescaped text and truncation flag
fn unquote(piece: &str) -> Option<(String, bool)> {
    let inner = piece.strip_prefix('"')?;
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => break,
            _ => i += 1,
        }
    }
    if i >= bytes.len() {
        return None;
    }
    let rest = &inner[i + 1..];
    let truncated = match rest {
        "" => false,
        "..." => true,
        _ => return None,
    };
    Some((unescape(&inner[..i]), truncated))
}

/// Resolve C-style escapes as printed by the tracer
pub fn unescape(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let next = bytes[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'v' => out.push(0x0b),
            b'f' => out.push(0x0c),
            b'x' => {
                let end = (i..bytes.len().min(i + 2))
                    .take_while(|&j| bytes[j].is_ascii_hexdigit())
                    .last()
                    .map_or(i, |j| j + 1);
                match u8::from_str_radix(&text[i..end], 16) {
                    Ok(b) => out.push(b),
                    Err(_) => out.extend_from_slice(b"\\x"),
                }
                i = end;
            }
            b'0'..=b'7' => {
                let start = i - 1;
                let end = (start..bytes.len().min(start + 3))
                    .take_while(|&j| (b'0'..=b'7').contains(&bytes[j]))
                    .last()
                    .map_or(start + 1, |j| j + 1);
                let value = u32::from_str_radix(&text[start..end], 8).unwrap_or(0);
                out.push((value & 0xff) as u8);
                i = end;
            }
            other => out.push(other),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
