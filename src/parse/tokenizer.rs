//! Line tokenizer for tracer text output
//!
//! Recognized line shapes (after an optional pid prefix and timestamp):
//!
//! ```text
//! openat(AT_FDCWD, "/etc/hosts", O_RDONLY|O_CLOEXEC) = 3 <0.000021>
//! read(3,  <unfinished ...>
//! <... read resumed>"127.0.0.1 localhost\n", 4096) = 20
//! connect(4, {...}, 16) = -1 ECONNREFUSED (Connection refused)
//! +++ exited with 0 +++
//! --- SIGCHLD {si_signo=SIGCHLD, ...} ---
//! ```

use super::event::{ExitStatus, Pid};
use crate::error::MalformedLineError;
use once_cell::sync::Lazy;
use regex::Regex;

static PID_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[pid\s+(\d+)\]|(\d+))\s+").expect("valid pid regex"));

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d{1,2}):(\d{2}):(\d{2})(\.\d+)?|(\d+\.\d+))\s+")
        .expect("valid timestamp regex")
});

static EXIT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+\+\+ (?:exited with (-?\d+)|killed by (\w+)(?: \(core dumped\))?) \+\+\+$")
        .expect("valid exit regex")
});

static SIGNAL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--- (\w+)\b.*---$").expect("valid signal regex"));

static RESUMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<\.\.\. (\w+) resumed>").expect("valid resume regex"));

const UNFINISHED_MARKERS: &[&str] = &["<unfinished ...>", "<detached ...>"];

/// Trailing return marker of a call line
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnMarker {
    Success { value: i64, path: Option<String> },
    /// `= ?`
    Unknown,
    Error { code: String, message: String },
    Unfinished,
    /// `<... name resumed>`; the result follows as a second marker
    Resumed(String),
}

/// Classified lexical unit of one trace line
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    PidTag(Pid),
    /// Seconds (wall clock, epoch or relative depending on tracer flags)
    Timestamp(f64),
    CallName(String),
    /// Raw argument text without the enclosing parentheses
    ArgList(String),
    Return(ReturnMarker),
    /// `-T` suffix
    Duration(f64),
    Exit(ExitStatus),
    Signal(String),
}

/// Split one trace line into tokens
///
/// Blank lines and tracer notices (`strace: Process 42 attached`) yield no
/// tokens. Anything else that does not fit the grammar is a
/// [`MalformedLineError`].
pub fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token>, MalformedLineError> {
    let malformed = |reason: &str| MalformedLineError::new(line_no, reason);

    let mut rest = line.trim();
    let mut tokens = Vec::new();
    if rest.is_empty() || rest.starts_with("strace: ") {
        return Ok(tokens);
    }

    if let Some(caps) = PID_PREFIX.captures(rest) {
        let digits = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        let pid = digits
            .parse::<Pid>()
            .map_err(|_| malformed("pid out of range"))?;
        tokens.push(Token::PidTag(pid));
        rest = &rest[caps.get(0).map_or(0, |m| m.end())..];
    }

    if let Some(caps) = TIMESTAMP.captures(rest) {
        let seconds = if let Some(epoch) = caps.get(5) {
            epoch.as_str().parse::<f64>().ok()
        } else {
            let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());
            let fraction = caps
                .get(4)
                .and_then(|m| format!("0{}", m.as_str()).parse::<f64>().ok())
                .unwrap_or(0.0);
            match (field(1), field(2), field(3)) {
                (Some(h), Some(m), Some(s)) => Some(h * 3600.0 + m * 60.0 + s + fraction),
                _ => None,
            }
        };
        let seconds = seconds.ok_or_else(|| malformed("invalid timestamp"))?;
        tokens.push(Token::Timestamp(seconds));
        rest = &rest[caps.get(0).map_or(0, |m| m.end())..];
    }

    if rest.starts_with("+++") {
        let caps = EXIT_LINE
            .captures(rest)
            .ok_or_else(|| malformed("unrecognized process status line"))?;
        let status = match (caps.get(1), caps.get(2)) {
            (Some(code), _) => ExitStatus::Exited(
                code.as_str()
                    .parse()
                    .map_err(|_| malformed("exit status out of range"))?,
            ),
            (None, Some(signal)) => ExitStatus::Killed(signal.as_str().to_string()),
            (None, None) => return Err(malformed("unrecognized process status line")),
        };
        tokens.push(Token::Exit(status));
        return Ok(tokens);
    }

    if rest.starts_with("---") {
        let caps = SIGNAL_LINE
            .captures(rest)
            .ok_or_else(|| malformed("unrecognized signal line"))?;
        let name = caps.get(1).map_or("", |m| m.as_str());
        tokens.push(Token::Signal(name.to_string()));
        return Ok(tokens);
    }

    if let Some(caps) = RESUMED.captures(rest) {
        let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
        let after = &rest[caps.get(0).map_or(0, |m| m.end())..];
        let close = find_closing(after, 1)
            .ok_or_else(|| malformed("unterminated argument list after resume"))?;
        tokens.push(Token::Return(ReturnMarker::Resumed(name)));
        tokens.push(Token::ArgList(after[..close].trim().to_string()));
        parse_return(line_no, &after[close + 1..], &mut tokens)?;
        return Ok(tokens);
    }

    let name_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    if name_len == 0 || rest.as_bytes().get(name_len) != Some(&b'(') {
        return Err(malformed("expected a call name followed by '('"));
    }
    if rest.as_bytes()[0].is_ascii_digit() {
        return Err(malformed("call name starts with a digit"));
    }
    tokens.push(Token::CallName(rest[..name_len].to_string()));
    let args = &rest[name_len + 1..];

    if let Some(marker) = UNFINISHED_MARKERS.iter().find(|m| args.ends_with(**m)) {
        let partial = &args[..args.len() - marker.len()];
        tokens.push(Token::ArgList(partial.trim().to_string()));
        tokens.push(Token::Return(ReturnMarker::Unfinished));
        return Ok(tokens);
    }

    let close = find_closing(args, 1).ok_or_else(|| malformed("unterminated argument list"))?;
    tokens.push(Token::ArgList(args[..close].trim().to_string()));
    parse_return(line_no, &args[close + 1..], &mut tokens)?;
    Ok(tokens)
}

/// Parse `= value [ECODE (message)] [<duration>]`
fn parse_return(
    line_no: usize,
    tail: &str,
    tokens: &mut Vec<Token>,
) -> Result<(), MalformedLineError> {
    let malformed = |reason: &str| MalformedLineError::new(line_no, reason);

    let mut tail = tail.trim();
    let mut duration = None;
    if let Some(stripped) = tail.strip_suffix('>') {
        if let Some(open) = stripped.rfind('<') {
            if let Ok(seconds) = stripped[open + 1..].parse::<f64>() {
                duration = Some(seconds);
                tail = stripped[..open].trim_end();
            }
        }
    }

    let body = tail
        .strip_prefix('=')
        .ok_or_else(|| malformed("missing return value"))?
        .trim_start();

    let value_len = body
        .find(|c: char| c.is_whitespace() || c == '<')
        .unwrap_or(body.len());
    let value_text = &body[..value_len];
    let mut after = &body[value_len..];

    let mut path = None;
    if after.starts_with('<') {
        let bytes = after.as_bytes();
        let end = (1..bytes.len())
            .find(|&i| bytes[i] == b'>' && bytes.get(i + 1).map_or(true, u8::is_ascii_whitespace))
            .ok_or_else(|| malformed("unterminated descriptor decoration"))?;
        path = Some(after[1..end].to_string());
        after = &after[end + 1..];
    }

    let after = after.trim_start();
    let code_len = after
        .find(char::is_whitespace)
        .unwrap_or(after.len());
    let code = &after[..code_len];
    let is_errno = code.len() > 1
        && code.starts_with('E')
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');

    let marker = if is_errno {
        let message = after[code_len..].trim();
        let message = message
            .strip_prefix('(')
            .and_then(|m| m.strip_suffix(')'))
            .unwrap_or(message);
        ReturnMarker::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    } else if value_text == "?" {
        ReturnMarker::Unknown
    } else {
        let value = parse_int(value_text).ok_or_else(|| malformed("invalid return value"))?;
        ReturnMarker::Success { value, path }
    };

    tokens.push(Token::Return(marker));
    if let Some(seconds) = duration {
        tokens.push(Token::Duration(seconds));
    }
    Ok(())
}

/// Byte index of the `)` that closes an argument list opened `depth` levels up
///
/// Quoted strings (with escapes) and `/* ... */` comments are skipped; `[]`
/// and `{}` nest.
pub(crate) fn find_closing(text: &str, mut depth: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut in_string = false;
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
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    let end = text[i + 2..].find("*/")?;
                    i += 2 + end + 1;
                }
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return (b == b')').then_some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Decimal or `0x` hexadecimal integer; hex values above `i64::MAX` wrap
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    text.parse::<i64>().ok()
}
