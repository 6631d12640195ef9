//! Parsed trace records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process or thread id as printed by the tracer
pub type Pid = u32;

/// Decoded socket address argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum SockAddr {
    Inet { address: String, port: u16 },
    Inet6 { address: String, port: u16 },
    /// Filesystem or abstract (`@name`) unix socket
    Unix { path: String },
    Other { name: String },
}

/// Typed argument value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    /// Quoted path argument; `truncated` is set when the tracer cut the string
    Path { value: String, truncated: bool },
    /// Quoted data buffer
    Str { value: String, truncated: bool },
    Int(i64),
    /// `O_RDONLY|O_CLOEXEC` style flag set
    Flags(Vec<String>),
    /// Descriptor number, with the `-y` path decoration when present
    Descriptor { fd: i32, path: Option<String> },
    /// `AT_FDCWD` sentinel
    AtCwd,
    SockAddr(SockAddr),
    /// Anything not decoded further
    Raw(String),
}

impl ArgValue {
    pub fn as_fd(&self) -> Option<i32> {
        match self {
            ArgValue::Descriptor { fd, .. } => Some(*fd),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&str> {
        match self {
            ArgValue::Path { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            ArgValue::Descriptor { fd, .. } => Some(i64::from(*fd)),
            _ => None,
        }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        match self {
            ArgValue::Flags(flags) => flags.iter().any(|f| f == flag),
            _ => false,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(
            self,
            ArgValue::Path {
                truncated: true,
                ..
            } | ArgValue::Str {
                truncated: true,
                ..
            }
        )
    }
}

/// Outcome of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallResult {
    Success {
        value: i64,
        /// `-y` decoration on a returned descriptor
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Error {
        code: String,
        message: String,
    },
    /// `= ?` (process went away before the return was observed)
    Unknown,
    /// Call was never resumed before the end of the trace
    Incomplete,
}

impl CallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CallResult::Success { .. })
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            CallResult::Success { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            CallResult::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Reassembly state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Complete,
    /// Interrupted and waiting for its resume line (never leaves the parser)
    Pending,
    /// Resume line seen without its start; arguments are partial
    Resumed,
    Incomplete,
}

/// One system call, reassembled from one or two trace lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyscallEvent {
    /// Emission order within the trace
    pub seq: u64,
    /// Line on which the call started
    pub line: usize,
    /// Seconds at which the call took effect: the line that carried its
    /// result, or end of input for incomplete calls. Non-decreasing in
    /// emission order.
    pub timestamp: f64,
    /// Timestamp of the line on which the call started
    pub started_at: f64,
    pub pid: Pid,
    pub name: String,
    pub args: Vec<ArgValue>,
    pub result: CallResult,
    pub state: CallState,
    /// `-T` time spent in the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl SyscallEvent {
    pub fn arg(&self, index: usize) -> Option<&ArgValue> {
        self.args.get(index)
    }

    /// True if any flag-set argument carries `flag`
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a.has_flag(flag))
    }

    pub fn sockaddr(&self) -> Option<&SockAddr> {
        self.args.iter().find_map(|a| match a {
            ArgValue::SockAddr(addr) => Some(addr),
            _ => None,
        })
    }
}

/// How a process left the trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitStatus {
    Exited(i32),
    Killed(String),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exited with {}", code),
            ExitStatus::Killed(signal) => write!(f, "killed by {}", signal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessExit {
    pub seq: u64,
    pub line: usize,
    pub timestamp: f64,
    pub pid: Pid,
    pub status: ExitStatus,
}

/// Item of the merged, ordered trace stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceEntry {
    Call(SyscallEvent),
    Exit(ProcessExit),
}

impl TraceEntry {
    pub fn pid(&self) -> Pid {
        match self {
            TraceEntry::Call(event) => event.pid,
            TraceEntry::Exit(exit) => exit.pid,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            TraceEntry::Call(event) => event.seq,
            TraceEntry::Exit(exit) => exit.seq,
        }
    }

    /// Point in time at which the entry takes effect
    pub fn effective_at(&self) -> f64 {
        match self {
            TraceEntry::Call(event) => event.timestamp,
            TraceEntry::Exit(exit) => exit.timestamp,
        }
    }

    pub fn as_call(&self) -> Option<&SyscallEvent> {
        match self {
            TraceEntry::Call(event) => Some(event),
            TraceEntry::Exit(_) => None,
        }
    }
}
