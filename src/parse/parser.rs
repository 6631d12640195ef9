//! Event parser: assembles tokens into ordered trace entries
//!
//! Interrupted calls are held in a per-pid pending table until their resume
//! line arrives. Entries are emitted in completion order, which is the order
//! the process state tracker must apply them in.

use super::event::{
    CallResult, CallState, ExitStatus, Pid, ProcessExit, SyscallEvent, TraceEntry,
};
use super::schema::decode_args;
use super::tokenizer::{tokenize, ReturnMarker, Token};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Location};
use crate::syscalls::normalize_name;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Line and event counters for one trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub lines: usize,
    pub events: usize,
    /// Lines rejected by the tokenizer
    pub skipped: usize,
    pub reassembled: usize,
    pub incomplete: usize,
    pub orphaned: usize,
    pub exits: usize,
    pub signals: usize,
}

/// Result of parsing one trace document
#[derive(Debug, Clone, Default)]
pub struct ParsedTrace {
    /// Calls and exits in completion order
    pub entries: Vec<TraceEntry>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ParseStats,
}

impl ParsedTrace {
    pub fn events(&self) -> impl Iterator<Item = &SyscallEvent> {
        self.entries.iter().filter_map(TraceEntry::as_call)
    }
}

/// Partial call waiting for its `<... resumed>` line
#[derive(Debug, Clone)]
struct PendingCall {
    name: String,
    raw_args: String,
    line: usize,
    timestamp: f64,
}

/// Everything one line contributed, gathered from its tokens
#[derive(Debug, Default)]
struct LineParts {
    pid: Option<Pid>,
    timestamp: Option<f64>,
    name: Option<String>,
    args: Option<String>,
    resumed: Option<String>,
    result: Option<ReturnMarker>,
    duration: Option<f64>,
    exit: Option<ExitStatus>,
    signal: Option<String>,
}

impl LineParts {
    fn from_tokens(tokens: Vec<Token>) -> Self {
        let mut parts = Self::default();
        for token in tokens {
            match token {
                Token::PidTag(pid) => parts.pid = Some(pid),
                Token::Timestamp(ts) => parts.timestamp = Some(ts),
                Token::CallName(name) => parts.name = Some(name),
                Token::ArgList(args) => parts.args = Some(args),
                Token::Return(ReturnMarker::Resumed(name)) => parts.resumed = Some(name),
                Token::Return(marker) => parts.result = Some(marker),
                Token::Duration(d) => parts.duration = Some(d),
                Token::Exit(status) => parts.exit = Some(status),
                Token::Signal(name) => parts.signal = Some(name),
            }
        }
        parts
    }
}

/// Streaming parser for one trace
///
/// # Example
///
/// ```
/// use dozer::parse::{CallState, EventParser};
///
/// let mut parser = EventParser::new(0);
/// parser.feed_line(1, "[pid 100] read(3,  <unfinished ...>");
/// parser.feed_line(2, "[pid 100] <... read resumed>\"hi\", 64) = 2");
/// let parsed = parser.finish();
/// let event = parsed.events().next().unwrap();
/// assert_eq!(event.state, CallState::Complete);
/// assert_eq!(event.args.len(), 3);
/// ```
#[derive(Debug)]
pub struct EventParser {
    default_pid: Pid,
    pending: BTreeMap<Pid, PendingCall>,
    entries: Vec<TraceEntry>,
    diagnostics: Vec<Diagnostic>,
    stats: ParseStats,
    last_timestamp: f64,
    next_seq: u64,
}

impl EventParser {
    /// `default_pid` is used for lines without a pid prefix
    pub fn new(default_pid: Pid) -> Self {
        Self {
            default_pid,
            pending: BTreeMap::new(),
            entries: Vec::new(),
            diagnostics: Vec::new(),
            stats: ParseStats::default(),
            last_timestamp: 0.0,
            next_seq: 0,
        }
    }

    /// Consume one line (1-based `line_no`)
    pub fn feed_line(&mut self, line_no: usize, line: &str) {
        self.stats.lines += 1;

        let tokens = match tokenize(line_no, line) {
            Ok(tokens) => tokens,
            Err(err) => {
                debug!(line = line_no, reason = %err.reason, "skipping malformed trace line");
                self.stats.skipped += 1;
                self.diagnostics.push(err.into());
                return;
            }
        };
        if tokens.is_empty() {
            return;
        }

        let parts = LineParts::from_tokens(tokens);
        let pid = parts.pid.unwrap_or(self.default_pid);

        // Clamp so relative stamps and midnight wrap never move time backwards
        let timestamp = parts
            .timestamp
            .map_or(self.last_timestamp, |ts| ts.max(self.last_timestamp));
        self.last_timestamp = timestamp;

        if let Some(status) = parts.exit {
            self.stats.exits += 1;
            let seq = self.bump_seq();
            self.entries.push(TraceEntry::Exit(ProcessExit {
                seq,
                line: line_no,
                timestamp,
                pid,
                status,
            }));
            return;
        }

        if let Some(signal) = parts.signal {
            trace!(pid, signal = %signal, "signal delivery");
            self.stats.signals += 1;
            return;
        }

        let args = parts.args.unwrap_or_default();
        let Some(marker) = parts.result else {
            // The tokenizer always yields a result for call lines
            return;
        };

        if let Some(name) = parts.resumed {
            self.resume(line_no, pid, timestamp, &name, &args, marker, parts.duration);
            return;
        }

        let Some(name) = parts.name else {
            return;
        };
        let name = normalize_name(&name).into_owned();

        if marker == ReturnMarker::Unfinished {
            if let Some(previous) = self.pending.remove(&pid) {
                // A pid can only have one call in flight
                self.flush_incomplete(pid, previous);
            }
            self.pending.insert(
                pid,
                PendingCall {
                    name,
                    raw_args: args,
                    line: line_no,
                    timestamp,
                },
            );
            return;
        }

        self.emit(
            line_no,
            pid,
            name,
            &args,
            marker,
            (timestamp, timestamp),
            CallState::Complete,
            parts.duration,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn resume(
        &mut self,
        line_no: usize,
        pid: Pid,
        timestamp: f64,
        name: &str,
        post_args: &str,
        marker: ReturnMarker,
        duration: Option<f64>,
    ) {
        let name = normalize_name(name).into_owned();

        match self.pending.remove(&pid) {
            Some(pending) if pending.name == name => {
                self.stats.reassembled += 1;
                let merged = merge_args(&pending.raw_args, post_args);
                self.emit(
                    pending.line,
                    pid,
                    name,
                    &merged,
                    marker,
                    (pending.timestamp, timestamp),
                    CallState::Complete,
                    duration,
                );
            }
            other => {
                if let Some(mismatched) = other {
                    self.flush_incomplete(pid, mismatched);
                }
                warn!(line = line_no, pid, call = %name, "resume without a pending call");
                self.stats.orphaned += 1;
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::OrphanResume,
                    Location::event(line_no, pid),
                    format!("{} resumed with no matching unfinished call", name),
                ));
                self.emit(
                    line_no,
                    pid,
                    name,
                    post_args,
                    marker,
                    (timestamp, timestamp),
                    CallState::Resumed,
                    duration,
                );
            }
        }
    }

    fn flush_incomplete(&mut self, pid: Pid, pending: PendingCall) {
        debug!(line = pending.line, pid, call = %pending.name, "call never resumed");
        self.stats.incomplete += 1;
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::IncompleteCall,
            Location::event(pending.line, pid),
            format!("{} was never resumed", pending.name),
        ));
        let seq = self.bump_seq();
        let timestamp = self.last_timestamp.max(pending.timestamp);
        self.stats.events += 1;
        self.entries.push(TraceEntry::Call(SyscallEvent {
            seq,
            line: pending.line,
            timestamp,
            started_at: pending.timestamp,
            pid,
            args: decode_args(&pending.name, &pending.raw_args),
            name: pending.name,
            result: CallResult::Incomplete,
            state: CallState::Incomplete,
            duration: None,
        }));
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        line: usize,
        pid: Pid,
        name: String,
        raw_args: &str,
        marker: ReturnMarker,
        (started_at, timestamp): (f64, f64),
        state: CallState,
        duration: Option<f64>,
    ) {
        let result = match marker {
            ReturnMarker::Success { value, path } => CallResult::Success { value, path },
            ReturnMarker::Error { code, message } => CallResult::Error { code, message },
            ReturnMarker::Unknown => CallResult::Unknown,
            ReturnMarker::Unfinished | ReturnMarker::Resumed(_) => CallResult::Incomplete,
        };
        let seq = self.bump_seq();
        self.stats.events += 1;
        self.entries.push(TraceEntry::Call(SyscallEvent {
            seq,
            line,
            timestamp,
            started_at,
            pid,
            args: decode_args(&name, raw_args),
            name,
            result,
            state,
            duration,
        }));
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Flush still-pending calls as incomplete and return everything parsed
    pub fn finish(mut self) -> ParsedTrace {
        let pending = std::mem::take(&mut self.pending);
        for (pid, call) in pending {
            self.flush_incomplete(pid, call);
        }
        ParsedTrace {
            entries: self.entries,
            diagnostics: self.diagnostics,
            stats: self.stats,
        }
    }
}

/// Join the argument text before `<unfinished ...>` with the text after
/// `<... resumed>`
pub(crate) fn merge_args(pre: &str, post: &str) -> String {
    let pre = pre.trim_end();
    let post = post.trim_start();
    if pre.is_empty() {
        return post.to_string();
    }
    if post.is_empty() {
        return pre.trim_end_matches(',').to_string();
    }
    if pre.ends_with(',') {
        format!("{} {}", pre, post)
    } else if post.starts_with(',') {
        format!("{}{}", pre, post)
    } else {
        format!("{}, {}", pre, post)
    }
}

/// Parse a whole trace document
pub fn parse_trace(text: &str, default_pid: Pid) -> ParsedTrace {
    let mut parser = EventParser::new(default_pid);
    for (index, line) in text.lines().enumerate() {
        parser.feed_line(index + 1, line);
    }
    parser.finish()
}
