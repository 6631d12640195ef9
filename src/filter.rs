//! Ignore set for dependency extraction
//!
//! Calls in the ignore set carry no dependency significance (allocator churn,
//! clocks, futexes, signal plumbing) and are skipped by the graph builder.
//! The process state tracker still sees every call; ignoring only affects
//! which events can create or update resource nodes.
//!
//! Supports:
//! - Individual syscalls: `futex,nanosleep`
//! - Syscall classes: `memory`, `timing`, `sync`, `signal`, `process-info`

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const MEMORY: &[&str] = &[
    "mmap", "mmap2", "munmap", "mprotect", "mremap", "brk", "madvise", "mlock", "munlock",
    "mincore", "msync", "pkey_mprotect", "membarrier",
];

const TIMING: &[&str] = &[
    "clock_gettime", "clock_getres", "clock_nanosleep", "gettimeofday", "time",
    "nanosleep", "times", "getitimer", "setitimer", "alarm", "timer_create",
    "timer_settime", "timer_gettime", "timer_delete",
];

const SYNC: &[&str] = &[
    "futex", "futex_waitv", "set_robust_list", "get_robust_list", "set_tid_address",
    "sched_yield", "rseq", "poll", "ppoll", "select", "pselect6", "epoll_wait",
    "epoll_pwait", "epoll_ctl",
];

const SIGNAL: &[&str] = &[
    "rt_sigaction", "rt_sigprocmask", "rt_sigreturn", "rt_sigsuspend", "rt_sigtimedwait",
    "sigaltstack", "kill", "tkill", "tgkill", "pause",
];

const PROCESS_INFO: &[&str] = &[
    "getpid", "getppid", "gettid", "getuid", "geteuid", "getgid", "getegid", "getgroups",
    "getresuid", "getresgid", "getpgrp", "getpgid", "getsid", "uname", "arch_prctl",
    "prctl", "getrlimit", "prlimit64", "getrusage", "sysinfo", "getrandom",
    "sched_getaffinity", "capget",
];

/// Set of call names excluded from dependency extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct IgnoreSet {
    names: BTreeSet<String>,
    /// Entries as written, so the set round-trips through configuration
    entries: Vec<String>,
}

impl IgnoreSet {
    /// An ignore set that skips nothing
    pub fn none() -> Self {
        Self {
            names: BTreeSet::new(),
            entries: Vec::new(),
        }
    }

    /// Parse a comma separated list such as "memory,timing,futex"
    pub fn from_list(list: &str) -> Result<Self> {
        let parts: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();

        for part in &parts {
            if !part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                bail!(
                    "Invalid ignore entry: '{}'. Expected a syscall name or one of: memory, timing, sync, signal, process-info",
                    part
                );
            }
        }

        Ok(Self::from_names(parts))
    }

    /// Build from a list of syscall names and/or class names
    pub fn from_names<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        let mut names = BTreeSet::new();

        for part in &entries {
            match Self::class_members(part) {
                Some(members) => names.extend(members.iter().map(|s| s.to_string())),
                None => {
                    names.insert(part.clone());
                }
            }
        }

        Self { names, entries }
    }

    fn class_members(class: &str) -> Option<&'static [&'static str]> {
        match class {
            "memory" => Some(MEMORY),
            "timing" => Some(TIMING),
            "sync" => Some(SYNC),
            "signal" => Some(SIGNAL),
            "process-info" => Some(PROCESS_INFO),
            _ => None,
        }
    }

    /// Check if a call should be skipped by the graph builder
    pub fn should_skip(&self, syscall_name: &str) -> bool {
        self.names.contains(syscall_name)
    }

    /// Number of distinct call names covered
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::from_names(["memory", "timing", "sync", "signal", "process-info"])
    }
}

impl From<Vec<String>> for IgnoreSet {
    fn from(entries: Vec<String>) -> Self {
        Self::from_names(entries)
    }
}

impl From<IgnoreSet> for Vec<String> {
    fn from(set: IgnoreSet) -> Self {
        set.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_skips_nothing() {
        let set = IgnoreSet::none();
        assert!(!set.should_skip("futex"));
        assert!(!set.should_skip("mmap"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_default_covers_noise_classes() {
        let set = IgnoreSet::default();
        assert!(set.should_skip("mmap"));
        assert!(set.should_skip("futex"));
        assert!(set.should_skip("clock_gettime"));
        assert!(set.should_skip("rt_sigaction"));
        assert!(set.should_skip("getpid"));
        assert!(!set.should_skip("openat"));
        assert!(!set.should_skip("connect"));
        assert!(!set.should_skip("execve"));
    }

    #[test]
    fn test_individual_names() {
        let set = IgnoreSet::from_list("futex,nanosleep").unwrap();
        assert!(set.should_skip("futex"));
        assert!(set.should_skip("nanosleep"));
        assert!(!set.should_skip("mmap"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_mixed_classes_and_names() {
        let set = IgnoreSet::from_list("memory, lseek").unwrap();
        assert!(set.should_skip("munmap"));
        assert!(set.should_skip("lseek"));
        assert!(!set.should_skip("futex"));
    }

    #[test]
    fn test_empty_list() {
        let set = IgnoreSet::from_list("").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_invalid_entry() {
        let result = IgnoreSet::from_list("mmap,trace=file");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid ignore entry"));
    }

    #[test]
    fn test_serde_round_trip_keeps_entries() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            ignore: IgnoreSet,
        }

        let parsed: Wrapper = toml::from_str(r#"ignore = ["memory", "futex"]"#).unwrap();
        assert!(parsed.ignore.should_skip("brk"));
        assert!(parsed.ignore.should_skip("futex"));

        let written = toml::to_string(&parsed).unwrap();
        assert!(written.contains("memory"));
        assert!(!written.contains("brk"));
    }
}
