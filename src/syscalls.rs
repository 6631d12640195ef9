//! Syscall name normalization and classification for x86_64 traces
//!
//! Two lookup tables live here: the kernel number table, used to normalize
//! names the tracer could not decode (`syscall_0x101`, `syscall_257`), and the
//! classification table that tells the tracker and graph builder what a call
//! does to process state and which resource it touches.

use std::borrow::Cow;

/// Resolve syscall number to name for x86_64
///
/// Returns the syscall name, or "unknown" if the number is not in the table
pub fn syscall_name(num: i64) -> &'static str {
    match num {
        0 => "read",
        1 => "write",
        2 => "open",
        3 => "close",
        4 => "stat",
        5 => "fstat",
        6 => "lstat",
        7 => "poll",
        8 => "lseek",
        9 => "mmap",
        10 => "mprotect",
        11 => "munmap",
        12 => "brk",
        13 => "rt_sigaction",
        14 => "rt_sigprocmask",
        15 => "rt_sigreturn",
        16 => "ioctl",
        17 => "pread64",
        18 => "pwrite64",
        19 => "readv",
        20 => "writev",
        21 => "access",
        22 => "pipe",
        23 => "select",
        24 => "sched_yield",
        25 => "mremap",
        26 => "msync",
        27 => "mincore",
        28 => "madvise",
        29 => "shmget",
        30 => "shmat",
        31 => "shmctl",
        32 => "dup",
        33 => "dup2",
        34 => "pause",
        35 => "nanosleep",
        36 => "getitimer",
        37 => "alarm",
        38 => "setitimer",
        39 => "getpid",
        40 => "sendfile",
        41 => "socket",
        42 => "connect",
        43 => "accept",
        44 => "sendto",
        45 => "recvfrom",
        46 => "sendmsg",
        47 => "recvmsg",
        48 => "shutdown",
        49 => "bind",
        50 => "listen",
        51 => "getsockname",
        52 => "getpeername",
        53 => "socketpair",
        54 => "setsockopt",
        55 => "getsockopt",
        56 => "clone",
        57 => "fork",
        58 => "vfork",
        59 => "execve",
        60 => "exit",
        61 => "wait4",
        62 => "kill",
        63 => "uname",
        72 => "fcntl",
        73 => "flock",
        74 => "fsync",
        75 => "fdatasync",
        76 => "truncate",
        77 => "ftruncate",
        78 => "getdents",
        79 => "getcwd",
        80 => "chdir",
        81 => "fchdir",
        82 => "rename",
        83 => "mkdir",
        84 => "rmdir",
        85 => "creat",
        86 => "link",
        87 => "unlink",
        88 => "symlink",
        89 => "readlink",
        90 => "chmod",
        91 => "fchmod",
        92 => "chown",
        93 => "fchown",
        94 => "lchown",
        95 => "umask",
        96 => "gettimeofday",
        97 => "getrlimit",
        98 => "getrusage",
        99 => "sysinfo",
        102 => "getuid",
        104 => "getgid",
        105 => "setuid",
        107 => "setgid",
        108 => "geteuid",
        109 => "getegid",
        110 => "setpgid",
        111 => "getppid",
        112 => "getpgrp",
        113 => "setsid",
        131 => "sigaltstack",
        157 => "prctl",
        158 => "arch_prctl",
        186 => "gettid",
        202 => "futex",
        217 => "getdents64",
        218 => "set_tid_address",
        228 => "clock_gettime",
        231 => "exit_group",
        257 => "openat",
        262 => "newfstatat",
        273 => "set_robust_list",
        288 => "accept4",
        290 => "eventfd2",
        291 => "epoll_create1",
        292 => "dup3",
        293 => "pipe2",
        302 => "prlimit64",
        316 => "renameat2",
        318 => "getrandom",
        319 => "memfd_create",
        322 => "execveat",
        332 => "statx",
        435 => "clone3",
        437 => "openat2",
        439 => "faccessat2",
        _ => "unknown",
    }
}

/// Normalize a call name as printed by the tracer
///
/// Undecoded calls appear as `syscall_NNN` or `syscall_0xNNN`; these are mapped
/// back through [`syscall_name`] when the number is known. All other names are
/// returned unchanged: `open` and `openat` stay distinct and are unified only
/// by [`classify`].
pub fn normalize_name(raw: &str) -> Cow<'_, str> {
    let Some(number) = raw.strip_prefix("syscall_") else {
        return Cow::Borrowed(raw);
    };

    let parsed = match number.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => number.parse::<i64>().ok(),
    };

    match parsed.map(syscall_name) {
        Some(name) if name != "unknown" => Cow::Borrowed(name),
        _ => Cow::Borrowed(raw),
    }
}

/// What a syscall does, as far as dependency extraction is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyscallClass {
    /// open, openat, openat2 (access depends on flags)
    Open,
    /// creat (always a write)
    Creat,
    /// Reads through a descriptor (read, pread64, readv, getdents64, fstat, ...)
    Read,
    /// Writes through a descriptor (write, pwrite64, writev, ftruncate, ...)
    Write,
    /// close
    Close,
    /// dup, dup2, dup3
    Dup,
    /// fcntl (F_DUPFD aliases, F_SETFD close-on-exec)
    Fcntl,
    /// chdir
    Chdir,
    /// fchdir
    Fchdir,
    /// getcwd
    Getcwd,
    /// fork, vfork, clone, clone3
    Spawn,
    /// execve, execveat
    Exec,
    /// Path metadata lookups (stat, access, readlink, ...)
    Stat,
    /// Path mutations (unlink, mkdir, chmod, rename, ...)
    Modify,
    /// link, linkat, symlink, symlinkat: only the new name is written
    Link,
    /// socket
    Socket,
    /// connect
    Connect,
    /// bind
    Bind,
    /// listen
    Listen,
    /// accept, accept4
    Accept,
    /// sendto, sendmsg, sendmmsg
    Send,
    /// recvfrom, recvmsg, recvmmsg
    Recv,
    /// Calls returning descriptors that name no dependency (pipe, eventfd, ...)
    AnonymousFd,
    /// Everything else: memory, timing, signals, synchronization, ...
    Other,
}

/// Classify a (normalized) syscall name
///
/// Platform variants collapse onto the same class: `stat`/`stat64`/`newfstatat`
/// are all `Stat`, `open`/`openat`/`openat2` are all `Open`.
pub fn classify(name: &str) -> SyscallClass {
    match name {
        "open" | "openat" | "openat2" | "open_by_handle_at" => SyscallClass::Open,
        "creat" => SyscallClass::Creat,
        "read" | "pread64" | "readv" | "preadv" | "preadv2" | "getdents" | "getdents64"
        | "fstat" | "fstat64" | "fstatfs" | "fgetxattr" | "flistxattr" | "sendfile" => {
            SyscallClass::Read
        }
        "write" | "pwrite64" | "writev" | "pwritev" | "pwritev2" | "ftruncate"
        | "ftruncate64" | "fallocate" | "fchmod" | "fchown" | "fsetxattr"
        | "fremovexattr" | "fsync" | "fdatasync" => SyscallClass::Write,
        "close" => SyscallClass::Close,
        "dup" | "dup2" | "dup3" => SyscallClass::Dup,
        "fcntl" | "fcntl64" => SyscallClass::Fcntl,
        "chdir" => SyscallClass::Chdir,
        "fchdir" => SyscallClass::Fchdir,
        "getcwd" => SyscallClass::Getcwd,
        "fork" | "vfork" | "clone" | "clone3" => SyscallClass::Spawn,
        "execve" | "execveat" => SyscallClass::Exec,
        "stat" | "stat64" | "lstat" | "lstat64" | "newfstatat" | "fstatat64" | "statx"
        | "access" | "faccessat" | "faccessat2" | "readlink" | "readlinkat" | "statfs"
        | "statfs64" | "getxattr" | "lgetxattr" | "listxattr" | "llistxattr" => {
            SyscallClass::Stat
        }
        "unlink" | "unlinkat" | "mkdir" | "mkdirat" | "rmdir" | "rename" | "renameat"
        | "renameat2" | "chmod" | "fchmodat" | "chown" | "lchown" | "fchownat"
        | "truncate" | "truncate64" | "utime" | "utimes" | "utimensat" | "futimesat"
        | "mknod" | "mknodat" | "setxattr" | "lsetxattr" | "removexattr" | "lremovexattr" => SyscallClass::Modify,
        "link" | "linkat" | "symlink" | "symlinkat" => SyscallClass::Link,
        "socket" => SyscallClass::Socket,
        "connect" => SyscallClass::Connect,
        "bind" => SyscallClass::Bind,
        "listen" => SyscallClass::Listen,
        "accept" | "accept4" => SyscallClass::Accept,
        "send" | "sendto" | "sendmsg" | "sendmmsg" => SyscallClass::Send,
        "recv" | "recvfrom" | "recvmsg" | "recvmmsg" => SyscallClass::Recv,
        "pipe" | "pipe2" | "socketpair" | "eventfd" | "eventfd2" | "epoll_create"
        | "epoll_create1" | "timerfd_create" | "signalfd" | "signalfd4" | "memfd_create"
        | "inotify_init" | "inotify_init1" | "userfaultfd" | "pidfd_open"
        | "perf_event_open" | "fanotify_init" => SyscallClass::AnonymousFd,
        _ => SyscallClass::Other,
    }
}
