//! Process state tracker
//!
//! Folds the merged, ordered trace stream into per-process context (cwd,
//! descriptor table, lineage) and resolves every call's resource references
//! to [`ResourceIdentity`] values. Must be applied strictly in stream order:
//! descriptor numbers and relative paths only mean something against the
//! state left behind by every earlier call in the trace, regardless of pid.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Location};
use crate::graph::{Endpoint, Protocol, ResourceIdentity};
use crate::parse::{ArgValue, CallState, Pid, ProcessExit, SyscallEvent, TraceEntry};
use crate::syscalls::{classify, SyscallClass};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// What a descriptor refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdTarget {
    Resource(ResourceIdentity),
    /// Socket not yet connected or bound
    Socket { protocol: Protocol },
    /// Pipes, eventfds, epoll instances and other kernel objects
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdEntry {
    pub target: FdTarget,
    /// Path the descriptor was opened with, if any
    pub path: Option<String>,
    pub cloexec: bool,
}

impl FdEntry {
    pub fn resource(identity: ResourceIdentity, path: Option<String>, cloexec: bool) -> Self {
        Self {
            target: FdTarget::Resource(identity),
            path,
            cloexec,
        }
    }

    fn anonymous() -> Self {
        Self {
            target: FdTarget::Anonymous,
            path: None,
            cloexec: false,
        }
    }

    pub fn identity(&self) -> Option<&ResourceIdentity> {
        match &self.target {
            FdTarget::Resource(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Descriptor table of one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdTable {
    table: BTreeMap<i32, FdEntry>,
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fd: i32, entry: FdEntry) {
        self.table.insert(fd, entry);
    }

    pub fn get(&self, fd: i32) -> Option<&FdEntry> {
        self.table.get(&fd)
    }

    pub fn get_path(&self, fd: i32) -> Option<&str> {
        self.table.get(&fd).and_then(|e| e.path.as_deref())
    }

    pub fn remove(&mut self, fd: i32) -> Option<FdEntry> {
        self.table.remove(&fd)
    }

    /// Copy `old` to `new`; the copy never inherits close-on-exec
    pub fn alias(&mut self, old: i32, new: i32, cloexec: bool) -> bool {
        match self.table.get(&old).cloned() {
            Some(mut entry) => {
                entry.cloexec = cloexec;
                self.table.insert(new, entry);
                true
            }
            None => false,
        }
    }

    pub fn set_cloexec(&mut self, fd: i32, cloexec: bool) {
        if let Some(entry) = self.table.get_mut(&fd) {
            entry.cloexec = cloexec;
        }
    }

    /// Drop close-on-exec entries, as `execve` does
    pub fn retain_on_exec(&mut self) {
        self.table.retain(|_, entry| !entry.cloexec);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &FdEntry)> {
        self.table.iter().map(|(fd, entry)| (*fd, entry))
    }
}

/// Mutable per-process state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessContext {
    pub pid: Pid,
    pub cwd: String,
    /// False until chdir/getcwd (or inheritance) pins the cwd down
    pub cwd_known: bool,
    pub fds: FdTable,
    pub parent: Option<Pid>,
    pub exited: bool,
    /// Last program image loaded by `execve`
    pub executable: Option<String>,
}

impl ProcessContext {
    pub fn new(pid: Pid, cwd: &str) -> Self {
        Self {
            pid,
            cwd: cwd.to_string(),
            cwd_known: false,
            fds: FdTable::new(),
            parent: None,
            exited: false,
            executable: None,
        }
    }
}

/// Resource reference resolved for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub identity: ResourceIdentity,
    /// Absolute path behind the identity, when there is one
    pub path: Option<String>,
}

/// An event plus its resolved resources
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEvent {
    pub event: SyscallEvent,
    pub class: SyscallClass,
    pub targets: Vec<ResolvedTarget>,
}

/// Pids that share one descriptor table (`CLONE_FILES`) or one cwd
/// (`CLONE_FS`). Members are kept in sync after every call of any of them.
#[derive(Debug, Default)]
struct ShareGroups {
    groups: BTreeMap<Pid, u64>,
    next: u64,
}

impl ShareGroups {
    fn join(&mut self, parent: Pid, child: Pid) {
        let group = match self.groups.get(&parent) {
            Some(group) => *group,
            None => {
                let group = self.next;
                self.next += 1;
                self.groups.insert(parent, group);
                group
            }
        };
        self.groups.insert(child, group);
    }

    fn leave(&mut self, pid: Pid) {
        self.groups.remove(&pid);
    }

    fn peers(&self, pid: Pid) -> Vec<Pid> {
        let Some(group) = self.groups.get(&pid) else {
            return Vec::new();
        };
        self.groups
            .iter()
            .filter(|(p, g)| **p != pid && *g == group)
            .map(|(p, _)| *p)
            .collect()
    }
}

/// Strictly ordered fold over a trace's entries
#[derive(Debug)]
pub struct ProcessTracker {
    processes: BTreeMap<Pid, ProcessContext>,
    lineage: BTreeMap<Pid, Pid>,
    shared_files: ShareGroups,
    shared_fs: ShareGroups,
    initial_cwd: String,
    diagnostics: Vec<Diagnostic>,
    ambiguous_reported: BTreeSet<(Pid, i32)>,
}

impl ProcessTracker {
    /// `initial_cwd` is assumed for processes whose cwd was never observed
    pub fn new(initial_cwd: &str) -> Self {
        Self {
            processes: BTreeMap::new(),
            lineage: BTreeMap::new(),
            shared_files: ShareGroups::default(),
            shared_fs: ShareGroups::default(),
            initial_cwd: initial_cwd.to_string(),
            diagnostics: Vec::new(),
            ambiguous_reported: BTreeSet::new(),
        }
    }

    pub fn context(&self, pid: Pid) -> Option<&ProcessContext> {
        self.processes.get(&pid)
    }

    /// Child → parent edges seen so far
    pub fn lineage(&self) -> &BTreeMap<Pid, Pid> {
        &self.lineage
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (BTreeMap<Pid, Pid>, Vec<Diagnostic>) {
        (self.lineage, self.diagnostics)
    }

    /// Apply one entry; calls come back with their resolved targets
    pub fn apply(&mut self, entry: TraceEntry) -> Option<ResolvedEvent> {
        match entry {
            TraceEntry::Exit(exit) => {
                self.retire(&exit);
                None
            }
            TraceEntry::Call(event) => Some(self.apply_call(event)),
        }
    }

    fn retire(&mut self, exit: &ProcessExit) {
        trace!(pid = exit.pid, status = %exit.status, "process exited");
        // Kept so trailing incomplete calls of this pid still resolve
        self.context_mut(exit.pid).exited = true;
        self.shared_files.leave(exit.pid);
        self.shared_fs.leave(exit.pid);
    }

    fn apply_call(&mut self, event: SyscallEvent) -> ResolvedEvent {
        let pid = event.pid;
        let reused = self
            .processes
            .get(&pid)
            .is_some_and(|ctx| ctx.exited && event.state != CallState::Incomplete);
        if reused {
            debug!(pid, line = event.line, "pid reused after exit");
            self.shared_files.leave(pid);
            self.shared_fs.leave(pid);
            self.processes
                .insert(pid, ProcessContext::new(pid, &self.initial_cwd));
        }

        let class = classify(&event.name);
        let targets = self.resolve_targets(&event, class);

        let succeeded = event.result.is_success()
            || (class == SyscallClass::Connect && event.result.error_code() == Some("EINPROGRESS"));
        if succeeded {
            self.update_state(&event, class, &targets);
        }
        self.sync_shared(event.pid);

        ResolvedEvent {
            event,
            class,
            targets,
        }
    }

    fn context_mut(&mut self, pid: Pid) -> &mut ProcessContext {
        let cwd = &self.initial_cwd;
        self.processes
            .entry(pid)
            .or_insert_with(|| ProcessContext::new(pid, cwd))
    }

    // ----- resolution -----

    fn resolve_targets(&mut self, event: &SyscallEvent, class: SyscallClass) -> Vec<ResolvedTarget> {
        use SyscallClass as C;
        match class {
            C::Open | C::Creat | C::Exec | C::Stat | C::Modify | C::Read | C::Write | C::Chdir => {
                let paths = self.resolve_path_args(event);
                if !paths.is_empty() {
                    return paths;
                }
                self.descriptor_target(event, 0).into_iter().collect()
            }
            C::Link => {
                let mut paths = self.resolve_path_args(event);
                // A symlink stores its target verbatim without looking it up
                if event.name.starts_with("symlink") && paths.len() > 1 {
                    paths.drain(..paths.len() - 1);
                }
                paths
            }
            C::Recv | C::Listen | C::Accept => self.descriptor_target(event, 0).into_iter().collect(),
            C::Send => match event.sockaddr() {
                Some(addr) => {
                    let protocol = self.socket_protocol(event.pid, event.arg(0));
                    Endpoint::from_sockaddr(addr, protocol)
                        .map(|e| ResolvedTarget {
                            identity: ResourceIdentity::Endpoint(e),
                            path: None,
                        })
                        .into_iter()
                        .collect()
                }
                None => self.descriptor_target(event, 0).into_iter().collect(),
            },
            C::Connect | C::Bind => {
                let protocol = self.socket_protocol(event.pid, event.arg(0));
                event
                    .sockaddr()
                    .and_then(|addr| Endpoint::from_sockaddr(addr, protocol))
                    .map(|e| ResolvedTarget {
                        identity: ResourceIdentity::Endpoint(e),
                        path: None,
                    })
                    .into_iter()
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Resolve every path argument against its directory descriptor or cwd
    fn resolve_path_args(&mut self, event: &SyscallEvent) -> Vec<ResolvedTarget> {
        let mut targets = Vec::new();
        let empty_path_means_fd = event.has_flag("AT_EMPTY_PATH");

        for (i, arg) in event.args.iter().enumerate() {
            let Some(path) = arg.as_path() else {
                continue;
            };
            let base = i.checked_sub(1).and_then(|j| event.arg(j)).filter(|a| {
                matches!(a, ArgValue::AtCwd | ArgValue::Descriptor { .. })
            });

            if path.is_empty() {
                if empty_path_means_fd {
                    if let Some(fd_arg) = base {
                        if let Some(target) = self.descriptor_arg_target(event, fd_arg) {
                            targets.push(target);
                        }
                    }
                }
                continue;
            }

            let absolute = if path.starts_with('/') {
                normalize_path("/", path)
            } else {
                match self.base_directory(event, base) {
                    Ok(dir) => normalize_path(&dir, path),
                    Err(identity) => {
                        targets.push(ResolvedTarget {
                            identity,
                            path: None,
                        });
                        continue;
                    }
                }
            };

            targets.push(ResolvedTarget {
                identity: ResourceIdentity::from_path(&absolute),
                path: Some(absolute),
            });
        }
        targets
    }

    /// Directory a relative path is resolved against; an unresolvable
    /// directory descriptor yields its placeholder identity instead
    fn base_directory(
        &mut self,
        event: &SyscallEvent,
        base: Option<&ArgValue>,
    ) -> Result<String, ResourceIdentity> {
        let pid = event.pid;
        if let Some(ArgValue::Descriptor { fd, path }) = base {
            let known = self
                .context_mut(pid)
                .fds
                .get(*fd)
                .and_then(|entry| entry.identity().and_then(ResourceIdentity::as_path).map(str::to_string));
            if let Some(dir) = known {
                return Ok(dir);
            }
            if let Some(decorated) = path.as_ref().filter(|p| p.starts_with('/')) {
                return Ok(decorated.clone());
            }
            return Err(self.ambiguous(pid, *fd, event.line));
        }
        Ok(self.context_mut(pid).cwd.clone())
    }

    fn descriptor_target(&mut self, event: &SyscallEvent, index: usize) -> Option<ResolvedTarget> {
        let arg = event.arg(index)?;
        self.descriptor_arg_target(event, arg)
    }

    /// Identity behind a descriptor argument; unknown descriptors become
    /// `Ambiguous` unless the `-y` decoration names an absolute path
    fn descriptor_arg_target(&mut self, event: &SyscallEvent, arg: &ArgValue) -> Option<ResolvedTarget> {
        let ArgValue::Descriptor { fd, path } = arg else {
            return None;
        };
        let pid = event.pid;
        if let Some(entry) = self.context_mut(pid).fds.get(*fd) {
            return entry.identity().map(|identity| ResolvedTarget {
                identity: identity.clone(),
                path: entry.path.clone(),
            });
        }

        match path {
            Some(decorated) if decorated.starts_with('/') => {
                let identity = ResourceIdentity::from_path(decorated);
                self.context_mut(pid).fds.insert(
                    *fd,
                    FdEntry::resource(identity.clone(), Some(decorated.clone()), false),
                );
                Some(ResolvedTarget {
                    identity,
                    path: Some(decorated.clone()),
                })
            }
            Some(_) => {
                // socket:[1234], pipe:[5678], anon_inode:[eventfd]
                self.context_mut(pid).fds.insert(*fd, FdEntry::anonymous());
                None
            }
            None => Some(ResolvedTarget {
                identity: self.ambiguous(pid, *fd, event.line),
                path: None,
            }),
        }
    }

    /// Install (and report once) a placeholder for a pre-trace descriptor
    fn ambiguous(&mut self, pid: Pid, fd: i32, line: usize) -> ResourceIdentity {
        let identity = ResourceIdentity::Ambiguous { pid, fd };
        self.context_mut(pid)
            .fds
            .insert(fd, FdEntry::resource(identity.clone(), None, false));
        if self.ambiguous_reported.insert((pid, fd)) {
            debug!(pid, fd, line, "descriptor used before it was opened");
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::AmbiguousDescriptor,
                Location::event(line, pid),
                format!("fd {} was open before tracing began", fd),
            ));
        }
        identity
    }

    fn socket_protocol(&mut self, pid: Pid, arg: Option<&ArgValue>) -> Option<Protocol> {
        let fd = arg?.as_fd()?;
        match &self.context_mut(pid).fds.get(fd)?.target {
            FdTarget::Socket { protocol } => Some(*protocol),
            FdTarget::Resource(ResourceIdentity::Endpoint(e)) => Some(e.protocol),
            _ => None,
        }
    }

    // ----- state changes (successful calls only) -----

    fn update_state(&mut self, event: &SyscallEvent, class: SyscallClass, targets: &[ResolvedTarget]) {
        use SyscallClass as C;
        let pid = event.pid;
        let ret = event.result.value();

        match class {
            C::Open | C::Creat => {
                if let (Some(fd), Some(target)) = (ret.and_then(to_fd), targets.first()) {
                    let cloexec = event.has_flag("O_CLOEXEC");
                    self.context_mut(pid).fds.insert(
                        fd,
                        FdEntry::resource(target.identity.clone(), target.path.clone(), cloexec),
                    );
                }
            }
            C::Dup => {
                let old = event.arg(0).and_then(ArgValue::as_fd);
                if let (Some(old), Some(new)) = (old, ret.and_then(to_fd)) {
                    let cloexec = event.name == "dup3" && event.has_flag("O_CLOEXEC");
                    self.duplicate(event, old, new, cloexec);
                }
            }
            C::Fcntl => self.apply_fcntl(event),
            C::Close => {
                if let Some(fd) = event.arg(0).and_then(ArgValue::as_fd) {
                    self.context_mut(pid).fds.remove(fd);
                }
            }
            C::Chdir => {
                if let Some(dir) = targets.first().and_then(|t| t.path.clone()) {
                    let ctx = self.context_mut(pid);
                    ctx.cwd = dir;
                    ctx.cwd_known = true;
                }
            }
            C::Fchdir => {
                let dir = match event.arg(0) {
                    Some(ArgValue::Descriptor { fd, path }) => self
                        .context_mut(pid)
                        .fds
                        .get(*fd)
                        .and_then(|e| e.identity().and_then(ResourceIdentity::as_path).map(str::to_string))
                        .or_else(|| path.clone().filter(|p| p.starts_with('/'))),
                    _ => None,
                };
                if let Some(dir) = dir {
                    let ctx = self.context_mut(pid);
                    ctx.cwd = dir;
                    ctx.cwd_known = true;
                }
            }
            C::Getcwd => {
                if let Some(dir) = event.arg(0).and_then(ArgValue::as_path) {
                    let ctx = self.context_mut(pid);
                    ctx.cwd = normalize_path("/", dir);
                    ctx.cwd_known = true;
                }
            }
            C::Spawn => {
                if let Some(child) = ret.filter(|v| *v > 0).and_then(|v| Pid::try_from(v).ok()) {
                    let sharing = Sharing {
                        files: clone_flag(event, "CLONE_FILES"),
                        fs: clone_flag(event, "CLONE_FS"),
                    };
                    self.spawn(pid, child, sharing);
                }
            }
            C::Exec => {
                // execve unshares the descriptor table but keeps CLONE_FS
                self.shared_files.leave(pid);
                let image = targets.first().and_then(|t| t.path.clone());
                let ctx = self.context_mut(pid);
                ctx.fds.retain_on_exec();
                ctx.executable = image;
            }
            C::Socket => {
                if let Some(fd) = ret.and_then(to_fd) {
                    let protocol = match (event.arg(0), event.arg(1)) {
                        (Some(ArgValue::Flags(domain)), Some(ArgValue::Flags(kind))) => {
                            Protocol::from_socket_args(domain, kind)
                        }
                        _ => Protocol::Ip,
                    };
                    let cloexec = event.has_flag("SOCK_CLOEXEC");
                    self.context_mut(pid).fds.insert(
                        fd,
                        FdEntry {
                            target: FdTarget::Socket { protocol },
                            path: None,
                            cloexec,
                        },
                    );
                }
            }
            C::Connect | C::Bind => {
                let fd = event.arg(0).and_then(ArgValue::as_fd);
                if let (Some(fd), Some(target)) = (fd, targets.first()) {
                    let ctx = self.context_mut(pid);
                    let cloexec = ctx.fds.get(fd).is_some_and(|e| e.cloexec);
                    ctx.fds
                        .insert(fd, FdEntry::resource(target.identity.clone(), None, cloexec));
                }
            }
            C::Accept => {
                if let (Some(fd), Some(target)) = (ret.and_then(to_fd), targets.first()) {
                    let cloexec = event.has_flag("SOCK_CLOEXEC");
                    self.context_mut(pid)
                        .fds
                        .insert(fd, FdEntry::resource(target.identity.clone(), None, cloexec));
                }
            }
            C::AnonymousFd => self.install_anonymous(event),
            _ => {}
        }
    }

    fn duplicate(&mut self, event: &SyscallEvent, old: i32, new: i32, cloexec: bool) {
        let pid = event.pid;
        if self.context_mut(pid).fds.get(old).is_none() {
            let decorated = match event.arg(0) {
                Some(arg @ ArgValue::Descriptor { .. }) => Some(arg.clone()),
                _ => None,
            };
            if let Some(arg) = decorated {
                self.descriptor_arg_target(event, &arg);
            }
        }
        self.context_mut(pid).fds.alias(old, new, cloexec);
    }

    fn apply_fcntl(&mut self, event: &SyscallEvent) {
        let pid = event.pid;
        let Some(fd) = event.arg(0).and_then(ArgValue::as_fd) else {
            return;
        };
        let command = event.arg(1);
        let has = |name: &str| command.is_some_and(|c| c.has_flag(name));

        if has("F_DUPFD") || has("F_DUPFD_CLOEXEC") {
            if let Some(new) = event.result.value().and_then(to_fd) {
                self.duplicate(event, fd, new, has("F_DUPFD_CLOEXEC"));
            }
        } else if has("F_SETFD") {
            let cloexec = match event.arg(2) {
                Some(ArgValue::Flags(flags)) => flags.iter().any(|f| f == "FD_CLOEXEC"),
                Some(ArgValue::Int(v)) => v & 1 == 1,
                _ => false,
            };
            self.context_mut(pid).fds.set_cloexec(fd, cloexec);
        }
    }

    fn install_anonymous(&mut self, event: &SyscallEvent) {
        let pid = event.pid;
        let mut fds = Vec::new();
        if matches!(event.name.as_str(), "pipe" | "pipe2" | "socketpair") {
            // Result is 0; the descriptors are printed as `[3, 4]`
            if let Some(ArgValue::Raw(pair)) = event
                .args
                .iter()
                .find(|a| matches!(a, ArgValue::Raw(r) if r.starts_with('[')))
            {
                fds.extend(
                    pair.trim_matches(|c| c == '[' || c == ']')
                        .split(',')
                        .filter_map(|s| s.trim().parse::<i32>().ok()),
                );
            }
        } else if let Some(fd) = event.result.value().and_then(to_fd) {
            fds.push(fd);
        }

        let cloexec = event.has_flag("O_CLOEXEC")
            || event.args.iter().any(|a| {
                matches!(a, ArgValue::Flags(f) if f.iter().any(|x| x.ends_with("_CLOEXEC")))
            });
        let ctx = self.context_mut(pid);
        for fd in fds {
            let mut entry = FdEntry::anonymous();
            entry.cloexec = cloexec;
            ctx.fds.insert(fd, entry);
        }
    }

    /// Copy `pid`'s descriptor table and cwd to the pids sharing them
    fn sync_shared(&mut self, pid: Pid) {
        let files = self.shared_files.peers(pid);
        let fs = self.shared_fs.peers(pid);
        if files.is_empty() && fs.is_empty() {
            return;
        }
        let Some(source) = self.processes.get(&pid).cloned() else {
            return;
        };
        for peer in files {
            if let Some(ctx) = self.processes.get_mut(&peer) {
                ctx.fds = source.fds.clone();
            }
        }
        for peer in fs {
            if let Some(ctx) = self.processes.get_mut(&peer) {
                ctx.cwd = source.cwd.clone();
                ctx.cwd_known = source.cwd_known;
            }
        }
    }

    /// Child context cloned from the parent at this instant, or joined to
    /// the parent's table and cwd when the clone shares them
    fn spawn(&mut self, parent: Pid, child: Pid, sharing: Sharing) {
        let parent_ctx = self.context_mut(parent).clone();
        self.lineage.insert(child, parent);

        match self.processes.get_mut(&child) {
            // Child lines can precede the parent's clone return
            Some(existing) if !existing.exited => {
                for (fd, entry) in parent_ctx.fds.iter() {
                    let inherit = existing
                        .fds
                        .get(fd)
                        .map_or(true, |e| e.identity().is_some_and(ResourceIdentity::is_ambiguous));
                    if inherit {
                        existing.fds.insert(fd, entry.clone());
                    }
                }
                if !existing.cwd_known {
                    existing.cwd = parent_ctx.cwd.clone();
                    existing.cwd_known = parent_ctx.cwd_known;
                }
                existing.parent = Some(parent);
            }
            _ => {
                let ctx = ProcessContext {
                    pid: child,
                    cwd: parent_ctx.cwd,
                    cwd_known: parent_ctx.cwd_known,
                    fds: parent_ctx.fds,
                    parent: Some(parent),
                    exited: false,
                    executable: parent_ctx.executable,
                };
                self.processes.insert(child, ctx);
            }
        }
        if sharing.files {
            self.shared_files.join(parent, child);
        }
        if sharing.fs {
            self.shared_fs.join(parent, child);
        }
        // Entries the child made before the clone returned land in the shared state
        self.sync_shared(child);
        trace!(parent, child, files = sharing.files, fs = sharing.fs, "process spawned");
    }
}

/// What a clone shares with its parent instead of copying
#[derive(Debug, Clone, Copy, Default)]
struct Sharing {
    files: bool,
    fs: bool,
}

/// clone prints `flags=A|B`, clone3 a `{flags=A|B, ...}` struct
fn clone_flag(event: &SyscallEvent, flag: &str) -> bool {
    event.has_flag(flag)
        || event.args.iter().any(|arg| match arg {
            ArgValue::Raw(raw) => raw
                .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .any(|token| token == flag),
            _ => false,
        })
}

fn to_fd(value: i64) -> Option<i32> {
    i32::try_from(value).ok().filter(|fd| *fd >= 0)
}

/// Lexically join `path` onto `base` and fold `.`/`..` components
///
/// Symlinks are not consulted; `..` at the root stays at the root.
pub fn normalize_path(base: &str, path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let joined = if path.starts_with('/') {
        [path, ""]
    } else {
        [base, path]
    };

    for segment in joined.iter().flat_map(|s| s.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_trace;

    fn run(trace: &str) -> (ProcessTracker, Vec<ResolvedEvent>) {
        let parsed = parse_trace(trace, 100);
        let mut tracker = ProcessTracker::new("/");
        let resolved = parsed
            .entries
            .into_iter()
            .filter_map(|entry| tracker.apply(entry))
            .collect();
        (tracker, resolved)
    }

    fn path_of(event: &ResolvedEvent) -> Option<&str> {
        event.targets.first().and_then(|t| t.path.as_deref())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/srv/app", "conf/../data/./x.db"), "/srv/app/data/x.db");
        assert_eq!(normalize_path("/", "../../etc"), "/etc");
        assert_eq!(normalize_path("/ignored", "/abs//path/"), "/abs/path");
        assert_eq!(normalize_path("/", "."), "/");
    }

    #[test]
    fn test_open_read_resolves_through_fd() {
        let (tracker, events) = run(
            r#"openat(AT_FDCWD, "/etc/nginx.conf", O_RDONLY) = 3
read(3, "...", 4096) = 128
close(3) = 0
"#,
        );
        assert_eq!(path_of(&events[0]), Some("/etc/nginx.conf"));
        assert_eq!(path_of(&events[1]), Some("/etc/nginx.conf"));
        assert!(events[2].targets.is_empty());
        assert!(tracker.context(100).unwrap().fds.get(3).is_none());
        assert!(tracker.diagnostics().is_empty());
    }

    #[test]
    fn test_relative_paths_follow_chdir_and_dirfd() {
        let (_, events) = run(
            r#"chdir("/srv/app") = 0
openat(AT_FDCWD, "conf/app.toml", O_RDONLY) = 3
openat(AT_FDCWD, "/var/lib", O_RDONLY|O_DIRECTORY) = 4
openat(4, "db/state", O_RDONLY) = 5
"#,
        );
        assert_eq!(path_of(&events[1]), Some("/srv/app/conf/app.toml"));
        assert_eq!(path_of(&events[3]), Some("/var/lib/db/state"));
    }

    #[test]
    fn test_getcwd_teaches_cwd() {
        let (tracker, events) = run(
            r#"getcwd("/home/build", 4096) = 12
stat("Makefile", {st_mode=S_IFREG|0644, st_size=10, ...}) = 0
"#,
        );
        assert_eq!(path_of(&events[1]), Some("/home/build/Makefile"));
        assert!(tracker.context(100).unwrap().cwd_known);
    }

    #[test]
    fn test_unknown_fd_is_ambiguous_once() {
        let (tracker, events) = run(
            r#"write(1, "hello\n", 6) = 6
write(1, "again\n", 6) = 6
"#,
        );
        let expected = ResourceIdentity::Ambiguous { pid: 100, fd: 1 };
        assert_eq!(events[0].targets[0].identity, expected);
        assert_eq!(events[1].targets[0].identity, expected);
        assert_eq!(tracker.diagnostics().len(), 1);
        assert_eq!(tracker.diagnostics()[0].kind, DiagnosticKind::AmbiguousDescriptor);
    }

    #[test]
    fn test_decorated_fd_is_not_ambiguous() {
        let (tracker, events) = run("read(7</etc/ssl/certs/ca.pem>, \"...\", 100) = 100\n");
        assert_eq!(path_of(&events[0]), Some("/etc/ssl/certs/ca.pem"));
        assert!(tracker.diagnostics().is_empty());
    }

    #[test]
    fn test_dup_aliases_and_close_removes() {
        let (tracker, events) = run(
            r#"openat(AT_FDCWD, "/var/log/app.log", O_WRONLY|O_APPEND) = 3
dup2(3, 1) = 1
write(1, "x", 1) = 1
close(3) = 0
"#,
        );
        assert_eq!(path_of(&events[2]), Some("/var/log/app.log"));
        let ctx = tracker.context(100).unwrap();
        assert!(ctx.fds.get(3).is_none());
        assert_eq!(ctx.fds.get_path(1), Some("/var/log/app.log"));
    }

    #[test]
    fn test_fork_clones_table_and_records_lineage() {
        let (tracker, events) = run(
            r#"[pid 100] chdir("/work") = 0
[pid 100] openat(AT_FDCWD, "input.txt", O_RDONLY) = 3
[pid 100] clone(child_stack=NULL, flags=CLONE_CHILD_CLEARTID|SIGCHLD) = 101
[pid 101] read(3, "data", 4) = 4
[pid 101] openat(AT_FDCWD, "out.txt", O_WRONLY|O_CREAT, 0644) = 4
"#,
        );
        assert_eq!(tracker.lineage().get(&101), Some(&100));
        assert_eq!(path_of(&events[3]), Some("/work/input.txt"));
        assert_eq!(path_of(&events[4]), Some("/work/out.txt"));
        assert_eq!(tracker.context(101).unwrap().parent, Some(100));
    }

    #[test]
    fn test_child_lines_before_clone_return() {
        let (tracker, events) = run(
            r#"[pid 100] openat(AT_FDCWD, "/etc/app.conf", O_RDONLY) = 3
[pid 100] clone(child_stack=NULL, flags=SIGCHLD <unfinished ...>
[pid 101] openat(AT_FDCWD, "/tmp/child", O_RDONLY) = 5
[pid 100] <... clone resumed>) = 101
[pid 101] read(3, "x", 1) = 1
"#,
        );
        let read = events.iter().find(|e| e.event.name == "read").unwrap();
        assert_eq!(path_of(read), Some("/etc/app.conf"));
        let child = tracker.context(101).unwrap();
        assert_eq!(child.fds.get_path(5), Some("/tmp/child"));
        assert_eq!(child.parent, Some(100));
    }

    #[test]
    fn test_thread_shares_descriptor_table_and_cwd() {
        let (tracker, events) = run(
            r#"[pid 10] openat(AT_FDCWD, "/etc/app.conf", O_RDONLY) = 3
[pid 10] clone(child_stack=0x7f00, flags=CLONE_VM|CLONE_FS|CLONE_FILES|CLONE_SIGHAND|CLONE_THREAD|CLONE_SYSVSEM) = 11
[pid 11] close(3) = 0
[pid 11] openat(AT_FDCWD, "/var/lib/state", O_RDONLY) = 4
[pid 11] chdir("/srv") = 0
[pid 10] read(3, "x", 1) = 1
[pid 10] read(4, "y", 1) = 1
[pid 10] openat(AT_FDCWD, "data", O_RDONLY) = 5
"#,
        );
        // close in the thread removed the shared entry
        assert_eq!(
            events[5].targets[0].identity,
            ResourceIdentity::Ambiguous { pid: 10, fd: 3 }
        );
        assert_eq!(path_of(&events[6]), Some("/var/lib/state"));
        assert_eq!(path_of(&events[7]), Some("/srv/data"));
        assert_eq!(tracker.context(11).unwrap().fds.get_path(5), Some("/srv/data"));
        assert_eq!(tracker.lineage().get(&11), Some(&10));
    }

    #[test]
    fn test_clone_files_without_fs_keeps_own_cwd() {
        let (_, events) = run(
            r#"[pid 10] chdir("/home") = 0
[pid 10] clone(child_stack=0x7f00, flags=CLONE_VM|CLONE_FILES) = 11
[pid 11] chdir("/tmp") = 0
[pid 11] openat(AT_FDCWD, "scratch", O_WRONLY|O_CREAT, 0600) = 3
[pid 10] openat(AT_FDCWD, "notes", O_RDONLY) = 4
[pid 10] write(3, "z", 1) = 1
"#,
        );
        assert_eq!(path_of(&events[3]), Some("/tmp/scratch"));
        assert_eq!(path_of(&events[4]), Some("/home/notes"));
        assert_eq!(path_of(&events[5]), Some("/tmp/scratch"));
    }

    #[test]
    fn test_fork_copies_are_independent() {
        let (tracker, events) = run(
            r#"[pid 10] openat(AT_FDCWD, "/etc/app.conf", O_RDONLY) = 3
[pid 10] clone(child_stack=NULL, flags=CLONE_CHILD_CLEARTID|CLONE_CHILD_SETTID|SIGCHLD) = 11
[pid 11] close(3) = 0
[pid 10] read(3, "x", 1) = 1
"#,
        );
        assert_eq!(path_of(&events[3]), Some("/etc/app.conf"));
        assert!(tracker.context(11).unwrap().fds.get(3).is_none());
    }

    #[test]
    fn test_execve_unshares_descriptor_table() {
        let (tracker, _) = run(
            r#"[pid 10] clone(child_stack=0x7f00, flags=CLONE_VM|CLONE_FILES) = 11
[pid 11] execve("/usr/bin/helper", ["helper"], 0x7ffc /* 3 vars */) = 0
[pid 11] openat(AT_FDCWD, "/tmp/helper.log", O_WRONLY|O_CREAT, 0644) = 3
"#,
        );
        assert_eq!(tracker.context(11).unwrap().fds.get_path(3), Some("/tmp/helper.log"));
        assert!(tracker.context(10).unwrap().fds.get(3).is_none());
    }

    #[test]
    fn test_execve_drops_only_cloexec_entries() {
        let (tracker, _) = run(
            r#"openat(AT_FDCWD, "/etc/keep", O_RDONLY) = 3
openat(AT_FDCWD, "/etc/drop", O_RDONLY|O_CLOEXEC) = 4
openat(AT_FDCWD, "/etc/drop2", O_RDONLY) = 5
fcntl(5, F_SETFD, FD_CLOEXEC) = 0
execve("/usr/bin/tool", ["tool"], 0x7ffc /* 3 vars */) = 0
"#,
        );
        let ctx = tracker.context(100).unwrap();
        assert_eq!(ctx.fds.get_path(3), Some("/etc/keep"));
        assert!(ctx.fds.get(4).is_none());
        assert!(ctx.fds.get(5).is_none());
        assert_eq!(ctx.executable.as_deref(), Some("/usr/bin/tool"));
    }

    /// Assumption: an execve with no preceding fork replaces the image in
    /// place, keeps the cwd and leaves lineage untouched.
    #[test]
    fn test_execve_without_fork_keeps_lineage_and_cwd() {
        let (tracker, _) = run(
            r#"chdir("/opt/svc") = 0
execve("/opt/svc/bin/run", ["run"], 0x7ffc /* 3 vars */) = 0
"#,
        );
        assert!(tracker.lineage().is_empty());
        let ctx = tracker.context(100).unwrap();
        assert_eq!(ctx.cwd, "/opt/svc");
        assert_eq!(ctx.parent, None);
    }

    #[test]
    fn test_socket_connect_upgrades_entry() {
        let (tracker, events) = run(
            r#"socket(AF_INET, SOCK_STREAM|SOCK_CLOEXEC, IPPROTO_TCP) = 3
connect(3, {sa_family=AF_INET, sin_port=htons(5432), sin_addr=inet_addr("10.0.0.5")}, 16) = -1 EINPROGRESS (Operation now in progress)
sendto(3, "ping", 4, MSG_NOSIGNAL, NULL, 0) = 4
"#,
        );
        let endpoint = ResourceIdentity::Endpoint(Endpoint {
            protocol: Protocol::Tcp,
            address: "10.0.0.5".to_string(),
            port: Some(5432),
        });
        assert_eq!(events[1].targets[0].identity, endpoint);
        assert_eq!(events[2].targets[0].identity, endpoint);
        let entry = tracker.context(100).unwrap().fds.get(3).unwrap();
        assert!(entry.cloexec);
        assert_eq!(entry.identity(), Some(&endpoint));
    }

    #[test]
    fn test_pipes_are_anonymous() {
        let (tracker, events) = run(
            r#"pipe2([3, 4], O_CLOEXEC) = 0
write(4, "x", 1) = 1
"#,
        );
        assert!(events[1].targets.is_empty());
        assert!(tracker.diagnostics().is_empty());
        assert_eq!(tracker.context(100).unwrap().fds.get(3).unwrap().target, FdTarget::Anonymous);
    }

    #[test]
    fn test_exited_pid_is_reused_fresh() {
        let (tracker, _) = run(
            r#"[pid 200] openat(AT_FDCWD, "/etc/a", O_RDONLY) = 3
[pid 200] +++ exited with 0 +++
[pid 200] close(9) = 0
"#,
        );
        let ctx = tracker.context(200).unwrap();
        assert!(!ctx.exited);
        assert!(ctx.fds.get(3).is_none());
    }
}
