//! Failure & lifecycle bookkeeping (C9) and startup/shutdown choreography
//! (C11), collapsed into one module since Rust supervises threads rather
//! than forked child processes — recorded as an Open Question decision in
//! DESIGN.md. The diff-and-respawn loop is grounded on `aldad.c`'s
//! config-mtime poll; the active-file guard is grounded on
//! `ops.rs::ensure_hostpilot_dir`/`setup_terminal`/`restore_terminal`'s
//! setup-then-guaranteed-teardown pairing and `main.rs::
//! init_tracing_if_requested`'s leaked-guard-on-success pattern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crate::binlog::DeleteReason;
use crate::util::now_secs;

/// The four conceptual daemons `init-afd` brings up, mapped to threads
/// instead of forked processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonId {
    Amg,
    Fd,
    ArchiveWatch,
    Monitor,
}

impl DaemonId {
    pub fn name(self) -> &'static str {
        match self {
            DaemonId::Amg => "AMG",
            DaemonId::Fd => "FD",
            DaemonId::ArchiveWatch => "archive_watch",
            DaemonId::Monitor => "afd_mon",
        }
    }
}

/// RAII presence lock for `AFD_ACTIVE_FILE`/`MON_ACTIVE_FILE`: created on
/// successful startup, removed on drop (including panic-unwind), mirroring
/// `setup_terminal`/`restore_terminal`'s guaranteed-teardown pairing.
pub struct ActiveFileGuard {
    path: PathBuf,
}

impl ActiveFileGuard {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, std::process::id().to_string())?;
        Ok(ActiveFileGuard { path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ActiveFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `startup_afd`'s probe-only handshake: confirm the active-file lock is
/// not already held by a live process before creating it. A stale lock
/// (process no longer running) is treated as absent; detecting "is this
/// pid alive" is out of scope here (that is a platform-specific concern
/// the original delegates to `kill(pid, 0)`), so this only checks presence.
pub fn probe_startup(active_file: &Path) -> StartupProbe {
    if active_file.exists() {
        StartupProbe::AlreadyActive
    } else {
        StartupProbe::ClearToStart
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupProbe {
    ClearToStart,
    AlreadyActive,
}

/// One supervised daemon's thread handle plus the join-time failure it
/// last reported, if any.
struct Supervised {
    handle: Option<JoinHandle<()>>,
    started_at: u64,
}

/// The in-process equivalent of `aldad`'s process table (`apl[]`):
/// daemons started so far, keyed by [`DaemonId`], with a diff-and-respawn
/// loop driven off a config file's mtime rather than forking anew on
/// every tick.
pub struct Supervisor {
    procs: HashMap<DaemonId, Supervised>,
    config_path: PathBuf,
    last_config_mtime: Option<SystemTime>,
}

impl Supervisor {
    pub fn new(config_path: PathBuf) -> Self {
        Supervisor { procs: HashMap::new(), config_path, last_config_mtime: None }
    }

    /// Registers a freshly spawned daemon thread, replacing (and joining)
    /// any prior handle under the same id.
    pub fn register(&mut self, id: DaemonId, handle: JoinHandle<()>) {
        if let Some(prev) = self.procs.remove(&id) {
            if let Some(h) = prev.handle {
                let _ = h.join();
            }
        }
        self.procs.insert(id, Supervised { handle: Some(handle), started_at: now_secs() });
    }

    pub fn is_running(&self, id: DaemonId) -> bool {
        self.procs.get(&id).map(|p| p.handle.as_ref().is_some_and(|h| !h.is_finished())).unwrap_or(false)
    }

    /// `zombie_check`: reclaim finished threads. A thread that finished
    /// (crashed or returned) is reported so the caller can reset the
    /// host's FSA slot to `DISCONNECT` and requeue its in-flight message,
    /// exactly as a crashed child process's slot would be reclaimed.
    pub fn zombie_check(&mut self) -> Vec<DaemonId> {
        let mut reclaimed = Vec::new();
        for (id, proc) in self.procs.iter_mut() {
            if proc.handle.as_ref().is_some_and(|h| h.is_finished()) {
                if let Some(h) = proc.handle.take() {
                    let _ = h.join();
                }
                reclaimed.push(*id);
            }
        }
        reclaimed
    }

    /// Whether the supervised config file changed since the last check,
    /// mirroring `aldad`'s `stat_buf.st_mtime != old_st_mtime` poll.
    pub fn config_changed(&mut self) -> bool {
        let mtime = std::fs::metadata(&self.config_path).and_then(|m| m.modified()).ok();
        let changed = mtime != self.last_config_mtime;
        self.last_config_mtime = mtime;
        changed
    }

    /// Joins every still-running daemon, blocking until each thread exits.
    /// Used by the shutdown path once each daemon has been told to stop
    /// via its [`crate::fifo::CommandFifo`].
    pub fn join_all(&mut self) {
        for proc in self.procs.values_mut() {
            if let Some(h) = proc.handle.take() {
                let _ = h.join();
            }
        }
    }

    pub fn uptime_secs(&self, id: DaemonId) -> Option<u64> {
        self.procs.get(&id).map(|p| now_secs().saturating_sub(p.started_at))
    }
}

/// `search_old_files`: stuck-file sweep over a staging root, returning
/// paths whose mtime predates `now - max_age_secs`. The caller decides
/// disposition (delete with a `DELETE_LOG` record, or just warn).
pub fn search_old_files(root: &Path, max_age_secs: u64, now: u64) -> Vec<PathBuf> {
    let mut stale = Vec::new();
    if !root.exists() {
        return stale;
    }
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(modified) = meta.modified() {
                if let Ok(age) = modified.duration_since(SystemTime::UNIX_EPOCH) {
                    if now.saturating_sub(age.as_secs()) > max_age_secs {
                        stale.push(entry.path().to_path_buf());
                    }
                }
            }
        }
    }
    stale
}

/// `remove_time_dir`: clears a time-anchored job's spool directory,
/// logging each deletion with `reason` (`OtherDel` or `HostDisabled` per
/// §4.9), returning the number of files removed.
pub fn remove_time_dir(
    job_dir: &Path,
    dir_id: u32,
    job_id: u32,
    reason: DeleteReason,
    delete_log_path: &Path,
) -> std::io::Result<u64> {
    let (count, _bytes) = crate::queue::remove_job_files(job_dir, dir_id, job_id, reason, delete_log_path)?;
    Ok(count)
}

/// `.min()`-bounded poll interval used by the supervisor's own loop,
/// mirroring `STAT_INTERVAL` from the ambient config.
pub fn next_poll_delay(stat_interval_secs: u64) -> Duration {
    Duration::from_secs(stat_interval_secs.max(1))
}
