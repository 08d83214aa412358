//! Output queue, message cache and append-restart state (C6): FD's view of
//! ready jobs, grounded on `transfer.rs`'s bounded `crossbeam_channel`
//! producer/consumer for the in-memory queue shape and
//! `util.rs::retry_operation`'s linear backoff for retry scheduling.
//! Append-restart is new code authored in the same idiom, grounded in
//! semantics on `original_source/src/fd/append.c`.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::TransferError;
use crate::util::now_secs;

pub const OPTION_IDENTIFIER: &str = "[options]";
pub const RESTART_FILE_ID: &str = "RESTART_FILE_ID";

/// One cached, parsed message: host, standard options and its live
/// restart list. `mdb[]` in §4.6.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMessage {
    pub job_id: u32,
    pub host_alias: String,
    pub standard_options: String,
    pub restart: Vec<RestartEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestartEntry {
    pub file_name: String,
    pub mtime: u64,
}

/// Append-managed message cache; `del_cache` removes an element by
/// position, closing the gap rather than leaving a tombstone.
#[derive(Debug, Clone, Default)]
pub struct MessageCache {
    entries: Vec<CachedMessage>,
}

impl MessageCache {
    pub fn new() -> Self {
        MessageCache::default()
    }

    pub fn push(&mut self, msg: CachedMessage) -> usize {
        self.entries.push(msg);
        self.entries.len() - 1
    }

    pub fn get(&self, pos: usize) -> Option<&CachedMessage> {
        self.entries.get(pos)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut CachedMessage> {
        self.entries.get_mut(pos)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `del_cache <pos>`: removes position `pos`, shifting later entries
    /// down by one (the `memmove`-and-decrement the original performs).
    /// Only valid when the queue referencing this cache is empty — the
    /// caller is responsible for that precondition (§6 CLI surface).
    pub fn remove(&mut self, pos: usize) -> Option<CachedMessage> {
        if pos >= self.entries.len() {
            return None;
        }
        Some(self.entries.remove(pos))
    }

    pub fn entries(&self) -> &[CachedMessage] {
        &self.entries
    }

    /// Flat on-disk encoding for the `del_cache` CLI tool: `u32 count`,
    /// then per message `u32 job_id`, `u32 alias_len`+bytes,
    /// `u32 options_len`+bytes, `u32 restart_count`, then per restart entry
    /// `u32 name_len`+bytes, `u64 mtime`.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for m in &self.entries {
            out.extend_from_slice(&m.job_id.to_le_bytes());
            write_len_prefixed(&mut out, m.host_alias.as_bytes());
            write_len_prefixed(&mut out, m.standard_options.as_bytes());
            out.extend_from_slice(&(m.restart.len() as u32).to_le_bytes());
            for r in &m.restart {
                write_len_prefixed(&mut out, r.file_name.as_bytes());
                out.extend_from_slice(&r.mtime.to_le_bytes());
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, out)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            return Ok(MessageCache::new());
        }
        let bytes = std::fs::read(path)?;
        let mut cache = MessageCache::new();
        let mut off = 0usize;
        let Some(count) = read_u32(&bytes, &mut off) else { return Ok(cache) };
        for _ in 0..count {
            let Some(job_id) = read_u32(&bytes, &mut off) else { break };
            let Some(host_alias) = read_len_prefixed_string(&bytes, &mut off) else { break };
            let Some(standard_options) = read_len_prefixed_string(&bytes, &mut off) else { break };
            let Some(restart_count) = read_u32(&bytes, &mut off) else { break };
            let mut restart = Vec::new();
            for _ in 0..restart_count {
                let Some(file_name) = read_len_prefixed_string(&bytes, &mut off) else { break };
                if off + 8 > bytes.len() {
                    break;
                }
                let mtime = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
                off += 8;
                restart.push(RestartEntry { file_name, mtime });
            }
            cache.entries.push(CachedMessage { job_id, host_alias, standard_options, restart });
        }
        Ok(cache)
    }
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_u32(bytes: &[u8], off: &mut usize) -> Option<u32> {
    if *off + 4 > bytes.len() {
        return None;
    }
    let v = u32::from_le_bytes(bytes[*off..*off + 4].try_into().unwrap());
    *off += 4;
    Some(v)
}

fn read_len_prefixed_string(bytes: &[u8], off: &mut usize) -> Option<String> {
    let len = read_u32(bytes, off)? as usize;
    if *off + len > bytes.len() {
        return None;
    }
    let s = String::from_utf8_lossy(&bytes[*off..*off + len]).into_owned();
    *off += len;
    Some(s)
}

/// One queue entry: either a pull directory or a staged push message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTarget {
    Directory(u32),
    Message(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub priority: u8,
    pub fsa_pos: usize,
    pub target: QueueTarget,
    pub queued_at: u64,
}

/// In-memory output queue (`qb[*no_msg_queued]`): ordered by priority then
/// arrival, served in enqueue order within a host modulo slot availability
/// (§5's ordering guarantee — no reordering across priority groups).
#[derive(Debug, Clone, Default)]
pub struct OutputQueue {
    entries: Vec<QueueEntry>,
}

impl OutputQueue {
    pub fn new() -> Self {
        OutputQueue::default()
    }

    pub fn push(&mut self, entry: QueueEntry) {
        let pos = self.entries.iter().position(|e| {
            e.priority > entry.priority
                || (e.priority == entry.priority && e.queued_at > entry.queued_at)
        });
        match pos {
            Some(i) => self.entries.insert(i, entry),
            None => self.entries.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First queued entry for `fsa_pos`, in priority/arrival order.
    pub fn next_for_host(&self, fsa_pos: usize) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.fsa_pos == fsa_pos)
    }

    /// Removes and returns the first queued entry for `fsa_pos`.
    pub fn pop_for_host(&mut self, fsa_pos: usize) -> Option<QueueEntry> {
        let idx = self.entries.iter().position(|e| e.fsa_pos == fsa_pos)?;
        Some(self.entries.remove(idx))
    }

    /// §4.9's crashed-worker recovery: a reclaimed message goes back to the
    /// head of its host's queue rather than the tail, so it is retried
    /// before anything enqueued later.
    pub fn requeue_at_head(&mut self, entry: QueueEntry) {
        let idx = self
            .entries
            .iter()
            .position(|e| e.fsa_pos == entry.fsa_pos)
            .unwrap_or(0);
        self.entries.insert(idx.min(self.entries.len()), entry);
    }
}

/// Whether host `fsa_pos`'s next attempt is due, given the last retry time
/// and the host's `retry_interval` (§4.6's "next attempt scheduled no
/// earlier than `last_retry_time + retry_interval`").
pub fn retry_due(last_retry_time: u64, retry_interval_secs: u64, now: u64) -> bool {
    now >= last_retry_time.saturating_add(retry_interval_secs)
}

fn lock_file_exclusive(file: &std::fs::File) -> std::io::Result<()> {
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if ret != 0 { Err(std::io::Error::last_os_error()) } else { Ok(()) }
}

fn unlock_file(file: &std::fs::File) {
    let _ = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
}

/// Parses a message file's text body into its option blob and restart
/// list, splitting at the `[options]` / `RESTART_FILE_ID` markers.
fn split_restart_section(text: &str) -> (String, Vec<RestartEntry>) {
    match text.find(OPTION_IDENTIFIER) {
        None => (text.to_string(), Vec::new()),
        Some(opt_pos) => {
            let (body, rest) = text.split_at(opt_pos);
            let rest = &rest[OPTION_IDENTIFIER.len()..];
            let rest = rest.trim_start_matches('\n');
            match rest.strip_prefix(RESTART_FILE_ID) {
                Some(after) => {
                    let entries = after
                        .lines()
                        .filter(|l| !l.is_empty())
                        .filter_map(|line| {
                            let (name, mtime) = line.split_once('|')?;
                            Some(RestartEntry { file_name: name.to_string(), mtime: mtime.trim().parse().ok()? })
                        })
                        .collect();
                    (body.trim_end_matches('\n').to_string(), entries)
                }
                None => (body.trim_end_matches('\n').to_string(), Vec::new()),
            }
        }
    }
}

fn render_message(standard_options: &str, restart: &[RestartEntry]) -> String {
    if restart.is_empty() {
        return format!("{standard_options}\n");
    }
    let mut out = format!("{standard_options}\n{OPTION_IDENTIFIER}\n{RESTART_FILE_ID}\n");
    for entry in restart {
        out.push_str(&format!("{}|{}\n", entry.file_name, entry.mtime));
    }
    out
}

/// `log_append(p_db, file_name, source_file_name)`: whole-file-lock the
/// message, add or refresh a restart entry for `file_name` using the
/// current mtime of `source_file_name` on disk, and rewrite the file.
pub fn log_append(msg_path: &Path, file_name: &str, source_file_name: &Path) -> Result<(), TransferError> {
    let mtime = std::fs::metadata(source_file_name)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_else(now_secs);

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(msg_path)
        .map_err(|e| TransferError::AppendIo(e.to_string()))?;
    lock_file_exclusive(&file).map_err(|e| TransferError::AppendIo(e.to_string()))?;

    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    let (body, mut restart) = split_restart_section(&text);

    if let Some(existing) = restart.iter_mut().find(|e| e.file_name == file_name) {
        existing.mtime = mtime;
    } else {
        restart.push(RestartEntry { file_name: file_name.to_string(), mtime });
    }

    let rendered = render_message(&body, &restart);
    file.set_len(0).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    use std::io::Seek;
    file.seek(std::io::SeekFrom::Start(0)).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    file.write_all(rendered.as_bytes()).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    unlock_file(&file);
    Ok(())
}

/// `append_compare(entry, fullname)`: true when `fullname`'s on-disk mtime
/// still matches the restart entry's recorded mtime (so the existing
/// partial transfer is still valid to resume from).
pub fn append_compare(entry: &RestartEntry, fullname: &Path) -> bool {
    std::fs::metadata(fullname)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .is_some_and(|mtime| mtime == entry.mtime)
}

/// `remove_append(jid, name)`: excises one restart entry on transfer
/// success; `remove_all` mode (name = None) matches `remove_all_appends`,
/// removing the whole `RESTART_FILE_ID` option on message retirement.
pub fn remove_append(msg_path: &Path, file_name: Option<&str>) -> Result<(), TransferError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(msg_path)
        .map_err(|e| TransferError::AppendIo(e.to_string()))?;
    lock_file_exclusive(&file).map_err(|e| TransferError::AppendIo(e.to_string()))?;

    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    let (body, mut restart) = split_restart_section(&text);

    match file_name {
        Some(name) => restart.retain(|e| e.file_name != name),
        None => restart.clear(),
    }

    let rendered = render_message(&body, &restart);
    file.set_len(0).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    use std::io::Seek;
    file.seek(std::io::SeekFrom::Start(0)).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    file.write_all(rendered.as_bytes()).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    unlock_file(&file);
    Ok(())
}

pub fn remove_all_appends(msg_path: &Path) -> Result<(), TransferError> {
    remove_append(msg_path, None)
}

/// `recreate_msg(jid)`: when a message file is corrupt or missing but the
/// JID entry survives, reconstruct its text from the dictionary's
/// recipient and standard-option blob and write it back under the
/// canonical path.
pub fn recreate_msg(msg_path: &Path, standard_options: &str) -> Result<(), TransferError> {
    if let Some(parent) = msg_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TransferError::AppendIo(e.to_string()))?;
    }
    std::fs::write(msg_path, render_message(standard_options, &[]))
        .map_err(|e| TransferError::AppendIo(e.to_string()))
}

/// `remove_job_files(dir, fsa_pos, jid, reason)`: recursively remove a
/// job's staging subdirectory, logging one `DELETE_LOG` record per file,
/// then `rmdir`. Returns the total bytes removed so the caller can
/// decrement the host's `total_file_counter`/`total_file_size` under its
/// byte-range (here, in-process mutex) lock.
pub fn remove_job_files(
    job_dir: &Path,
    dir_id: u32,
    job_id: u32,
    reason: crate::binlog::DeleteReason,
    delete_log_path: &Path,
) -> std::io::Result<(u64, u64)> {
    let mut count = 0u64;
    let mut bytes = 0u64;
    if job_dir.exists() {
        for entry in walkdir::WalkDir::new(job_dir).contents_first(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if entry.file_type().is_file() {
                let meta = entry.metadata()?;
                let name = entry.file_name().to_string_lossy().into_owned();
                crate::binlog::write_delete_log(
                    delete_log_path,
                    &crate::binlog::DeleteLogRecord {
                        file_size: meta.len(),
                        dir_id,
                        job_id,
                        input_time: now_secs(),
                        split_job_counter: 0,
                        unique_number: 0,
                        file_name: name,
                        reason,
                        age_limit_secs: None,
                    },
                )?;
                bytes += meta.len();
                count += 1;
                std::fs::remove_file(entry.path())?;
            } else if entry.file_type().is_dir() && entry.path() != job_dir {
                let _ = std::fs::remove_dir(entry.path());
            }
        }
        let _ = std::fs::remove_dir(job_dir);
    }
    Ok((count, bytes))
}

/// After [`remove_job_files`] zeroes a host's outstanding counters, the
/// quiescence invariant (Testable Property 3) requires clearing
/// `error_counter` and the first two error-history slots, and converting
/// any `NOT_WORKING` slots back to `DISCONNECT` — delegated to
/// [`crate::area::fsa::check_fsa_entries`], which this function calls once
/// `total_file_counter`/`total_file_size` have both reached zero.
pub fn settle_host_after_cleanup(host: &mut crate::area::fsa::HostEntry) {
    if host.is_quiescent() {
        let mut entries = [host.clone()];
        crate::area::fsa::check_fsa_entries(&mut entries);
        *host = entries[0].clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_cache_save_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mdb_data");
        let mut cache = MessageCache::new();
        cache.push(CachedMessage {
            job_id: 7,
            host_alias: "h1".into(),
            standard_options: "dest=ftp://h1/in".into(),
            restart: vec![RestartEntry { file_name: "a.dat".into(), mtime: 1000 }],
        });
        cache.save(&path).unwrap();
        let loaded = MessageCache::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(0).unwrap().job_id, 7);
        assert_eq!(loaded.get(0).unwrap().restart[0].file_name, "a.dat");
    }

    #[test]
    fn message_cache_del_cache_closes_gap() {
        let mut cache = MessageCache::new();
        cache.push(CachedMessage { job_id: 1, host_alias: "h1".into(), standard_options: String::new(), restart: vec![] });
        cache.push(CachedMessage { job_id: 2, host_alias: "h2".into(), standard_options: String::new(), restart: vec![] });
        cache.push(CachedMessage { job_id: 3, host_alias: "h3".into(), standard_options: String::new(), restart: vec![] });
        let removed = cache.remove(1).unwrap();
        assert_eq!(removed.job_id, 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(1).unwrap().job_id, 3);
    }

    #[test]
    fn output_queue_orders_by_priority_then_arrival() {
        let mut q = OutputQueue::new();
        q.push(QueueEntry { priority: 5, fsa_pos: 0, target: QueueTarget::Message(0), queued_at: 10 });
        q.push(QueueEntry { priority: 1, fsa_pos: 0, target: QueueTarget::Message(1), queued_at: 20 });
        q.push(QueueEntry { priority: 5, fsa_pos: 0, target: QueueTarget::Message(2), queued_at: 5 });
        let first = q.pop_for_host(0).unwrap();
        assert_eq!(first.priority, 1);
        let second = q.pop_for_host(0).unwrap();
        assert_eq!(second.queued_at, 5);
    }

    #[test]
    fn retry_due_respects_interval() {
        assert!(!retry_due(1000, 120, 1050));
        assert!(retry_due(1000, 120, 1120));
    }

    #[test]
    fn log_append_then_remove_round_trips_message_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let msg_path = tmp.path().join("msg");
        std::fs::write(&msg_path, "dest=ftp://host/path\n").unwrap();
        let source = tmp.path().join("big.dat");
        std::fs::write(&source, b"payload").unwrap();

        let before = std::fs::read(&msg_path).unwrap();
        log_append(&msg_path, "big.dat", &source).unwrap();
        let after_append = std::fs::read_to_string(&msg_path).unwrap();
        assert!(after_append.contains(RESTART_FILE_ID));
        assert!(after_append.contains("big.dat|"));

        remove_append(&msg_path, Some("big.dat")).unwrap();
        let after_remove = std::fs::read(&msg_path).unwrap();
        assert_eq!(after_remove, before);
    }

    #[test]
    fn append_compare_detects_mtime_drift() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("big.dat");
        std::fs::write(&source, b"v1").unwrap();
        let mtime = std::fs::metadata(&source).unwrap().modified().unwrap();
        let mtime_secs = mtime.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
        let entry = RestartEntry { file_name: "big.dat".into(), mtime: mtime_secs };
        assert!(append_compare(&entry, &source));

        std::thread::sleep(std::time::Duration::from_secs(1));
        std::fs::write(&source, b"v2-longer").unwrap();
        assert!(!append_compare(&entry, &source));
    }

    #[test]
    fn recreate_msg_writes_reconstructed_text() {
        let tmp = tempfile::tempdir().unwrap();
        let msg_path = tmp.path().join("msg");
        recreate_msg(&msg_path, "dest=ftp://host/path").unwrap();
        let text = std::fs::read_to_string(&msg_path).unwrap();
        assert!(text.contains("dest=ftp://host/path"));
    }

    #[test]
    fn remove_job_files_logs_and_removes_each_file() {
        let tmp = tempfile::tempdir().unwrap();
        let job_dir = tmp.path().join("jobdir");
        std::fs::create_dir_all(&job_dir).unwrap();
        std::fs::write(job_dir.join("a.txt"), b"12345").unwrap();
        std::fs::write(job_dir.join("b.txt"), b"12").unwrap();
        let log_path = tmp.path().join("delete_log");
        let (count, bytes) = remove_job_files(&job_dir, 1, 99, crate::binlog::DeleteReason::OtherDel, &log_path).unwrap();
        assert_eq!(count, 2);
        assert_eq!(bytes, 7);
        assert!(!job_dir.exists());
        assert!(log_path.exists());
    }
}
