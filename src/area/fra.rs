//! Directory-status table (C4): per-watched-directory configuration, live
//! counters, and the cron-style retrieval time window.

use super::AreaEntry;

pub const MAX_DIR_ALIAS_LENGTH: usize = 64;
pub const MAX_URL_LENGTH: usize = 256;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirFlags: u16 {
        const MAX_COPIED          = 1 << 0;
        const FILES_IN_QUEUE      = 1 << 1;
        const ADD_TIME_ENTRY      = 1 << 2;
        const LINK_NO_EXEC        = 1 << 3;
        const DIR_DISABLED        = 1 << 4;
        const ACCEPT_DOT_FILES    = 1 << 5;
        const DONT_GET_DIR_LIST   = 1 << 6;
        const DIR_ERROR_SET       = 1 << 7;
        const WARN_TIME_REACHED   = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    Normal,
    Scanning,
    Disabled,
    Error,
}

impl DirStatus {
    fn to_u8(self) -> u8 {
        match self {
            DirStatus::Normal => 0,
            DirStatus::Scanning => 1,
            DirStatus::Disabled => 2,
            DirStatus::Error => 3,
        }
    }
    fn from_u8(v: u8) -> Self {
        match v {
            1 => DirStatus::Scanning,
            2 => DirStatus::Disabled,
            3 => DirStatus::Error,
            _ => DirStatus::Normal,
        }
    }
}

/// Cron-style window bitmask for when retrieval is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BdTimeEntry {
    pub minute: u64,
    pub hour: u32,
    pub day_of_month: u32,
    pub month: u16,
    pub day_of_week: u8,
}

impl BdTimeEntry {
    pub fn every_minute() -> Self {
        BdTimeEntry {
            minute: u64::MAX,
            hour: u32::MAX,
            day_of_month: u32::MAX,
            month: u16::MAX,
            day_of_week: 0x7F,
        }
    }
}

/// Returns the next epoch-second timestamp strictly after `from_epoch_secs`
/// that matches every field of `te`, scanning forward minute by minute.
pub fn calc_next_time(te: &BdTimeEntry, from_epoch_secs: i64) -> Option<i64> {
    use chrono::{Datelike, Duration, Local, TimeZone, Timelike};
    let start = Local.timestamp_opt(from_epoch_secs, 0).single()?;
    let candidate = start + Duration::minutes(1);
    let naive = candidate
        .date_naive()
        .and_hms_opt(candidate.hour(), candidate.minute(), 0)?;
    let mut t = naive.and_local_timezone(Local).single()?;
    for _ in 0..(366 * 24 * 60) {
        let minute_ok = te.minute & (1u64 << t.minute()) != 0;
        let hour_ok = te.hour & (1u32 << t.hour()) != 0;
        let dom_ok = te.day_of_month & (1u32 << (t.day() - 1)) != 0;
        let month_ok = te.month & (1u16 << (t.month() - 1)) != 0;
        let dow = t.weekday().num_days_from_sunday();
        let dow_ok = te.day_of_week & (1u8 << dow) != 0;
        if minute_ok && hour_ok && dom_ok && month_ok && dow_ok {
            return Some(t.timestamp());
        }
        t += Duration::minutes(1);
    }
    None
}

/// One FRA element: a watched directory's config and live counters.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub alias: String,
    pub url: String,
    pub fsa_pos: i32,
    pub protocol: u8,
    pub priority: u8,
    pub age_limit_secs: u64,
    pub warn_time_secs: u64,
    pub time_window: Option<BdTimeEntry>,
    pub max_copied_files: u32,
    pub max_copied_file_size: u64,
    pub bytes_received: u64,
    pub files_received: u64,
    pub files_in_dir: u32,
    pub bytes_in_dir: u64,
    pub files_queued: u32,
    pub bytes_in_queue: u64,
    pub next_check_time: u64,
    pub last_retrieval: u64,
    pub dir_flag: DirFlags,
    pub dir_status: DirStatus,
    pub dup_check_enabled: bool,
}

impl DirEntry {
    pub fn new(alias: &str, url: &str) -> Self {
        DirEntry {
            alias: alias.to_string(),
            url: url.to_string(),
            fsa_pos: -1,
            protocol: 0,
            priority: 5,
            age_limit_secs: 0,
            warn_time_secs: 0,
            time_window: None,
            max_copied_files: 0,
            max_copied_file_size: 0,
            bytes_received: 0,
            files_received: 0,
            files_in_dir: 0,
            bytes_in_dir: 0,
            files_queued: 0,
            bytes_in_queue: 0,
            next_check_time: 0,
            last_retrieval: 0,
            dir_flag: DirFlags::empty(),
            dir_status: DirStatus::Normal,
            dup_check_enabled: false,
        }
    }

    /// Invariant 4: `files_queued <= files_in_dir`, `bytes_in_queue <=
    /// bytes_in_dir`, and `FILES_IN_QUEUE` set iff `files_queued > 0`.
    /// Self-corrects and reports whether anything changed.
    pub fn enforce_queue_invariant(&mut self) -> bool {
        let mut changed = false;
        if self.files_queued > self.files_in_dir {
            self.files_queued = self.files_in_dir;
            changed = true;
        }
        if self.bytes_in_queue > self.bytes_in_dir {
            self.bytes_in_queue = self.bytes_in_dir;
            changed = true;
        }
        let should_have_flag = self.files_queued > 0;
        let has_flag = self.dir_flag.contains(DirFlags::FILES_IN_QUEUE);
        if should_have_flag != has_flag {
            self.dir_flag.set(DirFlags::FILES_IN_QUEUE, should_have_flag);
            changed = true;
        }
        changed
    }

    /// Returns true the first time `warn_time_secs` has elapsed since the
    /// last successful retrieval and the flag was not already set — the
    /// transition §4.4 says must be emitted to `receive_log`.
    pub fn check_warn_time(&mut self, now_secs: u64) -> bool {
        if self.warn_time_secs == 0 {
            return false;
        }
        let overdue = now_secs.saturating_sub(self.last_retrieval) > self.warn_time_secs;
        let already = self.dir_flag.contains(DirFlags::WARN_TIME_REACHED);
        if overdue && !already {
            self.dir_flag.insert(DirFlags::WARN_TIME_REACHED);
            true
        } else {
            if !overdue && already {
                self.dir_flag.remove(DirFlags::WARN_TIME_REACHED);
            }
            false
        }
    }
}

fn write_fixed_str(out: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(out.len());
    out[..n].copy_from_slice(&bytes[..n]);
    for b in out[n..].iter_mut() {
        *b = 0;
    }
}

fn read_fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl AreaEntry for DirEntry {
    const SIZE: usize = MAX_DIR_ALIAS_LENGTH + MAX_URL_LENGTH + 4 + 1 + 1 + 8 + 8 + 20 + 4 + 8 * 7 + 4 + 4 + 2 + 1 + 1;

    fn encode(&self, out: &mut [u8]) {
        let mut off = 0;
        write_fixed_str(&mut out[off..off + MAX_DIR_ALIAS_LENGTH], &self.alias);
        off += MAX_DIR_ALIAS_LENGTH;
        write_fixed_str(&mut out[off..off + MAX_URL_LENGTH], &self.url);
        off += MAX_URL_LENGTH;
        out[off..off + 4].copy_from_slice(&self.fsa_pos.to_le_bytes());
        off += 4;
        out[off] = self.protocol;
        off += 1;
        out[off] = self.priority;
        off += 1;
        out[off..off + 8].copy_from_slice(&self.age_limit_secs.to_le_bytes());
        off += 8;
        out[off..off + 8].copy_from_slice(&self.warn_time_secs.to_le_bytes());
        off += 8;
        match &self.time_window {
            Some(te) => {
                out[off] = 1;
                off += 1;
                out[off..off + 8].copy_from_slice(&te.minute.to_le_bytes());
                off += 8;
                out[off..off + 4].copy_from_slice(&te.hour.to_le_bytes());
                off += 4;
                out[off..off + 4].copy_from_slice(&te.day_of_month.to_le_bytes());
                off += 4;
                out[off..off + 2].copy_from_slice(&te.month.to_le_bytes());
                off += 2;
                out[off] = te.day_of_week;
                off += 1;
            }
            None => {
                out[off] = 0;
                off += 1;
                off += 8 + 4 + 4 + 2 + 1;
            }
        }
        out[off..off + 4].copy_from_slice(&self.max_copied_files.to_le_bytes());
        off += 4;
        for v in [
            self.max_copied_file_size,
            self.bytes_received,
            self.files_received as u64,
            self.bytes_in_dir,
            self.bytes_in_queue,
            self.next_check_time,
            self.last_retrieval,
        ] {
            out[off..off + 8].copy_from_slice(&v.to_le_bytes());
            off += 8;
        }
        out[off..off + 4].copy_from_slice(&self.files_in_dir.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.files_queued.to_le_bytes());
        off += 4;
        out[off..off + 2].copy_from_slice(&self.dir_flag.bits().to_le_bytes());
        off += 2;
        out[off] = self.dir_status.to_u8();
        off += 1;
        out[off] = self.dup_check_enabled as u8;
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut off = 0;
        let alias = read_fixed_str(&bytes[off..off + MAX_DIR_ALIAS_LENGTH]);
        off += MAX_DIR_ALIAS_LENGTH;
        let url = read_fixed_str(&bytes[off..off + MAX_URL_LENGTH]);
        off += MAX_URL_LENGTH;
        let fsa_pos = i32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let protocol = bytes[off];
        off += 1;
        let priority = bytes[off];
        off += 1;
        let age_limit_secs = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let warn_time_secs = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let has_window = bytes[off] != 0;
        off += 1;
        let time_window = if has_window {
            let minute = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
            off += 8;
            let hour = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            off += 4;
            let day_of_month = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            off += 4;
            let month = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
            off += 2;
            let day_of_week = bytes[off];
            off += 1;
            Some(BdTimeEntry { minute, hour, day_of_month, month, day_of_week })
        } else {
            off += 8 + 4 + 4 + 2 + 1;
            None
        };
        let max_copied_files = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let mut vals = [0u64; 7];
        for v in vals.iter_mut() {
            *v = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
            off += 8;
        }
        let files_in_dir = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let files_queued = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let dir_flag = DirFlags::from_bits_truncate(u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap()));
        off += 2;
        let dir_status = DirStatus::from_u8(bytes[off]);
        off += 1;
        let dup_check_enabled = bytes[off] != 0;
        DirEntry {
            alias,
            url,
            fsa_pos,
            protocol,
            priority,
            age_limit_secs,
            warn_time_secs,
            time_window,
            max_copied_files,
            max_copied_file_size: vals[0],
            bytes_received: vals[1],
            files_received: vals[2],
            files_in_dir,
            bytes_in_dir: vals[3],
            files_queued,
            bytes_in_queue: vals[4],
            next_check_time: vals[5],
            last_retrieval: vals[6],
            dir_flag,
            dir_status,
            dup_check_enabled,
        }
    }
}
