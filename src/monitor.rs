//! Monitor fabric (C7): MSA counters plus the line-based TCP client that
//! polls a remote AFD's `afdd`. The connect/read/write-timeout pattern is
//! grounded on `transfer/session.rs::create_tcp_connection`, generalized
//! from an SSH handshake to a plain line protocol.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::TransferError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

pub const SYS_LOG_RING_LEN: usize = 64;
pub const LOG_HISTORY_LEN: usize = 360;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unknown,
    Off,
    StartingUp,
    Running,
    ShuttingDown,
}

impl ProcState {
    fn from_code(n: i32) -> Self {
        match n {
            0 => ProcState::Off,
            1 => ProcState::StartingUp,
            2 => ProcState::Running,
            3 => ProcState::ShuttingDown,
            _ => ProcState::Unknown,
        }
    }
}

/// One MSA element: a monitored remote AFD's live status, rebuilt from the
/// framed lines returned by its `afdd`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAfdStatus {
    pub afd_alias: String,
    pub amg_state: ProcState,
    pub fd_state: ProcState,
    pub archive_watch_state: ProcState,
    pub sys_log_errors: i64,
    pub sys_log_ring: Vec<char>,
    pub receive_history: Vec<u8>,
    pub sys_history: Vec<u8>,
    pub trans_history: Vec<u8>,
    pub error_history: Vec<(usize, Vec<i64>)>,
    pub job_list: Vec<JobListEntry>,
    pub max_connections: i64,
    pub connect_status: ConnectState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobListEntry {
    pub index: usize,
    pub job_id: u32,
    pub dir_id: u32,
    pub file_counter: u32,
    pub priority: u8,
    pub recipient: String,
}

impl RemoteAfdStatus {
    pub fn new(afd_alias: &str) -> Self {
        RemoteAfdStatus {
            afd_alias: afd_alias.to_string(),
            amg_state: ProcState::Unknown,
            fd_state: ProcState::Unknown,
            archive_watch_state: ProcState::Unknown,
            sys_log_errors: 0,
            sys_log_ring: vec!['\0'; SYS_LOG_RING_LEN],
            receive_history: vec![0; LOG_HISTORY_LEN],
            sys_history: vec![0; LOG_HISTORY_LEN],
            trans_history: vec![0; LOG_HISTORY_LEN],
            error_history: Vec::new(),
            job_list: Vec::new(),
            max_connections: 0,
            connect_status: ConnectState::Disconnected,
        }
    }
}

fn connect_with_timeout(addr: &str) -> Result<TcpStream, TransferError> {
    let mut addrs = addr
        .to_socket_addrs()
        .map_err(|e| TransferError::PeerRefused(format!("{addr}: {e}")))?;
    let sock = addrs
        .next()
        .ok_or_else(|| TransferError::PeerRefused(addr.to_string()))?;
    let stream = TcpStream::connect_timeout(&sock, CONNECT_TIMEOUT)
        .map_err(|e| TransferError::PeerTimeout(format!("{addr}: {e}")))?;
    let _ = stream.set_read_timeout(Some(IO_TIMEOUT));
    let _ = stream.set_write_timeout(Some(IO_TIMEOUT));
    Ok(stream)
}

/// One tick's raw reply lines from `afdd`, parsed by [`apply_reply_lines`].
/// Kept as plain strings rather than a richer type since the wire grammar
/// is a flat list of tagged lines (§6's "every reply line is `XX <args>`").
pub fn request_update(addr: &str, alias: &str) -> Result<Vec<String>, TransferError> {
    let stream = connect_with_timeout(addr)?;
    let mut writer = stream.try_clone().map_err(|e| TransferError::PeerProtocol(e.to_string()))?;
    writer
        .write_all(format!("AFDD {alias}\r\n").as_bytes())
        .map_err(|e| TransferError::PeerProtocol(e.to_string()))?;

    let reader = BufReader::new(stream);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| TransferError::PeerProtocol(e.to_string()))?;
        let done = line.trim_end() == "." || line.ends_with(".\r") || line.trim_end_matches('\r') == ".";
        if !line.is_empty() {
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        if done {
            break;
        }
    }
    Ok(lines)
}

/// Folds one tick's framed lines into `status`, tag by tag. Unknown tags
/// are ignored (forward compatible with lines this client doesn't parse).
pub fn apply_reply_lines(status: &mut RemoteAfdStatus, lines: &[String]) {
    for line in lines {
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else { continue };
        let rest: Vec<&str> = parts.collect();
        match tag {
            "AM" => status.amg_state = rest.first().and_then(|s| s.parse().ok()).map(ProcState::from_code).unwrap_or(ProcState::Unknown),
            "FD" => status.fd_state = rest.first().and_then(|s| s.parse().ok()).map(ProcState::from_code).unwrap_or(ProcState::Unknown),
            "AW" => status.archive_watch_state = rest.first().and_then(|s| s.parse().ok()).map(ProcState::from_code).unwrap_or(ProcState::Unknown),
            "SR" => {
                if let Some(ec) = rest.first().and_then(|s| s.parse::<i64>().ok()) {
                    status.sys_log_errors = ec;
                }
                if let Some(ring) = rest.get(1) {
                    status.sys_log_ring = ring.chars().collect();
                }
            }
            "RH" => status.receive_history = parse_u8_history(&rest),
            "SH" => status.sys_history = parse_u8_history(&rest),
            "TH" => status.trans_history = parse_u8_history(&rest),
            "EL" => {
                if let Some((&idx_str, vals)) = rest.split_first() {
                    if let Ok(idx) = idx_str.parse::<usize>() {
                        let values: Vec<i64> = vals.iter().filter_map(|v| v.parse().ok()).collect();
                        if let Some(slot) = status.error_history.iter_mut().find(|(i, _)| *i == idx) {
                            slot.1 = values;
                        } else {
                            status.error_history.push((idx, values));
                        }
                    }
                }
            }
            "JL" => {
                if rest.len() >= 5 {
                    if let (Ok(index), Ok(job_id), Ok(dir_id), Ok(file_counter), Ok(priority)) = (
                        rest[0].parse::<usize>(),
                        u32::from_str_radix(rest[1], 16),
                        u32::from_str_radix(rest[2], 16),
                        rest[3].parse::<u32>(),
                        rest[4].parse::<u8>(),
                    ) {
                        let recipient = rest.get(5).map(|s| s.to_string()).unwrap_or_default();
                        status.job_list.push(JobListEntry { index, job_id, dir_id, file_counter, priority, recipient });
                    }
                }
            }
            "MC" => {
                if let Some(n) = rest.first().and_then(|s| s.parse().ok()) {
                    status.max_connections = n;
                }
            }
            _ => {}
        }
    }
}

fn parse_u8_history(rest: &[&str]) -> Vec<u8> {
    rest.iter().filter_map(|v| v.parse::<u8>().ok()).collect()
}

/// One polling tick: connect, request, apply, update connect-state LED.
/// Failure leaves `status.connect_status = Error` and the prior history
/// data untouched, matching the "partial/stale is better than blank"
/// behavior of a LED viewer.
pub fn poll_once(status: &mut RemoteAfdStatus, addr: &str) -> Result<(), TransferError> {
    status.connect_status = ConnectState::Connecting;
    match request_update(addr, &status.afd_alias) {
        Ok(lines) => {
            status.job_list.clear();
            apply_reply_lines(status, &lines);
            status.connect_status = ConnectState::Connected;
            Ok(())
        }
        Err(e) => {
            status.connect_status = ConnectState::Error;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_reply_lines_parses_process_states() {
        let mut status = RemoteAfdStatus::new("remote1");
        let lines = vec!["AM 2".to_string(), "FD 2".to_string(), "AW 0".to_string()];
        apply_reply_lines(&mut status, &lines);
        assert_eq!(status.amg_state, ProcState::Running);
        assert_eq!(status.fd_state, ProcState::Running);
        assert_eq!(status.archive_watch_state, ProcState::Off);
    }

    #[test]
    fn apply_reply_lines_parses_sys_log_counter_and_ring() {
        let mut status = RemoteAfdStatus::new("remote1");
        let lines = vec!["SR 42 IIEWF".to_string()];
        apply_reply_lines(&mut status, &lines);
        assert_eq!(status.sys_log_errors, 42);
        assert_eq!(status.sys_log_ring, vec!['I', 'I', 'E', 'W', 'F']);
    }

    #[test]
    fn apply_reply_lines_parses_job_list_entry() {
        let mut status = RemoteAfdStatus::new("remote1");
        let lines = vec!["JL 0 1a2b 3c4d 7 3 host2".to_string()];
        apply_reply_lines(&mut status, &lines);
        assert_eq!(status.job_list.len(), 1);
        assert_eq!(status.job_list[0].job_id, 0x1a2b);
        assert_eq!(status.job_list[0].dir_id, 0x3c4d);
        assert_eq!(status.job_list[0].recipient, "host2");
    }

    #[test]
    fn apply_reply_lines_parses_max_connections() {
        let mut status = RemoteAfdStatus::new("remote1");
        apply_reply_lines(&mut status, &["MC 10".to_string()]);
        assert_eq!(status.max_connections, 10);
    }

    #[test]
    fn apply_reply_lines_updates_error_history_slot_in_place() {
        let mut status = RemoteAfdStatus::new("remote1");
        apply_reply_lines(&mut status, &["EL 2 0 1 0 0 0".to_string()]);
        apply_reply_lines(&mut status, &["EL 2 3 1 0 0 0".to_string()]);
        assert_eq!(status.error_history.len(), 1);
        assert_eq!(status.error_history[0].1[0], 3);
    }

    #[test]
    fn connect_with_timeout_reports_peer_refused_for_unresolvable_host() {
        let result = connect_with_timeout("no-such-host.invalid:9999");
        assert!(result.is_err());
    }
}
