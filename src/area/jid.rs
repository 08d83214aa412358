//! Job ID dictionary (JID): maps a content-hashed job id to the recipient
//! URL, file mask, priority and per-protocol options that produced it.
//! Append-only — entries are never rewritten in place, only migrated
//! wholesale during a rebuild-and-swap.

use super::AreaEntry;

pub const MAX_RECIPIENT_LENGTH: usize = 256;
pub const MAX_OPTION_LENGTH: usize = 256;

/// One JID element. `job_id` is the FNV-1a content hash produced by
/// [`crate::hash::job_id`]; it is the stable key other areas reference.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub job_id: u32,
    pub dir_id_pos: u32,
    pub file_mask_id: u32,
    pub priority: u8,
    pub local_options: String,
    pub standard_options: String,
    pub recipient: String,
}

impl JobEntry {
    pub fn new(job_id: u32, dir_id_pos: u32, file_mask_id: u32, recipient: &str) -> Self {
        JobEntry {
            job_id,
            dir_id_pos,
            file_mask_id,
            priority: 5,
            local_options: String::new(),
            standard_options: String::new(),
            recipient: recipient.to_string(),
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

impl AreaEntry for JobEntry {
    const SIZE: usize = 4 + 4 + 4 + 1 + MAX_OPTION_LENGTH + MAX_OPTION_LENGTH + MAX_RECIPIENT_LENGTH;

    fn encode(&self, out: &mut [u8]) {
        let mut off = 0;
        out[off..off + 4].copy_from_slice(&self.job_id.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.dir_id_pos.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.file_mask_id.to_le_bytes());
        off += 4;
        out[off] = self.priority;
        off += 1;
        write_fixed_str(&mut out[off..off + MAX_OPTION_LENGTH], &self.local_options);
        off += MAX_OPTION_LENGTH;
        write_fixed_str(&mut out[off..off + MAX_OPTION_LENGTH], &self.standard_options);
        off += MAX_OPTION_LENGTH;
        write_fixed_str(&mut out[off..off + MAX_RECIPIENT_LENGTH], &self.recipient);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut off = 0;
        let job_id = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let dir_id_pos = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let file_mask_id = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let priority = bytes[off];
        off += 1;
        let local_options = read_fixed_str(&bytes[off..off + MAX_OPTION_LENGTH]);
        off += MAX_OPTION_LENGTH;
        let standard_options = read_fixed_str(&bytes[off..off + MAX_OPTION_LENGTH]);
        off += MAX_OPTION_LENGTH;
        let recipient = read_fixed_str(&bytes[off..off + MAX_RECIPIENT_LENGTH]);
        JobEntry {
            job_id,
            dir_id_pos,
            file_mask_id,
            priority,
            local_options,
            standard_options,
            recipient,
        }
    }
}

/// Appends `entry` unless its `job_id` already exists, returning its index.
/// Mirrors the "append-only, content-addressed" contract: re-deriving the
/// same recipient/options/dir combination must yield the same slot.
pub fn find_or_append(entries: &mut Vec<JobEntry>, entry: JobEntry) -> usize {
    if let Some(pos) = entries.iter().position(|e| e.job_id == entry.job_id) {
        return pos;
    }
    entries.push(entry);
    entries.len() - 1
}
