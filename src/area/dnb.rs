//! Directory Name Buffer (DNB): the append-only dictionary mapping a
//! directory id to its original (as configured) and normalized on-disk
//! names. Referenced by [`super::jid::JobEntry::dir_id_pos`].

use super::AreaEntry;

pub const MAX_DIR_NAME_LENGTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct DirNameEntry {
    pub dir_id: u32,
    pub orig_dir_name: String,
    pub dir_name: String,
}

impl DirNameEntry {
    pub fn new(dir_id: u32, orig_dir_name: &str, dir_name: &str) -> Self {
        DirNameEntry {
            dir_id,
            orig_dir_name: orig_dir_name.to_string(),
            dir_name: dir_name.to_string(),
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

impl AreaEntry for DirNameEntry {
    const SIZE: usize = 4 + MAX_DIR_NAME_LENGTH + MAX_DIR_NAME_LENGTH;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.dir_id.to_le_bytes());
        write_fixed_str(&mut out[4..4 + MAX_DIR_NAME_LENGTH], &self.orig_dir_name);
        write_fixed_str(
            &mut out[4 + MAX_DIR_NAME_LENGTH..4 + 2 * MAX_DIR_NAME_LENGTH],
            &self.dir_name,
        );
    }

    fn decode(bytes: &[u8]) -> Self {
        let dir_id = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let orig_dir_name = read_fixed_str(&bytes[4..4 + MAX_DIR_NAME_LENGTH]);
        let dir_name = read_fixed_str(&bytes[4 + MAX_DIR_NAME_LENGTH..4 + 2 * MAX_DIR_NAME_LENGTH]);
        DirNameEntry { dir_id, orig_dir_name, dir_name }
    }
}

/// Appends `entry` unless `dir_name` is already registered, returning its
/// dir_id either way (the existing one on a hit, the new one on a miss).
pub fn find_or_append(entries: &mut Vec<DirNameEntry>, orig_dir_name: &str, dir_name: &str, next_id: impl FnOnce() -> u32) -> u32 {
    if let Some(existing) = entries.iter().find(|e| e.dir_name == dir_name) {
        return existing.dir_id;
    }
    let dir_id = next_id();
    entries.push(DirNameEntry::new(dir_id, orig_dir_name, dir_name));
    dir_id
}
