//! File-mask dictionary: one record per job holding the glob patterns used
//! to select which files in a directory belong to it. Records are packed
//! as `[no_of_mask_ids][padding][fml_record]*` rather than fixed-size
//! [`super::AreaEntry`] slots, since the pattern list itself is variable
//! length — the count prefix is what lets a reader walk the buffer.

use regex::Regex;

/// One file-mask group: the patterns that together decide whether a given
/// file name belongs to `file_mask_id`'s job.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMaskGroup {
    pub file_mask_id: u32,
    pub masks: Vec<String>,
}

/// Packs `groups` as a flat buffer: `u32 group_count`, then per group
/// `u32 file_mask_id`, `u32 no_of_mask_ids`, `u32 padding`, then each mask
/// as `u32 len` + bytes.
pub fn encode_groups(groups: &[FileMaskGroup]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(groups.len() as u32).to_le_bytes());
    for g in groups {
        out.extend_from_slice(&g.file_mask_id.to_le_bytes());
        out.extend_from_slice(&(g.masks.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        for m in &g.masks {
            let bytes = m.as_bytes();
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
    }
    out
}

/// Inverse of [`encode_groups`]. Truncates silently on a malformed tail
/// rather than panicking — a torn write during a crash should degrade to
/// "fewer groups recovered", not a decode panic.
pub fn decode_groups(bytes: &[u8]) -> Vec<FileMaskGroup> {
    let mut groups = Vec::new();
    if bytes.len() < 4 {
        return groups;
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut off = 4;
    for _ in 0..count {
        if off + 12 > bytes.len() {
            break;
        }
        let file_mask_id = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        let no_of_masks = u32::from_le_bytes(bytes[off + 4..off + 8].try_into().unwrap()) as usize;
        off += 12;
        let mut masks = Vec::with_capacity(no_of_masks);
        for _ in 0..no_of_masks {
            if off + 4 > bytes.len() {
                break;
            }
            let len = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as usize;
            off += 4;
            if off + len > bytes.len() {
                break;
            }
            masks.push(String::from_utf8_lossy(&bytes[off..off + len]).into_owned());
            off += len;
        }
        groups.push(FileMaskGroup { file_mask_id, masks });
    }
    groups
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Walks `masks` in order: the first non-negated pattern to match wins
/// (the file is selected), the first `!pattern` to match short-circuits
/// with "skip", and a list exhausted without any match also means "skip".
/// Order-dependent, matching §4.5 point 2 exactly rather than the
/// order-independent "negation always wins" reading.
pub fn matches(masks: &[String], filename: &str) -> bool {
    for mask in masks {
        let (negated, pattern) = match mask.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, mask.as_str()),
        };
        if let Some(re) = glob_to_regex(pattern) {
            if re.is_match(filename) {
                return !negated;
            }
        }
    }
    false
}
