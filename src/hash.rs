//! Content-addressing for job ids and other hex-keyed dictionary entries.
//!
//! The historical format derives `job_id` from a hash of recipient, options
//! and directory; any stable 32-bit hash satisfies the contract ("collisions
//! are treated as identity"). FNV-1a is used here rather than a crate
//! dependency since the rest of this corpus reaches for a crate only when
//! the logic genuinely isn't a few lines (see `wildcard_match`).

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Derive a job id from the fields that define a distinct job: recipient
/// url, the standard-option blob, and the owning directory id.
pub fn job_id(recipient: &str, options: &str, dir_id: u32) -> u32 {
    let mut buf = Vec::with_capacity(recipient.len() + options.len() + 4);
    buf.extend_from_slice(recipient.as_bytes());
    buf.extend_from_slice(options.as_bytes());
    buf.extend_from_slice(&dir_id.to_le_bytes());
    fnv1a_32(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_stable_and_collision_is_identity() {
        let a = job_id("ftp://host/path", "opt=1", 7);
        let b = job_id("ftp://host/path", "opt=1", 7);
        assert_eq!(a, b);
    }

    #[test]
    fn job_id_differs_for_different_recipients() {
        let a = job_id("ftp://host/path", "opt=1", 7);
        let b = job_id("ftp://other/path", "opt=1", 7);
        assert_ne!(a, b);
    }
}
