//! Password store: obfuscated (not encrypted — see §1 non-goals) per-host
//! credentials keyed by `user@host`.

/// Growth increment used when the password book needs more capacity than
/// its current allocation — mirrors the inherited step-allocation idiom
/// used across the other dictionary areas.
pub const PWB_STEP_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct PasswordEntry {
    pub uh_name: String,
    pub obfuscated: Vec<u8>,
}

pub fn uh_name(user: &str, host: &str) -> String {
    format!("{user}@{host}")
}

/// `stored[i] = plaintext[i] - (i is odd ? 11 : 24) + i`, performed on raw
/// bytes with wrapping arithmetic so any byte value round-trips.
pub fn obfuscate(plaintext: &str) -> Vec<u8> {
    plaintext
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let shift: u8 = if i % 2 == 1 { 11 } else { 24 };
            b.wrapping_sub(shift).wrapping_add(i as u8)
        })
        .collect()
}

/// Inverse of [`obfuscate`]: `plaintext[i] = stored[i] + shift - i`.
pub fn deobfuscate(stored: &[u8]) -> String {
    let bytes: Vec<u8> = stored
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            let shift: u8 = if i % 2 == 1 { 11 } else { 24 };
            b.wrapping_sub(i as u8).wrapping_add(shift)
        })
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[derive(Debug, Clone, Default)]
pub struct PasswordBook {
    entries: Vec<PasswordEntry>,
}

impl PasswordBook {
    pub fn new() -> Self {
        PasswordBook { entries: Vec::with_capacity(PWB_STEP_SIZE) }
    }

    pub fn set(&mut self, user: &str, host: &str, plaintext: &str) {
        let key = uh_name(user, host);
        let obfuscated = obfuscate(plaintext);
        if let Some(e) = self.entries.iter_mut().find(|e| e.uh_name == key) {
            e.obfuscated = obfuscated;
        } else {
            if self.entries.len() == self.entries.capacity() {
                self.entries.reserve(PWB_STEP_SIZE);
            }
            self.entries.push(PasswordEntry { uh_name: key, obfuscated });
        }
    }

    pub fn get(&self, user: &str, host: &str) -> Option<String> {
        let key = uh_name(user, host);
        self.entries
            .iter()
            .find(|e| e.uh_name == key)
            .map(|e| deobfuscate(&e.obfuscated))
    }

    pub fn remove(&mut self, user: &str, host: &str) -> bool {
        let key = uh_name(user, host);
        let before = self.entries.len();
        self.entries.retain(|e| e.uh_name != key);
        self.entries.len() != before
    }

    pub fn entries(&self) -> &[PasswordEntry] {
        &self.entries
    }

    /// Flat on-disk encoding: `u32 count`, then per entry `u32 name_len` +
    /// name bytes + `u32 obf_len` + obfuscated bytes — the same
    /// count-prefixed-variable-record shape as `filemask::encode_groups`.
    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            let name_bytes = e.uh_name.as_bytes();
            out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(name_bytes);
            out.extend_from_slice(&(e.obfuscated.len() as u32).to_le_bytes());
            out.extend_from_slice(&e.obfuscated);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, out)
    }

    pub fn load(path: &std::path::Path) -> std::io::Result<Self> {
        if !path.exists() {
            return Ok(PasswordBook::new());
        }
        let bytes = std::fs::read(path)?;
        let mut book = PasswordBook::new();
        if bytes.len() < 4 {
            return Ok(book);
        }
        let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let mut off = 4;
        for _ in 0..count {
            if off + 4 > bytes.len() {
                break;
            }
            let name_len = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as usize;
            off += 4;
            if off + name_len > bytes.len() {
                break;
            }
            let uh_name = String::from_utf8_lossy(&bytes[off..off + name_len]).into_owned();
            off += name_len;
            if off + 4 > bytes.len() {
                break;
            }
            let obf_len = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as usize;
            off += 4;
            if off + obf_len > bytes.len() {
                break;
            }
            let obfuscated = bytes[off..off + obf_len].to_vec();
            off += obf_len;
            book.entries.push(PasswordEntry { uh_name, obfuscated });
        }
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obfuscate_round_trips_for_arbitrary_text() {
        let plaintext = "hunter2!Complex_Pass";
        let stored = obfuscate(plaintext);
        assert_ne!(String::from_utf8_lossy(&stored), plaintext);
        assert_eq!(deobfuscate(&stored), plaintext);
    }

    #[test]
    fn password_book_save_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pwb_data");
        let mut book = PasswordBook::new();
        book.set("afd", "host1", "s3cret");
        book.set("afd", "host2", "other");
        book.save(&path).unwrap();
        let loaded = PasswordBook::load(&path).unwrap();
        assert_eq!(loaded.get("afd", "host1").as_deref(), Some("s3cret"));
        assert_eq!(loaded.get("afd", "host2").as_deref(), Some("other"));
    }

    #[test]
    fn password_book_set_get_remove() {
        let mut book = PasswordBook::new();
        book.set("afd", "host1", "secret");
        assert_eq!(book.get("afd", "host1").as_deref(), Some("secret"));
        book.set("afd", "host1", "updated");
        assert_eq!(book.get("afd", "host1").as_deref(), Some("updated"));
        assert!(book.remove("afd", "host1"));
        assert_eq!(book.get("afd", "host1"), None);
    }
}
