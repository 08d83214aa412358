//! `TYPESIZE_DATA`: a recorded profile of the primitive widths and size
//! limits a set of mapped areas was built with. Grounded on
//! `common/typesize_data.c`'s `check_typesize_data`/`write_typesize_data`
//! pair — here the "primitive width" question collapses to "which crate
//! version laid out these `#[repr(C)]` records", so the profile is a plain
//! versioned struct rather than a table of `sizeof()` results.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AreaError;

pub const TYPESIZE_FILE: &str = "TYPESIZE_DATA";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TypesizeProfile {
    pub off_t_bits: u8,
    pub time_t_bits: u8,
    pub pid_t_bits: u8,
    pub max_hostname_length: u32,
    pub max_user_name_length: u32,
    pub max_path_length: u32,
    pub layout_version: u32,
}

impl TypesizeProfile {
    /// The profile produced by the crate currently running.
    pub fn current() -> Self {
        TypesizeProfile {
            off_t_bits: 64,
            time_t_bits: 64,
            pid_t_bits: 32,
            max_hostname_length: 64,
            max_user_name_length: 32,
            max_path_length: 1024,
            layout_version: 1,
        }
    }
}

/// Stamp a fresh profile, as an installer would on first setup.
pub fn write_typesize_data(fifodir: &Path) -> std::io::Result<()> {
    let profile = TypesizeProfile::current();
    let text = serde_json::to_string_pretty(&profile).expect("profile serializes");
    std::fs::write(fifodir.join(TYPESIZE_FILE), text)
}

/// Compare the on-disk profile against the running crate's; refuses to
/// proceed on mismatch (stronger than the original's warn-and-continue,
/// since there is no compatible fallback layout to interpret bytes with).
pub fn check_typesize_data(fifodir: &Path) -> Result<(), AreaError> {
    let path = fifodir.join(TYPESIZE_FILE);
    if !path.exists() {
        write_typesize_data(fifodir).map_err(|e| AreaError::TypesizeMismatch(e.to_string()))?;
        return Ok(());
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| AreaError::TypesizeMismatch(format!("reading {}: {e}", path.display())))?;
    let on_disk: TypesizeProfile = serde_json::from_str(&text)
        .map_err(|e| AreaError::TypesizeMismatch(format!("parsing {}: {e}", path.display())))?;
    let current = TypesizeProfile::current();
    if on_disk != current {
        return Err(AreaError::TypesizeMismatch(format!(
            "on-disk profile {on_disk:?} does not match running profile {current:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_directory_self_stamps_and_passes() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(check_typesize_data(tmp.path()).is_ok());
        assert!(tmp.path().join(TYPESIZE_FILE).exists());
    }

    #[test]
    fn mismatched_profile_refuses_attach() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mutated = TypesizeProfile::current();
        mutated.off_t_bits = 32;
        std::fs::write(
            tmp.path().join(TYPESIZE_FILE),
            serde_json::to_string_pretty(&mutated).unwrap(),
        )
        .unwrap();
        let err = check_typesize_data(tmp.path()).unwrap_err();
        assert!(matches!(err, AreaError::TypesizeMismatch(_)));
    }
}
