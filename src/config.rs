use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Current on-disk config schema version; bumped whenever a field is added
/// or a default changes meaning. Older files are migrated in [`AfdConfig::load`].
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Process-wide configuration, equivalent in spirit to `etc/AFD_CONFIG`:
/// a handful of `KEY_DEF value` knobs plus the work-directory root every
/// other module resolves its paths relative to.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AfdConfig {
    pub work_dir: PathBuf,
    /// seconds between AMG's rescans of DIR_CONFIG for changes.
    #[serde(alias = "stat_interval_secs")]
    pub stat_interval_secs: u64,
    /// seconds to sleep between retries while a staging target is ENOSPC.
    pub disk_full_rescan_secs: u64,
    /// default per-host retry interval, seconds.
    pub default_retry_interval_secs: u64,
    /// default max_errors before a host is rendered "erroneous".
    pub default_max_errors: u32,
    /// default allowed parallel transfers per host.
    pub default_allowed_transfers: u32,
    /// age (seconds) after which an un-retrieved stuck file triggers a warning.
    pub old_file_time_secs: u64,
    pub version: u32,
    #[serde(skip)]
    pub mode: u8,
}

impl Default for AfdConfig {
    fn default() -> Self {
        AfdConfig {
            work_dir: PathBuf::from("."),
            stat_interval_secs: 5,
            disk_full_rescan_secs: 10,
            default_retry_interval_secs: 120,
            default_max_errors: 10,
            default_allowed_transfers: 1,
            old_file_time_secs: 24 * 3600,
            version: CURRENT_CONFIG_VERSION,
            mode: 0,
        }
    }
}

impl AfdConfig {
    /// Resolve a work directory (creating `fifodir`/`files`/`archive` skeletons
    /// if absent) and load or initialize `config.json` under it, exactly the
    /// way a first-run admin tool would seed a fresh install.
    pub fn init(work_dir: &Path, mode: u8) -> anyhow::Result<Self> {
        std::fs::create_dir_all(work_dir)?;
        for sub in ["fifodir", "files/incoming", "files/outgoing", "archive", "etc", "log"] {
            std::fs::create_dir_all(work_dir.join(sub))?;
        }
        let config_path = Self::config_path(work_dir, mode);
        let mut cfg = if config_path.exists() {
            Self::read_from(&config_path)?
        } else {
            let cfg = AfdConfig { work_dir: work_dir.to_path_buf(), ..AfdConfig::default() };
            cfg.save_to(&config_path)?;
            cfg
        };
        cfg.mode = mode;
        cfg.work_dir = work_dir.to_path_buf();
        cfg.migrate_if_needed(&config_path)?;
        Ok(cfg)
    }

    fn config_path(work_dir: &Path, mode: u8) -> PathBuf {
        if mode == 1 { work_dir.join("etc/config_test.json") } else { work_dir.join("etc/config.json") }
    }

    fn read_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn save_to_storage(&self) -> anyhow::Result<()> {
        let path = Self::config_path(&self.work_dir, self.mode);
        self.save_to(&path)
    }

    /// Additive migration: a version-0 file predates `default_allowed_transfers`;
    /// fill it in and bump the version, same shape as the area converters in C1.
    fn migrate_if_needed(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.version < CURRENT_CONFIG_VERSION {
            if self.default_allowed_transfers == 0 {
                self.default_allowed_transfers = AfdConfig::default().default_allowed_transfers;
            }
            self.version = CURRENT_CONFIG_VERSION;
            self.save_to(path)?;
        }
        Ok(())
    }

    pub fn fifodir(&self) -> PathBuf {
        self.work_dir.join("fifodir")
    }

    pub fn incoming_dir(&self) -> PathBuf {
        self.work_dir.join("files/incoming")
    }

    pub fn outgoing_dir(&self) -> PathBuf {
        self.work_dir.join("files/outgoing")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.work_dir.join("archive")
    }

    pub fn msg_dir(&self) -> PathBuf {
        self.work_dir.join("files/msg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_seeds_default_config_and_directory_skeleton() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = AfdConfig::init(tmp.path(), 0).unwrap();
        assert!(tmp.path().join("fifodir").is_dir());
        assert!(tmp.path().join("etc/config.json").is_file());
        assert_eq!(cfg.default_max_errors, 10);
    }

    #[test]
    fn reinit_reuses_saved_config() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = AfdConfig::init(tmp.path(), 0).unwrap();
        cfg.default_max_errors = 42;
        cfg.save_to_storage().unwrap();
        let reloaded = AfdConfig::init(tmp.path(), 0).unwrap();
        assert_eq!(reloaded.default_max_errors, 42);
    }
}
