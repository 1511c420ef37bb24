//! `ArchiveConfig` (§6 "Configuration"): the operator-facing knobs for
//! everything wired in [`crate::wiring`]. Follows the teacher's
//! `config.json`-relative-to-`home_dir` convention (`nearcore::config`):
//! `load_config` reads `<db_root>/<config_path>` if it exists and falls
//! back to defaults otherwise, rather than failing outright, so a fresh
//! `db-root` can be pointed at with no prior setup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default name of the config file inside `db_root`, mirroring the
/// teacher's `config.json` constant.
pub const CONFIG_FILENAME: &str = "archive_config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Masterchain-seqno stride between successive permanent archive
    /// slices (§3 "Archive catalog").
    pub archive_size: u32,
    /// Masterchain-seqno stride between successive key-block slices.
    pub key_archive_size: u32,
    /// Seconds a temp slice's hour bucket may lag "now" before `run_gc`
    /// retires it, unless it is the newest bucket (§3 Lifecycle).
    pub temp_ttl: u32,
    /// Seconds a permanent slice's masterchain timestamp may lag "now"
    /// before `run_gc` retires it, unless it is the newest slice.
    pub archive_ttl: u32,
    /// BoC-compression depth cutoff passed to the cell store
    /// (`CellStoreConfig::boc_depth_cutoff`, §4.2 SUPPLEMENT).
    pub celldb_compress_depth: u16,
    /// Cell-migration background-pass batch size.
    pub celldb_migration_batch_size: usize,
    /// Default lite-query deadline, in seconds (§4.9/§5, default ~10s).
    pub query_deadline_secs: u64,
    /// Response-cache capacity for `archive-liteserver`.
    pub response_cache_capacity: usize,
    /// Recent-message dedup capacity for `send_message`.
    pub recent_messages_capacity: usize,
    /// Upper bound on items walked by an enumerate-the-whole-dictionary
    /// query flow before truncating.
    pub max_enumerated_entries: usize,
    /// Worker thread count for the tokio runtime, mirroring the daemon's
    /// `--threads`/thread-count contract in §6.
    pub threads: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            archive_size: 100_000,
            key_archive_size: 20_000_000,
            temp_ttl: 3600,
            archive_ttl: 60 * 60 * 24 * 14,
            celldb_compress_depth: 8,
            celldb_migration_batch_size: 64,
            query_deadline_secs: 10,
            response_cache_capacity: 4096,
            recent_messages_capacity: 4096,
            max_enumerated_entries: 4096,
            threads: num_cpus(),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config at {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("failed to write config at {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

impl ArchiveConfig {
    /// Resolves `config_path` relative to `db_root` (an absolute
    /// `config_path` is used as-is), reading it if present. Absence is not
    /// an error: a fresh `db_root` gets an in-memory default, matching the
    /// teacher's "most fields are optional" posture for `config.json`.
    pub fn load(db_root: &Path, config_path: &Path) -> Result<ArchiveConfig, ConfigError> {
        let resolved = if config_path.is_absolute() { config_path.to_path_buf() } else { db_root.join(config_path) };
        if !resolved.exists() {
            return Ok(ArchiveConfig::default());
        }
        let bytes = fs::read_to_string(&resolved).map_err(|source| ConfigError::Read { path: resolved.clone(), source })?;
        serde_json::from_str(&bytes).map_err(|source| ConfigError::Parse { path: resolved, source })
    }

    /// Writes the default config to `db_root/config_path`, for an `init`
    /// command that wants a config file an operator can edit in place.
    pub fn write_default(db_root: &Path, config_path: &Path) -> Result<(), ConfigError> {
        let resolved = if config_path.is_absolute() { config_path.to_path_buf() } else { db_root.join(config_path) };
        let json = serde_json::to_string_pretty(&ArchiveConfig::default()).expect("default config always serializes");
        fs::write(&resolved, json).map_err(|source| ConfigError::Write { path: resolved, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ArchiveConfig::load(dir.path(), Path::new(CONFIG_FILENAME)).unwrap();
        assert_eq!(config.archive_size, ArchiveConfig::default().archive_size);
    }

    #[test]
    fn write_default_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        ArchiveConfig::write_default(dir.path(), Path::new(CONFIG_FILENAME)).unwrap();
        let mut config = ArchiveConfig::load(dir.path(), Path::new(CONFIG_FILENAME)).unwrap();
        config.archive_ttl = 7;
        let json = serde_json::to_string_pretty(&config).unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), json).unwrap();
        let reloaded = ArchiveConfig::load(dir.path(), Path::new(CONFIG_FILENAME)).unwrap();
        assert_eq!(reloaded.archive_ttl, 7);
    }
}
