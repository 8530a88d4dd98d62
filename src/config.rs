//! Typed configuration for a graph, with named presets and TOML loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// fsync after every commit.
    Full,
    /// fsync on a timer / page-count threshold.
    Normal,
    /// Batch concurrent committers' fsyncs (see `db::group_commit`).
    GroupCommit,
    /// No fsync at all. For benchmarks and throwaway graphs only.
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub page_size: usize,
    pub buffer_pool_frames: usize,
    pub wal_sync_mode: SyncMode,
    pub group_commit_window_ms: u64,
    pub checkpoint_threshold_bytes: u64,
    pub dictionary_initial_pool_bytes: usize,
    pub chunk_records_per_chunk: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 64 * 1024,
            buffer_pool_frames: 2048,
            wal_sync_mode: SyncMode::Full,
            group_commit_window_ms: 1,
            checkpoint_threshold_bytes: 64 * 1024 * 1024,
            dictionary_initial_pool_bytes: 64 * 1024,
            chunk_records_per_chunk: 0, // 0 => derive from page_size and record size
        }
    }
}

impl Config {
    /// Maximum safety: fsync every commit, small buffer pool.
    pub fn production() -> Self {
        Self {
            wal_sync_mode: SyncMode::Full,
            buffer_pool_frames: 4096,
            ..Self::default()
        }
    }

    /// Group-commit batching, larger buffer pool; the default trade-off
    /// for multi-writer workloads.
    pub fn balanced() -> Self {
        Self {
            wal_sync_mode: SyncMode::GroupCommit,
            group_commit_window_ms: 4,
            buffer_pool_frames: 8192,
            ..Self::default()
        }
    }

    /// No fsync. Benchmarks and scratch graphs only — never durable.
    pub fn benchmark() -> Self {
        Self {
            wal_sync_mode: SyncMode::Off,
            buffer_pool_frames: 16384,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| GraphError::InvalidArgument(format!("invalid config at {path:?}: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| GraphError::InvalidArgument(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Default location consulted by the CLI when `--config` is omitted.
    pub fn default_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|d| d.join("poseidon").join("config.toml"))
    }
}
