//! Checkpoint storage configuration.

use std::path::PathBuf;

/// Where checkpoint files live.
#[derive(Debug, Clone, Default)]
pub struct CheckpointConfig {
    /// Directory holding one file per checkpoint key.
    ///
    /// If `None`, [`default_checkpoint_dir`] is used.
    pub dir: Option<PathBuf>,
}

impl CheckpointConfig {
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// The configured directory or the default one.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_checkpoint_dir)
    }
}

/// Default checkpoint directory: `<system temp dir>/search-sync/checkpoints`.
pub fn default_checkpoint_dir() -> PathBuf {
    std::env::temp_dir().join("search-sync").join("checkpoints")
}
