//! Checkpoint manager applying the extraction failure policy.

use std::sync::Arc;

use crate::store::{CheckpointKey, CheckpointStore};

/// Manager for reading and advancing cursors with checkpoint tracking.
///
/// The `CheckpointManager` never returns an error to the extraction loop:
/// - a read failure is logged and treated as "no checkpoint"
/// - a write failure is logged and reported as `false` ("do not advance")
///
/// Extraction is safe to repeat from an old cursor because writes to the
/// search engine are upserts by document id.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::{CheckpointKey, CheckpointManager, FilesystemStore};
///
/// let manager = CheckpointManager::new(Arc::new(FilesystemStore::new("/tmp/checkpoints")));
/// let key = CheckpointKey::new("t_order", "order", "_doc");
///
/// let cursor = manager.read_cursor(&key).await; // "" on first run
/// if manager.advance(&key, "2024-01-01 10:00:00").await {
///     // cursor persisted
/// }
/// ```
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Read the cursor for a key; empty when absent or unreadable.
    pub async fn read_cursor(&self, key: &CheckpointKey) -> String {
        match self.store.read(key).await {
            Ok(Some(value)) => value,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!("Failed to read checkpoint {key}, starting from the beginning: {e:#}");
                String::new()
            }
        }
    }

    /// Persist a new cursor. Returns `false` when the write failed.
    pub async fn advance(&self, key: &CheckpointKey, value: &str) -> bool {
        match self.store.write(key, value).await {
            Ok(()) => {
                tracing::debug!("Advanced checkpoint {key} to '{value}'");
                true
            }
            Err(e) => {
                tracing::error!("Failed to write checkpoint {key} = '{value}': {e:#}");
                false
            }
        }
    }

    /// Administrative reset: the next run starts from the beginning.
    pub async fn reset(&self, key: &CheckpointKey) -> bool {
        match self.store.delete(key).await {
            Ok(()) => {
                tracing::info!("Deleted checkpoint {key}");
                true
            }
            Err(e) => {
                tracing::error!("Failed to delete checkpoint {key}: {e:#}");
                false
            }
        }
    }
}
