//! In-memory checkpoint storage.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::store::{CheckpointKey, CheckpointStore};

/// Checkpoint store kept in process memory.
///
/// Used for dry runs and tests; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CheckpointKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored value without going through the async trait.
    pub fn get(&self, key: &CheckpointKey) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read(&self, key: &CheckpointKey) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("checkpoint memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &CheckpointKey, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("checkpoint memory store poisoned"))?;
        entries.insert(key.clone(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &CheckpointKey) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("checkpoint memory store poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}
