//! Unit tests for the checkpoint crate.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::{
    CheckpointConfig, CheckpointKey, CheckpointManager, CheckpointStore, FilesystemStore,
    MemoryStore,
};

fn order_key() -> CheckpointKey {
    CheckpointKey::new("t_order", "order", "_doc")
}

/// Store whose every operation fails, to exercise the manager policy.
struct BrokenStore;

#[async_trait]
impl CheckpointStore for BrokenStore {
    async fn read(&self, _key: &CheckpointKey) -> Result<Option<String>> {
        bail!("disk on fire")
    }

    async fn write(&self, _key: &CheckpointKey, _value: &str) -> Result<()> {
        bail!("read-only filesystem")
    }

    async fn delete(&self, _key: &CheckpointKey) -> Result<()> {
        bail!("read-only filesystem")
    }
}

// ============================================================================
// CheckpointKey Tests
// ============================================================================

#[test]
fn test_key_file_name() {
    assert_eq!(order_key().file_name(), "t_order#order#_doc");

    let key = CheckpointKey::new("db.t/1", "idx#a", "_doc");
    assert_eq!(key.file_name(), "db.t_1#idx_a#_doc");
    assert_eq!(key.to_string(), "db.t/1/idx#a/_doc");
}

#[test]
fn test_distinct_keys_use_distinct_files() {
    let a = CheckpointKey::new("t_order_01", "order", "_doc");
    let b = CheckpointKey::new("t_order_02", "order", "_doc");
    let c = CheckpointKey::new("t_order_01", "order", "item");
    assert_ne!(a.file_name(), b.file_name());
    assert_ne!(a.file_name(), c.file_name());
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_resolved_dir() {
    let config = CheckpointConfig::with_dir("/var/lib/search-sync");
    assert_eq!(
        config.resolved_dir(),
        std::path::PathBuf::from("/var/lib/search-sync")
    );

    let default = CheckpointConfig::default().resolved_dir();
    assert!(default.ends_with("search-sync/checkpoints"));
}

// ============================================================================
// FilesystemStore Tests
// ============================================================================

#[tokio::test]
async fn test_filesystem_store_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(temp_dir.path().join("nested"));
    let key = order_key();

    assert_eq!(store.read(&key).await.unwrap(), None);

    store.write(&key, "2024-01-01 10:00:00").await.unwrap();
    assert_eq!(
        store.read(&key).await.unwrap().as_deref(),
        Some("2024-01-01 10:00:00")
    );

    store.write(&key, "2024-01-01 10:01:00").await.unwrap();
    assert_eq!(
        store.read(&key).await.unwrap().as_deref(),
        Some("2024-01-01 10:01:00")
    );

    // File content is the raw cursor, nothing else
    let raw = std::fs::read_to_string(store.path_for(&key)).unwrap();
    assert_eq!(raw, "2024-01-01 10:01:00");

    store.delete(&key).await.unwrap();
    assert_eq!(store.read(&key).await.unwrap(), None);
    // Deleting again is fine
    store.delete(&key).await.unwrap();
}

#[tokio::test]
async fn test_filesystem_store_reads_hand_edited_file() {
    let temp_dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(temp_dir.path());
    let key = order_key();

    std::fs::write(store.path_for(&key), "105\n").unwrap();
    assert_eq!(store.read(&key).await.unwrap().as_deref(), Some("105"));
}

#[tokio::test]
async fn test_filesystem_store_write_failure_is_error() {
    let temp_dir = TempDir::new().unwrap();
    // A regular file where the directory should be
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();

    let store = FilesystemStore::new(&blocker);
    assert!(store.write(&order_key(), "1").await.is_err());
}

// ============================================================================
// MemoryStore Tests
// ============================================================================

#[tokio::test]
async fn test_memory_store_roundtrip() {
    let store = MemoryStore::new();
    let key = order_key();

    assert_eq!(store.read(&key).await.unwrap(), None);
    store.write(&key, "7").await.unwrap();
    assert_eq!(store.get(&key).as_deref(), Some("7"));
    store.delete(&key).await.unwrap();
    assert_eq!(store.get(&key), None);
}

// ============================================================================
// CheckpointManager Tests
// ============================================================================

#[tokio::test]
async fn test_manager_first_run_reads_empty() {
    let temp_dir = TempDir::new().unwrap();
    let manager = CheckpointManager::new(Arc::new(FilesystemStore::new(temp_dir.path())));

    assert_eq!(manager.read_cursor(&order_key()).await, "");
}

#[tokio::test]
async fn test_manager_advance_and_reset() {
    let store = Arc::new(MemoryStore::new());
    let manager = CheckpointManager::new(store.clone());
    let key = order_key();

    assert!(manager.advance(&key, "2024-01-01 10:00:00").await);
    assert_eq!(manager.read_cursor(&key).await, "2024-01-01 10:00:00");

    assert!(manager.reset(&key).await);
    assert_eq!(manager.read_cursor(&key).await, "");
    assert_eq!(store.get(&key), None);
}

#[tokio::test]
async fn test_manager_swallows_store_failures() {
    let manager = CheckpointManager::new(Arc::new(BrokenStore));
    let key = order_key();

    // Unreadable checkpoint behaves like a first run
    assert_eq!(manager.read_cursor(&key).await, "");
    // Failed write means "do not advance"
    assert!(!manager.advance(&key, "1").await);
    assert!(!manager.reset(&key).await);
}

#[tokio::test]
async fn test_manager_keys_are_independent() {
    let manager = CheckpointManager::new(Arc::new(MemoryStore::new()));
    let a = CheckpointKey::new("t_order_01", "order", "_doc");
    let b = CheckpointKey::new("t_order_02", "order", "_doc");

    assert!(manager.advance(&a, "10").await);
    assert!(manager.advance(&b, "20").await);
    assert_eq!(manager.read_cursor(&a).await, "10");
    assert_eq!(manager.read_cursor(&b).await, "20");
}
