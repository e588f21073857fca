//! Checkpoint management for search-sync
//!
//! A checkpoint is the last increment-column value already delivered for one
//! (matched table, index, document type) key, stored as an opaque string.
//! It is the only state the extraction engine persists between runs.
//!
//! # Architecture
//!
//! - [`CheckpointStore`] abstracts the storage medium
//! - [`FilesystemStore`] keeps one flat UTF-8 file per key
//! - [`MemoryStore`] keeps checkpoints in process memory
//! - [`CheckpointManager`] applies the failure policy on top of a store:
//!   reads never fail (an unreadable checkpoint is "no checkpoint") and a
//!   failed write reports "do not advance" instead of an error
//!
//! Losing a checkpoint causes re-delivery from the start of the table, which
//! is idempotent because documents are upserted by id.

mod config;
mod filesystem;
mod manager;
mod memory;
pub mod store;

#[cfg(test)]
mod tests;

pub use config::{default_checkpoint_dir, CheckpointConfig};
pub use filesystem::FilesystemStore;
pub use manager::CheckpointManager;
pub use memory::MemoryStore;
pub use store::{CheckpointKey, CheckpointStore};
