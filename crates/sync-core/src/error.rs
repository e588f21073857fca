//! Error taxonomy of the extraction engine.
//!
//! Every variant is contained to the relation (or matched table) that
//! produced it. The orchestrator records them in the cycle summary and moves
//! on; none of them stops the process.

use std::fmt::Display;

/// Errors produced while synchronizing one relation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Missing table, increment column or primary key. The sub-run is skipped.
    #[error("configuration error for '{relation}': {message}")]
    Configuration { relation: String, message: String },

    /// SQL execution failed. Retried next cycle from the last checkpoint.
    #[error("query failed on '{table}': {message}")]
    TransientQuery { table: String, message: String },

    /// The search engine acknowledged none of the submitted documents.
    #[error("no documents acknowledged by index '{index}' ({submitted} submitted)")]
    TotalWriteFailure { index: String, submitted: usize },

    /// The index could not be created or its mapping was refused.
    #[error("mapping for index '{index}' could not be applied: {message}")]
    Mapping { index: String, message: String },

    /// The checkpoint could not be persisted; the cursor did not advance.
    #[error("checkpoint '{key}' could not be written: {message}")]
    CheckpointIo { key: String, message: String },
}

impl SyncError {
    pub fn configuration(relation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            relation: relation.into(),
            message: message.into(),
        }
    }

    /// Wrap a client error; the alternate format keeps the whole cause chain.
    pub fn query(table: impl Into<String>, err: impl Display) -> Self {
        Self::TransientQuery {
            table: table.into(),
            message: format!("{err:#}"),
        }
    }

    pub fn total_write_failure(index: impl Into<String>, submitted: usize) -> Self {
        Self::TotalWriteFailure {
            index: index.into(),
            submitted,
        }
    }

    pub fn mapping(index: impl Into<String>, err: impl Display) -> Self {
        Self::Mapping {
            index: index.into(),
            message: format!("{err:#}"),
        }
    }

    pub fn checkpoint_io(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CheckpointIo {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Short label used in cycle summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::TransientQuery { .. } => "query",
            Self::TotalWriteFailure { .. } => "write",
            Self::Mapping { .. } => "mapping",
            Self::CheckpointIo { .. } => "checkpoint",
        }
    }
}
