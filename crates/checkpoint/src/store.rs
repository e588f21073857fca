//! Checkpoint storage trait and key type.

use anyhow::Result;
use async_trait::async_trait;

/// Identifies one cursor: the matched table (or the relation's literal
/// table), the target index and the document type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub table: String,
    pub index: String,
    pub doc_type: String,
}

impl CheckpointKey {
    pub fn new(
        table: impl Into<String>,
        index: impl Into<String>,
        doc_type: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }

    /// Flat file name for this key.
    ///
    /// Segments are joined with `#`; characters that are unsafe in file
    /// names (including `#` itself) are replaced with `_`.
    pub fn file_name(&self) -> String {
        [&self.table, &self.index, &self.doc_type]
            .iter()
            .map(|segment| sanitize(segment))
            .collect::<Vec<_>>()
            .join("#")
    }
}

impl std::fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.table, self.index, self.doc_type)
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Trait for checkpoint storage operations.
///
/// Implementations surface every I/O failure as an error; the policy of
/// what a failure means for extraction lives in `CheckpointManager`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read a checkpoint. Returns `None` if it doesn't exist.
    async fn read(&self, key: &CheckpointKey) -> Result<Option<String>>;

    /// Store (overwrite) a checkpoint.
    async fn write(&self, key: &CheckpointKey, value: &str) -> Result<()>;

    /// Delete a checkpoint. Deleting a missing checkpoint is not an error.
    async fn delete(&self, key: &CheckpointKey) -> Result<()>;
}
