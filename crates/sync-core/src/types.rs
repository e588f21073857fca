//! Search-engine field types.

use serde::{Deserialize, Serialize};

/// Field type of a mapped column.
///
/// The inference rules live with the relational source; this crate only
/// knows how each type renders into an index mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// `tinyint(1)` columns
    Boolean,
    /// Integer and time-like columns
    Long,
    /// Everything else
    Text,
}

impl FieldType {
    /// Name of the type in the search engine's mapping language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Long => "long",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
