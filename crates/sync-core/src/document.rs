//! Documents written to the search engine.

use serde_json::{Map, Value};

/// One unit of (index, type, id, fields) sent to the search engine.
///
/// Documents are transient: created and consumed within one extraction page.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub index: String,
    pub doc_type: String,
    /// Never empty; rows without an id are dropped before a document exists
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
            fields,
        }
    }

    /// Serialized JSON body, one line.
    pub fn body(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}
