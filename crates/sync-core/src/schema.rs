//! Schemes: the field-type mapping attached to one index/type pair.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::relation::FieldOptions;
use crate::types::FieldType;

/// One mapped field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field type inferred from the column type
    pub field_type: FieldType,

    /// Indexing options resolved from the relation's field table
    pub options: FieldOptions,
}

/// Field-type mapping for one index/type pair.
///
/// Created once per relation before extraction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheme {
    pub index: String,
    pub doc_type: String,
    /// Field name -> spec, ordered for stable mapping documents
    pub fields: BTreeMap<String, FieldSpec>,
}

impl Scheme {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, field_type: FieldType, options: FieldOptions) {
        self.fields.insert(
            name.into(),
            FieldSpec {
                field_type,
                options,
            },
        );
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).map(|spec| spec.field_type)
    }

    /// Render the mapping document (`{"properties": {...}}`).
    ///
    /// Text fields honor the per-field options: `analyzed: false` maps to
    /// `keyword`, `keyword: true` adds a `keyword` sub-field and
    /// `suggest: true` adds a `suggest` completion sub-field.
    pub fn to_mapping(&self) -> Value {
        let mut properties = Map::new();
        for (name, spec) in &self.fields {
            properties.insert(name.clone(), field_mapping(spec));
        }
        json!({ "properties": properties })
    }
}

fn field_mapping(spec: &FieldSpec) -> Value {
    match spec.field_type {
        FieldType::Boolean | FieldType::Long => json!({ "type": spec.field_type.as_str() }),
        FieldType::Text if !spec.options.analyzed => {
            let mut mapping = json!({ "type": "keyword" });
            if spec.options.suggest {
                mapping["fields"] = json!({ "suggest": { "type": "completion" } });
            }
            mapping
        }
        FieldType::Text => {
            let mut mapping = json!({ "type": "text" });
            let mut sub_fields = Map::new();
            if spec.options.keyword {
                sub_fields.insert(
                    "keyword".to_string(),
                    json!({ "type": "keyword", "ignore_above": 256 }),
                );
            }
            if spec.options.suggest {
                sub_fields.insert("suggest".to_string(), json!({ "type": "completion" }));
            }
            if !sub_fields.is_empty() {
                mapping["fields"] = Value::Object(sub_fields);
            }
            mapping
        }
    }
}
