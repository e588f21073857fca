//! Row to document mapping.

use serde_json::Map;
use sync_core::{Document, Relation, Scheme, SourceRow};

/// Maps rows of one matched table to documents for one index.
pub struct DocumentMapper<'a> {
    relation: &'a Relation,
    index: String,
    primary_keys: &'a [String],
    match_token: Option<String>,
    scheme: Option<&'a Scheme>,
}

impl<'a> DocumentMapper<'a> {
    pub fn new(relation: &'a Relation, index: impl Into<String>, primary_keys: &'a [String]) -> Self {
        Self {
            relation,
            index: index.into(),
            primary_keys,
            match_token: None,
            scheme: None,
        }
    }

    /// Token of the matched table, folded into ids when the relation opts in.
    pub fn with_match_token(mut self, token: Option<String>) -> Self {
        self.match_token = token;
        self
    }

    /// Scheme used to coerce values to their mapped field types.
    pub fn with_scheme(mut self, scheme: Option<&'a Scheme>) -> Self {
        self.scheme = scheme;
        self
    }

    /// Document id for a row, or `None` when every primary-key value is blank.
    ///
    /// Layout: `prefix + [match token -] pk1 - pk2 ... + suffix`.
    pub fn document_id(&self, row: &SourceRow) -> Option<String> {
        let key_values: Vec<String> = self
            .primary_keys
            .iter()
            .map(|key| {
                row.get(key)
                    .map(|v| v.to_cursor_string().trim().to_string())
                    .unwrap_or_default()
            })
            .collect();

        if key_values.iter().all(String::is_empty) {
            return None;
        }

        let mut segments = Vec::with_capacity(key_values.len() + 1);
        if self.relation.include_match_in_id {
            if let Some(token) = &self.match_token {
                segments.push(token.clone());
            }
        }
        segments.extend(key_values);

        Some(format!(
            "{}{}{}",
            self.relation.id_prefix.as_deref().unwrap_or_default(),
            segments.join("-"),
            self.relation.id_suffix.as_deref().unwrap_or_default()
        ))
    }

    /// Map one row; rows without an id are dropped with a warning.
    pub fn map_row(&self, row: &SourceRow) -> Option<Document> {
        let Some(id) = self.document_id(row) else {
            tracing::warn!(
                "Dropping row without primary key value for index '{}' (keys: {:?})",
                self.index,
                self.primary_keys
            );
            return None;
        };

        let mut fields = Map::new();
        for (column, value) in row.iter() {
            if self.relation.is_ignored(column) {
                continue;
            }
            let name = self.relation.field_name(column);
            let field_type = self.scheme.and_then(|s| s.field_type(&name));
            fields.insert(name, value.to_field_value(field_type));
        }

        Some(Document::new(
            self.index.clone(),
            self.relation.doc_type.clone(),
            id,
            fields,
        ))
    }

    pub fn map_rows(&self, rows: &[SourceRow]) -> Vec<Document> {
        rows.iter().filter_map(|row| self.map_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_core::{FieldOptions, FieldType, SourceValue};

    fn order_row(id: i64, buyer: &str) -> SourceRow {
        SourceRow::new()
            .with("id", SourceValue::Int(id))
            .with("C_BUYER_NAME", SourceValue::Text(buyer.into()))
            .with("pay_status", SourceValue::Int(1))
            .with("remark", SourceValue::Null)
            .with("password", SourceValue::Text("hunter2".into()))
    }

    fn order_relation() -> Relation {
        let mut relation = Relation::new("t_order", "update_time");
        relation.ignore_columns = vec!["password".to_string()];
        relation
    }

    #[test]
    fn test_map_row_fields() {
        let relation = order_relation();
        let keys = vec!["id".to_string()];
        let mapper = DocumentMapper::new(&relation, "order", &keys);

        let doc = mapper.map_row(&order_row(7, "Alice")).unwrap();
        assert_eq!(doc.index, "order");
        assert_eq!(doc.doc_type, "_doc");
        assert_eq!(doc.id, "7");
        assert_eq!(doc.fields["id"], json!(7));
        assert_eq!(doc.fields["buyerName"], json!("Alice"));
        assert_eq!(doc.fields["payStatus"], json!(1));
        assert_eq!(doc.fields["remark"], json!(" "));
        assert!(!doc.fields.contains_key("password"));
    }

    #[test]
    fn test_boolean_coercion_follows_scheme() {
        let relation = order_relation();
        let keys = vec!["id".to_string()];
        let mut scheme = Scheme::new("order", "_doc");
        scheme.insert("payStatus", FieldType::Boolean, FieldOptions::default());

        let mapper = DocumentMapper::new(&relation, "order", &keys).with_scheme(Some(&scheme));
        let doc = mapper.map_row(&order_row(7, "Alice")).unwrap();
        assert_eq!(doc.fields["payStatus"], json!(true));
    }

    #[test]
    fn test_document_id_layout() {
        let mut relation = Relation::new("t_order_%", "update_time");
        relation.id_prefix = Some("o-".to_string());
        relation.id_suffix = Some("-x".to_string());
        relation.include_match_in_id = true;
        let keys = vec!["shop_id".to_string(), "id".to_string()];

        let row = SourceRow::new()
            .with("shop_id", SourceValue::Int(3))
            .with("id", SourceValue::Int(9));

        let mapper = DocumentMapper::new(&relation, "order", &keys)
            .with_match_token(relation.match_token("t_order_01"));
        assert_eq!(mapper.document_id(&row).as_deref(), Some("o-01-3-9-x"));

        // Same row, same configuration, same id
        assert_eq!(mapper.document_id(&row), mapper.document_id(&row));

        // Token only folded in when the relation opts in
        relation.include_match_in_id = false;
        let mapper = DocumentMapper::new(&relation, "order", &keys)
            .with_match_token(Some("01".to_string()));
        assert_eq!(mapper.document_id(&row).as_deref(), Some("o-3-9-x"));
    }

    #[test]
    fn test_rows_without_id_are_dropped() {
        let relation = order_relation();
        let keys = vec!["id".to_string()];
        let mapper = DocumentMapper::new(&relation, "order", &keys);

        let rows = vec![
            order_row(1, "Alice"),
            SourceRow::new()
                .with("id", SourceValue::Null)
                .with("C_BUYER_NAME", SourceValue::Text("Bob".into())),
            SourceRow::new().with("C_BUYER_NAME", SourceValue::Text("Carol".into())),
            order_row(2, "Dave"),
        ];

        let docs = mapper.map_rows(&rows);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_empty_field_map_is_still_a_document() {
        let mut relation = order_relation();
        relation.ignore_columns = vec!["id".to_string()];
        let keys = vec!["id".to_string()];
        let mapper = DocumentMapper::new(&relation, "order", &keys);

        let doc = mapper
            .map_row(&SourceRow::new().with("id", SourceValue::Int(5)))
            .unwrap();
        assert_eq!(doc.id, "5");
        assert!(doc.fields.is_empty());
    }
}
