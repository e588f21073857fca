//! Schema inference from table introspection.
//!
//! `DESC table` rows are turned into column descriptions, and declared
//! column types are mapped to search field types by a fixed rule table.

use sync_core::{FieldType, Relation, Scheme, SourceRow};

/// One column as reported by `DESC table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    /// Declared type, e.g. `bigint(20)` or `varchar(64)`
    pub column_type: String,
    pub primary_key: bool,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            primary_key,
        }
    }

    /// Parse a `DESC` result row (`Field`, `Type`, `Key` columns).
    pub fn from_row(row: &SourceRow) -> Option<Self> {
        let name = row.get("Field")?.as_text()?;
        let column_type = row
            .get("Type")
            .and_then(|v| v.as_text())
            .unwrap_or_default();
        let primary_key = row
            .get("Key")
            .and_then(|v| v.as_text())
            .is_some_and(|key| key.eq_ignore_ascii_case("PRI"));
        Some(Self::new(name, column_type, primary_key))
    }
}

/// Map a declared column type to a search field type.
///
/// - exactly `tinyint(1)` -> boolean
/// - anything containing `int` or `time` -> long
/// - everything else -> text
pub fn column_type_to_field_type(column_type: &str) -> FieldType {
    let column_type = column_type.trim().to_lowercase();
    if column_type == "tinyint(1)" {
        FieldType::Boolean
    } else if column_type.contains("int") || column_type.contains("time") {
        FieldType::Long
    } else {
        FieldType::Text
    }
}

/// Parse every row of a `DESC` result, skipping rows without a column name.
pub fn parse_description(rows: &[SourceRow]) -> Vec<ColumnDescription> {
    rows.iter().filter_map(ColumnDescription::from_row).collect()
}

/// Primary-key column names in declaration order.
pub fn primary_keys(columns: &[ColumnDescription]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.clone())
        .collect()
}

/// Build the scheme for one index from introspected columns.
///
/// Ignored and blank columns are skipped; field names and per-field options
/// come from the relation's field table.
pub fn infer_scheme(relation: &Relation, index: &str, columns: &[ColumnDescription]) -> Scheme {
    let mut scheme = Scheme::new(index, &relation.doc_type);
    for column in columns {
        if relation.is_ignored(&column.name) {
            continue;
        }
        let options = relation
            .field_options(&column.name)
            .cloned()
            .unwrap_or_default();
        scheme.insert(
            relation.field_name(&column.name),
            column_type_to_field_type(&column.column_type),
            options,
        );
    }
    scheme
}

/// Table names from a `SHOW TABLES LIKE` result.
pub fn parse_table_names(rows: &[SourceRow]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.first())
        .map(|value| value.to_cursor_string())
        .filter(|name| !name.is_empty())
        .collect()
}
