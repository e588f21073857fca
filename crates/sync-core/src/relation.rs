//! Relation descriptors.
//!
//! A [`Relation`] describes one table (or table-name pattern) that is
//! incrementally replicated into one search index. Relations are loaded once
//! from the configuration file and are read-only for the rest of the process.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Document type label used when a relation does not name one.
pub const DEFAULT_DOC_TYPE: &str = "_doc";

/// Page size used when a relation does not name one.
pub const DEFAULT_LIMIT: usize = 1000;

/// Row count above which paging switches to the join-based strategy.
pub const DEFAULT_BIG_OFFSET_THRESHOLD: u64 = 100_000;

/// Separator between the segments of a multi-column cursor.
pub const CURSOR_DELIMITER: char = ',';

/// Per-column indexing options.
///
/// `name` overrides the field name derived from the column name. The remaining
/// flags are resolved into the index mapping when the scheme is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOptions {
    /// Target field name (defaults to the naming convention)
    #[serde(default)]
    pub name: Option<String>,

    /// Add a `keyword` sub-field to text fields
    #[serde(default)]
    pub keyword: bool,

    /// Full-text analyze the field; `false` maps text columns to `keyword`
    #[serde(default = "default_true")]
    pub analyzed: bool,

    /// Add a completion sub-field for suggesters
    #[serde(default)]
    pub suggest: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            name: None,
            keyword: false,
            analyzed: true,
            suggest: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_doc_type() -> String {
    DEFAULT_DOC_TYPE.to_string()
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_big_offset_threshold() -> u64 {
    DEFAULT_BIG_OFFSET_THRESHOLD
}

/// Declarative table-to-index synchronization unit.
///
/// # YAML Format
///
/// ```yaml
/// table: t_order
/// increment_column: update_time
/// limit: 1000
/// index: order
/// fields:
///   c_BUYER_NAME: { name: buyer, keyword: true }
/// ignore_columns: [password]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Source table name, or a LIKE pattern when it contains `%`
    pub table: String,

    /// Explicit SELECT replacing the generated `SELECT * FROM table`.
    /// At most a WHERE clause may follow the FROM list
    #[serde(default)]
    pub sql: Option<String>,

    /// Target index name
    #[serde(default)]
    pub index: Option<String>,

    /// Target document type label
    #[serde(default = "default_doc_type", rename = "type")]
    pub doc_type: String,

    /// Page size
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Increment column(s), comma separated for multi-column cursors
    pub increment_column: String,

    /// Name(s) of the cursor column(s) as they appear in result rows
    #[serde(default)]
    pub increment_column_alias: Option<String>,

    /// Create the index and put a mapping inferred from the table schema
    #[serde(default)]
    pub create_mapping: bool,

    /// Column name -> field options
    #[serde(default)]
    pub fields: HashMap<String, FieldOptions>,

    /// Columns excluded from both the mapping and the documents
    #[serde(default)]
    pub ignore_columns: Vec<String>,

    /// Primary-key columns; discovered through `DESC` when empty
    #[serde(default)]
    pub primary_keys: Vec<String>,

    /// Row count above which the join-based paging strategy is used
    #[serde(default = "default_big_offset_threshold")]
    pub big_offset_threshold: u64,

    /// Static prefix of every document id
    #[serde(default)]
    pub id_prefix: Option<String>,

    /// Static suffix of every document id
    #[serde(default)]
    pub id_suffix: Option<String>,

    /// Fold the matched-table token into document ids (pattern relations only)
    #[serde(default)]
    pub include_match_in_id: bool,
}

impl Relation {
    /// Create a relation with default settings for the given table and cursor column.
    pub fn new(table: impl Into<String>, increment_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sql: None,
            index: None,
            doc_type: default_doc_type(),
            limit: DEFAULT_LIMIT,
            increment_column: increment_column.into(),
            increment_column_alias: None,
            create_mapping: false,
            fields: HashMap::new(),
            ignore_columns: Vec::new(),
            primary_keys: Vec::new(),
            big_offset_threshold: DEFAULT_BIG_OFFSET_THRESHOLD,
            id_prefix: None,
            id_suffix: None,
            include_match_in_id: false,
        }
    }

    /// Stable label used in logs and cycle summaries.
    pub fn key(&self) -> String {
        format!("{}->{}/{}", self.table, self.index_name(), self.doc_type)
    }

    /// Check the invariants every relation must satisfy before extraction.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.table.trim().is_empty() {
            return Err(SyncError::configuration(&self.table, "table is required"));
        }
        let columns = self.increment_columns();
        if columns.is_empty() {
            return Err(SyncError::configuration(
                &self.table,
                "increment_column is required",
            ));
        }
        if self.limit == 0 {
            return Err(SyncError::configuration(
                &self.table,
                "limit must be greater than 0",
            ));
        }
        if self.big_offset_threshold == 0 {
            return Err(SyncError::configuration(
                &self.table,
                "big_offset_threshold must be greater than 0",
            ));
        }
        if self.increment_aliases().len() != columns.len() {
            return Err(SyncError::configuration(
                &self.table,
                format!(
                    "increment_column_alias names {} column(s) but increment_column names {}",
                    self.increment_aliases().len(),
                    columns.len()
                ),
            ));
        }
        if let Some(clause) = self.sql.as_deref().and_then(trailing_clause) {
            return Err(SyncError::configuration(
                &self.table,
                format!("sql must not end with a {clause} clause; paging appends its own"),
            ));
        }
        Ok(())
    }

    /// Whether `table` is a LIKE pattern rather than a literal table name.
    pub fn is_pattern(&self) -> bool {
        self.table.contains('%')
    }

    /// Target index name, explicit or derived from the table name.
    pub fn index_name(&self) -> String {
        if let Some(index) = self.index.as_deref().filter(|i| !i.trim().is_empty()) {
            return index.to_string();
        }
        self.table
            .replace('%', "")
            .trim_end_matches(['_', '-'])
            .to_lowercase()
    }

    /// Increment column names in declaration order.
    pub fn increment_columns(&self) -> Vec<String> {
        split_columns(&self.increment_column)
    }

    /// Cursor column names as they appear in result rows.
    pub fn increment_aliases(&self) -> Vec<String> {
        match self.increment_column_alias.as_deref() {
            Some(alias) if !alias.trim().is_empty() => split_columns(alias),
            _ => self.increment_columns(),
        }
    }

    /// Whether the column is excluded from mapping and documents.
    pub fn is_ignored(&self, column: &str) -> bool {
        column.trim().is_empty()
            || self
                .ignore_columns
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(column))
    }

    /// Options configured for a column, if any.
    pub fn field_options(&self, column: &str) -> Option<&FieldOptions> {
        self.fields.get(column).or_else(|| {
            self.fields
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, options)| options)
        })
    }

    /// Field name for a column: the configured override or the naming convention.
    pub fn field_name(&self, column: &str) -> String {
        self.field_options(column)
            .and_then(|options| options.name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| column_to_field_name(column))
    }

    /// Token identifying a matched table within this relation's pattern.
    ///
    /// The token is what the `%` wildcards matched: the matched name with the
    /// pattern's literal prefix and suffix removed. Literal relations have no token.
    pub fn match_token(&self, matched_table: &str) -> Option<String> {
        if !self.is_pattern() {
            return None;
        }
        let first = self.table.find('%')?;
        let last = self.table.rfind('%')?;
        let prefix = &self.table[..first];
        let suffix = &self.table[last + 1..];
        let token = strip_prefix_ignore_case(matched_table, prefix)
            .and_then(|rest| strip_suffix_ignore_case(rest, suffix))
            .unwrap_or(matched_table);
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}

fn split_columns(value: &str) -> Vec<String> {
    value
        .split(CURSOR_DELIMITER)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Top-level clause in `sql` that cannot be followed by a paging condition.
///
/// Text inside parentheses and quotes is skipped, so subqueries may use them.
fn trailing_clause(sql: &str) -> Option<&'static str> {
    let mut top_level = String::with_capacity(sql.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, c) if depth == 0 => {
                top_level.push(if c.is_whitespace() { ' ' } else { c.to_ascii_uppercase() })
            }
            _ => {}
        }
    }
    let normalized = top_level.split_whitespace().collect::<Vec<_>>().join(" ");
    let normalized = format!(" {normalized} ");

    [
        (" GROUP BY ", "GROUP BY"),
        (" HAVING ", "HAVING"),
        (" ORDER BY ", "ORDER BY"),
        (" LIMIT ", "LIMIT"),
        (" UNION ", "UNION"),
    ]
    .into_iter()
    .find(|(needle, _)| normalized.contains(needle))
    .map(|(_, clause)| clause)
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    let tail = value.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &value[..split])
}

/// Derive a field name from a column name.
///
/// A literal `c_`/`C_` prefix is stripped and the remaining upper (or lower)
/// snake case is converted to lower camel case: `C_BUYER_NAME` -> `buyerName`.
pub fn column_to_field_name(column: &str) -> String {
    let trimmed = column
        .strip_prefix("c_")
        .or_else(|| column.strip_prefix("C_"))
        .unwrap_or(column);

    let mut out = String::with_capacity(trimmed.len());
    for (i, word) in trimmed.split('_').filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }

    if out.is_empty() {
        column.to_string()
    } else {
        out
    }
}
