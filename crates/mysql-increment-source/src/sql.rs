//! SQL generation for incremental extraction.
//!
//! Pure string building over a relation, a concrete table and a cursor
//! value. Cursor values are inlined as literals: numeric values unquoted,
//! everything else single-quoted with quotes and backslashes escaped.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use sync_core::{Relation, CURSOR_DELIMITER};

/// Leading `SELECT <list> FROM ` of a statement.
static SELECT_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*select\s+.*?\s+from\s+").expect("select list pattern should compile")
});

static WHERE_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("where pattern should compile"));

/// Cursor comparison: `>` for normal paging, `=` for the tie sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Greater,
    Equal,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::Equal => "=",
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema introspection statement (column name, declared type, key flag).
pub fn description_sql(table: &str) -> String {
    format!("DESC {table}")
}

/// Tables whose name matches a LIKE pattern.
pub fn match_sql(pattern: &str) -> String {
    format!("SHOW TABLES LIKE {}", quote_literal(pattern))
}

/// Whether a cursor value can be inlined without quotes.
///
/// Accepts an optional leading `-`, digits, and an optional fraction.
pub fn is_numeric(value: &str) -> bool {
    let unsigned = value.strip_prefix('-').unwrap_or(value);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(whole) && fraction.is_none_or(digits)
}

/// Inline a cursor value as a SQL literal.
pub fn quote_value(value: &str) -> String {
    if is_numeric(value) {
        value.to_string()
    } else {
        quote_literal(value)
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Statement builder for one relation applied to one concrete table.
pub struct SqlGenerator<'a> {
    relation: &'a Relation,
    table: &'a str,
    primary_keys: &'a [String],
}

impl<'a> SqlGenerator<'a> {
    pub fn new(relation: &'a Relation, table: &'a str, primary_keys: &'a [String]) -> Self {
        Self {
            relation,
            table,
            primary_keys,
        }
    }

    /// The relation's SQL override, or `SELECT * FROM table`.
    ///
    /// For pattern relations the pattern text inside the override is
    /// replaced with the matched table name.
    pub fn base_sql(&self) -> String {
        let sql = self
            .relation
            .sql
            .as_deref()
            .map(|sql| sql.trim().trim_end_matches(';').trim_end())
            .filter(|sql| !sql.is_empty());

        match sql {
            Some(sql) if self.relation.is_pattern() => sql.replace(&self.relation.table, self.table),
            Some(sql) => sql.to_string(),
            None => format!("SELECT * FROM {}", self.table),
        }
    }

    /// WHERE condition comparing the increment column(s) against the cursor.
    ///
    /// Returns `None` for an empty cursor. A multi-column cursor whose
    /// segment count does not match the increment columns is logged and
    /// ignored, so extraction restarts from the top of the column instead
    /// of stopping.
    pub fn cursor_condition(&self, cursor: &str, comparator: Comparator) -> Option<String> {
        if cursor.is_empty() {
            return None;
        }

        let columns = self.relation.increment_columns();
        if columns.len() == 1 {
            return Some(format!("{} {comparator} {}", columns[0], quote_value(cursor)));
        }

        let segments: Vec<&str> = cursor.split(CURSOR_DELIMITER).collect();
        if segments.len() != columns.len() {
            tracing::warn!(
                "Cursor '{cursor}' for '{}' has {} segment(s) but {} increment columns are configured; extracting without a cursor filter",
                self.table,
                segments.len(),
                columns.len()
            );
            return None;
        }

        let values: Vec<String> = segments.iter().map(|s| quote_value(s)).collect();
        Some(format!(
            "({}) {comparator} ({})",
            columns.join(", "),
            values.join(", ")
        ))
    }

    /// Row count for the current scan.
    pub fn count_sql(&self, cursor: &str, comparator: Comparator) -> String {
        let base = self.base_sql();
        let counted = if SELECT_LIST.is_match(&base) {
            SELECT_LIST
                .replace(&base, NoExpand("SELECT COUNT(*) FROM "))
                .into_owned()
        } else {
            format!("SELECT COUNT(*) FROM ({base}) AS CNT")
        };
        self.filtered(&counted, cursor, comparator)
    }

    /// Normal `>` page ordered by the increment column(s).
    pub fn page_sql(&self, cursor: &str, offset: u64) -> String {
        format!(
            "{} ORDER BY {} {}",
            self.filtered(&self.base_sql(), cursor, Comparator::Greater),
            order_by(&self.relation.increment_columns(), None),
            self.limit_clause(offset)
        )
    }

    /// Join-based `>` page: only the key columns are scanned at the offset,
    /// then joined back to the full rows.
    pub fn big_offset_page_sql(&self, cursor: &str, offset: u64) -> String {
        if self.primary_keys.is_empty() {
            return self.page_sql(cursor, offset);
        }
        self.join_sql(
            cursor,
            Comparator::Greater,
            offset,
            &order_by(&self.relation.increment_columns(), None),
            &order_by(&self.relation.increment_aliases(), Some("CUR")),
        )
    }

    /// `=` page over one exact cursor value, ordered by primary key.
    pub fn tie_sql(&self, cursor: &str, offset: u64) -> String {
        format!(
            "{} ORDER BY {} {}",
            self.filtered(&self.base_sql(), cursor, Comparator::Equal),
            order_by(&self.key_columns(), None),
            self.limit_clause(offset)
        )
    }

    /// Join-based variant of [`Self::tie_sql`] for large tie groups.
    pub fn big_offset_tie_sql(&self, cursor: &str, offset: u64) -> String {
        if self.primary_keys.is_empty() {
            return self.tie_sql(cursor, offset);
        }
        self.join_sql(
            cursor,
            Comparator::Equal,
            offset,
            &order_by(self.primary_keys, None),
            &order_by(self.primary_keys, Some("CUR")),
        )
    }

    fn join_sql(
        &self,
        cursor: &str,
        comparator: Comparator,
        offset: u64,
        inner_order: &str,
        outer_order: &str,
    ) -> String {
        let base = self.base_sql();
        let keys = self.primary_keys.join(", ");

        let keys_only = if SELECT_LIST.is_match(&base) {
            SELECT_LIST
                .replace(&base, NoExpand(&format!("SELECT {keys} FROM ")))
                .into_owned()
        } else {
            format!("SELECT {keys} FROM ({base}) AS SRC")
        };
        let inner = format!(
            "{} ORDER BY {inner_order} {}",
            self.filtered(&keys_only, cursor, comparator),
            self.limit_clause(offset)
        );

        let on = self
            .primary_keys
            .iter()
            .map(|key| format!("CUR.{key} = TMP.{key}"))
            .collect::<Vec<_>>()
            .join(" AND ");

        format!(
            "SELECT CUR.* FROM ({base}) AS CUR INNER JOIN ({inner}) AS TMP ON {on} ORDER BY {outer_order}"
        )
    }

    /// Append the cursor condition, parenthesizing an existing WHERE clause.
    ///
    /// Overrides with a top-level GROUP BY, HAVING, ORDER BY, LIMIT or UNION
    /// never get here; [`Relation::validate`] rejects them.
    fn filtered(&self, sql: &str, cursor: &str, comparator: Comparator) -> String {
        let Some(condition) = self.cursor_condition(cursor, comparator) else {
            return sql.to_string();
        };
        match WHERE_KEYWORD.find(sql) {
            Some(m) => format!(
                "{}WHERE ({}) AND ({condition})",
                &sql[..m.start()],
                sql[m.end()..].trim()
            ),
            None => format!("{sql} WHERE {condition}"),
        }
    }

    fn limit_clause(&self, offset: u64) -> String {
        if offset == 0 {
            format!("LIMIT {}", self.relation.limit)
        } else {
            format!("LIMIT {offset}, {}", self.relation.limit)
        }
    }

    /// Deterministic order for tie pages: primary keys, else the cursor columns.
    fn key_columns(&self) -> Vec<String> {
        if self.primary_keys.is_empty() {
            self.relation.increment_columns()
        } else {
            self.primary_keys.to_vec()
        }
    }
}

fn order_by(columns: &[String], qualifier: Option<&str>) -> String {
    columns
        .iter()
        .map(|column| match qualifier {
            Some(q) => format!("{q}.{column} ASC"),
            None => format!("{column} ASC"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Derive the cursor string from a row's increment value(s).
///
/// Multi-column cursors are joined with the cursor delimiter. Returns an
/// empty string when any segment is missing or null.
pub fn cursor_from_row(row: &sync_core::SourceRow, aliases: &[String]) -> String {
    let mut segments = Vec::with_capacity(aliases.len());
    for alias in aliases {
        match row.get(alias) {
            Some(value) if !value.is_blank() => segments.push(value.to_cursor_string()),
            _ => return String::new(),
        }
    }
    segments.join(CURSOR_DELIMITER.to_string().as_str())
}
