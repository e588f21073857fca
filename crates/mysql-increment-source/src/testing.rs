//! In-memory doubles of the relational source and the search sink.
//!
//! [`InMemoryRowSource`] understands the statements [`crate::SqlGenerator`]
//! emits for single-column cursors: `DESC`, `SHOW TABLES LIKE`, counts,
//! `>`/`=` pages and their join-based variants.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{LazyLock, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use regex::Regex;
use search_sink::{BulkItem, BulkRequest, BulkResponse, SearchSink};
use serde_json::Value;
use sync_core::{SourceRow, SourceValue};

use crate::schema::ColumnDescription;
use crate::source::RowSource;

static FROM_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\s+(\w+)").expect("from pattern should compile"));
static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bWHERE\s+(?:\()?(\w+)\s+(>|=)\s+('(?:[^']|'')*'|-?[\d.]+)")
        .expect("condition pattern should compile")
});
static ORDER_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bORDER BY\s+(?:CUR\.)?(\w+)").expect("order pattern should compile")
});
static LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+(?:(\d+),\s*)?(\d+)").expect("limit pattern should compile")
});

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
struct InMemoryTable {
    columns: Vec<ColumnDescription>,
    rows: Vec<SourceRow>,
}

/// Row source backed by in-memory tables.
#[derive(Default)]
pub struct InMemoryRowSource {
    tables: Mutex<BTreeMap<String, InMemoryTable>>,
    statements: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

impl InMemoryRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&self, name: &str, columns: Vec<ColumnDescription>) {
        lock(&self.tables).insert(
            name.to_string(),
            InMemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
    }

    pub fn insert(&self, table: &str, row: SourceRow) {
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .rows
            .push(row);
    }

    /// Fail every statement containing `fragment`; `None` clears it.
    pub fn fail_on(&self, fragment: Option<&str>) {
        *lock(&self.fail_on) = fragment.map(str::to_string);
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.statements).clone()
    }

    fn describe(&self, table: &str) -> Result<Vec<SourceRow>> {
        let tables = lock(&self.tables);
        let table = tables
            .get(table)
            .ok_or_else(|| anyhow!("Table '{table}' doesn't exist"))?;
        Ok(table
            .columns
            .iter()
            .map(|c| {
                SourceRow::new()
                    .with("Field", SourceValue::Text(c.name.clone()))
                    .with("Type", SourceValue::Text(c.column_type.clone()))
                    .with("Null", SourceValue::Text("NO".into()))
                    .with(
                        "Key",
                        SourceValue::Text(if c.primary_key { "PRI" } else { "" }.into()),
                    )
            })
            .collect())
    }

    fn show_tables(&self, pattern: &str) -> Result<Vec<SourceRow>> {
        let mut regex = String::from("(?i)^");
        for c in pattern.chars() {
            match c {
                '%' => regex.push_str(".*"),
                '_' => regex.push('.'),
                c => regex.push_str(&regex::escape(&c.to_string())),
            }
        }
        regex.push('$');
        let matcher = Regex::new(&regex)?;

        Ok(lock(&self.tables)
            .keys()
            .filter(|name| matcher.is_match(name))
            .map(|name| SourceRow::new().with("Tables_in_db", SourceValue::Text(name.clone())))
            .collect())
    }

    fn select(&self, sql: &str) -> Result<Vec<SourceRow>> {
        let table = FROM_TABLE
            .captures(sql)
            .map(|c| c[1].to_string())
            .ok_or_else(|| anyhow!("Unsupported statement: {sql}"))?;

        let tables = lock(&self.tables);
        let mut rows: Vec<SourceRow> = tables
            .get(&table)
            .ok_or_else(|| anyhow!("Table '{table}' doesn't exist"))?
            .rows
            .clone();

        if let Some(c) = CONDITION.captures(sql) {
            let column = c[1].to_string();
            let comparator = c[2].to_string();
            let literal = unquote(&c[3]);
            rows.retain(|row| {
                let ordering = row
                    .get(&column)
                    .map(|v| compare(v, &literal))
                    .unwrap_or(Ordering::Less);
                match comparator.as_str() {
                    ">" => ordering == Ordering::Greater,
                    _ => ordering == Ordering::Equal,
                }
            });
        }

        if sql.to_uppercase().starts_with("SELECT COUNT(*)") {
            return Ok(vec![
                SourceRow::new().with("COUNT(*)", SourceValue::Int(rows.len() as i64))
            ]);
        }

        if let Some(c) = ORDER_BY.captures(sql) {
            let column = c[1].to_string();
            rows.sort_by(|a, b| {
                let a = a.get(&column).map(SourceValue::to_cursor_string);
                let b = b.get(&column).map(SourceValue::to_cursor_string);
                compare_text(a.as_deref().unwrap_or(""), b.as_deref().unwrap_or(""))
            });
        }

        if let Some(c) = LIMIT.captures(sql) {
            let offset: usize = c.get(1).map_or(Ok(0), |m| m.as_str().parse())?;
            let limit: usize = c[2].parse()?;
            rows = rows.into_iter().skip(offset).take(limit).collect();
        }

        Ok(rows)
    }
}

fn unquote(literal: &str) -> String {
    match literal.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'").replace("\\\\", "\\"),
        None => literal.to_string(),
    }
}

fn compare(value: &SourceValue, literal: &str) -> Ordering {
    compare_text(&value.to_cursor_string(), literal)
}

/// Numeric when both sides parse as numbers, lexicographic otherwise.
fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[async_trait]
impl RowSource for InMemoryRowSource {
    async fn query(&self, sql: &str) -> Result<Vec<SourceRow>> {
        lock(&self.statements).push(sql.to_string());

        if let Some(fragment) = lock(&self.fail_on).as_deref() {
            if sql.contains(fragment) {
                bail!("Lost connection to MySQL server during query");
            }
        }

        if let Some(table) = sql.strip_prefix("DESC ") {
            return self.describe(table.trim());
        }
        if let Some(pattern) = sql.strip_prefix("SHOW TABLES LIKE ") {
            return self.show_tables(&unquote(pattern.trim()));
        }
        self.select(sql)
    }
}

/// Search sink that keeps the last body per (index, id).
#[derive(Default)]
pub struct RecordingSink {
    documents: Mutex<BTreeMap<(String, String), String>>,
    requests: Mutex<Vec<BulkRequest>>,
    indices: Mutex<BTreeSet<String>>,
    mappings: Mutex<Vec<(String, String, Value)>>,
    rejected_ids: Mutex<BTreeSet<String>>,
    unreachable: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the document with this id in every bulk request.
    pub fn reject(&self, id: &str) {
        lock(&self.rejected_ids).insert(id.to_string());
    }

    /// Fail every call as if the engine could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, AtomicOrdering::SeqCst);
    }

    /// Ids stored in an index, sorted.
    pub fn document_ids(&self, index: &str) -> Vec<String> {
        lock(&self.documents)
            .keys()
            .filter(|(i, _)| i == index)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Stored body of one document.
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        lock(&self.documents)
            .get(&(index.to_string(), id.to_string()))
            .and_then(|body| serde_json::from_str(body).ok())
    }

    pub fn requests(&self) -> Vec<BulkRequest> {
        lock(&self.requests).clone()
    }

    pub fn has_index(&self, index: &str) -> bool {
        lock(&self.indices).contains(index)
    }

    /// `(index, doc_type, mapping)` for every put-mapping call.
    pub fn mappings(&self) -> Vec<(String, String, Value)> {
        lock(&self.mappings).clone()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(AtomicOrdering::SeqCst) {
            bail!("error sending request: connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl SearchSink for RecordingSink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.has_index(index))
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        self.check_reachable()?;
        if !lock(&self.indices).insert(index.to_string()) {
            bail!("resource_already_exists_exception: index [{index}] already exists");
        }
        Ok(())
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> Result<()> {
        self.check_reachable()?;
        lock(&self.mappings).push((index.to_string(), doc_type.to_string(), mapping.clone()));
        Ok(())
    }

    async fn bulk_index(&self, request: &BulkRequest) -> Result<BulkResponse> {
        self.check_reachable()?;
        lock(&self.requests).push(request.clone());

        let rejected = lock(&self.rejected_ids).clone();
        let mut documents = lock(&self.documents);
        let items = request
            .documents
            .iter()
            .map(|(id, body)| {
                if rejected.contains(id) {
                    BulkItem::failed(id, 400, "mapper_parsing_exception: failed to parse")
                } else {
                    documents.insert((request.index.clone(), id.clone()), body.clone());
                    BulkItem::ok(id, 201)
                }
            })
            .collect();
        Ok(BulkResponse { items })
    }
}
