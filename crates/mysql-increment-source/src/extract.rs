//! Extraction loop.
//!
//! One sub-run per concrete table:
//!
//! ```text
//! START -> COUNT -> PAGE -> (TIE)? -> ADVANCE_OR_STOP
//!                    ^                      |
//!                    +----------------------+
//! ```
//!
//! Every page that indexed at least one document, or that had nothing
//! indexable, advances the checkpoint to the last row's increment value. When that value is not numeric, rows
//! sharing it are swept again with an `=` scan so a tie group split across a
//! page boundary is delivered in full.
//!
//! Failures stop the sub-run for this cycle and are reported, never raised:
//! the next cycle resumes from the last persisted checkpoint.

use std::sync::Arc;
use std::time::Instant;

use checkpoint::{CheckpointKey, CheckpointManager};
use search_sink::{submit_documents, BulkReport, SearchSink};
use sync_core::{Relation, Scheme, SourceRow, SyncError};

use crate::document::DocumentMapper;
use crate::schema::{self, ColumnDescription};
use crate::source::RowSource;
use crate::sql::{self, Comparator, SqlGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Describe,
    Match,
    Count,
    Page,
    Tie,
    Bulk,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Describe => "describe",
            Self::Match => "match",
            Self::Count => "count",
            Self::Page => "page",
            Self::Tie => "tie",
            Self::Bulk => "bulk",
        })
    }
}

/// Start time of one step, handed to the call it measures.
struct QueryTimer {
    step: Step,
    started: Instant,
}

impl QueryTimer {
    fn start(step: Step) -> Self {
        Self {
            step,
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

/// Why a sub-run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The count found no rows past the checkpoint
    NothingNew,
    /// A page came back smaller than the page size
    Exhausted,
    /// The last row had no usable increment value
    CursorUnavailable,
    /// The cursor would not have moved; stopped to avoid spinning
    Stalled,
}

/// Outcome of one successful sub-run.
#[derive(Debug, Clone, PartialEq)]
pub struct SubRunReport {
    pub table: String,
    pub index: String,
    /// `>` pages fetched
    pub pages: usize,
    /// `=` pages fetched by tie sweeps
    pub tie_pages: usize,
    pub submitted: usize,
    pub indexed: usize,
    /// Checkpoint value when the sub-run ended
    pub cursor: String,
    pub stop: StopReason,
}

impl SubRunReport {
    fn new(table: &str, index: &str, cursor: &str) -> Self {
        Self {
            table: table.to_string(),
            index: index.to_string(),
            pages: 0,
            tie_pages: 0,
            submitted: 0,
            indexed: 0,
            cursor: cursor.to_string(),
            stop: StopReason::NothingNew,
        }
    }

    fn record(&mut self, bulk: &BulkReport) {
        self.submitted += bulk.submitted;
        self.indexed += bulk.succeeded;
    }
}

/// Outcomes of every sub-run of one relation in one cycle.
#[derive(Debug)]
pub struct RelationReport {
    /// `Relation::key` of the relation
    pub relation: String,
    /// One entry per concrete table
    pub outcomes: Vec<(String, Result<SubRunReport, SyncError>)>,
}

impl RelationReport {
    fn failed(relation: &Relation, error: SyncError) -> Self {
        Self {
            relation: relation.key(),
            outcomes: vec![(relation.table.clone(), Err(error))],
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    /// Documents acknowledged across all sub-runs.
    pub fn indexed(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| outcome.as_ref().ok())
            .map(|report| report.indexed)
            .sum()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.outcomes
            .iter()
            .filter_map(|(table, outcome)| outcome.as_ref().err().map(|e| (table.as_str(), e)))
    }
}

/// Everything a sub-run needs about its concrete table.
struct Target {
    table: String,
    index: String,
    primary_keys: Vec<String>,
    scheme: Option<Scheme>,
    match_token: Option<String>,
    key: CheckpointKey,
}

/// Runs the extraction loop against a row source and a search sink.
///
/// Cheap to clone; each relation worker gets its own copy.
#[derive(Clone)]
pub struct Extractor {
    source: Arc<dyn RowSource>,
    sink: Arc<dyn SearchSink>,
    checkpoints: CheckpointManager,
}

impl Extractor {
    pub fn new(
        source: Arc<dyn RowSource>,
        sink: Arc<dyn SearchSink>,
        checkpoints: CheckpointManager,
    ) -> Self {
        Self {
            source,
            sink,
            checkpoints,
        }
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Run every sub-run of a relation. Never fails; outcomes are reported.
    pub async fn run_relation(&self, relation: &Relation) -> RelationReport {
        if let Err(e) = relation.validate() {
            tracing::error!("Skipping relation '{}': {e}", relation.key());
            return RelationReport::failed(relation, e);
        }

        let tables = match self.resolve_tables(relation).await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::error!("Failed to resolve tables for '{}': {e}", relation.key());
                return RelationReport::failed(relation, e);
            }
        };
        if tables.is_empty() {
            tracing::warn!("No tables match pattern '{}'", relation.table);
        }

        let mut outcomes = Vec::with_capacity(tables.len());
        for table in tables {
            let outcome = self.run_table(relation, &table).await;
            match &outcome {
                Ok(report) => tracing::info!(
                    "Sub-run '{table}' -> '{}' finished ({:?}): {} pages, {} tie pages, {}/{} documents indexed, cursor '{}'",
                    report.index,
                    report.stop,
                    report.pages,
                    report.tie_pages,
                    report.indexed,
                    report.submitted,
                    report.cursor
                ),
                Err(e) => tracing::error!("Sub-run '{table}' stopped: {e}"),
            }
            outcomes.push((table, outcome));
        }

        RelationReport {
            relation: relation.key(),
            outcomes,
        }
    }

    /// The literal table, or every table matching the relation's pattern.
    pub async fn resolve_tables(&self, relation: &Relation) -> Result<Vec<String>, SyncError> {
        if !relation.is_pattern() {
            return Ok(vec![relation.table.clone()]);
        }
        let rows = self
            .query(
                &relation.table,
                QueryTimer::start(Step::Match),
                &sql::match_sql(&relation.table),
            )
            .await?;
        Ok(schema::parse_table_names(&rows))
    }

    /// Introspect a table's columns.
    pub async fn describe(&self, table: &str) -> Result<Vec<ColumnDescription>, SyncError> {
        let rows = self
            .query(
                table,
                QueryTimer::start(Step::Describe),
                &sql::description_sql(table),
            )
            .await?;
        let columns = schema::parse_description(&rows);
        if columns.is_empty() {
            return Err(SyncError::configuration(table, "table has no columns"));
        }
        Ok(columns)
    }

    /// Create the relation's index when missing and apply the mapping
    /// inferred from its (first matched) table.
    pub async fn ensure_schema(&self, relation: &Relation) -> Result<(), SyncError> {
        relation.validate()?;
        let index = relation.index_name();

        let tables = self.resolve_tables(relation).await?;
        // Matched tables of one pattern share one index and one layout
        let Some(table) = tables.first() else {
            tracing::warn!(
                "No tables match pattern '{}'; mapping for '{index}' not created",
                relation.table
            );
            return Ok(());
        };

        let columns = self.describe(table).await?;
        let scheme = schema::infer_scheme(relation, &index, &columns);

        let exists = self
            .sink
            .index_exists(&index)
            .await
            .map_err(|e| SyncError::mapping(&index, e))?;
        if !exists {
            self.sink
                .create_index(&index)
                .await
                .map_err(|e| SyncError::mapping(&index, e))?;
        }
        self.sink
            .put_mapping(&index, &scheme.doc_type, &scheme.to_mapping())
            .await
            .map_err(|e| SyncError::mapping(&index, e))?;

        tracing::info!(
            "Mapping for '{index}/{}' applied from '{table}' ({} fields)",
            scheme.doc_type,
            scheme.fields.len()
        );
        Ok(())
    }

    async fn prepare_target(&self, relation: &Relation, table: &str) -> Result<Target, SyncError> {
        let index = relation.index_name();
        let mut primary_keys = relation.primary_keys.clone();
        let mut scheme = None;

        if primary_keys.is_empty() || relation.create_mapping {
            let columns = self.describe(table).await?;
            if primary_keys.is_empty() {
                primary_keys = schema::primary_keys(&columns);
            }
            scheme = Some(schema::infer_scheme(relation, &index, &columns));
        }

        if primary_keys.is_empty() {
            return Err(SyncError::configuration(
                table,
                "no primary key; document ids cannot be built",
            ));
        }

        Ok(Target {
            table: table.to_string(),
            key: CheckpointKey::new(table, &index, &relation.doc_type),
            index,
            primary_keys,
            scheme,
            match_token: relation.match_token(table),
        })
    }

    /// Run the extraction loop for one concrete table.
    pub async fn run_table(
        &self,
        relation: &Relation,
        table: &str,
    ) -> Result<SubRunReport, SyncError> {
        let target = self.prepare_target(relation, table).await?;
        let sql = SqlGenerator::new(relation, &target.table, &target.primary_keys);
        let mapper = DocumentMapper::new(relation, target.index.clone(), &target.primary_keys)
            .with_match_token(target.match_token.clone())
            .with_scheme(target.scheme.as_ref());
        let aliases = relation.increment_aliases();

        let mut cursor = self.checkpoints.read_cursor(&target.key).await;
        let mut report = SubRunReport::new(table, &target.index, &cursor);

        let mut remaining = self
            .count(table, &sql.count_sql(&cursor, Comparator::Greater))
            .await?;
        if remaining == 0 {
            tracing::info!("No new rows in '{table}' after '{cursor}'");
            report.stop = StopReason::NothingNew;
            return Ok(report);
        }

        loop {
            // The cursor moved, so each scan starts at offset 0 of the new window
            let page_sql = if remaining > relation.big_offset_threshold {
                sql.big_offset_page_sql(&cursor, 0)
            } else {
                sql.page_sql(&cursor, 0)
            };
            let rows = self
                .query(table, QueryTimer::start(Step::Page), &page_sql)
                .await?;
            let Some(last) = rows.last() else {
                report.stop = StopReason::Exhausted;
                break;
            };
            report.pages += 1;

            let bulk = self.index_rows(&target, relation, &mapper, &rows).await;
            report.record(&bulk);
            // A page whose rows all lack an id submits nothing and still counts as processed
            if bulk.is_total_failure() {
                return Err(SyncError::total_write_failure(&target.index, bulk.submitted));
            }

            let next = sql::cursor_from_row(last, &aliases);
            if next.is_empty() {
                tracing::warn!(
                    "Last row of '{table}' has no value for {aliases:?}; stopping at cursor '{cursor}'"
                );
                report.stop = StopReason::CursorUnavailable;
                break;
            }
            if next == cursor {
                tracing::warn!("Cursor of '{table}' did not move past '{cursor}'; stopping");
                report.stop = StopReason::Stalled;
                break;
            }
            if !self.checkpoints.advance(&target.key, &next).await {
                return Err(SyncError::checkpoint_io(
                    target.key.to_string(),
                    format!("cursor '{next}' not persisted"),
                ));
            }
            cursor = next;
            report.cursor = cursor.clone();

            // Auto-increment style cursors do not repeat
            if !sql::is_numeric(&cursor) {
                self.tie_sweep(&target, relation, &sql, &mapper, &cursor, &mut report)
                    .await?;
            }

            if rows.len() < relation.limit {
                report.stop = StopReason::Exhausted;
                break;
            }
            remaining = remaining.saturating_sub(rows.len() as u64);
        }

        Ok(report)
    }

    /// Re-deliver every row whose increment value equals `cursor`.
    async fn tie_sweep(
        &self,
        target: &Target,
        relation: &Relation,
        sql: &SqlGenerator<'_>,
        mapper: &DocumentMapper<'_>,
        cursor: &str,
        report: &mut SubRunReport,
    ) -> Result<(), SyncError> {
        let table = target.table.as_str();
        let ties = self
            .count(table, &sql.count_sql(cursor, Comparator::Equal))
            .await?;
        let limit = relation.limit as u64;
        let threshold = relation.big_offset_threshold;

        let mut offset = 0;
        while offset < ties {
            let tie_sql = if ties > threshold || offset > threshold {
                sql.big_offset_tie_sql(cursor, offset)
            } else {
                sql.tie_sql(cursor, offset)
            };
            let rows = self
                .query(table, QueryTimer::start(Step::Tie), &tie_sql)
                .await?;
            if rows.is_empty() {
                break;
            }
            report.tie_pages += 1;

            let bulk = self.index_rows(target, relation, mapper, &rows).await;
            report.record(&bulk);
            if bulk.is_total_failure() {
                return Err(SyncError::total_write_failure(&target.index, bulk.submitted));
            }

            if (rows.len() as u64) < limit {
                break;
            }
            offset += limit;
        }
        Ok(())
    }

    async fn index_rows(
        &self,
        target: &Target,
        relation: &Relation,
        mapper: &DocumentMapper<'_>,
        rows: &[SourceRow],
    ) -> BulkReport {
        let documents = mapper.map_rows(rows);
        let timer = QueryTimer::start(Step::Bulk);
        let bulk = submit_documents(
            self.sink.as_ref(),
            &target.index,
            &relation.doc_type,
            &documents,
        )
        .await;

        tracing::info!(
            "{} to '{}': {}/{} documents indexed from {} rows in {} ms",
            timer.step,
            target.index,
            bulk.succeeded,
            bulk.submitted,
            rows.len(),
            timer.elapsed_ms()
        );
        if bulk.failed > 0 && bulk.succeeded > 0 {
            tracing::warn!(
                "{} of {} documents rejected by '{}'; checkpoint still advances",
                bulk.failed,
                bulk.submitted,
                target.index
            );
        }
        bulk
    }

    async fn count(&self, table: &str, sql: &str) -> Result<u64, SyncError> {
        let rows = self
            .query(table, QueryTimer::start(Step::Count), sql)
            .await?;
        rows.first()
            .and_then(SourceRow::first)
            .and_then(|value| value.as_u64())
            .ok_or_else(|| SyncError::query(table, "count returned no value"))
    }

    async fn query(
        &self,
        table: &str,
        timer: QueryTimer,
        sql: &str,
    ) -> Result<Vec<SourceRow>, SyncError> {
        tracing::debug!("{} on '{table}': {sql}", timer.step);
        match self.source.query(sql).await {
            Ok(rows) => {
                tracing::info!(
                    "{} on '{table}': {} rows in {} ms",
                    timer.step,
                    rows.len(),
                    timer.elapsed_ms()
                );
                Ok(rows)
            }
            Err(e) => {
                tracing::warn!(
                    "{} on '{table}' failed after {} ms: {e:#}",
                    timer.step,
                    timer.elapsed_ms()
                );
                Err(SyncError::query(table, e))
            }
        }
    }
}

