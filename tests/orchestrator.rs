//! Cycle scheduling tests over in-memory source and sink doubles.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::{CheckpointKey, CheckpointManager, FilesystemStore, MemoryStore};
use mysql_increment_source::testing::{InMemoryRowSource, RecordingSink};
use mysql_increment_source::{ColumnDescription, Extractor, RowSource};
use search_sync::Orchestrator;
use sync_core::{Relation, SourceRow, SourceValue};

fn columns() -> Vec<ColumnDescription> {
    vec![
        ColumnDescription::new("id", "bigint(20)", true),
        ColumnDescription::new("name", "varchar(64)", false),
    ]
}

fn row(id: i64) -> SourceRow {
    SourceRow::new()
        .with("id", SourceValue::Int(id))
        .with("name", SourceValue::Text(format!("row-{id}")))
}

fn seeded_source(tables: &[(&str, i64)]) -> Arc<InMemoryRowSource> {
    let source = Arc::new(InMemoryRowSource::new());
    for (table, rows) in tables {
        source.add_table(table, columns());
        for id in 1..=*rows {
            source.insert(table, row(id));
        }
    }
    source
}

fn orchestrator(
    source: Arc<dyn RowSource>,
    sink: Arc<RecordingSink>,
    checkpoints: CheckpointManager,
    workers: usize,
) -> Orchestrator {
    Orchestrator::new(
        Extractor::new(source, sink, checkpoints),
        workers,
        Duration::from_secs(30),
    )
}

fn memory_checkpoints() -> CheckpointManager {
    CheckpointManager::new(Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn test_failing_relation_does_not_cancel_siblings() {
    let source = seeded_source(&[("t_order", 3), ("t_user", 2)]);
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator(source, sink.clone(), memory_checkpoints(), 2);

    let relations = vec![
        Relation::new("t_order", "id"),
        Relation::new("t_missing", "id"),
        Relation::new("t_user", "id"),
    ];
    let report = orchestrator.run_cycle(&relations).await;

    assert!(!report.is_success());
    assert_eq!(report.total(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.indexed(), 5);
    assert!(report.pending.is_empty());
    assert!(report.crashed.is_empty());

    let failed: Vec<_> = report
        .relations
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.relation.as_str())
        .collect();
    assert_eq!(failed, vec!["t_missing->t_missing/_doc"]);

    assert_eq!(sink.document_ids("t_order"), vec!["1", "2", "3"]);
    assert_eq!(sink.document_ids("t_user"), vec!["1", "2"]);
    report.log_summary();
}

#[tokio::test]
async fn test_single_worker_runs_every_relation() {
    let source = seeded_source(&[("t_a", 1), ("t_b", 1), ("t_c", 1)]);
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator(source, sink.clone(), memory_checkpoints(), 1);

    let relations: Vec<_> = ["t_a", "t_b", "t_c"]
        .iter()
        .map(|t| Relation::new(*t, "id"))
        .collect();
    let report = orchestrator.run_cycle(&relations).await;

    assert!(report.is_success());
    assert_eq!(report.succeeded(), 3);
    for table in ["t_a", "t_b", "t_c"] {
        assert_eq!(sink.document_ids(table), vec!["1"]);
    }
}

#[tokio::test]
async fn test_cycles_resume_from_file_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let source = seeded_source(&[("t_order", 2)]);
    let sink = Arc::new(RecordingSink::new());
    let checkpoints = CheckpointManager::new(Arc::new(FilesystemStore::new(dir.path())));
    let orchestrator = orchestrator(source.clone(), sink.clone(), checkpoints.clone(), 4);
    let relations = vec![Relation::new("t_order", "id")];

    orchestrator.run_cycle(&relations).await;
    let key = CheckpointKey::new("t_order", "t_order", "_doc");
    assert_eq!(checkpoints.read_cursor(&key).await, "2");
    let stored = std::fs::read_to_string(dir.path().join(key.file_name())).unwrap();
    assert_eq!(stored.trim(), "2");

    // Nothing new: no bulk request is sent
    let requests = sink.requests().len();
    let report = orchestrator.run_cycle(&relations).await;
    assert_eq!(report.indexed(), 0);
    assert_eq!(sink.requests().len(), requests);

    source.insert("t_order", row(3));
    let report = orchestrator.run_cycle(&relations).await;
    assert_eq!(report.indexed(), 1);
    assert_eq!(checkpoints.read_cursor(&key).await, "3");
    assert!(source
        .statements()
        .contains(&"SELECT * FROM t_order WHERE id > 2 ORDER BY id ASC LIMIT 1000".to_string()));
}

/// Delegates to an in-memory source, stalling statements on one table.
struct SlowSource {
    inner: Arc<InMemoryRowSource>,
    slow_table: &'static str,
}

#[async_trait]
impl RowSource for SlowSource {
    async fn query(&self, sql: &str) -> Result<Vec<SourceRow>> {
        if sql.contains(self.slow_table) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.query(sql).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_cycle_timeout_leaves_slow_relation_pending() {
    let inner = seeded_source(&[("t_fast", 2), ("t_slow", 2)]);
    let sink = Arc::new(RecordingSink::new());
    let source = Arc::new(SlowSource {
        inner,
        slow_table: "t_slow",
    });
    let orchestrator = Orchestrator::new(
        Extractor::new(source, sink.clone(), memory_checkpoints()),
        4,
        Duration::from_secs(60),
    );

    let relations = vec![Relation::new("t_slow", "id"), Relation::new("t_fast", "id")];
    let report = orchestrator.run_cycle(&relations).await;

    assert_eq!(report.pending, vec!["t_slow->t_slow/_doc".to_string()]);
    assert_eq!(report.relations.len(), 1);
    assert_eq!(report.relations[0].relation, "t_fast->t_fast/_doc");
    assert!(!report.is_success());
    assert_eq!(sink.document_ids("t_fast"), vec!["1", "2"]);
    assert!(sink.document_ids("t_slow").is_empty());
}

#[tokio::test]
async fn test_create_schemas_only_for_managed_relations() {
    let source = seeded_source(&[("t_order", 0), ("t_user", 0)]);
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator(source.clone(), sink.clone(), memory_checkpoints(), 2);

    let mut managed = Relation::new("t_order", "id");
    managed.create_mapping = true;
    managed.index = Some("orders".to_string());
    let unmanaged = Relation::new("t_user", "id");
    let mut broken = Relation::new("t_missing", "id");
    broken.create_mapping = true;

    let failures = orchestrator
        .create_schemas(&[managed, unmanaged, broken])
        .await;

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "t_missing->t_missing/_doc");
    assert_eq!(failures[0].1.kind(), "query");

    assert!(sink.has_index("orders"));
    assert!(!sink.has_index("t_user"));
    let mappings = sink.mappings();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].2["properties"]["id"]["type"], "long");
    assert!(!source.statements().contains(&"DESC t_user".to_string()));
}

#[tokio::test]
async fn test_scheduler_stops_before_first_cycle_on_shutdown() {
    let source = seeded_source(&[("t_order", 1)]);
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator(source, sink.clone(), memory_checkpoints(), 1);
    // Yearly trigger; shutdown wins immediately
    let schedule = cron::Schedule::from_str("0 0 0 1 1 *").unwrap();

    let cycles = orchestrator
        .run_scheduled(&[Relation::new("t_order", "id")], &schedule, async {})
        .await;

    assert_eq!(cycles, 0);
    assert!(sink.requests().is_empty());
}

#[tokio::test]
async fn test_scheduler_runs_cycles_until_shutdown() {
    let source = seeded_source(&[("t_order", 2)]);
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = orchestrator(source, sink.clone(), memory_checkpoints(), 1);
    let schedule = cron::Schedule::from_str("* * * * * *").unwrap();

    let cycles = orchestrator
        .run_scheduled(
            &[Relation::new("t_order", "id")],
            &schedule,
            tokio::time::sleep(Duration::from_millis(2500)),
        )
        .await;

    assert!(cycles >= 1);
    assert_eq!(sink.document_ids("t_order"), vec!["1", "2"]);
}
