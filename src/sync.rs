//! Orchestrator: runs every relation once per scheduled cycle.
//!
//! Each cycle fans the relations out to a bounded worker pool. Relations are
//! independent; one failing never cancels the others. A cycle is awaited
//! until its timeout, after which the summary is logged and workers still
//! running are left to finish (and checkpoint) on their own.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use mysql_increment_source::{Extractor, RelationReport};
use sync_core::{Relation, SyncError};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Outcome of one cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Relations whose worker finished in time
    pub relations: Vec<RelationReport>,
    /// Relation keys whose worker panicked, with the panic message
    pub crashed: Vec<(String, String)>,
    /// Relation keys still running when the cycle timed out
    pub pending: Vec<String>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.crashed.is_empty()
            && self.pending.is_empty()
            && self.relations.iter().all(RelationReport::is_success)
    }

    /// Documents acknowledged by the relations that finished.
    pub fn indexed(&self) -> usize {
        self.relations.iter().map(RelationReport::indexed).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.relations.iter().filter(|r| r.is_success()).count()
    }

    pub fn total(&self) -> usize {
        self.relations.len() + self.crashed.len() + self.pending.len()
    }

    pub fn log_summary(&self) {
        info!(
            "Cycle finished in {} ms: {}/{} relations succeeded, {} documents indexed",
            self.elapsed.as_millis(),
            self.succeeded(),
            self.total(),
            self.indexed()
        );
        for report in &self.relations {
            if report.is_success() {
                info!("  {}: ok ({} documents)", report.relation, report.indexed());
                continue;
            }
            for (table, e) in report.errors() {
                error!("  {}: {table} failed [{}]: {e}", report.relation, e.kind());
            }
        }
        for (key, message) in &self.crashed {
            error!("  {key}: worker crashed: {message}");
        }
        for key in &self.pending {
            warn!("  {key}: still running when the cycle timed out");
        }
    }
}

/// Drives the extraction engine over the configured relations.
#[derive(Clone)]
pub struct Orchestrator {
    extractor: Extractor,
    workers: usize,
    cycle_timeout: Duration,
}

impl Orchestrator {
    pub fn new(extractor: Extractor, workers: usize, cycle_timeout: Duration) -> Self {
        Self {
            extractor,
            workers: workers.max(1),
            cycle_timeout,
        }
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Create indexes and mappings for relations that manage their own.
    ///
    /// Failures are logged and returned; they do not stop the others.
    pub async fn create_schemas(&self, relations: &[Relation]) -> Vec<(String, SyncError)> {
        let mut failures = Vec::new();
        for relation in relations.iter().filter(|r| r.create_mapping) {
            if let Err(e) = self.extractor.ensure_schema(relation).await {
                error!("Schema creation for '{}' failed: {e}", relation.key());
                failures.push((relation.key(), e));
            }
        }
        failures
    }

    /// Run every relation once on the worker pool and wait for the outcomes.
    pub async fn run_cycle(&self, relations: &[Relation]) -> CycleReport {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.cycle_timeout;
        let semaphore = Arc::new(Semaphore::new(self.workers));

        info!(
            "Starting cycle: {} relations on {} workers",
            relations.len(),
            self.workers
        );

        let mut handles = Vec::with_capacity(relations.len());
        for relation in relations {
            let extractor = self.extractor.clone();
            let relation = relation.clone();
            let semaphore = semaphore.clone();
            let key = relation.key();
            let handle = tokio::spawn(async move {
                // Held until the relation finishes; the semaphore is never closed
                let _permit = semaphore.acquire_owned().await;
                extractor.run_relation(&relation).await
            });
            handles.push((key, handle));
        }

        let mut report = CycleReport::default();
        for (key, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(relation_report)) => report.relations.push(relation_report),
                Ok(Err(e)) => report.crashed.push((key, e.to_string())),
                // Dropping the handle detaches the worker
                Err(_) => report.pending.push(key),
            }
        }
        report.elapsed = started.elapsed();
        report
    }

    /// Run cycles on `schedule` until `shutdown` resolves.
    ///
    /// A cycle in progress when `shutdown` resolves is completed first.
    /// Returns the number of cycles run.
    pub async fn run_scheduled<F>(
        &self,
        relations: &[Relation],
        schedule: &cron::Schedule,
        shutdown: F,
    ) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles = 0;

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Schedule has no upcoming trigger; stopping");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            info!("Next cycle at {next}");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested; no further cycles will start");
                    break;
                }
            }

            self.run_cycle(relations).await.log_summary();
            cycles += 1;
        }

        cycles
    }
}
