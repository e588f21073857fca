//! search-sync library
//!
//! Keeps search indexes up to date with relational tables by repeatedly
//! pulling the rows whose increment column moved past the last checkpoint.
//!
//! # Crates
//!
//! - `sync_core` - Relation descriptors, rows, documents, error taxonomy
//! - `checkpoint` - Cursor persistence, one flat file per key
//! - `search_sink` - Search engine trait and bulk indexer
//! - `elasticsearch_sink` - HTTP implementation of the search engine trait
//! - `mysql_increment_source` - SQL generation and the extraction loop
//!
//! # CLI Usage
//!
//! ```bash
//! # Run on the configured cron schedule until Ctrl-C
//! search-sync run --config search-sync.yaml
//!
//! # One cycle for one relation
//! search-sync once --config search-sync.yaml --relation t_order
//!
//! # Forget a table's cursor so the next cycle starts over
//! search-sync checkpoint reset --config search-sync.yaml --table t_order
//! ```

pub mod config;
pub mod sync;

use std::sync::Arc;

use anyhow::Result;
use checkpoint::{CheckpointManager, FilesystemStore};
use elasticsearch_sink::{ElasticsearchOpts, ElasticsearchSink};
use mysql_increment_source::{new_mysql_pool, Extractor, MySqlRowSource};

pub use config::Config;
pub use sync::{CycleReport, Orchestrator};

/// Checkpoint manager over the configured checkpoint directory.
pub fn checkpoint_manager(config: &Config) -> CheckpointManager {
    let dir = config.checkpoint_config().resolved_dir();
    tracing::info!("Checkpoints stored in {}", dir.display());
    CheckpointManager::new(Arc::new(FilesystemStore::new(dir)))
}

/// Wire the MySQL source, the search sink and the checkpoint store.
///
/// Neither side is contacted here; connection problems surface per relation
/// on the first cycle.
pub fn connect(config: &Config) -> Result<Orchestrator> {
    let pool = new_mysql_pool(&config.mysql.uri)?;
    let sink = ElasticsearchSink::new(&ElasticsearchOpts::from(&config.search))?;

    let extractor = Extractor::new(
        Arc::new(MySqlRowSource::new(pool)),
        Arc::new(sink),
        checkpoint_manager(config),
    );
    Ok(Orchestrator::new(
        extractor,
        config.workers(),
        config.cycle_timeout()?,
    ))
}
