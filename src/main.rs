//! Command-line interface for search-sync
//!
//! # Usage Examples
//!
//! ```bash
//! # Create mappings, then run on the configured schedule until Ctrl-C
//! search-sync run --config search-sync.yaml
//!
//! # One cycle of every relation, overriding the connections
//! MYSQL_URI=mysql://sync:secret@db:3306/shop \
//! SEARCH_ENDPOINT=http://es:9200 \
//!   search-sync once --config search-sync.yaml
//!
//! # Create indexes and mappings only
//! search-sync create-schema --config search-sync.yaml
//!
//! # Inspect or reset the cursor of one matched table
//! search-sync checkpoint show --config search-sync.yaml --table t_order_01 --index t_order
//! search-sync checkpoint reset --config search-sync.yaml --table t_order
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use checkpoint::CheckpointKey;
use clap::{Args, Parser, Subcommand};
use search_sync::{checkpoint_manager, connect, Config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "search-sync")]
#[command(about = "Incrementally replicate relational tables into a search engine")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every subcommand
#[derive(Args, Clone)]
struct ConfigOpts {
    /// Configuration file (.yaml, .yml or .toml)
    #[arg(long, short = 'c', value_name = "PATH")]
    config: PathBuf,

    /// MySQL connection URI, overriding `mysql.uri`
    #[arg(long, env = "MYSQL_URI")]
    mysql_uri: Option<String>,

    /// Search engine endpoint, overriding `search.endpoint`
    #[arg(long, env = "SEARCH_ENDPOINT")]
    search_endpoint: Option<String>,

    /// Checkpoint directory, overriding `checkpoint_dir`
    #[arg(long, value_name = "DIR")]
    checkpoint_dir: Option<PathBuf>,
}

impl ConfigOpts {
    fn load(&self) -> Result<Config> {
        let mut config = Config::from_file(&self.config)?;
        if let Some(uri) = &self.mysql_uri {
            config.mysql.uri = uri.clone();
        }
        if let Some(endpoint) = &self.search_endpoint {
            config.search.endpoint = endpoint.clone();
        }
        if let Some(dir) = &self.checkpoint_dir {
            config.checkpoint_dir = Some(dir.clone());
        }
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", self.config.display()))?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create mappings, then run cycles on the configured schedule until Ctrl-C
    Run {
        #[command(flatten)]
        opts: ConfigOpts,
    },

    /// Run a single cycle and exit
    Once {
        #[command(flatten)]
        opts: ConfigOpts,

        /// Only run relations on this table (or table pattern)
        #[arg(long)]
        relation: Option<String>,
    },

    /// Create indexes and mappings for relations with `create_mapping` set
    CreateSchema {
        #[command(flatten)]
        opts: ConfigOpts,
    },

    /// Inspect or reset stored cursors
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },
}

#[derive(Args, Clone)]
struct CheckpointTarget {
    #[command(flatten)]
    opts: ConfigOpts,

    /// Concrete (matched) table name
    #[arg(long)]
    table: String,

    /// Index name; defaults to the index of the relation configured for the table
    #[arg(long)]
    index: Option<String>,

    /// Document type; defaults to the relation's type
    #[arg(long = "type")]
    doc_type: Option<String>,
}

impl CheckpointTarget {
    fn key(&self, config: &Config) -> Result<CheckpointKey> {
        let relation = config
            .relations
            .iter()
            .find(|r| r.table.eq_ignore_ascii_case(&self.table))
            .or_else(|| config.relations.iter().find(|r| r.match_token(&self.table).is_some()));

        let index = match (&self.index, relation) {
            (Some(index), _) => index.clone(),
            (None, Some(relation)) => relation.index_name(),
            (None, None) => bail!(
                "No relation configured for table '{}'; pass --index explicitly",
                self.table
            ),
        };
        let doc_type = self
            .doc_type
            .clone()
            .or_else(|| relation.map(|r| r.doc_type.clone()))
            .unwrap_or_else(|| sync_core::DEFAULT_DOC_TYPE.to_string());

        Ok(CheckpointKey::new(&self.table, &index, &doc_type))
    }
}

#[derive(Subcommand)]
enum CheckpointCommand {
    /// Print the stored cursor
    Show(CheckpointTarget),
    /// Delete the stored cursor so the next cycle starts from the beginning
    Reset(CheckpointTarget),
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { opts } => {
            let config = opts.load()?;
            let schedule = config.parsed_schedule()?;
            let orchestrator = connect(&config)?;

            orchestrator.create_schemas(&config.relations).await;
            let cycles = orchestrator
                .run_scheduled(&config.relations, &schedule, shutdown_signal())
                .await;
            tracing::info!("Stopped after {cycles} cycles");
        }
        Commands::Once { opts, relation } => {
            let config = opts.load()?;
            let relations = match &relation {
                Some(table) => {
                    let relations = config.relations_for_table(table);
                    if relations.is_empty() {
                        bail!("No relation configured for table '{table}'");
                    }
                    relations
                }
                None => config.relations.clone(),
            };

            let orchestrator = connect(&config)?;
            orchestrator.run_cycle(&relations).await.log_summary();
        }
        Commands::CreateSchema { opts } => {
            let config = opts.load()?;
            let orchestrator = connect(&config)?;
            let failures = orchestrator.create_schemas(&config.relations).await;
            if !failures.is_empty() {
                bail!("{} mapping(s) could not be applied", failures.len());
            }
        }
        Commands::Checkpoint { command } => match command {
            CheckpointCommand::Show(target) => {
                let config = target.opts.load()?;
                let key = target.key(&config)?;
                let cursor = checkpoint_manager(&config).read_cursor(&key).await;
                if cursor.is_empty() {
                    println!("{key}: no checkpoint");
                } else {
                    println!("{key}: {cursor}");
                }
            }
            CheckpointCommand::Reset(target) => {
                let config = target.opts.load()?;
                let key = target.key(&config)?;
                if !checkpoint_manager(&config).reset(&key).await {
                    bail!("Checkpoint {key} could not be deleted");
                }
                println!("{key}: reset");
            }
        },
    }

    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received interrupt signal (Ctrl-C)");
}
