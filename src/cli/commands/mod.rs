//! CLI parser and dispatch.

mod helpers;
mod init;
mod orchestrate;
mod serve;
mod stages;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "ytpipe")]
#[command(about = "YouTube analytics ETL pipeline")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the run ledger, local objects and DuckDB file
    #[arg(long, global = true, env = "YTPIPE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// DAG selection for `orchestrate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DagChoice {
    /// schema → extract → load → transform
    Etl,
    /// Wait for the ETL DAG, then call the golden endpoint
    Golden,
    /// Both DAGs; every UTC midnight, or once for --date
    Daily,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and run ledger
    Init,

    /// Start the function endpoints and dashboard
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default: server.bind or 127.0.0.1:3030)
        bind: Option<String>,
    },

    /// Create the raw dataset and tables
    Schema {
        /// Drop and recreate existing tables
        #[arg(long)]
        drop_existing: bool,
    },

    /// Extract from the YouTube API and stage the result
    Extract {
        /// Search query
        #[arg(short, long)]
        query: Option<String>,
        /// Maximum number of videos
        #[arg(short, long)]
        max_results: Option<usize>,
        /// Region code for search and categories
        #[arg(long)]
        region_code: Option<String>,
        /// Search order (relevance, date, viewCount, ...)
        #[arg(long)]
        order: Option<String>,
        /// Extract a single table as JSON Lines instead of one batch document
        #[arg(short, long)]
        table: Option<String>,
        /// Comma-separated video ids (single-table mode)
        #[arg(long)]
        video_ids: Option<String>,
        /// Comma-separated channel ids (single-table mode)
        #[arg(long)]
        channel_id: Option<String>,
        /// Run id (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,
        /// Logical date for the object path, YYYYMMDD or YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },

    /// Load staged data into the raw tables
    Load {
        /// Run id the data was staged under
        #[arg(long)]
        run_id: String,
        /// Object name of a staged batch document
        #[arg(long, conflicts_with = "table", required_unless_present = "table")]
        blob: Option<String>,
        /// Table staged by single-table extraction
        #[arg(long)]
        table: Option<String>,
    },

    /// Upsert raw rows into the dimension and fact tables
    Transform {
        /// Logical date, YYYYMMDD or YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Schema, extract, load and transform in one process
    Run {
        /// Search query
        #[arg(short, long)]
        query: Option<String>,
        /// Maximum number of videos
        #[arg(short, long)]
        max_results: Option<usize>,
        /// Run id (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Run DAGs against the function endpoints
    Orchestrate {
        #[arg(value_enum)]
        dag: DagChoice,
        /// Logical date, YYYYMMDD or YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },

    /// Show recent DAG runs from the run ledger
    Status {
        /// Number of DAG runs to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let settings = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            serve::cmd_serve(&settings, &bind).await
        }
        Commands::Schema { drop_existing } => stages::cmd_schema(&settings, drop_existing).await,
        Commands::Extract {
            query,
            max_results,
            region_code,
            order,
            table,
            video_ids,
            channel_id,
            run_id,
            date,
        } => {
            let args = stages::ExtractArgs {
                query,
                max_results,
                region_code,
                order,
                video_ids,
                channel_id,
                run_id,
                date,
            };
            match table {
                Some(table) => stages::cmd_extract_table(&settings, &table, args).await,
                None => stages::cmd_extract(&settings, args).await,
            }
        }
        Commands::Load {
            run_id,
            blob,
            table,
        } => match (blob, table) {
            (Some(blob), _) => stages::cmd_load(&settings, &run_id, &blob).await,
            (None, Some(table)) => stages::cmd_ingest(&settings, &run_id, &table).await,
            (None, None) => anyhow::bail!("one of --blob or --table is required"),
        },
        Commands::Transform { date } => stages::cmd_transform(&settings, date.as_deref()).await,
        Commands::Run {
            query,
            max_results,
            run_id,
        } => stages::cmd_run(&settings, query, max_results, run_id.as_deref()).await,
        Commands::Orchestrate { dag, date } => {
            orchestrate::cmd_orchestrate(&settings, dag, date.as_deref()).await
        }
        Commands::Status { limit } => status::cmd_status(&settings, limit).await,
    }
}
