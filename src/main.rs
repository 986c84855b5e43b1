//! folio CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use folio::{
    commands::{
        cmd_documents, cmd_ingest, cmd_init, cmd_job_status, cmd_query, cmd_refresh, cmd_retry,
        cmd_status, print_documents, print_ingest_report, print_job, print_query_results,
        print_status, DocumentFilter, IngestOptions, QueryOptions,
    },
    config::Config,
    embed::EmbeddingSpace,
    meta::MetaDb,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Document ingestion and hybrid retrieval engine", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize folio configuration and database
    Init {
        /// Base directory (defaults to the platform data dir)
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Ingest a document file
    Ingest {
        /// Path to the file to ingest
        path: PathBuf,

        /// Owner name the document belongs to
        #[arg(short, long)]
        owner: String,

        /// Owner display name (first ingest for this owner)
        #[arg(long)]
        owner_display: Option<String>,

        /// Document slug (defaults to a slugified file name)
        #[arg(long)]
        slug: Option<String>,

        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Embedding space (local or provider)
        #[arg(long, default_value = "local")]
        space: EmbeddingSpace,

        /// Mark the document publicly listable
        #[arg(long)]
        public: bool,
    },

    /// Show system status and the processing job ledger
    Status {
        /// Show a single job instead of the overview
        job_id: Option<String>,
    },

    /// Retry a failed or abandoned processing job
    Retry {
        /// Job ID to retry
        job_id: String,
    },

    /// List documents from the registry
    Documents {
        /// Only documents belonging to this owner
        #[arg(long)]
        owner: Option<String>,

        /// Only documents in this embedding space
        #[arg(long)]
        space: Option<EmbeddingSpace>,

        /// Include soft-disabled documents
        #[arg(long)]
        include_inactive: bool,
    },

    /// Rebuild the document registry snapshot
    Refresh,

    /// Query one or more documents
    Query {
        /// The search query
        query: String,

        /// Document selectors (id or slug), repeatable
        #[arg(short, long = "document", required = true)]
        documents: Vec<String>,

        /// Results per document
        #[arg(short, long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // init does not need an existing config
    if let Commands::Init { base_dir, force } = &cli.command {
        let target = base_dir.clone().or_else(|| {
            cli.config
                .as_ref()
                .and_then(|p| p.parent().map(PathBuf::from))
        });
        cmd_init(target, *force).await?;
        println!("✓ folio initialized");
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = MetaDb::connect(&config.paths.db_file).await?;
    db.init_schema().await?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Ingest {
            path,
            owner,
            owner_display,
            slug,
            title,
            space,
            public,
        } => {
            let options = IngestOptions {
                owner,
                owner_display,
                slug,
                title,
                space,
                public,
            };
            let report = cmd_ingest(&config, &db, &path, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_ingest_report(&report);
            }
        }

        Commands::Status { job_id: Some(job_id) } => {
            let job = cmd_job_status(&db, &job_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                print_job(&job);
            }
        }

        Commands::Status { job_id: None } => {
            let status = cmd_status(&config, &db).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Retry { job_id } => {
            let report = cmd_retry(&config, &db, &job_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_ingest_report(&report);
            }
        }

        Commands::Documents {
            owner,
            space,
            include_inactive,
        } => {
            let filter = DocumentFilter {
                owner,
                space,
                include_inactive,
            };
            let list = cmd_documents(&db, filter).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print_documents(&list);
            }
        }

        Commands::Refresh => {
            let version = cmd_refresh(&db).await?;
            if cli.json {
                println!(r#"{{"registry_version": {}}}"#, version);
            } else {
                println!("✓ Registry refreshed (v{})", version);
            }
        }

        Commands::Query { query, documents, k } => {
            let options = QueryOptions { documents, k };
            let response = cmd_query(&config, &db, &query, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_query_results(&response);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(folio::Error::NotInitialized.into());
    }

    Ok(Config::load(Some(&config_path))?)
}
