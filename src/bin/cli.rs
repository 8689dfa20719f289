//! image-ingest CLI
//!
//! Runs the HTTP service, or a single pipeline operation locally.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use image_ingest::{
    App,
    error::{AppError, Result},
    logging,
    models::{AppConfig, RecordsBackend, ResourceId},
    records::JsonRecordStore,
    server,
};

/// Image ingestion and serving URL service
#[derive(Parser, Debug)]
#[command(
    name = "image-ingest",
    version,
    about = "Ingests external images and keeps their serving URLs in sync"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service and queue worker
    Serve {
        /// Address to bind (default: server.bind from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ingest one image synchronously
    Ingest {
        /// Resource id
        #[arg(long)]
        id: String,

        /// Source URL, or the resource's storage key to re-mint
        #[arg(long)]
        source: String,
    },

    /// Revoke the serving URL and delete the stored image
    Delete {
        #[arg(long, required = true)]
        id: Vec<String>,

        /// Deletions run at the same time
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Show the link fields recorded for a resource
    Show {
        #[arg(long)]
        id: String,
    },

    /// Create empty records in the JSON record store
    Register {
        #[arg(long, required = true)]
        id: Vec<String>,
    },

    /// Validate the configuration file
    Validate,
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(path)?;
    config.apply_env();
    Ok(config)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    logging::init(level, cli.json || config.logging.json)?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let app = Arc::new(App::build(Arc::new(config)).await?);
            let worker = app.start_worker();

            server::serve(app, &bind).await?;

            if let Some(worker) = worker {
                worker.shutdown().await;
            }
        }

        Command::Ingest { id, source } => {
            let app = App::build(Arc::new(config)).await?;
            let serving_url = app.ingest.ingest(&id, &source).await?;
            println!("{serving_url}");
        }

        Command::Delete { id, concurrency } => {
            let app = App::build(Arc::new(config)).await?;
            let mut first_error = None;
            for (id, result) in app.delete.delete_many(&id, concurrency).await {
                match result {
                    Ok(()) => tracing::info!("Deleted image for {}", id),
                    Err(e) => {
                        tracing::error!("Deleting image for {} failed: {}", id, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Command::Show { id } => {
            let app = App::build(Arc::new(config)).await?;
            let id = ResourceId::parse(&id)?;
            match app.adapters.records.get_link(&id).await? {
                Some(link) => println!("{}", serde_json::to_string_pretty(&link)?),
                None => return Err(AppError::not_found(format!("record {id}"))),
            }
        }

        Command::Register { id } => {
            if config.records.backend != RecordsBackend::Json {
                return Err(AppError::config(
                    "register only applies to the json record store",
                ));
            }
            let ids = id
                .iter()
                .map(|raw| ResourceId::parse(raw))
                .collect::<Result<Vec<_>>>()?;
            let store = JsonRecordStore::open(&config.records.path).await?;
            store.ensure_records(&ids).await?;
            tracing::info!(
                "Registered {} records in {}",
                ids.len(),
                config.records.path.display()
            );
        }

        Command::Validate => {
            config.validate()?;
            tracing::info!(
                storage = ?config.storage.backend,
                records = ?config.records.backend,
                "Configuration OK ({})",
                cli.config.display()
            );
        }
    }

    Ok(())
}
