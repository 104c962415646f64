//! Tweet Harvester CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tweet_harvester::{
    error::Result,
    models::{Config, FilterMethod, SearchMethod, load_terms},
    pipeline::{self, SearchOptions},
    storage::CheckpointStore,
};

/// Tweet Harvester - resumable tweet search
#[derive(Parser, Debug)]
#[command(
    name = "tweet-harvester",
    version,
    about = "Resumable, rate-limited tweet search harvester"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "harvest.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search every term and store new records
    Search {
        /// How terms become queries: ticker, hashtag or raw
        #[arg(short, long, default_value = "raw")]
        method: SearchMethod,

        /// CSV term list (default: {data_path}/search_terms.csv)
        #[arg(long, default_value = "search_terms.csv")]
        terms_file: PathBuf,

        /// Column of the term list holding the terms
        #[arg(long, default_value = "term")]
        terms_column: String,

        /// Noise filter: none or crypto
        #[arg(short, long, default_value = "none")]
        filter: FilterMethod,

        /// Passes over the term list
        #[arg(short, long, default_value_t = 1)]
        passes: usize,

        /// Small batches, first terms only, stop after the first flush
        #[arg(long)]
        testing: bool,
    },

    /// Drop the configured database from the primary store
    FlushDb,

    /// Validate configuration (and a term list, if given)
    Validate {
        /// CSV term list to check
        #[arg(long)]
        terms_file: Option<PathBuf>,

        #[arg(long, default_value = "term")]
        terms_column: String,
    },

    /// Show saved checkpoints
    Checkpoints,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;
    init_logging(cli.verbose, &config.logging.level);

    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Search {
            method,
            terms_file,
            terms_column,
            filter,
            passes,
            testing,
        } => {
            config.validate()?;
            let options = SearchOptions {
                terms_file,
                terms_column,
                method,
                filter,
                passes,
                testing,
            };
            pipeline::run_search(&config, &options).await?;
        }

        Command::FlushDb => {
            config.validate()?;
            pipeline::run_flush_db(&config).await?;
            log::info!("Flush complete");
        }

        Command::Validate {
            terms_file,
            terms_column,
        } => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            if let Some(path) = terms_file {
                let path = if path.is_absolute() {
                    path
                } else {
                    config.data_path().join(path)
                };
                let terms = load_terms(&path, &terms_column)?;
                log::info!("✓ {} terms in {}", terms.len(), path.display());
            }

            log::info!("All validations passed!");
        }

        Command::Checkpoints => {
            let store = CheckpointStore::new(config.checkpoint_path());
            let checkpoint = store.load().await?;
            log::info!(
                "{} checkpoints in {}",
                checkpoint.len(),
                store.path().display()
            );
            for (term, since_id) in checkpoint.iter() {
                println!("{term}\t{since_id}");
            }
        }
    }

    Ok(())
}
