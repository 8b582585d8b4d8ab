use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newswatch_core::{storage::Database, AppConfig};

mod commands;

#[derive(Parser)]
#[command(name = "newswatch")]
#[command(author, version, about = "Periodic poller that flags fake news posts for tracked accounts")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll tracked entities on a fixed interval until interrupted
    Run {
        /// Log events instead of publishing them to the queue
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a single polling cycle and exit
    Once {
        /// Log events instead of publishing them to the queue
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage tracked entities
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },
}

#[derive(Subcommand)]
enum EntityAction {
    /// Start tracking an account
    Add {
        /// Numeric Twitter user id
        #[arg(long)]
        twitter_id: String,
        /// Display name for the account
        #[arg(short, long)]
        name: String,
    },
    /// List tracked accounts
    List,
    /// Stop tracking an account
    Remove {
        /// Twitter user id of the account to remove
        twitter_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    // Initialize logging; RUST_LOG takes precedence over the configured level
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Initialize database
    let db = Arc::new(Database::new(&config).await?);

    match cli.command {
        Commands::Run { dry_run } => commands::run::run(db, &config, dry_run).await,
        Commands::Once { dry_run } => commands::once::run(db, &config, dry_run).await,
        Commands::Entity { action } => match action {
            EntityAction::Add { twitter_id, name } => {
                commands::entity::add(&db, &twitter_id, &name).await
            }
            EntityAction::List => commands::entity::list(&db).await,
            EntityAction::Remove { twitter_id } => {
                commands::entity::remove(&db, &twitter_id).await
            }
        },
    }
}
