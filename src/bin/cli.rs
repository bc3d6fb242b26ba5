//! schedwatch CLI
//!
//! Runs the sync pipeline on a schedule or once, and manages subscriptions
//! in the local record store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use schedwatch::{
    error::{AppError, Result},
    models::{Config, GatewayKind, RecordId, SubscriberId},
    pipeline::SyncPipeline,
    services::{DocumentLister, LogGateway, MessagingGateway, SourceLister},
    storage::{DocumentStore, LocalStore},
    utils::http,
};

/// schedwatch - schedule change watcher
#[derive(Parser, Debug)]
#[command(
    name = "schedwatch",
    version,
    about = "Watches published schedules and notifies subscribers of changes"
)]
struct Cli {
    /// Path to storage directory containing config.toml and records
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a pass now and then on every sync interval until Ctrl-C
    Run,

    /// Run a single sync pass
    Sync,

    /// Scrape the listing page and print what was found
    List,

    /// Validate the configuration file
    Validate,

    /// Show stored categories
    Categories,

    /// Show stored documents of one category
    Documents {
        #[arg(long)]
        category: String,
    },

    /// Subscribe someone to a document
    Subscribe {
        #[arg(long)]
        record: String,
        #[arg(long)]
        subscriber: i64,
    },

    /// Cancel a subscription
    Unsubscribe {
        #[arg(long)]
        record: String,
        #[arg(long)]
        subscriber: i64,
    },

    /// Show the documents someone is subscribed to
    Subscriptions {
        #[arg(long)]
        subscriber: i64,
    },

    /// Show storage and configuration info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Resolve a possibly relative path against the storage directory.
fn resolve(storage_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        storage_dir.join(path)
    }
}

fn build_gateway(config: &Config, client: &reqwest::Client) -> Result<Arc<dyn MessagingGateway>> {
    match config.gateway.kind {
        GatewayKind::Log => Ok(Arc::new(LogGateway)),
        #[cfg(feature = "telegram")]
        GatewayKind::Telegram => {
            let token = config
                .gateway
                .bot_token
                .as_deref()
                .ok_or_else(|| AppError::config("gateway.bot_token is required for telegram"))?;
            Ok(Arc::new(schedwatch::services::TelegramGateway::new(
                client.clone(),
                &config.gateway.api_base,
                token,
            )))
        }
        #[cfg(not(feature = "telegram"))]
        GatewayKind::Telegram => {
            let _ = client;
            Err(AppError::config(
                "telegram gateway requested but the 'telegram' feature is disabled",
            ))
        }
    }
}

/// Validate the config and wire the HTTP-backed pipeline to the local store.
async fn build_pipeline(config: &Config, records_dir: &Path) -> Result<SyncPipeline> {
    config.validate()?;
    let client = http::create_client(&config.fetcher)?;
    let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::open(records_dir).await?);
    let gateway = build_gateway(config, &client)?;
    SyncPipeline::from_config(config, client, store, gateway)
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Ctrl-C received");
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = Config::load_or_default(&config_path);
    config.apply_env();
    config.renderer.artifact_dir = resolve(&cli.storage_dir, &config.renderer.artifact_dir);
    let records_dir = config
        .storage
        .root_dir
        .as_deref()
        .map(|dir| resolve(&cli.storage_dir, dir))
        .unwrap_or_else(|| cli.storage_dir.clone());

    log::info!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Command::Run => {
            let pipeline = build_pipeline(&config, &records_dir).await?;
            log::info!(
                "Syncing every {}s, records expire after {}s",
                config.sync.interval_secs,
                config.sync.ttl_secs
            );
            pipeline
                .run_scheduled(config.sync.interval(), shutdown_signal())
                .await;
        }

        Command::Sync => {
            let pipeline = build_pipeline(&config, &records_dir).await?;
            pipeline.run_pass_now().await?;
        }

        Command::List => {
            let client = http::create_client(&config.fetcher)?;
            let lister = SourceLister::new(client, config.source.clone());
            for d in lister.list_documents().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    d.category_id, d.category_label, d.display_name, d.source_url
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }

        Command::Categories => {
            let store = LocalStore::open(&records_dir).await?;
            for category in store.list_categories().await? {
                println!("{}\t{}", category.id, category.label);
            }
        }

        Command::Documents { category } => {
            let store = LocalStore::open(&records_dir).await?;
            let records = store.list_by_category(&category).await?;
            if records.is_empty() {
                log::warn!("No documents in category '{}'", category);
            }
            for record in records {
                println!(
                    "{}\t{}\t{}",
                    record.id, record.display_name, record.source_url
                );
            }
        }

        Command::Subscribe { record, subscriber } => {
            let store = LocalStore::open(&records_dir).await?;
            let id = RecordId::from(record.as_str());
            if store.find_by_id(&id).await?.is_none() {
                return Err(AppError::validation(format!("no record with id {id}")));
            }
            if store.add_subscriber(&id, SubscriberId(subscriber)).await? {
                log::info!("Subscribed {} to {}", subscriber, id);
            } else {
                log::info!("{} is already subscribed to {}", subscriber, id);
            }
        }

        Command::Unsubscribe { record, subscriber } => {
            let store = LocalStore::open(&records_dir).await?;
            let id = RecordId::from(record.as_str());
            if store.remove_subscriber(&id, SubscriberId(subscriber)).await? {
                log::info!("Unsubscribed {} from {}", subscriber, id);
            } else {
                log::info!("{} was not subscribed to {}", subscriber, id);
            }
        }

        Command::Subscriptions { subscriber } => {
            let store = LocalStore::open(&records_dir).await?;
            for record in store.list_by_subscriber(SubscriberId(subscriber)).await? {
                println!(
                    "{}\t{}\t{}",
                    record.id, record.category_label, record.display_name
                );
            }
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            log::info!("Records directory: {}", records_dir.display());
            log::info!("Artifacts: {}", config.renderer.artifact_dir.display());
            log::info!("Listing: {}", config.source.listing_url);
            log::info!(
                "Interval: {}s, TTL: {}s",
                config.sync.interval_secs,
                config.sync.ttl_secs
            );
            log::info!("Gateway: {:?}", config.gateway.kind);

            let store = LocalStore::open(&records_dir).await?;
            let categories = store.list_categories().await?;
            let mut documents = 0;
            for category in &categories {
                documents += store.list_by_category(&category.id).await?.len();
            }
            log::info!(
                "Stored: {} document(s) in {} categor(ies)",
                documents,
                categories.len()
            );
        }
    }

    Ok(())
}
