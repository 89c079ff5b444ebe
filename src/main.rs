//! Data Fabric
//!
//! Runs one ingester per configured source against a shared document store.

use clap::{Parser, Subcommand};
use data_fabric::{
    config::{Config, StorageBackend},
    ingester::{HttpJsonSource, Ingester},
    notify::{AlertSink, LogAlertSink, TelegramAlertSink},
    storage::{DocumentStore, MemoryStore, SqliteStore},
};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "data-fabric")]
#[command(about = "Ingest market, chain, macro and news feeds into a document store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (searches the default locations when omitted)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all ingesters until Ctrl-C
    Run {
        /// Run a single cycle per source and exit
        #[arg(long)]
        once: bool,
    },
    /// Validate the configuration and exit
    CheckConfig,
    /// List configured sources with their effective settings
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    init_logging(&config)?;
    config.validate()?;

    match cli.command {
        Commands::Run { once } => run(config, once).await,
        Commands::CheckConfig => {
            println!("Configuration OK: {} source(s)", config.sources.len());
            Ok(())
        }
        Commands::Sources => {
            show_sources(&config);
            Ok(())
        }
    }
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.system.log_level))
    };

    let file_layer = match &config.system.log_file {
        Some(path) => {
            let path = shellexpand::tilde(path).into_owned();
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();

    Ok(())
}

async fn run(config: Config, once: bool) -> anyhow::Result<()> {
    tracing::info!("Starting data fabric ({})", config.system.environment);

    // one store handle for the whole process
    let store: Arc<dyn DocumentStore> = match config.storage.backend {
        StorageBackend::Sqlite => {
            let path = shellexpand::tilde(&config.storage.path).into_owned();
            Arc::new(SqliteStore::connect(path).await?)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage - documents are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let alerts: Arc<dyn AlertSink> = match &config.alerts.telegram {
        Some(telegram) => Arc::new(TelegramAlertSink::new(
            telegram.bot_token.clone(),
            telegram.chat_id.clone(),
        )),
        None => Arc::new(LogAlertSink),
    };

    let mut ingesters = Vec::with_capacity(config.sources.len());
    for source_config in &config.sources {
        let settings = config.settings_for(source_config);
        let source = Arc::new(HttpJsonSource::from_config(source_config));
        let ingester = Ingester::new(settings, source, Arc::clone(&store), Arc::clone(&alerts))?;
        ingesters.push(Arc::new(ingester));
    }

    if once {
        let results = futures_util::future::join_all(
            ingesters.iter().map(|ingester| ingester.run_cycle()),
        )
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        for (ingester, result) in ingesters.iter().zip(&results) {
            match result {
                Ok(id) => println!("{:<20} ok      {}", ingester.name(), id),
                Err(e) => println!("{:<20} FAILED  {}", ingester.name(), e),
            }
        }
        if failed > 0 {
            anyhow::bail!("{} of {} source(s) failed", failed, ingesters.len());
        }
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut handles = Vec::with_capacity(ingesters.len());
    for ingester in &ingesters {
        let ingester = Arc::clone(ingester);
        let shutdown = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move { ingester.run(shutdown).await }));
    }

    tracing::info!("{} ingester(s) running. Press Ctrl-C to stop.", handles.len());
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(());

    for handle in futures_util::future::join_all(handles).await {
        if let Err(e) = handle {
            tracing::error!("Ingester task panicked: {}", e);
        }
    }

    for ingester in &ingesters {
        let stats = ingester.stats();
        tracing::info!(
            "{}: {} ok, {} failed, {} alert(s)",
            ingester.name(),
            stats.cycles_succeeded,
            stats.cycles_failed,
            stats.alerts_raised
        );
    }

    Ok(())
}

fn show_sources(config: &Config) {
    println!(
        "\n{:<16} {:<16} {:>8} {:>8} {:>8} {:>10} {:>8}",
        "Source", "Collection", "Req/Win", "Window", "Retries", "Base delay", "Alert@"
    );
    println!("{}", "-".repeat(80));

    for source in &config.sources {
        let s = config.settings_for(source);
        println!(
            "{:<16} {:<16} {:>8} {:>7}s {:>8} {:>8}ms {:>8}",
            s.source_name,
            s.collection,
            s.max_requests_per_window,
            s.rate_limit_window.as_secs(),
            s.max_retries,
            s.retry_base_delay.as_millis(),
            s.max_errors_before_alert
        );
    }
}
