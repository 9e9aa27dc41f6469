use std::{fs::OpenOptions, future::Future, io, path::{Path, PathBuf}, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use justrun_data_management::{local_store::FileStore, session_store::SessionPersistence, step_cache::DailyStepCache, DataManager, LOCAL_STORE_DIR};
use justrun_lib::clock::SystemClock;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracker::{
    actor::spawn_tracker,
    config::TrackerConfig,
    jog_store::LocalJogStore,
    replay::replay_gpx_file,
    routes::router,
    runtime::{FixFeed, PushLocationProvider},
    server_state::ServerState,
};

#[derive(Parser)]
struct Cli {
    /// Path to a `key = value` config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tracking service
    Serve,
    /// Feed a recorded GPX file through the tracker
    Replay {
        file: PathBuf,
        /// Report only, do not save the jog
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = TrackerConfig::load(cli.config.as_deref())?;
    let data_dir = config.resolved_data_dir();

    match cli.command {
        Command::Serve => {
            init_logging(Some(data_dir.as_path()))?;
            warn_unknown_keys(&config);
            serve(config, data_dir).await
        }
        Command::Replay { file, dry_run } => {
            init_logging(None)?;
            warn_unknown_keys(&config);

            let store = if dry_run {
                None
            } else {
                let data_manager = DataManager::open(&data_dir).await?;
                Some(LocalJogStore::new(data_manager, config.user_id.clone()))
            };

            let summary = replay_gpx_file(&file, config.controller_settings(), store.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn init_logging(data_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into());

    let file_layer = match data_dir {
        Some(data_dir) => {
            let log_dir = data_dir.join("log");
            std::fs::create_dir_all(&log_dir).with_context(|| format!("Failed to create {:?}", log_dir))?;

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join("tracker.log"))?;
            Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

fn warn_unknown_keys(config: &TrackerConfig) {
    for key in &config.unknown_keys {
        tracing::warn!("Unknown config key: {}", key);
    }
}

async fn serve(config: TrackerConfig, data_dir: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Starting tracker...");

    let data_manager = DataManager::open(&data_dir).await?;
    let local_store = data_dir.join(LOCAL_STORE_DIR);

    let fixes = FixFeed::new();
    let (tracker, tracker_task) = spawn_tracker(
        PushLocationProvider::new(fixes.clone()),
        SessionPersistence::new(FileStore::open(&local_store)?, SystemClock),
        config.controller_settings(),
        LocalJogStore::new(data_manager.clone(), config.user_id.clone()),
    );

    let server_state = Arc::new(ServerState {
        tracker: tracker.clone(),
        fixes,
        data_manager,
        step_cache: Mutex::new(DailyStepCache::new(FileStore::open(&local_store)?)),
        user_id: config.user_id.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(server_state))
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await?;

    tracing::info!("Shutting down");
    tracker.shutdown().await?;
    tracker_task.await?;

    Ok(())
}

/// Resolves when `signal` fires. A signal that cannot be registered never
/// resolves, so the server keeps running instead of stopping at once.
async fn shutdown_signal(signal: impl Future<Output = io::Result<()>>) {
    if let Err(err) = signal.await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
