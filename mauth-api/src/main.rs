//! mauth-api - Mouse-movement identity verification microservice
//!
//! Startup order: arguments, bootstrap TOML, tracing, root folder, database,
//! model store, HTTP server.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mauth_api::{build_router, AppState};
use mauth_core::config::{
    LoggingConfig, RootFolderInitializer, RootFolderResolver, DEFAULT_BIND_ADDRESS, DEFAULT_PORT,
};
use mauth_core::{ArtifactStore, FileArtifactStore};

/// Command-line arguments for mauth-api
#[derive(Parser, Debug)]
#[command(name = "mauth-api")]
#[command(about = "Mouse-movement identity verification service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and model
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on [default: 5790]
    #[arg(short, long, env = "MAUTH_PORT")]
    port: Option<u16>,

    /// Address to bind [default: 127.0.0.1]
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new("mauth-api");
    let toml_config = resolver.toml_config();

    init_tracing(&toml_config.logging)?;

    // Build identity first, before any slow startup step
    info!(
        "Starting mauth-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolver.resolve_with(args.root_folder.as_deref());
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = match mauth_api::db::init_database_pool(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e);
        }
    };

    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FileArtifactStore::new(initializer.model_dir()));
    match artifacts.current_version() {
        Some(version) => info!("Model v{} at {}", version, initializer.artifact_path().display()),
        None => warn!("No trained model yet; /verify-user answers 503 until /train-model succeeds"),
    }

    let state = AppState::new(db_pool, artifacts);
    let app = build_router(state);

    let bind = args
        .bind
        .or(toml_config.bind_address)
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr = format!("{}:{}", bind, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},tower_http=info", logging.level)))
        .context("Invalid log level")?;
    let registry = tracing_subscriber::registry().with(filter);

    match logging.file.as_deref() {
        Some(path) => {
            let file = open_log_file(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
