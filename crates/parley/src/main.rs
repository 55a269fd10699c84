//! # parley
//!
//! Parley chat server binary. Loads settings, opens the chat store and
//! starts the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use parley_server::{ParleyServer, ServerConfig};
use parley_settings::{ParleySettings, StoreSettings};
use parley_store::{PoolConfig, SqliteStore};

/// How long shutdown waits for live connections to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Parley chat server.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Parley real-time chat server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server until Ctrl-C.
    Serve(ServeArgs),
    /// Register or rename a user so their display name resolves.
    AddUser(AddUserArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (default `~/.parley/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AddUserArgs {
    /// User email, as forwarded by the proxy.
    #[arg(long)]
    email: String,

    /// Display name.
    #[arg(long)]
    name: String,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn load_settings(path: Option<&Path>) -> Result<ParleySettings> {
    match path {
        Some(path) => parley_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => parley_settings::load_settings().context("Failed to load settings"),
    }
}

/// Flag first, then settings. Relative paths resolve under `~/.parley`.
fn resolve_db_path(flag: Option<PathBuf>, store: &StoreSettings) -> PathBuf {
    let path = flag.unwrap_or_else(|| PathBuf::from(&store.db_path));
    if path.is_absolute() {
        path
    } else {
        parley_settings::parley_home().join(path)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_store(path: &Path, store: &StoreSettings) -> Result<SqliteStore> {
    ensure_parent_dir(path)?;
    let config = PoolConfig {
        pool_size: store.pool_size,
        ..PoolConfig::default()
    };
    SqliteStore::open(path, &config)
        .with_context(|| format!("Failed to open database: {}", path.display()))
}

/// Build the server from settings and an opened store.
fn build_server(settings: &ParleySettings, store: SqliteStore) -> ParleyServer {
    let store = Arc::new(store);
    ParleyServer::new(
        ServerConfig::from_settings(&settings.server),
        store.clone(),
        store,
    )
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut settings = load_settings(args.settings.as_deref())?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    parley_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let db_path = resolve_db_path(args.db_path, &settings.store);
    let store = open_store(&db_path, &settings.store)?;
    tracing::info!(path = %db_path.display(), "chat store ready");

    let mut server = build_server(&settings, store);
    match parley_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        origins = ?settings.server.allowed_origins,
        "Parley listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown_gracefully(Some(SHUTDOWN_GRACE)).await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn add_user(args: AddUserArgs) -> Result<()> {
    let settings = load_settings(None)?;
    parley_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let db_path = resolve_db_path(args.db_path, &settings.store);
    let store = open_store(&db_path, &settings.store)?;
    store
        .upsert_user(args.email.trim(), args.name.trim())
        .await
        .context("Failed to save user")?;
    tracing::info!(email = %args.email, name = %args.name, "user saved");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::AddUser(args) => add_user(args).await,
    }
}
