use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use printdesk_agent::GenerativeFallback;
use printdesk_core::config::SessionBackend;
use printdesk_core::{Clock, PrintdeskConfig, SystemClock};
use printdesk_router::{Dispatcher, SupportRouter, UnsupportedTranscriber};
use printdesk_sessions::{MemorySessionStore, SessionStore, SessionSweeper, SqliteSessionStore};

mod app;
mod console;
mod http;
mod provider;

#[derive(Parser)]
#[command(name = "printdesk")]
#[command(about = "Label printer support assistant", long_about = None)]
struct Cli {
    /// Path to printdesk.toml (overrides PRINTDESK_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Chat with the assistant from the terminal
    Console {
        /// Sender identity used for the session
        #[arg(long, default_value = "console")]
        sender: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "printdesk=info,printdesk_router=info,tower_http=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // load config: explicit path > PRINTDESK_CONFIG env > ~/.printdesk/printdesk.toml
    let config_path = cli.config.or_else(|| std::env::var("PRINTDESK_CONFIG").ok());
    let config = PrintdeskConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        PrintdeskConfig::default()
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(&config, clock.clone())?;

    let fallback = GenerativeFallback::new(provider::build_upstreams(&config), &config.fallback);
    let router = Arc::new(SupportRouter::from_config(&config, store.clone(), fallback)?);
    let dispatcher = Arc::new(Dispatcher::new(router, Arc::new(UnsupportedTranscriber)));

    // spawn session sweeper in background
    let sweeper = SessionSweeper::new(
        store.clone(),
        clock,
        std::time::Duration::from_secs(config.sessions.sweep_interval_secs.max(1)),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, dispatcher, store).await?,
        Commands::Console { sender } => console::run(dispatcher, sender.into()).await?,
    }

    // signal sweeper to stop
    let _ = shutdown_tx.send(true);
    let _ = sweeper_task.await;
    Ok(())
}

async fn serve(
    config: PrintdeskConfig,
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn SessionStore>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    if config.gateway.auth_token.is_none() {
        tracing::warn!("gateway.auth_token not set, /v1/messages is unauthenticated");
    }

    let state = Arc::new(app::AppState::new(config, dispatcher, store));
    let router = app::build_router(state);

    info!("printdesk gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

/// Open the configured session backend.
fn build_store(
    config: &PrintdeskConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn SessionStore>> {
    let retention = config.retention()?;
    match config.sessions.backend {
        SessionBackend::Memory => {
            info!(retention_hours = config.sessions.retention_hours, "using in-memory session store");
            Ok(Arc::new(MemorySessionStore::new(clock, retention)))
        }
        SessionBackend::Sqlite => {
            let path = &config.sessions.path;
            ensure_parent_dir(path);
            info!(path = %path, "opening SQLite session store");

            let db = rusqlite::Connection::open(path)?;
            db.execute_batch("PRAGMA journal_mode=WAL;")?;
            Ok(Arc::new(SqliteSessionStore::new(db, clock, retention)?))
        }
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
