//! cocoa-trace-server - HTTP service for the cocoa delivery ledger.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cocoa_trace::core::qr::DEFAULT_VERIFY_URL_BASE;
use cocoa_trace::store::{MemoryStore, SqliteStore, Store};
use cocoa_trace::{Ledger, LedgerConfig};
use cocoa_trace_server::AppState;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// cocoa-trace-server - delivery traceability ledger over HTTP
#[derive(Parser, Debug)]
#[command(name = "cocoa-trace-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "COCOA_TRACE_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Path to the ledger database file (`SQLite`)
    #[arg(long, env = "COCOA_TRACE_DB", default_value = "cocoa-trace.db")]
    db: PathBuf,

    /// Keep the ledger in memory; nothing survives a restart
    #[arg(long, env = "COCOA_TRACE_IN_MEMORY")]
    in_memory: bool,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(long, env = "COCOA_TRACE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Prefix of the verify URL printed into QR payloads
    #[arg(long, env = "COCOA_TRACE_VERIFY_URL_BASE", default_value = DEFAULT_VERIFY_URL_BASE)]
    verify_url_base: String,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = LedgerConfig {
        verify_url_base: args.verify_url_base.clone(),
        ..LedgerConfig::default()
    };

    if args.in_memory {
        info!("using in-memory store");
        serve(Ledger::new(MemoryStore::new(), config), args.listen).await
    } else {
        let store = SqliteStore::open(&args.db)
            .with_context(|| format!("failed to open ledger database {}", args.db.display()))?;
        info!(db = %args.db.display(), "opened ledger database");
        serve(Ledger::new(store, config), args.listen).await
    }
}

async fn serve<S: Store + 'static>(ledger: Ledger<S>, listen: SocketAddr) -> Result<()> {
    let tail = ledger.tail().await.context("failed to read chain tail")?;
    info!(
        blocks = tail.as_ref().map_or(0, |b| b.block_number),
        "ledger ready"
    );

    let app = cocoa_trace_server::app(AppState::new(ledger));
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;
    info!(%listen, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
