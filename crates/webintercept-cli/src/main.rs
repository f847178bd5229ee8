//! webintercept binary: wires the repository, event bus, certificate
//! authority, and engine managers together and serves the operator API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use webintercept_api::{router, AppState};
use webintercept_core::tls::CertificateAuthority;
use webintercept_core::{AppConfig, EventBus, MemoryRepository};
use webintercept_intruder::IntruderManager;
use webintercept_proxy::ProxyManager;
use webintercept_scanner::ScannerManager;
use webintercept_sequencer::SequencerManager;
use webintercept_spider::SpiderManager;

#[derive(Parser)]
#[command(name = "webintercept", about = "Web application security testing workbench", version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the operator API (and optionally the proxy) until interrupted
    Serve {
        /// Start the intercepting proxy immediately instead of waiting for
        /// the operator to start it
        #[arg(long)]
        start_proxy: bool,
    },
    /// Print the CA certificate PEM for installation in a trust store
    Certificate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve { start_proxy: false }) {
        Command::Serve { start_proxy } => serve(config, start_proxy).await,
        Command::Certificate => {
            let authority = CertificateAuthority::load_or_create(&config.proxy.cert_dir)
                .context("failed to load or create CA")?;
            println!("{}", authority.ca_cert_pem());
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, start_proxy: bool) -> anyhow::Result<()> {
    let repo = Arc::new(MemoryRepository::new());
    let events = EventBus::default();

    let authority = if config.proxy.tls_mitm {
        Some(Arc::new(
            CertificateAuthority::load_or_create(&config.proxy.cert_dir)
                .context("failed to load or create CA")?,
        ))
    } else {
        None
    };

    let proxy = Arc::new(ProxyManager::new(
        config.proxy.clone(),
        config.limits.clone(),
        repo.clone(),
        events.clone(),
        authority,
    )?);
    if start_proxy {
        let port = proxy.start().await?;
        info!(port, "proxy started");
    }

    let state = AppState {
        repo: repo.clone(),
        events: events.clone(),
        proxy: proxy.clone(),
        intruder: Arc::new(IntruderManager::new(repo.clone(), events.clone())),
        spider: Arc::new(SpiderManager::new(repo.clone(), events.clone())),
        scanner: Arc::new(ScannerManager::new(repo.clone(), events.clone())?),
        sequencer: Arc::new(SequencerManager::new(repo)),
    };

    let bind_addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind operator API on {bind_addr}"))?;
    info!(addr = %bind_addr, "operator API listening");

    axum::serve(listener, router(state, &config.api.cors_origins))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("operator API failed")?;

    proxy.stop().await;
    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("interrupt received, shutting down");
}
