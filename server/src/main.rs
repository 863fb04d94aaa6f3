use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

use seo_core::config::Config;
use seo_core::search::SearchBackend;
use server::{build_app, spawn_decay_loop, AppState};

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = Config::from_env();
    let backend = SearchBackend::new(&config)?;
    backend.ensure_indices().await?;

    let state = AppState::new(backend, &config);
    let decay_task = spawn_decay_loop(&state);
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = decay_task {
        task.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
}
