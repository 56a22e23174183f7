// SPDX-License-Identifier: Apache-2.0
//! `theatreos-server`: wires every engine over one storage backend, mounts
//! the HTTP/WS/SSE transport (spec §6), and runs the four background
//! drivers (spec §5) until shutdown.
//!
//! `tracing_subscriber::fmt().with_env_filter(...)` initializes logging;
//! an `axum_server::Handle` drives graceful shutdown on `ctrl_c`/`SIGTERM`.

mod drivers;
mod error;
mod routes;
mod settings;
mod state;
mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use theatreos_storage::postgres::PostgresStorage;
use tracing::info;
use tracing_subscriber::EnvFilter;

use settings::Settings;
use state::AppState;

/// `theatreos-server`: the TheatreOS transport boundary and background
/// driver host.
#[derive(Parser, Debug)]
#[command(author, version, about = "TheatreOS transport boundary and background drivers")]
struct Args {
    /// Run migrations against `DATABASE_URL` before serving.
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("loading configuration from the environment")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let storage = PostgresStorage::connect(&settings.database_url)
        .await
        .context("connecting to storage backend")?;
    if args.migrate {
        storage.migrate().await.context("running migrations")?;
        info!("migrations applied");
    }

    let api_host = settings.api_host.clone();
    let api_port = settings.api_port;
    let state = Arc::new(AppState::new(settings, Arc::new(storage)));

    let drivers = drivers::spawn_all(state.clone());
    let heartbeat = state.realtime.clone().spawn_heartbeat();

    let app = routes::build_router(state);
    let addr: std::net::SocketAddr = format!("{api_host}:{api_port}")
        .parse()
        .with_context(|| format!("parsing bind address {api_host}:{api_port}"))?;

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining background drivers");
        shutdown.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
    });

    info!(%addr, "theatreos-server listening");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("serving HTTP")?;

    heartbeat.abort();
    for driver in drivers {
        driver.abort();
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(?err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
