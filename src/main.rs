mod bootstrap;
mod chain;
mod config;
mod error;
mod payout;
mod store;

#[cfg(test)]
mod testing;

use std::future::Future;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Secrets};

// Initialize logging and tracing
fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "info,pool_payout=debug"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on ctrl-c, or on SIGTERM where the platform has it. The handlers
/// are installed before this returns.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "ctrl-c",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        "ctrl-c"
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    dotenv::dotenv().ok();

    init_tracing(config::debug_from_env());

    info!("🚀 Starting pool payout engine");

    let config = Config::load()?;
    let secrets = Secrets::from_env()?;

    let service = bootstrap::initialize_payout_service(&config, &secrets).await?;

    let shutdown = shutdown_signal()?;
    let handle = service.scheduler.start();
    info!(
        "🌐 Payout engine running (ready: {})",
        service.orchestrator.is_ready()
    );

    let signal = shutdown.await;
    info!("🛑 Shutdown requested ({})", signal);

    if service.orchestrator.is_busy() {
        info!(
            "Waiting for payout cycle in {:?} to finish",
            service.orchestrator.state()
        );
    }
    handle.stop().await;

    info!(
        "👋 Payout engine stopped after {} cycle(s), {} dropped trigger(s)",
        service.orchestrator.cycles_run(),
        service.orchestrator.dropped_triggers()
    );
    Ok(())
}
