//! export-worker: long-running service that
//! - Leases queued export tasks and builds signed archives
//! - Stores them encrypted with a 72h lifetime
//! - Sweeps requests past the retention period

mod state;

use export_worker::Config;
use state::AppState;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "export_worker=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting export-worker (env: {})", config.environment);

    let state = std::sync::Arc::new(AppState::new(&config).await?);
    let shutdown = CancellationToken::new();

    let daemon_handle = {
        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { state.daemon.run(shutdown).await })
    };
    let sweeper_handle = {
        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { state.sweeper.run(shutdown).await })
    };

    shutdown_signal().await;
    tracing::info!("Shutdown requested, finishing current task");
    shutdown.cancel();

    daemon_handle.await?;
    sweeper_handle.await?;
    tracing::info!("export-worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
