use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use castbridge::{Config, Router};
use castcontrol::{CastWatcherFactory, RustCastConnector};

/// Resolves on SIGTERM or Ctrl+C. The router stops the media server on the
/// way out so the port is released.
async fn termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!("Cannot install SIGTERM handler: {}", err);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = term.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the framed message channel; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    info!("castbridge {} starting", env!("CARGO_PKG_VERSION"));

    let router = Router::new(
        config,
        Arc::new(RustCastConnector::new()),
        Arc::new(CastWatcherFactory),
    );

    router
        .run(tokio::io::stdin(), tokio::io::stdout(), termination())
        .await
}
