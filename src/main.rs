use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use healthguard::api::RestApi;
use healthguard::auth::AuthService;
use healthguard::config::{config_path, load_config, Config};
use healthguard::history::HistoryEngine;
use healthguard::storage::RecordStore;

fn build_api(config: &Config) -> healthguard::error::Result<RestApi> {
    let store = Arc::new(RecordStore::open(&config.storage)?);
    tracing::info!(
        path = %config.storage.path.display(),
        observations = store.count()?,
        "record store opened"
    );

    let history = Arc::new(HistoryEngine::new(Arc::clone(&store), config.history.recent_limit));
    let auth = AuthService::new(Arc::clone(&store), &config.auth);
    Ok(RestApi::new(history, auth))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("healthguard=info")),
        )
        .init();

    let config = load_config(&config_path())?;
    let api = build_api(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    tracing::info!(%addr, "starting server");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let routes = api.routes();
    let (bound, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async move {
        shutdown_rx.await.ok();
        tracing::info!("shutting down server");
    })?;
    tracing::info!(addr = %bound, "listening");

    let server_handle = tokio::spawn(server);

    signal::ctrl_c().await?;
    tracing::info!("ctrl+c received, starting graceful shutdown");
    shutdown_tx.send(()).ok();

    server_handle.await?;
    tracing::info!("server shutdown complete");
    Ok(())
}
