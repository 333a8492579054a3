use stats_tracker::autosave::{shutdown_signal, spawn_autosave};
use stats_tracker::config::Config;
use stats_tracker::kv::FileStore;
use stats_tracker::{AppState, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::fs;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    fs::create_dir_all(&config.data_path).await?;
    let storage = FileStore::open(&config.data_path, config.storage_quota)?;
    info!("storing data in {}", storage.dir().display());

    let state = AppState::load(Arc::new(storage), &config).await?;
    let autosave = spawn_autosave(state.clone(), config.autosave_interval);

    let app = router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    autosave.abort();
    Ok(())
}
