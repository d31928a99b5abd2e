//! Hearth Node - keeps a local replica and syncs it with peers.

use hearth_node::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth_node=debug,hearth_engine=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        data_dir = %config.data_dir.display(),
        peers = config.peers.len(),
        "Starting Hearth node on {}:{}",
        config.host,
        config.port
    );

    let addr = config.addr();
    let (state, runtime) = hearth_node::build(config)?;
    let handle = state.handle.clone();
    let connections = state.connections.clone();
    let sync_loop = tokio::spawn(runtime.run());

    let app = hearth_node::app(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Node listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
            connections.close_all();
            if handle.shutdown().await.is_err() {
                tracing::warn!("Sync loop already stopped");
            }
        })
        .await?;

    sync_loop.await?;
    Ok(())
}
