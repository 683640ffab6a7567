use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use arena_room_core::config::ServerConfig;
use arena_room_core::metrics::{self, Metrics};
use arena_room_core::net::game_session::{start_game_loop, GameSession, IdleSimulation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Arena Room Core v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: room {} at {}, {} Hz, sync {}",
        config.server_id,
        config.server_endpoint,
        config.tick_rate,
        if config.sync_secret.is_empty() { "disabled" } else { "enabled" }
    );

    let metrics = Arc::new(Metrics::new());

    #[cfg(feature = "metrics_extended")]
    {
        let metrics_clone = metrics.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    // The socket transport feeds the session through this sender
    let (session, _events) = GameSession::new(&config, metrics.clone(), Instant::now());
    let game_loop = start_game_loop(session, IdleSimulation, config.tick_rate);

    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = game_loop => {
            if let Err(e) = result {
                error!("Game loop stopped: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped");
    Ok(())
}
