use hololens_server::{metrics, rest, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    info!("Starting HoloLens Communication Server");
    info!("HTTP server: {}", config.http_addr);
    info!("CORS origins: {:?}", config.cors_origins);

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
        std::process::exit(1);
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    if let Err(e) = rest::serve(config, shutdown).await {
        error!("HTTP server error: {}", e);
        std::process::exit(1);
    }

    info!("Shutting down");
}
