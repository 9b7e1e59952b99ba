use anyhow::{Context, Result};
use concierge_app::{bootstrap, config, server};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    #[cfg(feature = "prometheus")]
    {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus exporter listening on 0.0.0.0:9000");
    }

    let args: Vec<String> = std::env::args().collect();
    let path = config::config_path(&args, std::env::var("CONCIERGE_CONFIG").ok());
    let config = config::AppConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    let state = bootstrap::bootstrap(&config).await?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "Concierge listening");

    axum::serve(listener, server::router(Arc::new(state)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
