//! Input Watch Controller
//!
//! Watches the resources declared by a set of owners (kind + optional
//! namespace + optional name) and reconciles every matching change:
//! - One watch stream per distinct resource kind, shared by every selector
//! - Changes are filtered per selector and queued per object
//! - Reconciling starts only after every watch cache has synced

mod backoff;
mod config;
mod controller;
mod error;
mod logging;
mod metrics;
mod queue;
mod reconciler;
mod server;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let config = ControllerConfig::from_env()?;
    logging::init(&config.log_level, config.log_format)?;

    // kube's rustls-tls needs a process-wide crypto provider; an already
    // installed provider is fine
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting Input Watch Controller");
    info!("Configuration:");
    info!(
        "  Input resources: {}",
        config
            .input_resources_file
            .as_deref()
            .map_or_else(|| "built-in".to_string(), |p| p.display().to_string())
    );
    info!("  Kind resolver: {:?}", config.kind_resolver);
    info!("  Event channel capacity: {}", config.event_channel_capacity);
    info!("  Cache sync timeout: {:?}", config.cache_sync_timeout);
    match config.metrics_port {
        Some(port) => info!("  Metrics port: {}", port),
        None => info!("  Metrics server disabled"),
    }

    metrics::register_metrics()?;

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
