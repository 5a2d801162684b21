//! ChilliBot server
//!
//! Provisions the disease model, then serves the LINE webhook.

use anyhow::Result;
use chillibot_server::{create_router, AppState, BotConfig, Cli};
use chillibot_vision::ModelProvisioner;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting ChilliBot server");

    let config = BotConfig::load(&cli.config, &cli)?;
    info!("Configuration loaded successfully");
    info!("Model source: {}", config.model.source.describe());
    info!("Model path: {}", config.model.local_path.display());
    if config.server.public_base_url.is_none() {
        info!("No public_base_url configured, replies will not include images");
    }

    let metrics_handle = init_metrics()?;

    // Provision before binding so the first webhook sees the final state
    let provisioner =
        ModelProvisioner::with_url_guard(config.model.clone(), config.model_source.url_guard())?;
    let model = provisioner.ensure_available().await;
    match model.unavailable_reason() {
        None => info!("Model ready ({})", model.source().describe()),
        Some(reason) => warn!("Model unavailable, serving in degraded mode: {}", reason),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.listen, config.server.port).parse()?;
    let state = AppState::new(config, model, metrics_handle)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("chillibot_server=debug,chillibot_vision=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("chillibot_server=info,chillibot_vision=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "chillibot_webhook_events_total",
        "Webhook events received by kind"
    );
    metrics::describe_counter!(
        "chillibot_webhook_rejected_total",
        "Webhook deliveries rejected by reason"
    );
    metrics::describe_counter!("chillibot_replies_total", "LINE replies by outcome");
    metrics::describe_counter!(
        "chillibot_classifications_total",
        "Image classifications by outcome"
    );
    metrics::describe_histogram!(
        "chillibot_inference_latency_us",
        metrics::Unit::Microseconds,
        "Image classification latency in microseconds"
    );
    metrics::describe_counter!(
        "chillibot_model_provision_total",
        "Model provisioning attempts by outcome"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
