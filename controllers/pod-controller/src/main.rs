//! Pod Controller
//!
//! Level-triggered controller for Pods: an informer mirrors Pods into a local
//! cache, every observed change becomes a work item in a deduplicating,
//! rate-limited queue, and a pool of workers reconciles each item against the
//! cache's current state, retrying failures a bounded number of times.

mod controller;
mod error;
mod event;
mod handler;
mod inventory;
mod metrics;
mod reconciler;
mod retry;
mod server;
mod settings;
#[cfg(test)]
mod test_utils;

use controller::{Controller, ControllerOptions};
use controller_config::read_config;
use handler::PodReporter;
use informer::KubeWatchSource;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use metrics::Metrics;
use retry::RetryPolicy;
use settings::Settings;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use workqueue::default_controller_rate_limiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls backend needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("Crypto provider already installed");
    }

    info!("Starting Pod Controller");

    let settings = Settings::from_env()?;
    info!("Configuration:");
    info!("  Config file: {}", settings.config_file_path.display());
    info!("  Namespace: {}", settings.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Workers: {}", settings.workers);
    info!("  Cache sync timeout: {:?}", settings.cache_sync_timeout);
    info!("  Max retries: {}", settings.max_retries);
    info!("  Metrics address: {}", settings.metrics_addr);

    let config = read_config(&settings.config_file_path)?;
    info!(
        "Loaded configuration {} (deployment {}, {} replicas)",
        config.metadata.name, config.spec.deployment_name, config.spec.replicas
    );

    let client = Client::try_default().await?;
    inventory::log_inventory(client.clone()).await?;

    let pods: Api<Pod> = match settings.namespace.as_deref() {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    let metrics = Arc::new(Metrics::new()?);
    let options = ControllerOptions {
        workers: settings.workers,
        sync_timeout: settings.cache_sync_timeout,
        retry: RetryPolicy::new(settings.max_retries),
        rate_limiter: default_controller_rate_limiter(),
    };
    let controller = Controller::new(
        Box::new(KubeWatchSource::new(pods)),
        PodReporter::new(config),
        options,
        Arc::clone(&metrics),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let server = tokio::spawn(server::serve(
        settings.metrics_addr,
        metrics,
        controller.sync_handle(),
        shutdown.clone(),
    ));

    let result = controller.run(shutdown.clone()).await;

    // Stop the health server as well if the controller stopped on its own
    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Health server failed: {}", e),
        Err(e) => error!("Health server task failed: {}", e),
    }

    result?;
    info!("Pod Controller stopped");
    Ok(())
}

/// Cancels `shutdown` on Ctrl-C or SIGTERM.
async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
    shutdown.cancel();
}
