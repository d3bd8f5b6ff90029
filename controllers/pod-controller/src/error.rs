//! Controller-specific error types.
//!
//! This module defines error types specific to the Pod Controller
//! that are not covered by upstream library errors.

use controller_config::ConfigError;
use informer::InformerError;
use kube::Error as KubeError;
use std::time::Duration;
use thiserror::Error;

/// Errors a resource handler can report for one reconciliation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The object is missing data the handler needs
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// A dependency was temporarily unavailable; retrying may help
    #[error("Transient failure: {0}")]
    #[allow(dead_code)] // Reserved for handlers that call out to other services
    Transient(String),
}

/// Errors from reconciling one event.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The resource handler failed
    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),
}

/// Errors that can occur in the Pod Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Static configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid runtime setting
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The informer stopped
    #[error("Resource watch failed: {0}")]
    Informer(#[from] InformerError),

    /// The cache did not sync before the startup deadline
    #[error("Timed out after {0:?} waiting for caches to sync")]
    CacheSyncTimeout(Duration),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Health/metrics server error
    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),

    /// A background task panicked or was aborted
    #[error("Task failed: {0}")]
    Join(String),
}
