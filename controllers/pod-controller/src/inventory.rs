//! One-shot cluster inventory logged at startup.

use crate::error::ControllerError;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tracing::info;

/// Lists every node and every pod in the cluster once and logs their names.
///
/// # Errors
///
/// Returns [`ControllerError::Kube`] if either list call fails.
pub async fn log_inventory(client: Client) -> Result<(), ControllerError> {
    let nodes = Api::<Node>::all(client.clone())
        .list(&ListParams::default())
        .await?;
    info!("Nodes in cluster ({}):", nodes.items.len());
    for node in &nodes.items {
        info!("  {}", node.name_any());
    }

    let pods = Api::<Pod>::all(client)
        .list(&ListParams::default())
        .await?;
    info!("Pods in cluster ({}):", pods.items.len());
    for pod in &pods.items {
        info!("  {}/{}", pod.namespace().unwrap_or_default(), pod.name_any());
    }

    Ok(())
}
