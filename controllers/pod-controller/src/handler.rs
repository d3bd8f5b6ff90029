//! Pod reporter.
//!
//! The shipped [`ResourceHandler`]: reports every pod change to the log,
//! listing the pod's containers and whether it belongs to the configured
//! deployment.

use crate::error::HandlerError;
use crate::reconciler::ResourceHandler;
use controller_config::Configuration;
use k8s_openapi::api::core::v1::Pod;
use tracing::info;

/// Logs a report for every reconciled pod.
#[derive(Debug, Clone)]
pub struct PodReporter {
    config: Configuration,
}

impl PodReporter {
    /// Creates a reporter for the given static configuration.
    #[must_use]
    pub fn new(config: Configuration) -> Self {
        Self { config }
    }

    /// Renders the report for a pod that exists.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidObject`] if the pod has no name or no spec.
    pub fn render(&self, pod: &Pod, verb: &str) -> Result<String, HandlerError> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| HandlerError::InvalidObject("pod has no name".to_string()))?;
        let spec = pod
            .spec
            .as_ref()
            .ok_or_else(|| HandlerError::InvalidObject(format!("pod {name} has no spec")))?;

        let mut report = format!("A Pod with name {name} has been {verb}.\n");
        report.push_str(&format!("Containers in Pod {name} :\n"));
        for (index, container) in spec.containers.iter().enumerate() {
            report.push_str(&format!("{}.  {}\n", index + 1, container.name));
        }
        if self.config.owns_pod(name) {
            report.push_str(&format!(
                "Managed by deployment {} ({} replicas expected)",
                self.config.spec.deployment_name, self.config.spec.replicas
            ));
        } else {
            report.push_str("Not managed by this controller");
        }
        Ok(report)
    }

    /// Renders the report for a pod that is gone.
    #[must_use]
    pub fn render_deleted(display_name: &str) -> String {
        format!("A Pod with name {display_name} has been deleted.")
    }
}

#[async_trait::async_trait]
impl ResourceHandler<Pod> for PodReporter {
    async fn on_created(&self, obj: &Pod) -> Result<(), HandlerError> {
        info!("{}", self.render(obj, "created")?);
        Ok(())
    }

    async fn on_updated(&self, obj: &Pod) -> Result<(), HandlerError> {
        info!("{}", self.render(obj, "updated")?);
        Ok(())
    }

    async fn on_deleted(&self, key: &str, display_name: &str) -> Result<(), HandlerError> {
        info!("{} ({})", Self::render_deleted(display_name), key);
        Ok(())
    }
}
