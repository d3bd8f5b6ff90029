//! Configuration document
//!
//! Kubernetes-style YAML document:
//!
//! ```yaml
//! apiVersion: podcontroller.microscaler.io/v1alpha1
//! kind: PodController
//! metadata:
//!   name: pod-controller
//! spec:
//!   deploymentName: web
//!   replicas: 3
//! ```
//!
//! Keys are camelCase; the all-lowercase spellings (`apiversion`,
//! `deploymentname`) written by older tooling are accepted too.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Document schema version
    #[serde(alias = "apiversion")]
    pub api_version: String,

    /// Document kind
    pub kind: String,

    /// Identifying metadata
    pub metadata: MetaData,

    /// Controller settings
    pub spec: Specifications,
}

/// Identifying metadata of the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaData {
    /// Name of this controller instance
    pub name: String,
}

/// What the controller should look after.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Specifications {
    /// Deployment whose pods the controller reports as managed
    #[serde(alias = "deploymentname")]
    pub deployment_name: String,

    /// Expected replica count of that deployment
    #[serde(default)]
    pub replicas: i32,
}

impl Configuration {
    /// Parses a configuration document from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid document.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(source).map_err(ConfigError::Parse)
    }

    /// Renders the configuration as YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::Serialize)
    }

    /// Returns true if `pod_name` looks like a pod of the configured deployment
    /// (`<deploymentName>-<replicaset hash>-<pod hash>`).
    #[must_use]
    pub fn owns_pod(&self, pod_name: &str) -> bool {
        let deployment = self.spec.deployment_name.as_str();
        !deployment.is_empty()
            && pod_name
                .strip_prefix(deployment)
                .is_some_and(|rest| rest.starts_with('-'))
    }
}

/// Reads and parses the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if its content is not a valid document.
pub fn read_config(path: impl AsRef<Path>) -> Result<Configuration, ConfigError> {
    let path = path.as_ref();
    debug!("Reading configuration from {}", path.display());
    let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Configuration::from_yaml(&source)
}

/// Writes `config` as YAML to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`ConfigError::Serialize`] or [`ConfigError::Io`].
pub fn write_config(config: &Configuration, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let yaml = config.to_yaml()?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
