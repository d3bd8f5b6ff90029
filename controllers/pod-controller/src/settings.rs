//! Runtime settings read from environment variables.

use crate::error::ControllerError;
use crate::retry::MAX_RETRIES;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_FILE_PATH: &str = "yaml/sample.yaml";
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 120;
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Static configuration document (`CONFIG_FILE_PATH`)
    pub config_file_path: PathBuf,
    /// Namespace to watch, all namespaces if unset (`WATCH_NAMESPACE`)
    pub namespace: Option<String>,
    /// Worker pool size (`CONTROLLER_WORKERS`)
    pub workers: usize,
    /// Startup cache sync deadline (`CACHE_SYNC_TIMEOUT_SECS`)
    pub cache_sync_timeout: Duration,
    /// Requeues per key before it is dropped (`MAX_RETRIES`)
    pub max_retries: u32,
    /// Health/metrics listener (`METRICS_ADDR`)
    pub metrics_addr: SocketAddr,
}

impl Settings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidConfig`] if a variable is set to an
    /// unparseable or out-of-range value.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let config_file_path: PathBuf = lookup("CONFIG_FILE_PATH")
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE_PATH.to_string())
            .into();
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());

        let workers: usize = parse(&lookup, "CONTROLLER_WORKERS", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONTROLLER_WORKERS must be at least 1".to_string(),
            ));
        }

        let sync_secs: u64 = parse(&lookup, "CACHE_SYNC_TIMEOUT_SECS", DEFAULT_CACHE_SYNC_TIMEOUT_SECS)?;
        let max_retries: u32 = parse(&lookup, "MAX_RETRIES", MAX_RETRIES)?;

        let metrics_addr = match lookup("METRICS_ADDR") {
            Some(value) => parse_value("METRICS_ADDR", &value)?,
            None => parse_value("METRICS_ADDR", DEFAULT_METRICS_ADDR)?,
        };

        Ok(Self {
            config_file_path,
            namespace,
            workers,
            cache_sync_timeout: Duration::from_secs(sync_secs),
            max_retries,
            metrics_addr,
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ControllerError> {
    match lookup(name) {
        Some(value) => parse_value(name, &value),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ControllerError> {
    value
        .trim()
        .parse()
        .map_err(|_| ControllerError::InvalidConfig(format!("{name} has invalid value {value:?}")))
}
