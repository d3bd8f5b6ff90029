//! Test utilities for unit testing the controller
//!
//! This module provides helpers for creating test data and handlers that
//! record or hold up reconciliations.

use crate::error::HandlerError;
use crate::reconciler::ResourceHandler;
use controller_config::{Configuration, MetaData, Specifications};
use informer::{Store, StoreWriter, object_key};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Helper to create a test Pod with the given containers
pub fn create_test_pod(namespace: &str, name: &str, containers: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|name| Container {
                    name: (*name).to_string(),
                    image: Some("busybox".to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        status: None,
    }
}

/// Helper to create a configuration for `deployment` with 3 replicas
pub fn test_configuration(deployment: &str) -> Configuration {
    Configuration {
        api_version: "podcontroller.microscaler.io/v1alpha1".to_string(),
        kind: "PodController".to_string(),
        metadata: MetaData {
            name: "pod-controller".to_string(),
        },
        spec: Specifications {
            deployment_name: deployment.to_string(),
            replicas: 3,
        },
    }
}

/// Helper to build a cache pre-filled with `pods`
pub fn store_with(pods: Vec<Pod>) -> (StoreWriter<Pod>, Store<Pod>) {
    let mut writer = StoreWriter::default();
    for pod in pods {
        let key = object_key(&pod).unwrap();
        writer.apply(key, Arc::new(pod));
    }
    let store = writer.as_reader();
    (writer, store)
}

/// Polls `condition` every few milliseconds, panicking after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

/// Handler recording every call as `"<kind> <key>"`, optionally failing for
/// some keys.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<String>>>,
    fail_all: bool,
    failing_keys: Arc<HashSet<String>>,
}

impl RecordingHandler {
    /// Handler that fails every call
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Handler that fails calls for the given keys only
    pub fn failing_for(keys: &[&str]) -> Self {
        Self {
            failing_keys: Arc::new(keys.iter().map(|key| (*key).to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String, key: &str) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(call);
        if self.fail_all || self.failing_keys.contains(key) {
            return Err(HandlerError::Transient(format!("simulated failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceHandler<Pod> for RecordingHandler {
    async fn on_created(&self, obj: &Pod) -> Result<(), HandlerError> {
        let key = object_key(obj).unwrap();
        self.record(format!("created {key}"), &key)
    }

    async fn on_updated(&self, obj: &Pod) -> Result<(), HandlerError> {
        let key = object_key(obj).unwrap();
        self.record(format!("updated {key}"), &key)
    }

    async fn on_deleted(&self, key: &str, display_name: &str) -> Result<(), HandlerError> {
        self.record(format!("deleted {key} as {display_name}"), key)
    }
}

/// Handler whose created/updated callbacks wait until the test releases them.
#[derive(Debug, Clone)]
pub struct BlockingHandler {
    entered: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

impl Default for BlockingHandler {
    fn default() -> Self {
        Self {
            entered: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(0)),
        }
    }
}

impl BlockingHandler {
    /// Number of calls currently or previously inside the handler
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Number of calls that have returned
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Lets `count` blocked calls return
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    async fn block(&self) -> Result<(), HandlerError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceHandler<Pod> for BlockingHandler {
    async fn on_created(&self, _obj: &Pod) -> Result<(), HandlerError> {
        self.block().await
    }

    async fn on_updated(&self, _obj: &Pod) -> Result<(), HandlerError> {
        self.block().await
    }

    async fn on_deleted(&self, _key: &str, _display_name: &str) -> Result<(), HandlerError> {
        Ok(())
    }
}
