//! Resource watch sources.
//!
//! A source produces the raw list+watch stream the informer consumes. The
//! stream uses `kube_runtime::watcher` semantics: each (re)list is reported
//! as `Init`, zero or more `InitApply`, then `InitDone`; changes after that
//! arrive as `Apply` and `Delete`. Reconnecting after transient failures is
//! the source's responsibility.

use futures::StreamExt;
use futures::stream::BoxStream;
use kube::{Api, Resource};
use kube_runtime::WatchStreamExt;
use kube_runtime::watcher;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Stream of list+watch events for one resource kind.
pub type WatchStream<K> = BoxStream<'static, Result<watcher::Event<K>, watcher::Error>>;

/// Something the informer can list and watch.
///
/// This trait is the seam between the reconciliation core and the cluster
/// API; tests use an in-memory implementation instead of a live cluster.
pub trait WatchSource<K>: Send + Sync {
    /// Opens the list+watch stream. Called once per informer run.
    fn subscribe(&self) -> WatchStream<K>;
}

/// Watch source backed by the Kubernetes API through `kube_runtime::watcher`.
pub struct KubeWatchSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    api: Api<K>,
    config: watcher::Config,
}

impl<K> Debug for KubeWatchSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWatchSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K> KubeWatchSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Watches every object reachable through `api` (all namespaces or one,
    /// depending on how the `Api` was built).
    pub fn new(api: Api<K>) -> Self {
        Self {
            api,
            config: watcher::Config::default(),
        }
    }
}

impl<K> WatchSource<K> for KubeWatchSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn subscribe(&self) -> WatchStream<K> {
        // default_backoff keeps the stream alive across API disconnects
        watcher(self.api.clone(), self.config.clone())
            .default_backoff()
            .boxed()
    }
}
