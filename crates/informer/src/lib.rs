//! List+watch informer with a local cache
//!
//! Mirrors one Kubernetes resource kind into an in-memory [`Store`] and tells
//! a [`ResourceEventHandler`] about every add, update and delete, always after
//! the cache reflects the change.
//!
//! # Example
//!
//! ```no_run
//! use informer::{Informer, KubeWatchSource, ResourceEventHandler};
//! use k8s_openapi::api::core::v1::Pod;
//! use kube::{Api, Client};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Printer;
//!
//! impl ResourceEventHandler<Pod> for Printer {
//!     fn on_add(&self, pod: &Pod) { println!("added {:?}", pod.metadata.name); }
//!     fn on_update(&self, _old: &Pod, pod: &Pod) { println!("updated {:?}", pod.metadata.name); }
//!     fn on_delete(&self, pod: &Pod) { println!("deleted {:?}", pod.metadata.name); }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::try_default().await?;
//! let source = KubeWatchSource::new(Api::<Pod>::all(client));
//! let (informer, store, synced) = Informer::new(Box::new(source), Arc::new(Printer));
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(informer.run(shutdown.clone()));
//! synced.wait_for_sync().await;
//! println!("{} pods cached", store.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod informer;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod source;

pub use cache::{Store, StoreWriter, object_key};
pub use error::InformerError;
pub use informer::{Informer, ResourceEventHandler, SyncHandle};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockWatchHandle, MockWatchSource};
pub use source::{KubeWatchSource, WatchSource, WatchStream};
