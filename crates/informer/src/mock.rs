//! In-memory watch source for unit testing
//!
//! Tests drive the informer by pushing `kube_runtime::watcher` events through
//! a [`MockWatchHandle`], without a running cluster.

use crate::source::{WatchSource, WatchStream};
use futures::StreamExt;
use kube_runtime::watcher;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Mock watch source fed by a [`MockWatchHandle`].
///
/// The stream can be subscribed to once; it ends when every handle is dropped.
#[derive(Debug)]
pub struct MockWatchSource<K> {
    events: Mutex<Option<mpsc::UnboundedReceiver<watcher::Event<K>>>>,
}

/// Test-side handle pushing events into a [`MockWatchSource`].
#[derive(Debug, Clone)]
pub struct MockWatchHandle<K> {
    events: mpsc::UnboundedSender<watcher::Event<K>>,
}

impl<K: Send + 'static> MockWatchSource<K> {
    /// Create a new mock source and the handle that feeds it
    pub fn channel() -> (Self, MockWatchHandle<K>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: Mutex::new(Some(rx)),
            },
            MockWatchHandle { events: tx },
        )
    }
}

impl<K: Send + 'static> WatchSource<K> for MockWatchSource<K> {
    fn subscribe(&self) -> WatchStream<K> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match events {
            Some(rx) => futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (Ok(event), rx))
            })
            .boxed(),
            None => futures::stream::empty().boxed(),
        }
    }
}

impl<K> MockWatchHandle<K> {
    /// Push a raw watcher event. Returns false if the source is gone.
    pub fn send(&self, event: watcher::Event<K>) -> bool {
        self.events.send(event).is_ok()
    }

    /// Report a complete listing: `Init`, one `InitApply` per object, `InitDone`.
    pub fn list(&self, objects: Vec<K>) -> bool {
        let mut sent = self.send(watcher::Event::Init);
        for obj in objects {
            sent &= self.send(watcher::Event::InitApply(obj));
        }
        sent && self.send(watcher::Event::InitDone)
    }

    /// Report a created or modified object.
    pub fn apply(&self, obj: K) -> bool {
        self.send(watcher::Event::Apply(obj))
    }

    /// Report a deleted object.
    pub fn delete(&self, obj: K) -> bool {
        self.send(watcher::Event::Delete(obj))
    }
}
