//! Informer: keeps the local cache in step with a watch source and reports
//! every change to a [`ResourceEventHandler`].
//!
//! The cache is always updated before the handler hears about a change, so
//! anything the handler schedules will find the new state in the [`Store`].

use crate::cache::{Store, StoreWriter, object_key};
use crate::error::InformerError;
use crate::source::WatchSource;
use futures::StreamExt;
use kube::Resource;
use kube_runtime::watcher;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callbacks invoked by the informer after the cache has been updated.
///
/// Callbacks run on the informer task and must not block; the usual
/// implementation just turns the change into a work queue item.
pub trait ResourceEventHandler<K>: Send + Sync {
    /// An object appeared that was not cached before.
    fn on_add(&self, obj: &K);

    /// A cached object changed.
    fn on_update(&self, old: &K, new: &K);

    /// An object disappeared; `obj` is its last-known state.
    fn on_delete(&self, obj: &K);
}

/// Cloneable view on whether the informer has applied its initial listing.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    synced: watch::Receiver<bool>,
}

impl SyncHandle {
    /// True once the first full listing has been applied to the cache.
    /// Never goes back to false.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Waits until the cache has synced.
    ///
    /// Returns false if the informer stopped before it ever synced.
    pub async fn wait_for_sync(&self) -> bool {
        let mut synced = self.synced.clone();
        synced.wait_for(|synced| *synced).await.is_ok()
    }
}

/// Lists and watches one resource kind, mirroring it into a [`Store`].
pub struct Informer<K> {
    source: Box<dyn WatchSource<K>>,
    handler: Arc<dyn ResourceEventHandler<K>>,
    writer: StoreWriter<K>,
    synced: watch::Sender<bool>,
    // Objects of a listing in progress, between `Init` and `InitDone`
    listing: Option<HashMap<String, Arc<K>>>,
}

impl<K> fmt::Debug for Informer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Informer")
            .field("synced", &*self.synced.borrow())
            .field("listing", &self.listing.as_ref().map(HashMap::len))
            .finish_non_exhaustive()
    }
}

impl<K> Informer<K>
where
    K: Resource + Send + Sync + 'static,
{
    /// Creates an informer together with the read side of its cache and its sync handle.
    pub fn new(
        source: Box<dyn WatchSource<K>>,
        handler: Arc<dyn ResourceEventHandler<K>>,
    ) -> (Self, Store<K>, SyncHandle) {
        let writer = StoreWriter::default();
        let store = writer.as_reader();
        let (synced, synced_rx) = watch::channel(false);

        let informer = Self {
            source,
            handler,
            writer,
            synced,
            listing: None,
        };
        (informer, store, SyncHandle { synced: synced_rx })
    }

    /// Runs the list+watch loop until `shutdown` is cancelled.
    ///
    /// Errors reported by the source are logged and skipped; the source is
    /// expected to reconnect on its own.
    ///
    /// # Errors
    ///
    /// Returns [`InformerError::StreamEnded`] if the source stream finishes.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), InformerError> {
        info!("Starting informer");
        let mut stream = self.source.subscribe();

        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Informer stopping");
                    return Ok(());
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => self.apply_event(event),
                Some(Err(e)) => warn!("Watch stream error, waiting for the source to recover: {}", e),
                None => return Err(InformerError::StreamEnded),
            }
        }
    }

    fn apply_event(&mut self, event: watcher::Event<K>) {
        match event {
            watcher::Event::Init => {
                debug!("Listing started");
                self.listing = Some(HashMap::new());
            }
            watcher::Event::InitApply(obj) => {
                if let Some(key) = keyed(&obj) {
                    self.listing
                        .get_or_insert_with(HashMap::new)
                        .insert(key, Arc::new(obj));
                }
            }
            watcher::Event::InitDone => {
                let listing = self.listing.take().unwrap_or_default();
                self.apply_listing(listing);
                if !*self.synced.borrow() {
                    info!("Informer cache synced ({} objects)", self.writer.as_reader().len());
                    self.synced.send_replace(true);
                }
            }
            watcher::Event::Apply(obj) => {
                let Some(key) = keyed(&obj) else { return };
                let obj = Arc::new(obj);
                match self.writer.apply(key.clone(), Arc::clone(&obj)) {
                    Some(old) => {
                        debug!("Updated {}", key);
                        self.handler.on_update(&old, &obj);
                    }
                    None => {
                        debug!("Added {}", key);
                        self.handler.on_add(&obj);
                    }
                }
            }
            watcher::Event::Delete(obj) => {
                let Some(key) = keyed(&obj) else { return };
                self.writer.delete(&key);
                debug!("Deleted {}", key);
                self.handler.on_delete(&obj);
            }
        }
    }

    /// Swaps a complete listing into the cache and reports the difference.
    fn apply_listing(&mut self, listing: HashMap<String, Arc<K>>) {
        let previous = self.writer.replace(listing.clone());

        for (key, obj) in &listing {
            match previous.get(key) {
                None => self.handler.on_add(obj),
                Some(old) if !same_version(old.as_ref(), obj.as_ref()) => {
                    self.handler.on_update(old, obj);
                }
                Some(_) => debug!("{} unchanged across relist", key),
            }
        }

        for (key, old) in &previous {
            if !listing.contains_key(key) {
                debug!("{} vanished across relist", key);
                self.handler.on_delete(old);
            }
        }
    }
}

fn keyed<K: Resource>(obj: &K) -> Option<String> {
    let key = object_key(obj);
    if key.is_none() {
        warn!("Skipping object without a name");
    }
    key
}

fn same_version<K: Resource>(old: &K, new: &K) -> bool {
    match (&old.meta().resource_version, &new.meta().resource_version) {
        (Some(old), Some(new)) => old == new,
        _ => false,
    }
}
