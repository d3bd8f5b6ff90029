//! Local cache of watched objects.
//!
//! The cache is single-writer / multi-reader: the informer owns the only
//! [`StoreWriter`], everything else reads through cloneable [`Store`] handles.
//! A missing key is an ordinary `None`, since a delete may already have
//! evicted an object that a queued event still refers to.

use kube::Resource;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Entries<K> = Arc<RwLock<HashMap<String, Arc<K>>>>;

/// Builds the identity key of an object: `namespace/name`, or just `name`
/// for cluster-scoped objects.
///
/// Returns `None` when the object has no name.
pub fn object_key<K: Resource>(obj: &K) -> Option<String> {
    let meta = obj.meta();
    let name = meta.name.as_deref().filter(|name| !name.is_empty())?;
    match meta.namespace.as_deref() {
        Some(namespace) if !namespace.is_empty() => Some(format!("{namespace}/{name}")),
        _ => Some(name.to_string()),
    }
}

/// Read handle on the local cache.
pub struct Store<K> {
    entries: Entries<K>,
}

impl<K> Clone for Store<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K> fmt::Debug for Store<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("len", &self.len()).finish()
    }
}

impl<K> Store<K> {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<K>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last-known snapshot of the object with identity `key`.
    #[must_use]
    pub fn get_by_key(&self, key: &str) -> Option<Arc<K>> {
        self.read().get(key).cloned()
    }

    /// Returns true if an object with identity `key` is cached.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Snapshots of every cached object, in no particular order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<K>> {
        self.read().values().cloned().collect()
    }

    /// Identity keys of every cached object, sorted.
    #[must_use]
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of cached objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write handle on the local cache. There is exactly one per cache.
pub struct StoreWriter<K> {
    entries: Entries<K>,
}

impl<K> fmt::Debug for StoreWriter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreWriter").finish_non_exhaustive()
    }
}

impl<K> Default for StoreWriter<K> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K> StoreWriter<K> {
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<K>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands out a new read handle on this cache.
    #[must_use]
    pub fn as_reader(&self) -> Store<K> {
        Store {
            entries: Arc::clone(&self.entries),
        }
    }

    /// Inserts or replaces the object stored under `key`, returning the previous snapshot.
    pub fn apply(&mut self, key: String, obj: Arc<K>) -> Option<Arc<K>> {
        self.write().insert(key, obj)
    }

    /// Removes the object stored under `key`, returning the evicted snapshot.
    pub fn delete(&mut self, key: &str) -> Option<Arc<K>> {
        self.write().remove(key)
    }

    /// Replaces the whole cache content, returning what was there before.
    pub fn replace(&mut self, entries: HashMap<String, Arc<K>>) -> HashMap<String, Arc<K>> {
        std::mem::replace(&mut *self.write(), entries)
    }
}
