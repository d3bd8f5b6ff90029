//! Reconciliation logic.
//!
//! The reconciler takes one `Event`, looks the object up in the local cache
//! and hands it to a [`ResourceHandler`]. It is level-triggered: a created or
//! updated event is reconciled against whatever the cache holds *now*, not
//! against the object as it was when the event was recorded.

use crate::error::{HandlerError, ReconcileError};
use crate::event::{Event, EventKind};
use informer::Store;
use tracing::{debug, warn};

/// Kind-specific business logic.
///
/// Handlers must tolerate at-least-once delivery: the same event can be
/// reconciled again after a retry, so side effects have to be idempotent.
#[async_trait::async_trait]
pub trait ResourceHandler<K>: Send + Sync {
    /// The object exists and was created since it was last seen.
    async fn on_created(&self, obj: &K) -> Result<(), HandlerError>;

    /// The object exists and changed.
    async fn on_updated(&self, obj: &K) -> Result<(), HandlerError>;

    /// The object is gone. Only its identity survives.
    async fn on_deleted(&self, key: &str, display_name: &str) -> Result<(), HandlerError>;
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The handler ran and succeeded
    Handled,
    /// A created/updated event found nothing in the cache; skipped this round
    CacheMiss,
}

impl ReconcileOutcome {
    /// Label used in metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::CacheMiss => "cache_miss",
        }
    }
}

/// Reconciles events for one resource kind.
pub struct Reconciler<K, H> {
    store: Store<K>,
    handler: H,
}

impl<K, H> std::fmt::Debug for Reconciler<K, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<K, H> Reconciler<K, H>
where
    K: Send + Sync,
    H: ResourceHandler<K>,
{
    /// Creates a new reconciler instance.
    pub fn new(store: Store<K>, handler: H) -> Self {
        Self { store, handler }
    }

    /// Reconciles one event.
    ///
    /// A created/updated event whose object is no longer cached is a race
    /// with a later delete, not an error: it is logged and skipped, and the
    /// delete event that must follow will finish the job.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Handler`] if the handler fails.
    pub async fn reconcile(&self, event: &Event) -> Result<ReconcileOutcome, ReconcileError> {
        debug!("Reconciling {}", event);

        match event.kind() {
            EventKind::Created | EventKind::Updated => {
                let Some(obj) = self.store.get_by_key(event.key()) else {
                    warn!(
                        "Object {} not found in cache while handling {} event, skipping",
                        event.key(),
                        event.kind()
                    );
                    return Ok(ReconcileOutcome::CacheMiss);
                };

                if event.kind() == EventKind::Created {
                    self.handler.on_created(&obj).await?;
                } else {
                    self.handler.on_updated(&obj).await?;
                }
            }
            EventKind::Deleted => {
                // The cache is expected to have dropped the object already
                self.handler
                    .on_deleted(event.key(), event.display_name())
                    .await?;
            }
        }

        Ok(ReconcileOutcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingHandler, create_test_pod, store_with};

    #[tokio::test]
    async fn test_created_dispatches_cached_snapshot() {
        let (_writer, store) = store_with(vec![create_test_pod("ns", "a", &["app"])]);
        let handler = RecordingHandler::default();
        let reconciler = Reconciler::new(store, handler.clone());

        let outcome = reconciler
            .reconcile(&Event::new("ns/a", EventKind::Created, "a"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Handled);
        assert_eq!(handler.calls(), vec!["created ns/a".to_string()]);
    }

    #[tokio::test]
    async fn test_updated_dispatches_cached_snapshot() {
        let (_writer, store) = store_with(vec![create_test_pod("ns", "a", &["app"])]);
        let handler = RecordingHandler::default();
        let reconciler = Reconciler::new(store, handler.clone());

        reconciler
            .reconcile(&Event::new("ns/a", EventKind::Updated, "a"))
            .await
            .unwrap();

        assert_eq!(handler.calls(), vec!["updated ns/a".to_string()]);
    }

    #[tokio::test]
    async fn test_created_cache_miss_is_not_an_error() {
        let (_writer, store) = store_with(vec![]);
        let handler = RecordingHandler::default();
        let reconciler = Reconciler::new(store, handler.clone());

        let outcome = reconciler
            .reconcile(&Event::new("ns/gone", EventKind::Created, "gone"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::CacheMiss);
        assert!(handler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_uses_carried_display_name() {
        // Cache no longer holds the object
        let (_writer, store) = store_with(vec![]);
        let handler = RecordingHandler::default();
        let reconciler = Reconciler::new(store, handler.clone());

        let outcome = reconciler
            .reconcile(&Event::new("ns/a", EventKind::Deleted, "a"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Handled);
        assert_eq!(handler.calls(), vec!["deleted ns/a as a".to_string()]);
    }

    #[tokio::test]
    async fn test_deleted_ignores_stale_cache_entry() {
        // Even if the cache still has a (stale) entry, the event's name is used
        let (_writer, store) = store_with(vec![create_test_pod("ns", "a", &["app"])]);
        let handler = RecordingHandler::default();
        let reconciler = Reconciler::new(store, handler.clone());

        reconciler
            .reconcile(&Event::new("ns/a", EventKind::Deleted, "carried-name"))
            .await
            .unwrap();

        assert_eq!(handler.calls(), vec!["deleted ns/a as carried-name".to_string()]);
    }

    #[tokio::test]
    async fn test_handler_failure_is_reported() {
        let (_writer, store) = store_with(vec![create_test_pod("ns", "b", &["app"])]);
        let handler = RecordingHandler::failing();
        let reconciler = Reconciler::new(store, handler);

        let result = reconciler
            .reconcile(&Event::new("ns/b", EventKind::Created, "b"))
            .await;

        assert!(matches!(result, Err(ReconcileError::Handler(_))));
    }
}
