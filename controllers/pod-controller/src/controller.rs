//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the informer, the
//! local cache, the work queue and the reconciler together, runs the worker
//! pool and drives startup and shutdown.

use crate::error::{ControllerError, ReconcileError};
use crate::event::{Event, EventKind};
use crate::metrics::{Metrics, OUTCOME_ERROR};
use crate::reconciler::{ReconcileOutcome, Reconciler, ResourceHandler};
use crate::retry::{RetryDecision, RetryPolicy};
use informer::{
    Informer, InformerError, ResourceEventHandler, Store, SyncHandle, WatchSource, object_key,
};
use kube::Resource;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use workqueue::{RateLimiter, RateLimitingQueue, default_controller_rate_limiter};

/// Default startup deadline for the informer cache to sync.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

/// Tunables of a [`Controller`].
#[derive(Clone)]
pub struct ControllerOptions {
    /// Number of worker tasks
    pub workers: usize,
    /// How long to wait for the cache to sync before giving up
    pub sync_timeout: Duration,
    /// Retry budget for failed reconciliations
    pub retry: RetryPolicy,
    /// Delay policy for requeued items
    pub rate_limiter: Arc<dyn RateLimiter<Event>>,
}

impl fmt::Debug for ControllerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerOptions")
            .field("workers", &self.workers)
            .field("sync_timeout", &self.sync_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            retry: RetryPolicy::default(),
            rate_limiter: default_controller_rate_limiter(),
        }
    }
}

/// Informer callbacks turning every change into a queued [`Event`].
struct QueueingHandler {
    queue: RateLimitingQueue<Event>,
    metrics: Arc<Metrics>,
}

impl QueueingHandler {
    fn enqueue<K: Resource>(&self, obj: &K, kind: EventKind) {
        let Some(key) = object_key(obj) else {
            warn!("Ignoring {} event for an object without a name", kind);
            return;
        };
        let name = obj.meta().name.clone().unwrap_or_default();
        debug!("Queueing {} event for {}", kind, key);

        self.metrics.observe_event(kind);
        self.queue.add(Event::new(key, kind, name));
        self.metrics.set_queue_depth(self.queue.len());
    }
}

impl<K: Resource> ResourceEventHandler<K> for QueueingHandler {
    fn on_add(&self, obj: &K) {
        self.enqueue(obj, EventKind::Created);
    }

    fn on_update(&self, _old: &K, new: &K) {
        self.enqueue(new, EventKind::Updated);
    }

    fn on_delete(&self, obj: &K) {
        self.enqueue(obj, EventKind::Deleted);
    }
}

/// Level-triggered controller for one resource kind.
pub struct Controller<K, H> {
    informer: Informer<K>,
    store: Store<K>,
    synced: SyncHandle,
    queue: RateLimitingQueue<Event>,
    reconciler: Arc<Reconciler<K, H>>,
    workers: usize,
    sync_timeout: Duration,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl<K, H> fmt::Debug for Controller<K, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("informer", &self.informer)
            .field("queue", &self.queue)
            .field("workers", &self.workers)
            .field("sync_timeout", &self.sync_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<K, H> Controller<K, H>
where
    K: Resource + Send + Sync + 'static,
    H: ResourceHandler<K> + 'static,
{
    /// Creates a new controller instance.
    ///
    /// Nothing runs until [`run`](Self::run) is called.
    pub fn new(
        source: Box<dyn WatchSource<K>>,
        handler: H,
        options: ControllerOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        let queue = RateLimitingQueue::new(options.rate_limiter);
        let events = Arc::new(QueueingHandler {
            queue: queue.clone(),
            metrics: Arc::clone(&metrics),
        });
        let (informer, store, synced) = Informer::new(source, events);
        let reconciler = Arc::new(Reconciler::new(store.clone(), handler));

        Self {
            informer,
            store,
            synced,
            queue,
            reconciler,
            workers: options.workers.max(1),
            sync_timeout: options.sync_timeout,
            retry: options.retry,
            metrics,
        }
    }

    /// Readiness view on the controller's cache.
    #[must_use]
    pub fn sync_handle(&self) -> SyncHandle {
        self.synced.clone()
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> RateLimitingQueue<Event> {
        self.queue.clone()
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> Store<K> {
        self.store.clone()
    }

    /// Runs the controller until `shutdown` is cancelled.
    ///
    /// Starts the informer, waits for its cache to sync, then runs the worker
    /// pool. On shutdown the queue stops accepting work, every worker drains
    /// what is already queued and finishes its current item, and only then
    /// is the informer stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::CacheSyncTimeout`] if the cache does not
    /// sync in time, or the informer's error if it stops on its own.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        let Self {
            informer,
            store,
            synced,
            queue,
            reconciler,
            workers,
            sync_timeout,
            retry,
            metrics,
        } = self;

        info!("Starting controller");
        let informer_shutdown = shutdown.child_token();
        let mut informer_task = tokio::spawn(informer.run(informer_shutdown.clone()));

        info!("Waiting for informer caches to sync");
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                info!("Shutdown requested before caches synced");
                queue.shut_down();
                informer_shutdown.cancel();
                return informer_exit(informer_task.await);
            }
            result = &mut informer_task => {
                queue.shut_down();
                return informer_exit(result);
            }
            result = tokio::time::timeout(sync_timeout, synced.wait_for_sync()) => match result {
                Ok(true) => {}
                Ok(false) => {
                    queue.shut_down();
                    return informer_exit(informer_task.await);
                }
                Err(_) => {
                    error!("Timed out after {:?} waiting for caches to sync", sync_timeout);
                    queue.shut_down();
                    informer_shutdown.cancel();
                    if let Err(e) = informer_exit(informer_task.await) {
                        warn!("Informer failed while stopping: {}", e);
                    }
                    return Err(ControllerError::CacheSyncTimeout(sync_timeout));
                }
            },
        }
        info!("Caches synced ({} objects), starting {} workers", store.len(), workers);

        let mut pool = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                queue: queue.clone(),
                reconciler: Arc::clone(&reconciler),
                retry,
                metrics: Arc::clone(&metrics),
            };
            pool.spawn(worker.run());
        }

        let informer_result = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                info!("Shutdown signal received");
                None
            }
            result = &mut informer_task => {
                error!("Informer stopped unexpectedly");
                Some(result)
            }
        };

        info!("Shutting down work queue, waiting for workers to finish");
        queue.shut_down();
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }

        informer_shutdown.cancel();
        let result = match informer_result {
            Some(result) => informer_exit(result),
            None => informer_exit(informer_task.await),
        };
        info!("Controller stopped");
        result
    }
}

fn informer_exit(
    result: Result<Result<(), InformerError>, JoinError>,
) -> Result<(), ControllerError> {
    match result {
        Ok(result) => result.map_err(ControllerError::from),
        Err(e) => Err(ControllerError::Join(format!("informer task failed: {e}"))),
    }
}

/// One worker of the pool.
struct Worker<K, H> {
    id: usize,
    queue: RateLimitingQueue<Event>,
    reconciler: Arc<Reconciler<K, H>>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl<K, H> Worker<K, H>
where
    K: Send + Sync,
    H: ResourceHandler<K>,
{
    async fn run(self) {
        debug!("Worker {} started", self.id);
        while self.process_next_item().await {}
        debug!("Worker {} stopped", self.id);
    }

    /// Takes one event off the queue and reconciles it.
    ///
    /// Returns false once the queue is shut down and drained.
    async fn process_next_item(&self) -> bool {
        let Some(event) = self.queue.get().await else {
            return false;
        };
        self.metrics.set_queue_depth(self.queue.len());

        let result = self.reconciler.reconcile(&event).await;
        self.handle_err(&event, result);
        self.queue.done(&event);
        true
    }

    /// Records the outcome of a reconciliation and decides whether to retry.
    fn handle_err(&self, event: &Event, result: Result<ReconcileOutcome, ReconcileError>) {
        let error = match result {
            Ok(outcome) => {
                self.metrics.observe_reconcile(outcome.as_str());
                self.queue.forget(event);
                return;
            }
            Err(e) => e,
        };
        self.metrics.observe_reconcile(OUTCOME_ERROR);

        let requeues = self.queue.num_requeues(event);
        match self.retry.decide(requeues) {
            RetryDecision::Requeue => {
                warn!(
                    "Error syncing {} (retry {}/{}), requeueing: {}",
                    event,
                    requeues + 1,
                    self.retry.max_retries(),
                    error
                );
                self.queue.add_rate_limited(event.clone());
                self.metrics.observe_requeue();
            }
            RetryDecision::Drop => {
                self.queue.forget(event);
                error!(
                    "Dropping {} out of the queue after {} attempts: {}",
                    event,
                    requeues + 1,
                    error
                );
                self.metrics.observe_drop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{BlockingHandler, RecordingHandler, create_test_pod, wait_until};
    use informer::MockWatchSource;
    use k8s_openapi::api::core::v1::Pod;
    use workqueue::ItemExponentialFailureRateLimiter;

    fn fast_options(workers: usize) -> ControllerOptions {
        ControllerOptions {
            workers,
            sync_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            rate_limiter: Arc::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(1),
                Duration::from_millis(10),
            )),
        }
    }

    #[tokio::test]
    async fn test_created_then_deleted_pod_is_reported() {
        let (source, handle) = MockWatchSource::<Pod>::channel();
        let handler = RecordingHandler::default();
        let metrics = Arc::new(Metrics::new().unwrap());
        let controller = Controller::new(
            Box::new(source),
            handler.clone(),
            fast_options(1),
            Arc::clone(&metrics),
        );
        let queue = controller.queue();
        let store = controller.store();
        let shutdown = CancellationToken::new();

        handle.list(vec![]);
        let task = tokio::spawn(controller.run(shutdown.clone()));

        let pod = create_test_pod("ns", "a", &["app"]);
        handle.apply(pod.clone());
        wait_until(|| metrics.reconcile_count("handled") == 1).await;
        assert_eq!(handler.calls(), vec!["created ns/a".to_string()]);
        assert!(store.contains_key("ns/a"));
        assert_eq!(queue.num_requeues(&Event::new("ns/a", EventKind::Created, "a")), 0);

        handle.delete(pod);
        wait_until(|| handler.calls().len() == 2).await;
        assert_eq!(handler.calls()[1], "deleted ns/a as a");
        assert!(!store.contains_key("ns/a"));

        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_persistent_failure_is_dropped_after_budget() {
        let (source, handle) = MockWatchSource::<Pod>::channel();
        let handler = RecordingHandler::failing_for(&["ns/b"]);
        let metrics = Arc::new(Metrics::new().unwrap());
        let controller = Controller::new(
            Box::new(source),
            handler.clone(),
            fast_options(1),
            Arc::clone(&metrics),
        );
        let queue = controller.queue();
        let shutdown = CancellationToken::new();

        handle.list(vec![]);
        let task = tokio::spawn(controller.run(shutdown.clone()));

        handle.apply(create_test_pod("ns", "b", &["app"]));
        wait_until(|| metrics.drop_count() == 1).await;

        // Give any stray requeue a chance to show up
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handler.calls().len(), 6);
        assert_eq!(metrics.requeue_count(), 5);
        assert_eq!(metrics.reconcile_count(OUTCOME_ERROR), 6);

        let key = Event::new("ns/b", EventKind::Updated, "b");
        assert_eq!(queue.num_requeues(&key), 0);

        // A fresh change starts a fresh budget
        let mut changed = create_test_pod("ns", "b", &["app"]);
        changed.metadata.resource_version = Some("2".to_string());
        handle.apply(changed);
        wait_until(|| metrics.drop_count() == 2).await;
        let calls = handler.calls();
        assert_eq!(calls.len(), 12);
        assert!(calls[6..].iter().all(|call| call == "updated ns/b"));
        assert_eq!(queue.num_requeues(&key), 0);

        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_items() {
        let (source, handle) = MockWatchSource::<Pod>::channel();
        let handler = BlockingHandler::default();
        let metrics = Arc::new(Metrics::new().unwrap());
        let controller = Controller::new(Box::new(source), handler.clone(), fast_options(2), metrics);
        let shutdown = CancellationToken::new();

        handle.list(vec![
            create_test_pod("ns", "a", &["app"]),
            create_test_pod("ns", "b", &["app"]),
        ]);
        let mut task = tokio::spawn(controller.run(shutdown.clone()));

        wait_until(|| handler.entered() == 2).await;
        shutdown.cancel();

        // Both workers are stuck in the handler, so run must not return yet
        let early = tokio::time::timeout(Duration::from_millis(50), &mut task).await;
        assert!(early.is_err());
        assert_eq!(handler.finished(), 0);

        handler.release(2);
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(handler.finished(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_idle_workers() {
        let (source, handle) = MockWatchSource::<Pod>::channel();
        let handler = RecordingHandler::default();
        let metrics = Arc::new(Metrics::new().unwrap());
        let controller = Controller::new(Box::new(source), handler.clone(), fast_options(2), metrics);
        let synced = controller.sync_handle();
        let queue = controller.queue();
        let shutdown = CancellationToken::new();

        handle.list(vec![]);
        let task = tokio::spawn(controller.run(shutdown.clone()));

        let ready = tokio::time::timeout(Duration::from_secs(2), synced.wait_for_sync())
            .await
            .unwrap();
        assert!(ready);
        // Both workers are parked in `get` on an empty queue
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.is_empty());
        assert!(!task.is_finished());

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(handler.calls().is_empty());
        drop(handle);
    }

    #[tokio::test]
    async fn test_sync_timeout_is_fatal() {
        let (source, _handle) = MockWatchSource::<Pod>::channel();
        let metrics = Arc::new(Metrics::new().unwrap());
        let options = ControllerOptions {
            sync_timeout: Duration::from_millis(20),
            ..fast_options(1)
        };
        let controller = Controller::new(Box::new(source), RecordingHandler::default(), options, metrics);

        let result = controller.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(ControllerError::CacheSyncTimeout(_))));
    }

    #[tokio::test]
    async fn test_shutdown_before_sync_is_clean() {
        let (source, _handle) = MockWatchSource::<Pod>::channel();
        let metrics = Arc::new(Metrics::new().unwrap());
        let controller = Controller::new(
            Box::new(source),
            RecordingHandler::default(),
            fast_options(1),
            metrics,
        );
        let synced = controller.sync_handle();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(controller.run(shutdown).await.is_ok());
        assert!(!synced.has_synced());
    }

    #[tokio::test]
    async fn test_informer_failure_stops_controller() {
        let (source, handle) = MockWatchSource::<Pod>::channel();
        let metrics = Arc::new(Metrics::new().unwrap());
        let controller = Controller::new(
            Box::new(source),
            RecordingHandler::default(),
            fast_options(1),
            metrics,
        );

        handle.list(vec![]);
        drop(handle);

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            controller.run(CancellationToken::new()),
        )
        .await
        .unwrap();
        assert!(matches!(
            result,
            Err(ControllerError::Informer(InformerError::StreamEnded))
        ));
    }
}
