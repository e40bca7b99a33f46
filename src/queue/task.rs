//! Task queue: one worker driving one sync function over a [`WorkQueue`].
//!
//! Shutdown: [`TaskQueue::shutdown`] closes the queue and waits for the worker
//! to acknowledge. The sync callback has no timeout; a callback that never
//! returns keeps the worker, and therefore `shutdown`, waiting.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::SyncError;
use crate::key::{meta_namespace_key, KeyFn, ObjectMeta};
use crate::observability::metrics;
use crate::queue::rate_limit::RateLimiter;
use crate::queue::work_queue::WorkQueue;

type SyncFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<(), SyncError>> + Send + Sync>;

/// Why a worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    /// The queue was shut down and drained.
    Shutdown,
    /// The sync callback panicked.
    Panicked,
}

/// Lifecycle of the worker slot. Start and close are decided under one lock
/// so a spawned but not yet polled `run` cannot slip past `shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Exited,
    Closed,
}

/// Work queue bound to a single sync function and key function.
pub struct TaskQueue<T: ?Sized> {
    queue: WorkQueue,
    sync: SyncFn,
    key_fn: KeyFn<T>,
    state: Mutex<RunState>,
    worker_done: watch::Sender<bool>,
}

impl<T: ObjectMeta + ?Sized + 'static> TaskQueue<T> {
    /// Create a task queue keyed by `namespace/name`.
    pub fn new<F, Fut, E>(sync: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<SyncError> + 'static,
    {
        Self::with_key_fn(sync, Arc::new(|obj: &T| meta_namespace_key(obj)))
    }
}

impl<T: ?Sized> TaskQueue<T> {
    /// Create a task queue with an explicit key-extraction function.
    pub fn with_key_fn<F, Fut, E>(sync: F, key_fn: KeyFn<T>) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<SyncError> + 'static,
    {
        let sync: SyncFn = Arc::new(move |key: String| {
            let fut = sync(key);
            async move { fut.await.map_err(Into::into) }.boxed()
        });
        let (worker_done, _) = watch::channel(false);

        Self {
            queue: WorkQueue::default(),
            sync,
            key_fn,
            state: Mutex::new(RunState::Idle),
            worker_done,
        }
    }

    /// Replace the retry strategy. Must be called before any key is added.
    pub fn with_rate_limiter(mut self, limiter: impl RateLimiter + 'static) -> Self {
        self.queue = WorkQueue::new(limiter);
        self
    }

    /// The underlying work queue.
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Enqueue the key of `obj`. Objects whose key cannot be derived are
    /// logged and dropped; a later resync picks them up.
    pub fn enqueue(&self, obj: &T) {
        match (self.key_fn)(obj) {
            Ok(key) => {
                self.queue.add(&key);
            }
            Err(e) => {
                tracing::info!(error = %e, "Could not get key for object");
            }
        }
    }

    /// Enqueue an already derived key.
    pub fn enqueue_key(&self, key: &str) {
        self.queue.add(key);
    }

    /// Re-add `key` after its backoff delay.
    pub fn requeue(&self, key: &str) {
        metrics::record_retry();
        self.queue.add_rate_limited(key);
    }

    /// Run the worker until the queue shuts down.
    ///
    /// A worker that exits for any other reason is logged and relaunched after
    /// `period`, for as long as `stop` has not fired. `stop` never interrupts a
    /// running worker; only [`TaskQueue::shutdown`] does.
    pub async fn run(&self, period: Duration, mut stop: broadcast::Receiver<()>) {
        {
            let mut state = self.lock_state();
            if *state != RunState::Idle {
                tracing::debug!(state = ?*state, "Queue worker not started");
                return;
            }
            *state = RunState::Running;
        }

        while !stop_requested(&mut stop) {
            match self.worker().await {
                WorkerExit::Shutdown => break,
                WorkerExit::Panicked => {
                    tracing::error!(
                        restart_in_ms = period.as_millis() as u64,
                        "Queue worker exited unexpectedly, restarting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(period) => {}
                        _ = stop.recv() => {
                            tracing::info!("Stop signal received, queue worker not restarted");
                            break;
                        }
                    }
                }
            }
        }

        *self.lock_state() = RunState::Exited;
        self.worker_done.send_replace(true);
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn worker(&self) -> WorkerExit {
        while let Some(key) = self.queue.get().await {
            let sync_id = Uuid::new_v4();
            tracing::debug!(key = %key, sync_id = %sync_id, "Syncing");

            let start = Instant::now();
            let result = AssertUnwindSafe(async { (self.sync)(key.clone()).await })
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => {
                    metrics::record_sync("success", start);
                    self.queue.forget(&key);
                }
                Ok(Err(e)) => {
                    metrics::record_sync("error", start);
                    tracing::warn!(key = %key, sync_id = %sync_id, error = %e, "Requeuing after sync error");
                    self.requeue(&key);
                }
                Err(_) => {
                    metrics::record_sync("panic", start);
                    tracing::error!(key = %key, sync_id = %sync_id, "Sync panicked, requeuing");
                    self.requeue(&key);
                    self.queue.done(&key);
                    return WorkerExit::Panicked;
                }
            }

            self.queue.done(&key);
        }

        tracing::debug!("Queue shut down, worker exiting");
        WorkerExit::Shutdown
    }

    /// Close the queue and wait for the worker to exit.
    ///
    /// A `run` that has not started yet is refused from here on, so no sync
    /// happens after this returns.
    pub async fn shutdown(&self) {
        self.queue.shut_down();
        {
            let mut state = self.lock_state();
            match *state {
                RunState::Idle => {
                    *state = RunState::Closed;
                    self.worker_done.send_replace(true);
                    return;
                }
                RunState::Exited | RunState::Closed => return,
                RunState::Running => {}
            }
        }
        let mut done = self.worker_done.subscribe();
        let _ = done.wait_for(|exited| *exited).await;
    }

    /// True once the worker has exited.
    pub fn is_idle(&self) -> bool {
        *self.worker_done.borrow()
    }
}

/// A fired or dropped stop channel both count as a stop request.
fn stop_requested(stop: &mut broadcast::Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyError;
    use crate::key::NamespacedName;
    use crate::lifecycle::Shutdown;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn identity() -> KeyFn<str> {
        Arc::new(|key: &str| Ok::<_, KeyError>(key.to_string()))
    }

    #[tokio::test]
    async fn test_enqueue_uses_namespace_key() {
        let queue: TaskQueue<NamespacedName> =
            TaskQueue::new(|_key: String| async { Ok::<(), SyncError>(()) });

        queue.enqueue(&NamespacedName::new("default", "web"));
        queue.enqueue(&NamespacedName::new("default", "web"));
        queue.enqueue(&NamespacedName::new("default", ""));

        assert_eq!(queue.queue().len(), 1);
        assert_eq!(queue.queue().get().await.as_deref(), Some("default/web"));
    }

    #[tokio::test]
    async fn test_run_syncs_then_shutdown_waits_for_worker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let queue = Arc::new(TaskQueue::with_key_fn(
            move |key: String| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(key);
                    Ok::<(), SyncError>(())
                }
            },
            identity(),
        ));

        let stop = Shutdown::new();
        let worker = {
            let queue = queue.clone();
            let stop = stop.subscribe();
            tokio::spawn(async move { queue.run(Duration::from_millis(10), stop).await })
        };

        queue.enqueue("default/a");
        queue.enqueue("default/b");
        while seen.lock().unwrap().len() < 2 {
            tokio::task::yield_now().await;
        }

        queue.shutdown().await;
        assert!(queue.is_idle());
        worker.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["default/a", "default/b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_sync_restarts_worker() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let queue = Arc::new(TaskQueue::with_key_fn(
            move |_key: String| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("boom");
                    }
                    Ok::<(), SyncError>(())
                }
            },
            identity(),
        ));

        let stop = Shutdown::new();
        {
            let queue = queue.clone();
            let stop = stop.subscribe();
            tokio::spawn(async move { queue.run(Duration::from_secs(1), stop).await });
        }

        queue.enqueue("default/a");
        while calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(queue.queue().num_requeues("default/a"), 0);
        queue.shutdown().await;
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_stop_before_run_skips_worker() {
        let queue: TaskQueue<str> =
            TaskQueue::with_key_fn(|_key: String| async { Ok::<(), SyncError>(()) }, identity());
        let stop = Shutdown::new();
        let rx = stop.subscribe();
        stop.trigger();

        queue.enqueue("default/a");
        queue.run(Duration::from_millis(1), rx).await;

        assert!(queue.is_idle());
        assert_eq!(queue.queue().len(), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_without_run_returns() {
        let queue: TaskQueue<str> =
            TaskQueue::with_key_fn(|_key: String| async { Ok::<(), SyncError>(()) }, identity());
        queue.shutdown().await;
        assert!(queue.is_idle());
        queue.enqueue("default/a");
        assert!(queue.queue().is_empty());
    }

    #[tokio::test]
    async fn test_run_after_shutdown_never_syncs() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let queue: TaskQueue<str> = TaskQueue::with_key_fn(
            move |_key: String| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), SyncError>(())
                }
            },
            identity(),
        );
        queue.enqueue("default/a");
        queue.shutdown().await;

        let stop = Shutdown::new();
        queue.run(Duration::from_millis(1), stop.subscribe()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(queue.is_idle());
    }
}
