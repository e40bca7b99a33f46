//! Deduplicating, delaying FIFO of string keys.
//!
//! Every key the queue knows about carries exactly one [`KeyState`] in a single
//! guarded map, so "is it queued" and "is it being processed" are answered by
//! the same lookup under the same lock.
//!
//! # State Transitions
//! ```text
//! absent     --add-->  queued
//! queued     --get-->  processing
//! processing --add-->  processing (dirty)
//! processing --done--> absent
//! dirty      --done--> queued
//! failure: add_rate_limited --> delayed --(deadline)--> add
//! ```

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::queue::rate_limit::{ExponentialBackoff, RateLimiter};

/// Where a known key currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// Waiting in the FIFO to be handed out by `get`.
    Queued,
    /// Handed out by `get`, not yet `done`.
    Processing,
    /// Re-added while processing; goes back to `Queued` on `done`.
    ProcessingDirty,
}

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<String, KeyState>,
    fifo: VecDeque<String>,
    /// Delayed keys ordered by readiness.
    waiting: BTreeSet<(Instant, String)>,
    ready_at: HashMap<String, Instant>,
    shutting_down: bool,
}

impl Inner {
    fn add(&mut self, key: &str) -> bool {
        if self.shutting_down {
            return false;
        }
        match self.states.get(key).copied() {
            Some(KeyState::Queued | KeyState::ProcessingDirty) => false,
            Some(KeyState::Processing) => {
                self.states.insert(key.to_string(), KeyState::ProcessingDirty);
                true
            }
            None => {
                self.states.insert(key.to_string(), KeyState::Queued);
                self.fifo.push_back(key.to_string());
                true
            }
        }
    }

    /// Hold `key` until `at`; an earlier pending deadline for the same key wins.
    fn add_at(&mut self, key: &str, at: Instant) {
        if self.shutting_down {
            return;
        }
        if let Some(existing) = self.ready_at.get(key).copied() {
            if existing <= at {
                return;
            }
            self.waiting.remove(&(existing, key.to_string()));
        }
        self.ready_at.insert(key.to_string(), at);
        self.waiting.insert((at, key.to_string()));
    }

    /// Move every delayed key whose deadline has passed into the FIFO.
    fn promote_due(&mut self, now: Instant) {
        while let Some((at, _)) = self.waiting.first() {
            if *at > now {
                break;
            }
            let Some((_, key)) = self.waiting.pop_first() else {
                break;
            };
            self.ready_at.remove(&key);
            self.add(&key);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.waiting.first().map(|(at, _)| *at)
    }
}

/// Rate-limited work queue with a single consumer.
pub struct WorkQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    limiter: Box<dyn RateLimiter>,
}

impl WorkQueue {
    /// Create a queue that retries with the given limiter.
    pub fn new(limiter: impl RateLimiter + 'static) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            limiter: Box::new(limiter),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing work. Returns false if it was already pending
    /// or the queue is shutting down.
    pub fn add(&self, key: &str) -> bool {
        let (added, depth) = {
            let mut inner = self.lock();
            let added = inner.add(key);
            (added, inner.fifo.len())
        };
        if added {
            metrics::record_queue_add();
            metrics::record_queue_depth(depth);
            self.notify.notify_one();
        }
        added
    }

    /// Add `key` once `delay` has elapsed.
    pub fn add_after(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        self.lock().add_at(key, Instant::now() + delay);
        // The worker may be sleeping towards a later deadline.
        self.notify.notify_one();
    }

    /// Add `key` after the limiter's next delay for it.
    pub fn add_rate_limited(&self, key: &str) {
        let delay = self.limiter.next_delay(key);
        tracing::debug!(
            key = %key,
            delay_ms = delay.as_millis() as u64,
            failures = self.limiter.failures(key),
            "Key scheduled for retry"
        );
        self.add_after(key, delay);
    }

    /// Wait for the next key.
    ///
    /// Returns `None` once the queue is shutting down and nothing ready is
    /// left to hand out.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let mut inner = self.lock();
                inner.promote_due(Instant::now());
                if let Some(key) = inner.fifo.pop_front() {
                    inner.states.insert(key.clone(), KeyState::Processing);
                    metrics::record_queue_depth(inner.fifo.len());
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
                inner.next_deadline()
            };

            match deadline {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release a key handed out by `get`. A key re-added while processing is
    /// queued again.
    pub fn done(&self, key: &str) {
        let requeued_depth = {
            let mut inner = self.lock();
            match inner.states.remove(key) {
                Some(KeyState::ProcessingDirty) => {
                    inner.states.insert(key.to_string(), KeyState::Queued);
                    inner.fifo.push_back(key.to_string());
                    Some(inner.fifo.len())
                }
                Some(KeyState::Processing) => None,
                Some(KeyState::Queued) => {
                    // Not ours to release.
                    inner.states.insert(key.to_string(), KeyState::Queued);
                    tracing::warn!(key = %key, "Done called for a key that was never handed out");
                    None
                }
                None => None,
            }
        };
        if let Some(depth) = requeued_depth {
            metrics::record_queue_depth(depth);
            self.notify.notify_one();
        }
    }

    /// Clear retry history for `key` after a successful sync.
    pub fn forget(&self, key: &str) {
        self.limiter.forget(key);
    }

    /// Consecutive failures recorded for `key`.
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.limiter.failures(key)
    }

    /// Current state of `key`, `None` if absent or only delayed.
    pub fn state(&self, key: &str) -> Option<KeyState> {
        self.lock().states.get(key).copied()
    }

    /// Number of keys ready to be handed out.
    pub fn len(&self) -> usize {
        self.lock().fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys waiting out a retry delay.
    pub fn delayed_len(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Stop accepting keys and wake any blocked `get`. Delayed keys are dropped.
    pub fn shut_down(&self) {
        {
            let mut inner = self.lock();
            inner.shutting_down = true;
            inner.waiting.clear();
            inner.ready_at.clear();
        }
        self.notify.notify_waiters();
        // Covers a consumer that is between its state check and its wait.
        self.notify.notify_one();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(ExponentialBackoff::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::rate_limit::FixedDelay;

    #[tokio::test]
    async fn test_add_deduplicates_pending_keys() {
        let queue = WorkQueue::default();
        assert!(queue.add("default/web"));
        assert!(!queue.add("default/web"));
        assert!(!queue.add("default/web"));
        assert!(queue.add("default/api"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().await.as_deref(), Some("default/web"));
        assert_eq!(queue.get().await.as_deref(), Some("default/api"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_add_while_processing_marks_dirty() {
        let queue = WorkQueue::default();
        queue.add("k");
        let key = queue.get().await.unwrap();
        assert_eq!(queue.state(&key), Some(KeyState::Processing));

        assert!(queue.add("k"));
        assert!(!queue.add("k"));
        assert_eq!(queue.state("k"), Some(KeyState::ProcessingDirty));
        // Not handed out again while still processing.
        assert!(queue.is_empty());

        queue.done(&key);
        assert_eq!(queue.state("k"), Some(KeyState::Queued));
        assert_eq!(queue.get().await.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_dirty_requeue_updates_depth_gauge() {
        use metrics_exporter_prometheus::PrometheusBuilder;

        let queue = WorkQueue::default();
        queue.add("k");
        let key = queue.get().await.unwrap();
        queue.add("k");

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || queue.done(&key));

        assert!(handle.render().contains("ingress_queue_depth 1"));
    }

    #[tokio::test]
    async fn test_done_without_dirty_removes_key() {
        let queue = WorkQueue::default();
        queue.add("k");
        let key = queue.get().await.unwrap();
        queue.done(&key);
        assert_eq!(queue.state("k"), None);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_waits_for_deadline() {
        let queue = WorkQueue::default();
        let start = Instant::now();
        queue.add_after("k", Duration::from_secs(3));
        assert_eq!(queue.delayed_len(), 1);
        assert!(queue.is_empty());

        assert_eq!(queue.get().await.as_deref(), Some("k"));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_key_keeps_earliest_deadline() {
        let queue = WorkQueue::default();
        queue.add_after("k", Duration::from_secs(10));
        queue.add_after("k", Duration::from_secs(2));
        queue.add_after("k", Duration::from_secs(5));
        assert_eq!(queue.delayed_len(), 1);

        let start = Instant::now();
        assert_eq!(queue.get().await.as_deref(), Some("k"));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_add_counts_failures() {
        let queue = WorkQueue::new(FixedDelay::new(Duration::from_millis(100)));
        queue.add_rate_limited("k");
        queue.add_rate_limited("k");
        assert_eq!(queue.num_requeues("k"), 2);

        queue.forget("k");
        assert_eq!(queue.num_requeues("k"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_get() {
        let queue = std::sync::Arc::new(WorkQueue::default());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;

        queue.shut_down();
        assert_eq!(consumer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shutdown_drains_ready_keys_and_ignores_new_ones() {
        let queue = WorkQueue::default();
        queue.add("a");
        queue.add_after("b", Duration::from_secs(60));
        queue.shut_down();

        assert!(!queue.add("c"));
        assert_eq!(queue.delayed_len(), 0);
        assert_eq!(queue.get().await.as_deref(), Some("a"));
        assert_eq!(queue.get().await, None);
    }
}
