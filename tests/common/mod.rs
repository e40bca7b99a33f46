//! Shared utilities for queue integration tests.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ingress_sync::error::{KeyError, SyncError};
use ingress_sync::key::KeyFn;
use ingress_sync::{Shutdown, TaskQueue};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Key function for queues fed with raw keys.
pub fn raw_keys() -> KeyFn<str> {
    Arc::new(|key: &str| Ok::<_, KeyError>(key.to_string()))
}

/// Every sync invocation, in order, with the time it started.
#[derive(Clone, Default)]
pub struct SyncLog {
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

#[allow(dead_code)]
impl SyncLog {
    pub fn record(&self, key: &str) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push((key.to_string(), Instant::now()));
        calls.len()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Gaps between consecutive calls for `key`.
    pub fn gaps(&self, key: &str) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        let times: Vec<Instant> = calls.iter().filter(|(k, _)| k == key).map(|(_, t)| *t).collect();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// Start the queue worker on its own task.
pub fn spawn_worker(queue: &Arc<TaskQueue<str>>, shutdown: &Shutdown) -> JoinHandle<()> {
    let queue = queue.clone();
    let stop = shutdown.subscribe();
    tokio::spawn(async move { queue.run(Duration::from_millis(10), stop).await })
}

/// Poll `condition` every few milliseconds until it holds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    while !condition() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Build a raw-key task queue around `sync`.
#[allow(dead_code)]
pub fn raw_queue<F, Fut>(sync: F) -> Arc<TaskQueue<str>>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
{
    Arc::new(TaskQueue::with_key_fn(sync, raw_keys()))
}
