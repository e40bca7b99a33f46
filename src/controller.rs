//! Controller wiring: store, task queue, live config and certificate choice.
//!
//! # Data Flow
//! ```text
//! Change<IngressRule>
//!     → handle(): update store, enqueue key
//!     → worker: select_certificate(key)
//!         → store lookup (absent = removed)
//!         → certs::first_match(host, certificate names)
//!         → fallback credential when nothing matches
//! resync ticker → enqueue every stored key
//! config file change → reload_config() → live swap + resync
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::certs::{first_match, read_credential, FallbackCredential};
use crate::config::{load_config, ControllerConfig};
use crate::error::{ConfigError, SyncError};
use crate::key::{meta_namespace_key, Change, KeyFn, ObjectMeta};
use crate::queue::TaskQueue;
use crate::store::MemoryStore;

/// A host rule published for one namespaced object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngressRule {
    pub namespace: String,
    pub name: String,
    pub host: String,
}

impl IngressRule {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            host: host.into(),
        }
    }
}

impl ObjectMeta for IngressRule {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of syncing one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateChoice {
    /// A configured certificate name covers the host.
    Matched(String),
    /// Nothing matched; the fallback credential is served.
    Fallback,
    /// Nothing matched and no fallback credential exists.
    Uncovered,
    /// The rule no longer exists.
    Removed,
}

/// Reconcile `key` against the store and pick a certificate for its host.
pub fn select_certificate(
    key: &str,
    store: &MemoryStore<IngressRule>,
    config: &ControllerConfig,
    fallback: &FallbackCredential,
) -> Result<CertificateChoice, SyncError> {
    let Some(rule) = store.get_by_key(key) else {
        return Ok(CertificateChoice::Removed);
    };
    if rule.host.is_empty() {
        return Err(format!("rule {key} has no host").into());
    }

    let host = rule.host.to_lowercase();
    Ok(match first_match(&host, &config.tls.certificate_names) {
        Some(name) => CertificateChoice::Matched(name.to_string()),
        None if !fallback.is_empty() => CertificateChoice::Fallback,
        None => CertificateChoice::Uncovered,
    })
}

/// Ingress controller core.
pub struct Controller {
    store: MemoryStore<IngressRule>,
    queue: Arc<TaskQueue<Change<IngressRule>>>,
    config: Arc<ArcSwap<ControllerConfig>>,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        let fallback = Arc::new(read_credential(
            Path::new(&config.tls.fallback_cert_path),
            Path::new(&config.tls.fallback_key_path),
        ));
        if fallback.is_empty() {
            tracing::warn!("No fallback certificate available");
        } else if !fallback.has_certificate() {
            tracing::warn!("Fallback certificate files do not contain a PEM certificate and key");
        }

        let limiter = config.queue.rate_limiter();
        let config = Arc::new(ArcSwap::from_pointee(config));
        let store = MemoryStore::new();

        let sync = {
            let store = store.clone();
            let config = config.clone();
            move |key: String| {
                let store = store.clone();
                let config = config.clone();
                let fallback = fallback.clone();
                async move {
                    let choice = select_certificate(&key, &store, &config.load(), &fallback)?;
                    match &choice {
                        CertificateChoice::Matched(name) => {
                            tracing::info!(key = %key, certificate = %name, "Certificate selected")
                        }
                        CertificateChoice::Fallback => {
                            tracing::info!(key = %key, "Using fallback certificate")
                        }
                        CertificateChoice::Uncovered => {
                            tracing::warn!(key = %key, "No certificate covers host")
                        }
                        CertificateChoice::Removed => tracing::info!(key = %key, "Rule removed"),
                    }
                    Ok::<(), SyncError>(())
                }
            }
        };

        // Tombstones carry the key they were stored under; never rebuild it.
        let key_fn: KeyFn<Change<IngressRule>> = Arc::new(Change::<IngressRule>::key);
        let queue = Arc::new(TaskQueue::with_key_fn(sync, key_fn).with_rate_limiter(limiter));

        Self {
            store,
            queue,
            config,
        }
    }

    pub fn store(&self) -> &MemoryStore<IngressRule> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<TaskQueue<Change<IngressRule>>> {
        &self.queue
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<ControllerConfig> {
        self.config.load_full()
    }

    /// Swap in a reloaded configuration and resync everything under it.
    ///
    /// Returns false when nothing changed. Queue settings are read once at
    /// startup; a change to them is stored but only takes effect on restart.
    pub fn apply_config(&self, config: ControllerConfig) -> bool {
        let current = self.config.load();
        if **current == config {
            tracing::debug!("Configuration unchanged, skipping reload");
            return false;
        }
        if current.queue != config.queue {
            tracing::warn!("Queue settings changed; they apply after a restart");
        }
        self.config.store(Arc::new(config));
        tracing::info!("Configuration reloaded");
        self.resync();
        true
    }

    /// Load `path` and apply it. A rejected file keeps the current config.
    pub fn reload_config(&self, path: &Path) -> Result<bool, ConfigError> {
        let config = load_config(path)?;
        Ok(self.apply_config(config))
    }

    /// Reload the configuration whenever `path` changes. The returned
    /// watcher must be kept alive.
    pub fn watch_config(self: &Arc<Self>, path: &Path) -> Result<RecommendedWatcher, notify::Error> {
        let controller = Arc::clone(self);
        let watched: PathBuf = path.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Err(e) = controller.reload_config(&watched) {
                        tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }

    /// Apply a change notification to the store and queue its key.
    pub fn handle(&self, change: Change<IngressRule>) {
        match &change {
            Change::Upsert(rule) => {
                if let Err(e) = self.store.upsert(rule.clone()) {
                    tracing::info!(error = %e, "Dropping rule without a key");
                }
            }
            Change::Delete(rule) => {
                if let Ok(key) = meta_namespace_key(rule) {
                    self.store.delete(&key);
                }
            }
            Change::DeletedFinalStateUnknown { key, last_known } => {
                let removed = self.store.delete(key);
                if let (None, Some(rule)) = (&removed, last_known) {
                    tracing::debug!(key = %key, host = %rule.host, "Tombstone for a rule that was never stored");
                }
            }
        }
        self.queue.enqueue(&change);
    }

    /// Enqueue every stored key.
    pub fn resync(&self) {
        let keys = self.store.list_keys();
        tracing::debug!(count = keys.len(), "Resyncing");
        for key in keys {
            self.queue.enqueue_key(&key);
        }
    }

    /// Run the queue worker until shutdown.
    pub async fn run(&self, stop: broadcast::Receiver<()>) {
        let period = self.config.load().queue.worker_restart_period();
        self.queue.run(period, stop).await;
    }

    /// Periodically resync until `stop` fires.
    pub async fn run_resync(&self, mut stop: broadcast::Receiver<()>) {
        let period = self.config.load().queue.resync_period();
        if period.is_zero() {
            tracing::info!("Periodic resync disabled");
            return;
        }
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.resync(),
                _ = stop.recv() => {
                    tracing::info!("Resync loop received stop signal, exiting");
                    break;
                }
            }
        }
    }

    /// Close the queue and wait for the worker to exit.
    pub async fn shutdown(&self, grace: Duration) {
        if tokio::time::timeout(grace, self.queue.shutdown()).await.is_err() {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "Queue worker still busy after grace period"
            );
        }
    }
}
