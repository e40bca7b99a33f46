//! In-memory object store keyed by `namespace/name`.
//!
//! Stands in for the lister that feeds the task queue: watchers write here,
//! the sync callback reads here by key.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::KeyError;
use crate::key::{meta_namespace_key, ObjectMeta};

/// A thread-safe keyed store of watched objects.
#[derive(Clone)]
pub struct MemoryStore<T> {
    inner: Arc<DashMap<String, T>>,
}

impl<T: ObjectMeta + Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace `obj`, returning its key.
    pub fn upsert(&self, obj: T) -> Result<String, KeyError> {
        let key = meta_namespace_key(&obj)?;
        self.inner.insert(key.clone(), obj);
        Ok(key)
    }

    /// Remove the object stored under `key`.
    pub fn delete(&self, key: &str) -> Option<T> {
        self.inner.remove(key).map(|(_, obj)| obj)
    }

    pub fn get_by_key(&self, key: &str) -> Option<T> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<T> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn list_keys(&self) -> Vec<String> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T: ObjectMeta + Clone> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
