//! Queue key derivation and `namespace/name` parsing.

use std::fmt;
use std::str::FromStr;

use crate::error::{KeyError, NsNameError};

/// Identity of a watched object.
pub trait ObjectMeta {
    /// Namespace, empty for cluster-scoped objects.
    fn namespace(&self) -> &str;
    fn name(&self) -> &str;
}

/// Key function injected into a task queue.
pub type KeyFn<T> = std::sync::Arc<dyn Fn(&T) -> Result<String, KeyError> + Send + Sync>;

/// `namespace/name`, or just `name` when the namespace is empty.
pub fn meta_namespace_key<T: ObjectMeta + ?Sized>(obj: &T) -> Result<String, KeyError> {
    let name = obj.name();
    if name.is_empty() {
        return Err(KeyError::MissingName);
    }
    match obj.namespace() {
        "" => Ok(name.to_string()),
        namespace => Ok(format!("{namespace}/{name}")),
    }
}

/// Inverse of [`meta_namespace_key`].
pub fn split_meta_namespace_key(key: &str) -> Result<(&str, &str), KeyError> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) => Ok(("", name)),
        (Some(namespace), Some(name), None) => Ok((namespace, name)),
        _ => Err(KeyError::UnexpectedFormat(key.to_string())),
    }
}

/// Split `namespace/name`; exactly one separator is accepted.
pub fn parse_ns_name(input: &str) -> Result<(&str, &str), NsNameError> {
    match input.split_once('/') {
        Some((namespace, name)) if !name.contains('/') => Ok((namespace, name)),
        _ => Err(NsNameError::InvalidFormat(input.to_string())),
    }
}

/// An owned `namespace/name` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl FromStr for NamespacedName {
    type Err = NsNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = parse_ns_name(s)?;
        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl ObjectMeta for NamespacedName {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A change notification delivered by a watcher.
#[derive(Debug, Clone)]
pub enum Change<T> {
    Upsert(T),
    Delete(T),
    /// A deletion observed without the object's final state; only the key
    /// recorded when it was last seen is known.
    DeletedFinalStateUnknown { key: String, last_known: Option<T> },
}

impl<T: ObjectMeta> Change<T> {
    /// Key for this change; tombstones reuse their recorded key verbatim.
    pub fn key(&self) -> Result<String, KeyError> {
        match self {
            Change::Upsert(obj) | Change::Delete(obj) => meta_namespace_key(obj),
            Change::DeletedFinalStateUnknown { key, .. } => Ok(key.clone()),
        }
    }
}

impl<T: ObjectMeta> ObjectMeta for Change<T> {
    fn namespace(&self) -> &str {
        match self {
            Change::Upsert(obj) | Change::Delete(obj) => obj.namespace(),
            Change::DeletedFinalStateUnknown { key, .. } => {
                split_meta_namespace_key(key).map_or("", |(namespace, _)| namespace)
            }
        }
    }

    fn name(&self) -> &str {
        match self {
            Change::Upsert(obj) | Change::Delete(obj) => obj.name(),
            Change::DeletedFinalStateUnknown { key, .. } => {
                split_meta_namespace_key(key).map_or("", |(_, name)| name)
            }
        }
    }
}
