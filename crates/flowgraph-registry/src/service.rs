//! Typed service objects handed to sub-graph factories.
//!
//! The embedding environment registers shared objects under a
//! [`GraphService`] key; factories look them up while generating their
//! fragment. Lookups return the registered `Arc` itself, never a copy.

use core::fmt;
use core::marker::PhantomData;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Typed key for a service of type `T`.
pub struct GraphService<T> {
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> GraphService<T> {
    /// Creates a service key.
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    /// The string key.
    pub const fn key(&self) -> &'static str {
        self.key
    }
}

impl<T> Clone for GraphService<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GraphService<T> {}

impl<T> fmt::Debug for GraphService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphService({})", self.key)
    }
}

/// Service objects keyed by [`GraphService`].
#[derive(Clone, Default)]
pub struct ServiceSet {
    services: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl ServiceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` under `service`, replacing any previous object.
    pub fn set<T: Any + Send + Sync>(&mut self, service: &GraphService<T>, value: Arc<T>) {
        self.services.insert(service.key, value);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with<T: Any + Send + Sync>(mut self, service: &GraphService<T>, value: Arc<T>) -> Self {
        self.set(service, value);
        self
    }

    /// The object registered under `service`.
    ///
    /// Returns `None` if nothing is registered or the stored object has a
    /// different type.
    pub fn get<T: Any + Send + Sync>(&self, service: &GraphService<T>) -> Option<Arc<T>> {
        let stored = Arc::clone(self.services.get(service.key)?);
        stored.downcast::<T>().ok()
    }

    /// Returns true if anything is registered under the key.
    pub fn contains<T>(&self, service: &GraphService<T>) -> bool {
        self.services.contains_key(service.key)
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if no services are registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.services.keys().copied().collect();
        keys.sort_unstable();
        f.debug_struct("ServiceSet").field("keys", &keys).finish()
    }
}
