//! Graph Index
//!
//! The authoritative id index of all loaded resources plus the subset that
//! is visible to external consumers. Both maps live under one mutex: a
//! resource must never be observable in one index but not the other, so
//! every mutation covers both in a single critical section. The sections
//! never await and never call back into resources, which keeps the lock
//! cheap and ordering trivial.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::{ResourceId, SharedResource};

#[derive(Default)]
struct GraphIndexes {
    resources: HashMap<ResourceId, SharedResource>,
    public: HashMap<ResourceId, SharedResource>,
}

/// Thread-safe id index and externally visible subset.
#[derive(Default)]
pub struct ResourceGraph {
    indexes: Mutex<GraphIndexes>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn indexes(&self) -> MutexGuard<'_, GraphIndexes> {
        self.indexes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a resource under its id, optionally into the public subset.
    pub fn insert(&self, id: ResourceId, resource: SharedResource, public: bool) {
        let mut indexes = self.indexes();
        indexes.resources.insert(id, resource.clone());
        if public {
            indexes.public.insert(id, resource);
        }
    }

    /// Canonical handle by id.
    pub fn get(&self, id: ResourceId) -> Option<SharedResource> {
        self.indexes().resources.get(&id).cloned()
    }

    /// Handle by id, restricted to the externally visible subset.
    pub fn public_get(&self, id: ResourceId) -> Option<SharedResource> {
        self.indexes().public.get(&id).cloned()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.indexes().resources.contains_key(&id)
    }

    /// Removes a resource from both indexes. Returns whether either index
    /// actually held it.
    pub fn remove(&self, id: ResourceId) -> bool {
        let mut indexes = self.indexes();
        let in_resources = indexes.resources.remove(&id).is_some();
        let in_public = indexes.public.remove(&id).is_some();
        in_resources || in_public
    }

    /// Demotes a resource from the externally visible subset, keeping it in
    /// the id index. Used when its initialization or start failed.
    pub fn remove_public(&self, id: ResourceId) -> bool {
        self.indexes().public.remove(&id).is_some()
    }

    /// Snapshot of every loaded resource.
    pub fn all(&self) -> Vec<SharedResource> {
        self.indexes().resources.values().cloned().collect()
    }

    /// Snapshot of the externally visible subset.
    pub fn public(&self) -> Vec<SharedResource> {
        self.indexes().public.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.indexes().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes().resources.is_empty()
    }
}
