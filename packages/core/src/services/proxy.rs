//! Resource Proxies
//!
//! External consumers never receive the mutable resource instance. Lookups
//! return a [`ResourceProxy`] instead, which holds only the id and
//! re-resolves through the externally visible subset on every access. Once
//! a resource is destroyed or demoted, its proxies answer with
//! [`ResourceError::NotFound`] rather than serving stale state.

use std::sync::{Arc, Weak};

use super::error::ResourceError;
use super::graph::ResourceGraph;
use crate::models::{Capabilities, LifecycleState, ResourceId, SharedResource};

/// Capability-safe handle to a publicly visible resource.
#[derive(Debug, Clone)]
pub struct ResourceProxy {
    id: ResourceId,
    graph: Weak<ResourceGraph>,
}

impl ResourceProxy {
    pub(crate) fn new(id: ResourceId, graph: &Arc<ResourceGraph>) -> Self {
        Self {
            id,
            graph: Arc::downgrade(graph),
        }
    }

    /// Identity of the resource behind this proxy. Available even after
    /// the resource is gone.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    fn resolve(&self) -> Result<SharedResource, ResourceError> {
        let graph = self
            .graph
            .upgrade()
            .ok_or(ResourceError::NotFound { id: self.id })?;
        graph
            .public_get(self.id)
            .ok_or(ResourceError::NotFound { id: self.id })
    }

    /// Whether the resource is still externally visible.
    pub fn is_alive(&self) -> bool {
        self.resolve().is_ok()
    }

    pub async fn name(&self) -> Result<String, ResourceError> {
        Ok(self.resolve()?.read().await.name.clone())
    }

    pub async fn type_name(&self) -> Result<String, ResourceError> {
        Ok(self.resolve()?.read().await.type_name().to_string())
    }

    pub async fn local_identifier(&self) -> Result<String, ResourceError> {
        Ok(self.resolve()?.read().await.local_identifier.clone())
    }

    pub async fn global_identifier(&self) -> Result<String, ResourceError> {
        Ok(self.resolve()?.read().await.global_identifier.clone())
    }

    pub async fn capabilities(&self) -> Result<Capabilities, ResourceError> {
        Ok(self.resolve()?.read().await.capabilities.clone())
    }

    pub async fn state(&self) -> Result<LifecycleState, ResourceError> {
        Ok(self.resolve()?.read().await.state())
    }

    /// Snapshot of the extension payload.
    pub async fn extension_data(&self) -> Result<serde_json::Value, ResourceError> {
        Ok(self.resolve()?.read().await.extension_data.clone())
    }
}
