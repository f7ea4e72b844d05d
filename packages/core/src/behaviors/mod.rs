//! Resource Behavior System
//!
//! Per-type lifecycle hooks. A behavior is registered alongside its type in
//! the [`crate::registry::ResourceTypeRegistry`] and is invoked by the
//! lifecycle controller when the graph boots, starts or stops. Behaviors
//! are the extension point for hardware bindings, protocol sessions and
//! anything else a concrete resource type has to set up or tear down.
//!
//! All hooks default to no-ops, so passive resources need no behavior of
//! their own.

use async_trait::async_trait;

use crate::models::Resource;

/// Type-specific lifecycle hooks.
///
/// A failing hook never takes the rest of the graph down: bulk lifecycle
/// calls isolate the failure, report it through the warning sink and move
/// on. Hooks must leave the resource in a consistent state when they fail.
#[async_trait]
pub trait ResourceBehavior: Send + Sync {
    /// Called once after the graph is fully linked, before anything starts.
    async fn initialize(&self, resource: &mut Resource) -> anyhow::Result<()> {
        let _ = resource;
        Ok(())
    }

    /// Called when the resource transitions into operation.
    async fn start(&self, resource: &mut Resource) -> anyhow::Result<()> {
        let _ = resource;
        Ok(())
    }

    /// Called when the resource shuts down. Only invoked on running
    /// resources.
    async fn stop(&self, resource: &mut Resource) -> anyhow::Result<()> {
        let _ = resource;
        Ok(())
    }
}

/// Behavior for resource types without lifecycle needs.
#[derive(Debug, Default)]
pub struct NullBehavior;

#[async_trait]
impl ResourceBehavior for NullBehavior {}
