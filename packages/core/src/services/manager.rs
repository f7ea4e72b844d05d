//! Resource Manager
//!
//! The facade over the whole resource layer. It owns the graph index and
//! composes the loader, persistence synchronizer and lifecycle controller
//! behind one surface:
//!
//! - **Boot**: [`ResourceManager::initialize`] loads the graph from the
//!   store, or bootstraps a root resource into an empty store, and then
//!   initializes every resource in parallel. [`ResourceManager::start`] and
//!   [`ResourceManager::stop`] drive the remaining lifecycle phases.
//! - **Mutation**: [`ResourceManager::update`] and
//!   [`ResourceManager::mutate_collection`] apply a change and persist it
//!   before returning, so persistence ordering is deterministic and a
//!   caller never observes an unsaved mutation.
//! - **Access**: [`ResourceManager::get_resource`] and friends filter the
//!   externally visible subset by capabilities and predicate and hand out
//!   proxies, never the internal instances.
//!
//! Domain events are published on a broadcast channel, following the
//! subscribe-to-events pattern of the storage layer services.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::ResourceError;
use super::graph::ResourceGraph;
use super::lifecycle::LifecycleController;
use super::loader::GraphLoader;
use super::persistence::PersistenceSync;
use super::proxy::ResourceProxy;
use super::reporting::{ErrorReporting, TracingErrorReporting};
use crate::db::ResourceStore;
use crate::models::{Capabilities, ReferenceError, Resource, ResourceId, SharedResource};
use crate::registry::ResourceTypeRegistry;

/// Broadcast channel capacity for resource events.
///
/// Sized for burst boots of mid-size graphs; lagging observers only miss
/// events they can re-derive from the current graph state.
const RESOURCE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Type of the root resource created when the store is empty.
    pub root_type: String,
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl ManagerConfig {
    pub fn new(root_type: impl Into<String>) -> Self {
        Self {
            root_type: root_type.into(),
            event_channel_capacity: RESOURCE_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Events published to external observers.
#[derive(Debug, Clone)]
pub enum ResourceEvent {
    /// A resource entered the externally visible subset.
    ResourceAdded(ResourceProxy),
    /// A visible resource changed its capability set. The sender is
    /// proxy-wrapped; observers never see the internal instance.
    CapabilitiesChanged {
        resource: ResourceProxy,
        capabilities: Capabilities,
    },
}

/// Facade over graph loading, persistence, lifecycle and access.
pub struct ResourceManager {
    registry: Arc<ResourceTypeRegistry>,
    store: Arc<dyn ResourceStore>,
    graph: Arc<ResourceGraph>,
    persistence: PersistenceSync,
    lifecycle: LifecycleController,
    config: ManagerConfig,
    event_tx: broadcast::Sender<ResourceEvent>,
}

impl ResourceManager {
    /// Creates a manager reporting isolated faults through `tracing`.
    pub fn new(
        registry: Arc<ResourceTypeRegistry>,
        store: Arc<dyn ResourceStore>,
        config: ManagerConfig,
    ) -> Self {
        Self::with_reporting(registry, store, config, Arc::new(TracingErrorReporting))
    }

    /// Creates a manager with a custom warning sink.
    pub fn with_reporting(
        registry: Arc<ResourceTypeRegistry>,
        store: Arc<dyn ResourceStore>,
        config: ManagerConfig,
        reporting: Arc<dyn ErrorReporting>,
    ) -> Self {
        let graph = Arc::new(ResourceGraph::new());
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            persistence: PersistenceSync::new(store.clone(), registry.clone()),
            lifecycle: LifecycleController::new(registry.clone(), graph.clone(), reporting),
            registry,
            store,
            graph,
            config,
            event_tx,
        }
    }

    /// Subscribes to resource events.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<ResourceEvent> {
        self.event_tx.subscribe()
    }

    /// Loads the graph from the store, bootstrapping a root resource when
    /// the store is empty, and initializes every resource in parallel.
    pub async fn initialize(&self) -> Result<(), ResourceError> {
        let templates = self.store.fetch_templates().await?;
        if templates.is_empty() {
            tracing::debug!(root_type = %self.config.root_type, "empty store, bootstrapping root");
            let root = self.create(&self.config.root_type)?;
            self.save(&root).await?;
        } else {
            GraphLoader::new(self.registry.clone(), self.graph.clone())
                .load(templates)
                .await?;
        }
        self.lifecycle.initialize_all().await;
        Ok(())
    }

    /// Starts every resource in parallel with isolated failure handling.
    pub async fn start(&self) {
        self.lifecycle.start_all().await;
    }

    /// Stops every resource in parallel with isolated failure handling.
    pub async fn stop(&self) {
        self.lifecycle.stop_all().await;
    }

    /// Starts one resource, reporting failure through the warning sink.
    pub async fn start_resource(&self, resource: &SharedResource) -> bool {
        self.lifecycle.start(resource).await
    }

    /// Stops one resource, reporting failure through the warning sink.
    pub async fn stop_resource(&self, resource: &SharedResource) -> bool {
        self.lifecycle.stop(resource).await
    }

    /// Direct lookup by id. Internal entry point without capability
    /// filtering; external consumers go through [`ResourceManager::get_resource`].
    pub fn get(&self, id: ResourceId) -> Result<SharedResource, ResourceError> {
        self.graph.get(id).ok_or(ResourceError::NotFound { id })
    }

    /// Instantiates a transient resource of the named type. The instance
    /// is not persisted or indexed until its first save; it starts out
    /// named after its type with a generated global identifier.
    pub fn create(&self, type_name: &str) -> Result<SharedResource, ResourceError> {
        let mut resource = self.registry.instantiate(type_name, type_name, None)?;
        if resource.global_identifier.is_empty() {
            resource.global_identifier = Uuid::new_v4().to_string();
        }
        Ok(Arc::new(RwLock::new(resource)))
    }

    /// Persists a resource and everything it transitively requires. Newly
    /// persisted resources are indexed afterwards and announced when they
    /// are publicly visible.
    pub async fn save(&self, resource: &SharedResource) -> Result<ResourceId, ResourceError> {
        let outcome = self.persistence.save(resource).await?;
        self.index_new(outcome.newly_persisted).await;
        Ok(outcome.id)
    }

    /// Applies a mutation and persists it before returning.
    pub async fn update<F>(&self, resource: &SharedResource, mutate: F) -> Result<(), ResourceError>
    where
        F: FnOnce(&mut Resource),
    {
        {
            let mut guard = resource.write().await;
            mutate(&mut *guard);
        }
        self.save(resource).await?;
        Ok(())
    }

    /// Applies a mutation to a reference collection. When the descriptor
    /// (or, for override fields, its source field) is marked auto-save and
    /// the resource is persisted, the field's rows are re-synchronized
    /// before returning. Collections of transient resources persist with
    /// the first full save instead.
    pub async fn mutate_collection<F>(
        &self,
        resource: &SharedResource,
        field: &str,
        mutate: F,
    ) -> Result<(), ResourceError>
    where
        F: FnOnce(&mut Vec<SharedResource>),
    {
        let (type_name, transient) = {
            let guard = resource.read().await;
            (guard.type_name().to_string(), guard.is_transient())
        };
        let def = self.registry.get(&type_name)?;
        let descriptor = def
            .reference(field)
            .ok_or_else(|| ReferenceError::UnknownField(field.to_string()))?;
        let auto_save = descriptor.auto_save;
        // Override fields are views; edits land on the source field.
        let storage_field = descriptor
            .override_source
            .clone()
            .unwrap_or_else(|| descriptor.field.clone());

        {
            let mut guard = resource.write().await;
            mutate(guard.collection_mut(&storage_field)?);
        }

        if auto_save && !transient {
            let outcome = self.persistence.auto_save_collection(resource, field).await?;
            self.index_new(outcome.newly_persisted).await;
        }
        Ok(())
    }

    /// Replaces the capability set of a resource and notifies observers.
    /// Capabilities are runtime state and are not persisted.
    pub async fn set_capabilities(
        &self,
        resource: &SharedResource,
        capabilities: Capabilities,
    ) -> Result<(), ResourceError> {
        let id = {
            let mut guard = resource.write().await;
            guard.capabilities = capabilities.clone();
            guard.id()
        };
        if id > 0 && self.graph.public_get(id).is_some() {
            let _ = self.event_tx.send(ResourceEvent::CapabilitiesChanged {
                resource: ResourceProxy::new(id, &self.graph),
                capabilities,
            });
        }
        Ok(())
    }

    /// Exactly-one lookup over the externally visible subset. Resources
    /// whose capability set is the `Null` sentinel never match, even for
    /// an unconditional predicate.
    pub async fn get_resource<F>(&self, predicate: F) -> Result<ResourceProxy, ResourceError>
    where
        F: Fn(&Resource) -> bool,
    {
        let matches = self.collect_matches(predicate).await;
        match matches.len() {
            0 => Err(ResourceError::NoMatch),
            1 => Ok(ResourceProxy::new(matches[0], &self.graph)),
            n => Err(ResourceError::Ambiguous { matches: n }),
        }
    }

    /// Exactly-one lookup by id.
    pub async fn get_resource_by_id(&self, id: ResourceId) -> Result<ResourceProxy, ResourceError> {
        self.get_resource(|r| r.id() == id).await
    }

    /// Exactly-one lookup by display name.
    pub async fn get_resource_by_name(&self, name: &str) -> Result<ResourceProxy, ResourceError> {
        self.get_resource(|r| r.name == name).await
    }

    /// Exactly-one lookup by required capabilities.
    pub async fn get_resource_with(
        &self,
        required: &Capabilities,
    ) -> Result<ResourceProxy, ResourceError> {
        self.get_resource(|r| required.provided_by(&r.capabilities))
            .await
    }

    /// All matches over the externally visible subset, proxy-wrapped.
    pub async fn get_resources<F>(&self, predicate: F) -> Vec<ResourceProxy>
    where
        F: Fn(&Resource) -> bool,
    {
        self.collect_matches(predicate)
            .await
            .into_iter()
            .map(|id| ResourceProxy::new(id, &self.graph))
            .collect()
    }

    /// All resources providing the required capabilities.
    pub async fn get_resources_with(&self, required: &Capabilities) -> Vec<ResourceProxy> {
        self.get_resources(|r| required.provided_by(&r.capabilities))
            .await
    }

    async fn collect_matches<F>(&self, predicate: F) -> Vec<ResourceId>
    where
        F: Fn(&Resource) -> bool,
    {
        let mut ids = Vec::new();
        for resource in self.graph.public() {
            let guard = resource.read().await;
            // Public but capability-less resources stay invisible.
            if guard.capabilities.is_null() {
                continue;
            }
            if predicate(&guard) {
                ids.push(guard.id());
            }
        }
        ids.sort_unstable();
        ids
    }

    /// Stops a resource, severs every reference its neighbors hold to it,
    /// and removes it from store and graph. Permanent destruction also
    /// deletes its relation rows; soft destruction keeps record and rows
    /// for audit. Returns whether the graph actually changed.
    pub async fn destroy(
        &self,
        resource: &SharedResource,
        permanent: bool,
    ) -> Result<bool, ResourceError> {
        let (id, name) = {
            let guard = resource.read().await;
            (guard.id(), guard.name.clone())
        };
        if id == 0 {
            return Err(ResourceError::Transient { name });
        }

        self.stop_resource(resource).await;

        let mut uow = self.store.begin().await?;
        let records = uow.relations_for(id).await?;
        for record in &records {
            let partner_id = if record.source_id == id {
                record.target_id
            } else {
                record.source_id
            };
            if let Some(partner) = self.graph.get(partner_id) {
                if !Arc::ptr_eq(&partner, resource) {
                    partner.write().await.clear_reference_to(resource);
                }
            }
            if permanent {
                uow.remove_relation(record.id).await?;
            }
        }
        uow.remove_resource(id, permanent).await?;
        uow.commit().await?;

        tracing::debug!(id, permanent, "resource destroyed");
        Ok(self.graph.remove(id))
    }

    async fn index_new(&self, newly_persisted: Vec<SharedResource>) {
        for resource in newly_persisted {
            let (id, type_name) = {
                let guard = resource.read().await;
                (guard.id(), guard.type_name().to_string())
            };
            let public = self
                .registry
                .get(&type_name)
                .map(|def| def.is_public())
                .unwrap_or(false);
            self.graph.insert(id, resource, public);
            if public {
                let _ = self
                    .event_tx
                    .send(ResourceEvent::ResourceAdded(ResourceProxy::new(
                        id,
                        &self.graph,
                    )));
            }
        }
    }
}
