//! Graph Loader
//!
//! Rebuilds the in-memory resource graph from the flat templates the store
//! returns at boot. Resources may reference each other mutually, so no
//! single-pass construction order exists; loading therefore runs in two
//! phases:
//!
//! 1. Every template is instantiated independently and inserted into the
//!    graph index. No resource needs another one to exist yet.
//! 2. Once the index is complete, every resource's reference fields are
//!    linked against it. Each task only reads the shared index and writes
//!    its own fields, so this phase fans out as well.
//!
//! Linking failures propagate. An inconsistent graph at boot is fatal;
//! fault tolerance is the lifecycle controller's job and applies to
//! lifecycle calls only.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinSet;

use super::error::ResourceError;
use super::graph::ResourceGraph;
use super::matching::matching_links;
use crate::db::ResourceTemplate;
use crate::models::{RelationLink, Resource, SharedResource};
use crate::registry::{ReferenceCardinality, ResourceTypeRegistry};

pub(crate) struct GraphLoader {
    registry: Arc<ResourceTypeRegistry>,
    graph: Arc<ResourceGraph>,
}

impl GraphLoader {
    pub(crate) fn new(registry: Arc<ResourceTypeRegistry>, graph: Arc<ResourceGraph>) -> Self {
        Self { registry, graph }
    }

    /// Instantiates and links the full template set.
    pub(crate) async fn load(&self, templates: Vec<ResourceTemplate>) -> Result<(), ResourceError> {
        tracing::debug!(count = templates.len(), "instantiating resource graph");

        let mut instantiation = JoinSet::new();
        for template in templates {
            let registry = self.registry.clone();
            let graph = self.graph.clone();
            instantiation.spawn(async move {
                let resource = instantiate(&registry, &template)?;
                let public = registry.get(&template.record.type_name)?.is_public();
                graph.insert(
                    template.record.id,
                    Arc::new(RwLock::new(resource)),
                    public,
                );
                Ok::<ResourceTemplate, ResourceError>(template)
            });
        }

        let mut instantiated = Vec::new();
        while let Some(joined) = instantiation.join_next().await {
            instantiated.push(joined.map_err(|e| ResourceError::Task(e.to_string()))??);
        }

        tracing::debug!("linking resource references");
        let mut linking = JoinSet::new();
        for template in instantiated {
            let registry = self.registry.clone();
            let graph = self.graph.clone();
            linking.spawn(async move { link(&registry, &graph, &template).await });
        }
        while let Some(joined) = linking.join_next().await {
            joined.map_err(|e| ResourceError::Task(e.to_string()))??;
        }

        Ok(())
    }
}

/// Builds one resource from its stored template.
fn instantiate(
    registry: &ResourceTypeRegistry,
    template: &ResourceTemplate,
) -> Result<Resource, ResourceError> {
    let record = &template.record;
    let extension: Option<serde_json::Value> = if record.extension_data.is_empty() {
        None
    } else {
        Some(serde_json::from_str(&record.extension_data)?)
    };
    let mut resource = registry.instantiate(&record.type_name, &record.name, extension)?;
    resource.assign_id(record.id);
    resource.local_identifier = record.local_identifier.clone();
    resource.global_identifier = record.global_identifier.clone();
    Ok(resource)
}

/// Populates one resource's reference fields from its relation rows.
async fn link(
    registry: &ResourceTypeRegistry,
    graph: &ResourceGraph,
    template: &ResourceTemplate,
) -> Result<(), ResourceError> {
    let id = template.record.id;
    let def = registry.get(&template.record.type_name)?;
    let resource = graph.get(id).ok_or(ResourceError::NotFound { id })?;
    let links = RelationLink::from_records(id, &template.relations);

    let mut guard = resource.write().await;
    for descriptor in def.references() {
        if descriptor.override_source.is_some() {
            continue;
        }
        let matches = matching_links(&links, descriptor);
        match descriptor.cardinality {
            ReferenceCardinality::Single => {
                if let Some(link) = matches.first() {
                    let partner = resolve(graph, link)?;
                    guard.set_single(&descriptor.field, Some(partner))?;
                }
            }
            ReferenceCardinality::Collection => {
                let mut partners = Vec::with_capacity(matches.len());
                for link in &matches {
                    partners.push(resolve(graph, link)?);
                }
                guard.collection_mut(&descriptor.field)?.extend(partners);
            }
        }
    }
    Ok(())
}

fn resolve(graph: &ResourceGraph, link: &RelationLink) -> Result<SharedResource, ResourceError> {
    graph
        .get(link.partner_id)
        .ok_or(ResourceError::DanglingRelation {
            row: link.row_id,
            id: link.partner_id,
        })
}
