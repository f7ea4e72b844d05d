//! Persistence Synchronization
//!
//! Translates in-memory resource state into store mutations. A save writes
//! the base record and extension payload unconditionally, then diffs every
//! reference field against the relation rows currently stored for the
//! resource and issues the minimal create/delete set. After a save no row
//! is left dangling and no live reference is missing its row.
//!
//! Ordering inside a save is strict: a referenced resource that is still
//! transient is persisted first, so a relation row can never point at an
//! unassigned id. All mutations of one save run inside a single unit of
//! work and commit atomically.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::error::ResourceError;
use super::matching::matching_links;
use crate::db::{ResourceRecord, ResourceStore, ResourceUnitOfWork};
use crate::models::{
    ReferenceRole, RelationKind, RelationLink, RelationRecord, ResourceId, SharedResource,
};
use crate::registry::{ReferenceCardinality, ReferenceDescriptor, ResourceTypeRegistry};

/// Result of one save call.
pub(crate) struct SaveOutcome {
    /// Identity of the saved resource.
    pub id: ResourceId,
    /// Resources that received their identity during this save, in
    /// persistence order. They are in memory but not yet indexed; the
    /// caller adds them to the graph once the session has committed.
    pub newly_persisted: Vec<SharedResource>,
}

/// Book-keeping of one save session.
#[derive(Default)]
struct SaveContext {
    /// Resources already written in this session, keyed by handle identity.
    /// Reference cycles between transient resources terminate here.
    visited: HashSet<usize>,
    newly_persisted: Vec<SharedResource>,
}

fn handle_key(resource: &SharedResource) -> usize {
    Arc::as_ptr(resource) as usize
}

pub(crate) struct PersistenceSync {
    store: Arc<dyn ResourceStore>,
    registry: Arc<ResourceTypeRegistry>,
}

impl PersistenceSync {
    pub(crate) fn new(store: Arc<dyn ResourceStore>, registry: Arc<ResourceTypeRegistry>) -> Self {
        Self { store, registry }
    }

    /// Persists a resource, its reference rows and any transient neighbors
    /// inside one transactional session.
    pub(crate) async fn save(
        &self,
        resource: &SharedResource,
    ) -> Result<SaveOutcome, ResourceError> {
        let mut uow = self.store.begin().await?;
        let mut ctx = SaveContext::default();
        let id = self.save_within(&mut *uow, resource, &mut ctx).await?;
        uow.commit().await?;
        tracing::debug!(id, "resource saved");
        Ok(SaveOutcome {
            id,
            newly_persisted: ctx.newly_persisted,
        })
    }

    /// Re-synchronizes the rows of exactly one collection field, in its own
    /// session. Override fields are redirected to their source field.
    pub(crate) async fn auto_save_collection(
        &self,
        resource: &SharedResource,
        field: &str,
    ) -> Result<SaveOutcome, ResourceError> {
        let (owner_id, type_name, name) = {
            let guard = resource.read().await;
            (guard.id(), guard.type_name().to_string(), guard.name.clone())
        };
        if owner_id == 0 {
            return Err(ResourceError::Transient { name });
        }

        let def = self.registry.get(&type_name)?;
        let descriptor = def
            .reference(field)
            .ok_or_else(|| crate::models::ReferenceError::UnknownField(field.to_string()))?;
        let target = match &descriptor.override_source {
            Some(source) => def
                .reference(source)
                .ok_or_else(|| crate::models::ReferenceError::UnknownField(source.clone()))?,
            None => descriptor,
        };

        let mut uow = self.store.begin().await?;
        let mut ctx = SaveContext::default();
        let records = uow.relations_for(owner_id).await?;
        let links = RelationLink::from_records(owner_id, &records);
        let matches: Vec<RelationLink> = matching_links(&links, target)
            .into_iter()
            .cloned()
            .collect();
        self.update_collection_reference(&mut *uow, owner_id, resource, target, &matches, &mut ctx)
            .await?;
        uow.commit().await?;
        tracing::debug!(id = owner_id, field = %target.field, "collection re-synchronized");
        Ok(SaveOutcome {
            id: owner_id,
            newly_persisted: ctx.newly_persisted,
        })
    }

    /// Recursive save step shared by the entry points. Boxed because saving
    /// a transient neighbor re-enters it.
    fn save_within<'a>(
        &'a self,
        uow: &'a mut dyn ResourceUnitOfWork,
        resource: &'a SharedResource,
        ctx: &'a mut SaveContext,
    ) -> Pin<Box<dyn Future<Output = Result<ResourceId, ResourceError>> + Send + 'a>> {
        Box::pin(async move {
            if !ctx.visited.insert(handle_key(resource)) {
                return Ok(resource.read().await.id());
            }

            let (record, was_transient) = {
                let guard = resource.read().await;
                let record = ResourceRecord {
                    id: guard.id(),
                    type_name: guard.type_name().to_string(),
                    name: guard.name.clone(),
                    local_identifier: guard.local_identifier.clone(),
                    global_identifier: guard.global_identifier.clone(),
                    extension_data: serde_json::to_string(&guard.extension_data)?,
                };
                (record, guard.is_transient())
            };
            let type_name = record.type_name.clone();

            let assigned = uow.save_resource(record).await?;
            if was_transient {
                resource.write().await.assign_id(assigned);
                ctx.newly_persisted.push(resource.clone());
            }

            let def = self.registry.get(&type_name)?;
            let records = uow.relations_for(assigned).await?;
            let links = RelationLink::from_records(assigned, &records);

            for descriptor in def.references() {
                if descriptor.override_source.is_some() {
                    continue;
                }
                let matches: Vec<RelationLink> = matching_links(&links, descriptor)
                    .into_iter()
                    .cloned()
                    .collect();
                match descriptor.cardinality {
                    ReferenceCardinality::Single => {
                        self.update_single_reference(
                            uow, assigned, resource, descriptor, &matches, ctx,
                        )
                        .await?;
                    }
                    ReferenceCardinality::Collection => {
                        self.update_collection_reference(
                            uow, assigned, resource, descriptor, &matches, ctx,
                        )
                        .await?;
                    }
                }
            }

            Ok(assigned)
        })
    }

    /// Syncs one single-reference field. The diff is taken against the
    /// partner id, so re-targeting the field replaces the stale row.
    async fn update_single_reference(
        &self,
        uow: &mut dyn ResourceUnitOfWork,
        owner_id: ResourceId,
        owner: &SharedResource,
        descriptor: &ReferenceDescriptor,
        matches: &[RelationLink],
        ctx: &mut SaveContext,
    ) -> Result<(), ResourceError> {
        let current = owner.read().await.single(&descriptor.field)?;
        let existing = matches.first();

        let referenced = match (current, existing) {
            (None, None) => return Ok(()),
            (None, Some(link)) => {
                uow.remove_relation(link.row_id).await?;
                return Ok(());
            }
            (Some(referenced), _) => referenced,
        };

        let referenced_id = self.ensure_persisted(uow, &referenced, ctx).await?;
        if let Some(link) = existing {
            if link.partner_id == referenced_id {
                return Ok(());
            }
            uow.remove_relation(link.row_id).await?;
        }
        uow.create_relation(relation_record_for(descriptor, owner_id, referenced_id))
            .await?;
        Ok(())
    }

    /// Syncs one collection field: rows whose partner left the collection
    /// are removed, new members get rows, transient members are persisted
    /// first.
    async fn update_collection_reference(
        &self,
        uow: &mut dyn ResourceUnitOfWork,
        owner_id: ResourceId,
        owner: &SharedResource,
        descriptor: &ReferenceDescriptor,
        matches: &[RelationLink],
        ctx: &mut SaveContext,
    ) -> Result<(), ResourceError> {
        let items = owner.read().await.collection(&descriptor.field)?;

        let mut live_ids = HashSet::new();
        for item in &items {
            let id = item.read().await.id();
            if id > 0 {
                live_ids.insert(id);
            }
        }

        let stale: Vec<_> = matches
            .iter()
            .filter(|link| !live_ids.contains(&link.partner_id))
            .map(|link| link.row_id)
            .collect();
        if !stale.is_empty() {
            uow.remove_relations(stale).await?;
        }

        let known: HashSet<ResourceId> = matches.iter().map(|link| link.partner_id).collect();
        for item in &items {
            let id = item.read().await.id();
            if id > 0 && known.contains(&id) {
                continue;
            }
            let referenced_id = self.ensure_persisted(uow, item, ctx).await?;
            uow.create_relation(relation_record_for(descriptor, owner_id, referenced_id))
                .await?;
        }
        Ok(())
    }

    /// Identity of the referenced resource, saving it first when transient.
    async fn ensure_persisted(
        &self,
        uow: &mut dyn ResourceUnitOfWork,
        referenced: &SharedResource,
        ctx: &mut SaveContext,
    ) -> Result<ResourceId, ResourceError> {
        let id = referenced.read().await.id();
        if id > 0 {
            Ok(id)
        } else {
            self.save_within(uow, referenced, ctx).await
        }
    }
}

/// Builds the relation row for a reference field, assigning source and
/// target according to the descriptor role: a `Source` role puts the
/// referenced resource at the source end of the row.
fn relation_record_for(
    descriptor: &ReferenceDescriptor,
    owner: ResourceId,
    referenced: ResourceId,
) -> RelationRecord {
    let spec = descriptor.relation.as_ref();
    let kind = spec.map_or(RelationKind::Custom, |s| s.kind);
    let name = if kind == RelationKind::Custom {
        spec.and_then(|s| s.name.clone())
            .or_else(|| Some(descriptor.field.clone()))
    } else {
        spec.and_then(|s| s.name.clone())
    };
    let (source_id, target_id) = match descriptor.role() {
        ReferenceRole::Source => (referenced, owner),
        ReferenceRole::Target => (owner, referenced),
    };
    RelationRecord {
        id: 0,
        kind,
        name,
        source_id,
        target_id,
    }
}
