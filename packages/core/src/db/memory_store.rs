//! In-Memory Store
//!
//! Transactional in-memory implementation of the storage contract. It backs
//! the test suites and embedded deployments that do not need durability.
//!
//! Units of work buffer their mutations and apply them under one lock at
//! commit time, so concurrent readers never observe a half-applied session.
//! Identities are pre-allocated from atomic counters when a record or row
//! is first saved, which keeps ids unique across concurrent sessions even
//! before they commit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreError;
use super::store::{ResourceRecord, ResourceStore, ResourceTemplate, ResourceUnitOfWork};
use crate::models::{RelationRecord, RelationRowId, ResourceId};

#[derive(Debug, Clone)]
struct StoredResource {
    record: ResourceRecord,
    deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CommittedState {
    resources: HashMap<ResourceId, StoredResource>,
    relations: HashMap<RelationRowId, RelationRecord>,
}

impl CommittedState {
    fn relations_touching(&self, id: ResourceId) -> Vec<RelationRecord> {
        let mut rows: Vec<RelationRecord> = self
            .relations
            .values()
            .filter(|r| r.source_id == id || r.target_id == id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }
}

/// In-memory storage engine.
#[derive(Clone)]
pub struct MemoryResourceStore {
    state: Arc<Mutex<CommittedState>>,
    next_resource_id: Arc<AtomicI64>,
    next_relation_id: Arc<AtomicI64>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CommittedState::default())),
            next_resource_id: Arc::new(AtomicI64::new(1)),
            next_relation_id: Arc::new(AtomicI64::new(1)),
        }
    }

    fn state(&self) -> MutexGuard<'_, CommittedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Committed record by id, soft-deleted records included.
    pub fn resource_record(&self, id: ResourceId) -> Option<ResourceRecord> {
        self.state().resources.get(&id).map(|r| r.record.clone())
    }

    /// Whether the record exists and is soft-deleted.
    pub fn is_soft_deleted(&self, id: ResourceId) -> bool {
        self.state().resources.get(&id).is_some_and(|r| r.deleted)
    }

    /// Creation and last-update timestamps of a committed record.
    pub fn timestamps(&self, id: ResourceId) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.state()
            .resources
            .get(&id)
            .map(|r| (r.created_at, r.updated_at))
    }

    /// All committed relation rows, ordered by row id.
    pub fn relation_records(&self) -> Vec<RelationRecord> {
        let state = self.state();
        let mut rows: Vec<RelationRecord> = state.relations.values().cloned().collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    /// Committed relation rows touching one resource id.
    pub fn relations_touching(&self, id: ResourceId) -> Vec<RelationRecord> {
        self.state().relations_touching(id)
    }
}

impl Default for MemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn fetch_templates(&self) -> Result<Vec<ResourceTemplate>, StoreError> {
        let state = self.state();
        let live: Vec<&StoredResource> =
            state.resources.values().filter(|r| !r.deleted).collect();
        let mut templates: Vec<ResourceTemplate> = live
            .iter()
            .map(|stored| {
                let id = stored.record.id;
                // Rows kept for audit after a soft delete must not resurface
                // as dangling references, so only rows between live records
                // enter the load view.
                let relations = state
                    .relations_touching(id)
                    .into_iter()
                    .filter(|row| {
                        let partner = if row.source_id == id {
                            row.target_id
                        } else {
                            row.source_id
                        };
                        state.resources.get(&partner).is_some_and(|p| !p.deleted)
                    })
                    .collect();
                ResourceTemplate {
                    record: stored.record.clone(),
                    relations,
                }
            })
            .collect();
        templates.sort_by_key(|t| t.record.id);
        Ok(templates)
    }

    async fn begin(&self) -> Result<Box<dyn ResourceUnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            pending: Vec::new(),
        }))
    }
}

#[derive(Debug)]
enum PendingOp {
    UpsertResource(ResourceRecord),
    RemoveResource { id: ResourceId, permanent: bool },
    CreateRelation(RelationRecord),
    RemoveRelation(RelationRowId),
}

struct MemoryUnitOfWork {
    store: MemoryResourceStore,
    pending: Vec<PendingOp>,
}

impl MemoryUnitOfWork {
    fn pending_resource(&self, id: ResourceId) -> bool {
        self.pending
            .iter()
            .any(|op| matches!(op, PendingOp::UpsertResource(r) if r.id == id))
    }
}

#[async_trait]
impl ResourceUnitOfWork for MemoryUnitOfWork {
    async fn save_resource(&mut self, mut record: ResourceRecord) -> Result<ResourceId, StoreError> {
        if record.id == 0 {
            record.id = self.store.next_resource_id.fetch_add(1, Ordering::Relaxed);
        } else if !self.store.state().resources.contains_key(&record.id)
            && !self.pending_resource(record.id)
        {
            return Err(StoreError::ResourceMissing { id: record.id });
        }
        let id = record.id;
        self.pending.push(PendingOp::UpsertResource(record));
        Ok(id)
    }

    async fn relations_for(&mut self, id: ResourceId) -> Result<Vec<RelationRecord>, StoreError> {
        let mut rows = self.store.state().relations_touching(id);
        for op in &self.pending {
            match op {
                PendingOp::CreateRelation(record)
                    if record.source_id == id || record.target_id == id =>
                {
                    rows.push(record.clone());
                }
                PendingOp::RemoveRelation(row) => rows.retain(|r| r.id != *row),
                _ => {}
            }
        }
        Ok(rows)
    }

    async fn create_relation(
        &mut self,
        mut record: RelationRecord,
    ) -> Result<RelationRowId, StoreError> {
        if record.id == 0 {
            record.id = self.store.next_relation_id.fetch_add(1, Ordering::Relaxed);
        }
        let id = record.id;
        self.pending.push(PendingOp::CreateRelation(record));
        Ok(id)
    }

    async fn remove_relation(&mut self, row: RelationRowId) -> Result<(), StoreError> {
        // A row created in this session is simply withdrawn again.
        if let Some(index) = self
            .pending
            .iter()
            .position(|op| matches!(op, PendingOp::CreateRelation(r) if r.id == row))
        {
            self.pending.remove(index);
            return Ok(());
        }
        if !self.store.state().relations.contains_key(&row) {
            return Err(StoreError::RelationMissing { row });
        }
        self.pending.push(PendingOp::RemoveRelation(row));
        Ok(())
    }

    async fn remove_relations(&mut self, rows: Vec<RelationRowId>) -> Result<(), StoreError> {
        for row in rows {
            self.remove_relation(row).await?;
        }
        Ok(())
    }

    async fn remove_resource(&mut self, id: ResourceId, permanent: bool) -> Result<(), StoreError> {
        if !self.store.state().resources.contains_key(&id) && !self.pending_resource(id) {
            return Err(StoreError::ResourceMissing { id });
        }
        self.pending.push(PendingOp::RemoveResource { id, permanent });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut state = self.store.state();
        let now = Utc::now();
        for op in self.pending {
            match op {
                PendingOp::UpsertResource(record) => {
                    let id = record.id;
                    state
                        .resources
                        .entry(id)
                        .and_modify(|stored| {
                            stored.record = record.clone();
                            stored.deleted = false;
                            stored.updated_at = now;
                        })
                        .or_insert_with(|| StoredResource {
                            record,
                            deleted: false,
                            created_at: now,
                            updated_at: now,
                        });
                }
                PendingOp::RemoveResource { id, permanent } => {
                    if permanent {
                        state.resources.remove(&id);
                    } else if let Some(stored) = state.resources.get_mut(&id) {
                        stored.deleted = true;
                        stored.updated_at = now;
                    }
                }
                PendingOp::CreateRelation(record) => {
                    state.relations.insert(record.id, record);
                }
                PendingOp::RemoveRelation(row) => {
                    state.relations.remove(&row);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelationKind;

    fn record(name: &str) -> ResourceRecord {
        ResourceRecord {
            id: 0,
            type_name: "Machine".to_string(),
            name: name.to_string(),
            local_identifier: String::new(),
            global_identifier: String::new(),
            extension_data: "{}".to_string(),
        }
    }

    fn relation(source: ResourceId, target: ResourceId) -> RelationRecord {
        RelationRecord {
            id: 0,
            kind: RelationKind::Driver,
            name: None,
            source_id: source,
            target_id: target,
        }
    }

    #[tokio::test]
    async fn commit_publishes_and_assigns_ids() {
        let store = MemoryResourceStore::new();
        let mut uow = store.begin().await.unwrap();

        let id = uow.save_resource(record("press-1")).await.unwrap();
        assert!(id > 0);
        // Nothing visible before commit.
        assert!(store.resource_record(id).is_none());

        uow.commit().await.unwrap();
        assert_eq!(store.resource_record(id).unwrap().name, "press-1");
    }

    #[tokio::test]
    async fn dropping_a_session_rolls_back() {
        let store = MemoryResourceStore::new();
        let mut uow = store.begin().await.unwrap();
        let id = uow.save_resource(record("press-1")).await.unwrap();
        drop(uow);
        assert!(store.resource_record(id).is_none());
    }

    #[tokio::test]
    async fn relations_for_overlays_pending_mutations() {
        let store = MemoryResourceStore::new();

        let (a, b, row) = {
            let mut uow = store.begin().await.unwrap();
            let a = uow.save_resource(record("a")).await.unwrap();
            let b = uow.save_resource(record("b")).await.unwrap();
            let row = uow.create_relation(relation(a, b)).await.unwrap();
            uow.commit().await.unwrap();
            (a, b, row)
        };

        let mut uow = store.begin().await.unwrap();
        let fresh = uow.create_relation(relation(a, b)).await.unwrap();
        uow.remove_relation(row).await.unwrap();

        let rows = uow.relations_for(a).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, fresh);

        drop(uow);
        // The committed row survives the rollback.
        assert_eq!(store.relations_touching(b).len(), 1);
    }

    #[tokio::test]
    async fn removing_a_session_created_row_withdraws_it() {
        let store = MemoryResourceStore::new();
        let mut uow = store.begin().await.unwrap();
        let a = uow.save_resource(record("a")).await.unwrap();
        let b = uow.save_resource(record("b")).await.unwrap();
        let row = uow.create_relation(relation(a, b)).await.unwrap();
        uow.remove_relation(row).await.unwrap();
        uow.commit().await.unwrap();

        assert!(store.relation_records().is_empty());
    }

    #[tokio::test]
    async fn removing_an_unknown_row_fails() {
        let store = MemoryResourceStore::new();
        let mut uow = store.begin().await.unwrap();
        assert!(matches!(
            uow.remove_relation(99).await,
            Err(StoreError::RelationMissing { row: 99 })
        ));
    }

    #[tokio::test]
    async fn saving_an_unknown_persisted_record_fails() {
        let store = MemoryResourceStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut rec = record("ghost");
        rec.id = 42;
        assert!(matches!(
            uow.save_resource(rec).await,
            Err(StoreError::ResourceMissing { id: 42 })
        ));
    }

    #[tokio::test]
    async fn soft_delete_keeps_the_record_out_of_the_load_view() {
        let store = MemoryResourceStore::new();

        let (a, b) = {
            let mut uow = store.begin().await.unwrap();
            let a = uow.save_resource(record("a")).await.unwrap();
            let b = uow.save_resource(record("b")).await.unwrap();
            uow.create_relation(relation(a, b)).await.unwrap();
            uow.commit().await.unwrap();
            (a, b)
        };

        let mut uow = store.begin().await.unwrap();
        uow.remove_resource(b, false).await.unwrap();
        uow.commit().await.unwrap();

        // Record and row retained for audit.
        assert!(store.is_soft_deleted(b));
        assert_eq!(store.relation_records().len(), 1);

        // But neither appears in the cold-start view.
        let templates = store.fetch_templates().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].record.id, a);
        assert!(templates[0].relations.is_empty());
    }

    #[tokio::test]
    async fn updates_touch_the_update_timestamp() {
        let store = MemoryResourceStore::new();
        let mut uow = store.begin().await.unwrap();
        let id = uow.save_resource(record("press-1")).await.unwrap();
        uow.commit().await.unwrap();

        let (created, _) = store.timestamps(id).unwrap();

        let mut rec = store.resource_record(id).unwrap();
        rec.name = "press-2".to_string();
        let mut uow = store.begin().await.unwrap();
        uow.save_resource(rec).await.unwrap();
        uow.commit().await.unwrap();

        let (created_after, updated) = store.timestamps(id).unwrap();
        assert_eq!(created, created_after);
        assert!(updated >= created);
    }
}
