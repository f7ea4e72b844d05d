//! ResourceStore Trait - Storage Abstraction Layer
//!
//! This module defines the storage contract between the resource services
//! and the backing relational engine. The engine itself is deliberately
//! behind a trait: production deployments bind a database, tests and
//! embedded setups use [`crate::db::MemoryResourceStore`].
//!
//! The contract is session based. Every save or destroy opens one
//! [`ResourceUnitOfWork`], performs all of its record and relation-row
//! mutations inside it, and commits once. Dropping a unit of work without
//! committing discards everything, so a failed operation never leaves a
//! partial state behind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use crate::models::{RelationRecord, RelationRowId, ResourceId};

/// Stored shape of a resource's base attributes.
///
/// The extension payload travels as JSON text; the store never interprets
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// Identity, 0 for records that were never stored.
    pub id: ResourceId,
    pub type_name: String,
    pub name: String,
    pub local_identifier: String,
    pub global_identifier: String,
    pub extension_data: String,
}

/// Cold-start view of one stored resource: its record plus every relation
/// row touching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub record: ResourceRecord,
    pub relations: Vec<RelationRecord>,
}

/// Storage engine contract.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetches every stored resource with its relation rows, for graph
    /// reconstruction at boot.
    async fn fetch_templates(&self) -> Result<Vec<ResourceTemplate>, StoreError>;

    /// Opens a transactional unit of work.
    async fn begin(&self) -> Result<Box<dyn ResourceUnitOfWork>, StoreError>;
}

/// One transactional session against the store.
///
/// All mutations are deferred until [`ResourceUnitOfWork::commit`]; reads
/// observe the committed state overlaid with this session's own pending
/// mutations.
#[async_trait]
pub trait ResourceUnitOfWork: Send {
    /// Creates or updates a resource record. Records with id 0 are assigned
    /// a fresh identity, which is returned either way.
    async fn save_resource(&mut self, record: ResourceRecord) -> Result<ResourceId, StoreError>;

    /// All relation rows with `id` as either endpoint.
    async fn relations_for(&mut self, id: ResourceId) -> Result<Vec<RelationRecord>, StoreError>;

    /// Stores a new relation row and returns its identity.
    async fn create_relation(&mut self, record: RelationRecord)
        -> Result<RelationRowId, StoreError>;

    /// Deletes one relation row.
    async fn remove_relation(&mut self, row: RelationRowId) -> Result<(), StoreError>;

    /// Deletes several relation rows.
    async fn remove_relations(&mut self, rows: Vec<RelationRowId>) -> Result<(), StoreError>;

    /// Deletes a resource record. Soft deletion keeps the record for audit
    /// but removes it from the cold-start view.
    async fn remove_resource(&mut self, id: ResourceId, permanent: bool) -> Result<(), StoreError>;

    /// Applies every pending mutation atomically.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
