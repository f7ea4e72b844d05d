//! Store Error Types
//!
//! Error type for the storage contract. Service-layer failures are wrapped
//! into [`crate::services::ResourceError`].

use thiserror::Error;

use crate::models::{RelationRowId, ResourceId};

/// Storage operation errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The resource record does not exist (or was hard-deleted).
    #[error("resource record not found: {id}")]
    ResourceMissing { id: ResourceId },

    /// The relation row does not exist.
    #[error("relation row not found: {row}")]
    RelationMissing { row: RelationRowId },

    /// Backend-specific failure, e.g. an I/O error of a real engine.
    #[error("storage backend failure: {0}")]
    Backend(String),
}
