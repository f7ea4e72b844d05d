//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations on the
//! resource graph, with proper error chaining down to the storage layer.

use thiserror::Error;

use crate::db::StoreError;
use crate::models::{LifecycleState, ReferenceError, RelationRowId, ResourceId};
use crate::registry::RegistryError;

/// Resource service operation errors.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Id lookup against the graph index failed.
    #[error("resource not found: {id}")]
    NotFound { id: ResourceId },

    /// A query expected exactly one match and found none.
    #[error("no resource matched the request")]
    NoMatch,

    /// A query expected exactly one match and found several.
    #[error("request matched {matches} resources, expected exactly one")]
    Ambiguous { matches: usize },

    /// Type registry failure.
    #[error("resource type error: {0}")]
    Registry(#[from] RegistryError),

    /// Reference field access failure.
    #[error("reference field error: {0}")]
    Reference(#[from] ReferenceError),

    /// A stored relation row points at a resource that does not exist.
    #[error("relation row {row} references missing resource {id}")]
    DanglingRelation {
        row: RelationRowId,
        id: ResourceId,
    },

    /// The requested lifecycle transition is not allowed.
    #[error("cannot {operation} a resource in state {from:?}")]
    InvalidTransition {
        from: LifecycleState,
        operation: &'static str,
    },

    /// The operation requires a persisted resource.
    #[error("operation requires a persisted resource, but {name} is transient")]
    Transient { name: String },

    /// Storage failure; the enclosing session was rolled back.
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    /// Extension payload could not be encoded or decoded.
    #[error("extension payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// A background task of a bulk operation died.
    #[error("background task failed: {0}")]
    Task(String),
}
