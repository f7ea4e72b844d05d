//! Data Structures
//!
//! Core data types of the resource graph:
//!
//! - [`Resource`] - the universal resource struct with type tag, extension
//!   payload and reference fields
//! - [`RelationRecord`] / [`RelationLink`] - persisted edges and their
//!   per-resource view
//! - [`Capabilities`] - runtime capability sets with the `Null` sentinel

pub mod capabilities;
pub mod relation;
pub mod resource;

pub use capabilities::Capabilities;
pub use relation::{ReferenceRole, RelationKind, RelationLink, RelationRecord, RelationRowId};
pub use resource::{
    LifecycleState, ReferenceError, ReferenceValue, Resource, ResourceId, SharedResource,
};
