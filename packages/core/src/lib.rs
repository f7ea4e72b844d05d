//! PlantGraph Core Resource Layer
//!
//! This crate manages a runtime graph of typed resources (machines,
//! drivers, transport routes, ...) that stays durably synchronized with a
//! relational store, and exposes it to external consumers through
//! capability-filtered proxies.
//!
//! # Architecture
//!
//! - **Universal resource model**: one struct for all types; a type tag
//!   selects registry metadata and behavior, variant-specific fields live
//!   in an opaque JSON extension payload
//! - **Two logical tables**: resource records and relation rows are all
//!   the store needs; the reference graph is rebuilt from them in a
//!   two-phase load
//! - **Diff-based persistence**: every save recomputes the expected row
//!   set per reference field and issues the minimal create/delete set
//! - **Isolated lifecycle faults**: initialize/start/stop fan out per
//!   resource; one faulty device never blocks the rest of the plant
//!
//! # Modules
//!
//! - [`models`] - data structures (Resource, relation rows, capabilities)
//! - [`registry`] - resource type registry and reference descriptors
//! - [`behaviors`] - per-type lifecycle behavior trait
//! - [`services`] - manager facade, graph index, persistence, proxies
//! - [`db`] - storage contract and the in-memory engine

pub mod behaviors;
pub mod db;
pub mod models;
pub mod registry;
pub mod services;

// Re-export commonly used types
pub use behaviors::*;
pub use models::*;
pub use registry::*;
pub use services::*;
