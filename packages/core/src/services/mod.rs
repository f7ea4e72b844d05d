//! Resource Services
//!
//! This module contains the service layer of the resource graph:
//!
//! - [`ResourceManager`] - facade for boot, mutation, lookup and teardown
//! - [`ResourceGraph`] - thread-safe id index and externally visible subset
//! - [`matching_links`] - relation-row to reference-field matching
//! - [`ResourceProxy`] - indirection handed to external consumers
//! - [`ErrorReporting`] - warning sink for isolated faults
//!
//! The loader, persistence synchronizer and lifecycle controller are
//! internal; they are orchestrated by the manager.

pub mod error;
pub mod graph;
pub mod manager;
pub mod matching;
pub mod proxy;
pub mod reporting;

pub(crate) mod lifecycle;
pub(crate) mod loader;
pub(crate) mod persistence;

pub use error::ResourceError;
pub use graph::ResourceGraph;
pub use manager::{ManagerConfig, ResourceEvent, ResourceManager};
pub use matching::matching_links;
pub use proxy::ResourceProxy;
pub use reporting::{ErrorReporting, TracingErrorReporting};
