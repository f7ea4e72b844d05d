//! Storage Layer
//!
//! Contract between the resource services and the backing relational
//! engine, plus the in-memory implementation used by tests and embedded
//! setups.
//!
//! The store only knows two logical tables: resource records and relation
//! rows. Everything else, including the reference graph, is reconstructed
//! from those by the service layer.

mod error;
mod memory_store;
mod store;

pub use error::StoreError;
pub use memory_store::MemoryResourceStore;
pub use store::{ResourceRecord, ResourceStore, ResourceTemplate, ResourceUnitOfWork};
