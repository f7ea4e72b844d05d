//! Resource Data Structures
//!
//! This module defines the core `Resource` struct shared by every concrete
//! resource type in PlantGraph.
//!
//! # Architecture
//!
//! - **Universal resource**: a single struct represents all variants; the
//!   concrete type is carried as a type tag plus per-type metadata in the
//!   type registry.
//! - **Opaque extension payload**: all variant-specific fields that are not
//!   modeled as relations live in `extension_data` as JSON, so the store
//!   schema never changes when a new type is registered.
//! - **Id semantics**: `id` is 0 until the store assigns an identity at the
//!   first successful save. Until then the resource is *transient* and not
//!   addressable through the graph.
//! - **Reference fields**: references to other resources are held as shared
//!   handles so that a transient neighbor can be referenced before it has
//!   an id. The graph index owns the canonical handle per id; proxies and
//!   external consumers only ever hold ids.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::capabilities::Capabilities;

/// Store-assigned resource identity. 0 means transient.
pub type ResourceId = i64;

/// Shared handle to a resource. The graph index holds the canonical handle;
/// reference fields hold clones of the same allocation.
pub type SharedResource = Arc<RwLock<Resource>>;

/// Errors raised by reference field access.
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("unknown reference field: {0}")]
    UnknownField(String),

    #[error("reference field {0} is not a single reference")]
    NotSingle(String),

    #[error("reference field {0} is not a reference collection")]
    NotCollection(String),
}

/// Lifecycle state of a resource.
///
/// Transitions only move forward, except that `Running` falls back to
/// `Stopped` on shutdown. A stopped resource is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    Constructed,
    Initialized,
    Running,
    Stopped,
}

/// Value of one reference field.
pub enum ReferenceValue {
    /// At most one referenced resource.
    Single(Option<SharedResource>),
    /// Any number of referenced resources.
    Collection(Vec<SharedResource>),
}

impl fmt::Debug for ReferenceValue {
    // Handles may form cycles, so the referenced resources are not printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceValue::Single(None) => write!(f, "Single(None)"),
            ReferenceValue::Single(Some(_)) => write!(f, "Single(..)"),
            ReferenceValue::Collection(items) => write!(f, "Collection(len = {})", items.len()),
        }
    }
}

/// A typed domain object participating in the resource graph.
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    type_name: String,
    state: LifecycleState,
    references: HashMap<String, ReferenceValue>,

    /// Display name.
    pub name: String,
    /// Identifier within the local installation, e.g. a bus address.
    pub local_identifier: String,
    /// Globally unique identifier, e.g. a serial number.
    pub global_identifier: String,
    /// Variant-specific fields not modeled as relations.
    pub extension_data: serde_json::Value,
    /// Current runtime capability set.
    pub capabilities: Capabilities,
}

impl Resource {
    /// Creates a transient resource. Reference fields are registered
    /// afterwards by the type registry.
    pub(crate) fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            type_name: type_name.into(),
            state: LifecycleState::Constructed,
            references: HashMap::new(),
            name: name.into(),
            local_identifier: String::new(),
            global_identifier: String::new(),
            extension_data: serde_json::Value::Object(serde_json::Map::new()),
            capabilities: Capabilities::default(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Whether the store has not assigned an identity yet.
    pub fn is_transient(&self) -> bool {
        self.id == 0
    }

    /// Identity is assigned exactly once, by the store, at first save.
    pub(crate) fn assign_id(&mut self, id: ResourceId) {
        self.id = id;
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    /// Registers a reference field. Called once per field at instantiation.
    pub(crate) fn init_reference(&mut self, field: impl Into<String>, value: ReferenceValue) {
        self.references.insert(field.into(), value);
    }

    /// Current value of a single reference field.
    pub fn single(&self, field: &str) -> Result<Option<SharedResource>, ReferenceError> {
        match self.references.get(field) {
            Some(ReferenceValue::Single(value)) => Ok(value.clone()),
            Some(ReferenceValue::Collection(_)) => Err(ReferenceError::NotSingle(field.into())),
            None => Err(ReferenceError::UnknownField(field.into())),
        }
    }

    /// Replaces the value of a single reference field.
    pub fn set_single(
        &mut self,
        field: &str,
        value: Option<SharedResource>,
    ) -> Result<(), ReferenceError> {
        match self.references.get_mut(field) {
            Some(ReferenceValue::Single(slot)) => {
                *slot = value;
                Ok(())
            }
            Some(ReferenceValue::Collection(_)) => Err(ReferenceError::NotSingle(field.into())),
            None => Err(ReferenceError::UnknownField(field.into())),
        }
    }

    /// Snapshot of a reference collection.
    pub fn collection(&self, field: &str) -> Result<Vec<SharedResource>, ReferenceError> {
        match self.references.get(field) {
            Some(ReferenceValue::Collection(items)) => Ok(items.clone()),
            Some(ReferenceValue::Single(_)) => Err(ReferenceError::NotCollection(field.into())),
            None => Err(ReferenceError::UnknownField(field.into())),
        }
    }

    /// Mutable access to a reference collection.
    pub(crate) fn collection_mut(
        &mut self,
        field: &str,
    ) -> Result<&mut Vec<SharedResource>, ReferenceError> {
        match self.references.get_mut(field) {
            Some(ReferenceValue::Collection(items)) => Ok(items),
            Some(ReferenceValue::Single(_)) => Err(ReferenceError::NotCollection(field.into())),
            None => Err(ReferenceError::UnknownField(field.into())),
        }
    }

    /// Severs the first reference field currently holding `instance`.
    /// Returns whether a field was changed. Fields are matched by handle
    /// identity, not by id, so transient instances are found as well.
    pub(crate) fn clear_reference_to(&mut self, instance: &SharedResource) -> bool {
        for value in self.references.values_mut() {
            match value {
                ReferenceValue::Single(slot) => {
                    if slot.as_ref().is_some_and(|r| Arc::ptr_eq(r, instance)) {
                        *slot = None;
                        return true;
                    }
                }
                ReferenceValue::Collection(items) => {
                    if let Some(index) = items.iter().position(|r| Arc::ptr_eq(r, instance)) {
                        items.remove(index);
                        return true;
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(type_name: &str) -> SharedResource {
        Arc::new(RwLock::new(Resource::new(type_name, type_name)))
    }

    #[test]
    fn new_resource_is_transient_and_constructed() {
        let resource = Resource::new("Machine", "press-1");
        assert_eq!(resource.id(), 0);
        assert!(resource.is_transient());
        assert_eq!(resource.state(), LifecycleState::Constructed);
        assert_eq!(resource.type_name(), "Machine");
        assert_eq!(resource.name, "press-1");
    }

    #[test]
    fn single_reference_roundtrip() {
        let mut resource = Resource::new("Machine", "press-1");
        resource.init_reference("driver", ReferenceValue::Single(None));

        assert!(resource.single("driver").unwrap().is_none());

        let driver = shared("Driver");
        resource.set_single("driver", Some(driver.clone())).unwrap();
        let held = resource.single("driver").unwrap().unwrap();
        assert!(Arc::ptr_eq(&held, &driver));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let resource = Resource::new("Machine", "press-1");
        assert!(matches!(
            resource.single("driver"),
            Err(ReferenceError::UnknownField(_))
        ));
    }

    #[test]
    fn cardinality_mismatch_is_rejected() {
        let mut resource = Resource::new("Machine", "press-1");
        resource.init_reference("parts", ReferenceValue::Collection(Vec::new()));

        assert!(matches!(
            resource.single("parts"),
            Err(ReferenceError::NotSingle(_))
        ));
        assert!(matches!(
            resource.set_single("parts", None),
            Err(ReferenceError::NotSingle(_))
        ));
    }

    #[test]
    fn clear_reference_severs_single_and_collection() {
        let mut resource = Resource::new("Machine", "press-1");
        let neighbor = shared("Driver");
        resource.init_reference("driver", ReferenceValue::Single(Some(neighbor.clone())));
        resource.init_reference(
            "parts",
            ReferenceValue::Collection(vec![neighbor.clone()]),
        );

        assert!(resource.clear_reference_to(&neighbor));
        assert!(resource.clear_reference_to(&neighbor));
        assert!(!resource.clear_reference_to(&neighbor));

        assert!(resource.single("driver").unwrap().is_none());
        assert!(resource.collection("parts").unwrap().is_empty());
    }
}
