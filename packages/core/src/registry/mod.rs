//! Resource Type Registry
//!
//! Static, builder-populated metadata for every concrete resource type:
//! which of its fields reference other resources, how those references map
//! to relation rows, whether the type is externally visible, and which
//! lifecycle behavior it runs.
//!
//! The registry is built once at wiring time and is immutable afterwards,
//! so type lookups need no synchronization. It also acts as the factory
//! for resource instances: [`ResourceTypeRegistry::instantiate`] produces
//! a transient resource with every reference field registered and empty.
//!
//! # Examples
//!
//! ```rust
//! use plantgraph_core::models::{Capabilities, ReferenceRole, RelationKind};
//! use plantgraph_core::registry::{
//!     ReferenceDescriptor, ResourceTypeDef, ResourceTypeRegistry,
//! };
//!
//! let registry = ResourceTypeRegistry::builder()
//!     .register(
//!         ResourceTypeDef::new("Machine")
//!             .public()
//!             .with_capabilities(Capabilities::single("assemble"))
//!             .with_reference(
//!                 ReferenceDescriptor::single("driver").with_kind(RelationKind::Driver),
//!             )
//!             .with_reference(
//!                 ReferenceDescriptor::collection("routes")
//!                     .with_kind(RelationKind::TransportRoute)
//!                     .with_role(ReferenceRole::Source),
//!             ),
//!     )
//!     .register(ResourceTypeDef::new("Driver").public())
//!     .build()
//!     .unwrap();
//!
//! let machine = registry.instantiate("Machine", "press-1", None).unwrap();
//! assert!(machine.single("driver").unwrap().is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::behaviors::{NullBehavior, ResourceBehavior};
use crate::models::{Capabilities, ReferenceRole, ReferenceValue, RelationKind, Resource};

/// Registry construction and lookup errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown resource type: {0}")]
    UnknownType(String),

    #[error("duplicate resource type registration: {0}")]
    DuplicateType(String),

    #[error("field {field} on type {type_name} overrides missing source field {source_field}")]
    MissingOverrideSource {
        type_name: String,
        field: String,
        source_field: String,
    },
}

/// Whether a reference field holds one resource or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceCardinality {
    Single,
    Collection,
}

/// Explicit relation mapping of a reference field.
///
/// Fields without a spec are *undecorated*: their rows are matched by the
/// field name alone and created as `Custom` rows named after the field.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSpec {
    pub kind: RelationKind,
    pub name: Option<String>,
    /// Role the *referenced* resource occupies in the row.
    pub role: ReferenceRole,
}

impl Default for RelationSpec {
    fn default() -> Self {
        Self {
            kind: RelationKind::Custom,
            name: None,
            role: ReferenceRole::Target,
        }
    }
}

/// Static metadata of one reference-bearing field.
#[derive(Debug, Clone)]
pub struct ReferenceDescriptor {
    /// Field identifier, unique per type.
    pub field: String,
    pub cardinality: ReferenceCardinality,
    pub relation: Option<RelationSpec>,
    /// Whether a collection mutation alone triggers a save of this field.
    pub auto_save: bool,
    /// When set, this field is a view over another field of the same type.
    /// Override fields hold no storage of their own and are skipped during
    /// linking and saving; their auto-save is addressed at the source field.
    pub override_source: Option<String>,
}

impl ReferenceDescriptor {
    /// A single-resource reference field.
    pub fn single(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            cardinality: ReferenceCardinality::Single,
            relation: None,
            auto_save: false,
            override_source: None,
        }
    }

    /// A resource-collection reference field.
    pub fn collection(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            cardinality: ReferenceCardinality::Collection,
            relation: None,
            auto_save: false,
            override_source: None,
        }
    }

    /// Sets the relation kind. Decorating a field with any spec setter
    /// switches it from name-only matching to spec matching.
    pub fn with_kind(mut self, kind: RelationKind) -> Self {
        self.spec_mut().kind = kind;
        self
    }

    /// Sets the relation name used to disambiguate same-kind rows, or to
    /// carry the meaning of `Custom` rows.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.spec_mut().name = Some(name.into());
        self
    }

    /// Sets the role the referenced resource occupies in created rows.
    pub fn with_role(mut self, role: ReferenceRole) -> Self {
        self.spec_mut().role = role;
        self
    }

    /// Marks collection mutations as persistence triggers for this field.
    pub fn auto_saved(mut self) -> Self {
        self.auto_save = true;
        self
    }

    /// Declares this field as a view over `source`.
    pub fn overriding(mut self, source: impl Into<String>) -> Self {
        self.override_source = Some(source.into());
        self
    }

    /// Role used when matching rows and assigning endpoints.
    pub fn role(&self) -> ReferenceRole {
        self.relation.as_ref().map(|s| s.role).unwrap_or_default()
    }

    fn spec_mut(&mut self) -> &mut RelationSpec {
        self.relation.get_or_insert_with(RelationSpec::default)
    }
}

/// Definition of one concrete resource type.
pub struct ResourceTypeDef {
    name: String,
    public: bool,
    initial_capabilities: Capabilities,
    default_extension: Value,
    references: Vec<ReferenceDescriptor>,
    behavior: Arc<dyn ResourceBehavior>,
}

impl ResourceTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: false,
            initial_capabilities: Capabilities::default(),
            default_extension: Value::Object(serde_json::Map::new()),
            references: Vec::new(),
            behavior: Arc::new(NullBehavior),
        }
    }

    /// Makes instances of this type part of the externally visible subset.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Capability set assigned to new and loaded instances. Defaults to the
    /// `Null` sentinel, keeping instances invisible to capability queries
    /// until a behavior or operator assigns real capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.initial_capabilities = capabilities;
        self
    }

    /// Extension payload for instances created without stored data.
    pub fn with_extension(mut self, extension: Value) -> Self {
        self.default_extension = extension;
        self
    }

    /// Appends a reference field descriptor. Order is preserved.
    pub fn with_reference(mut self, descriptor: ReferenceDescriptor) -> Self {
        self.references.push(descriptor);
        self
    }

    pub fn with_behavior(mut self, behavior: Arc<dyn ResourceBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Reference descriptors in registration order.
    pub fn references(&self) -> &[ReferenceDescriptor] {
        &self.references
    }

    /// Looks up one descriptor by field name.
    pub fn reference(&self, field: &str) -> Option<&ReferenceDescriptor> {
        self.references.iter().find(|d| d.field == field)
    }

    pub fn behavior(&self) -> Arc<dyn ResourceBehavior> {
        self.behavior.clone()
    }
}

/// Immutable type name to definition index.
pub struct ResourceTypeRegistry {
    types: HashMap<String, ResourceTypeDef>,
}

impl ResourceTypeRegistry {
    pub fn builder() -> ResourceTypeRegistryBuilder {
        ResourceTypeRegistryBuilder { types: Vec::new() }
    }

    pub fn get(&self, type_name: &str) -> Result<&ResourceTypeDef, RegistryError> {
        self.types
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))
    }

    /// Creates a transient resource of the named type. Every non-override
    /// reference field is registered and empty; the extension payload falls
    /// back to the type default when none is supplied.
    pub fn instantiate(
        &self,
        type_name: &str,
        name: &str,
        extension: Option<Value>,
    ) -> Result<Resource, RegistryError> {
        let def = self.get(type_name)?;
        let mut resource = Resource::new(type_name, name);
        resource.extension_data = extension.unwrap_or_else(|| def.default_extension.clone());
        resource.capabilities = def.initial_capabilities.clone();
        for descriptor in def.references() {
            if descriptor.override_source.is_some() {
                continue;
            }
            let value = match descriptor.cardinality {
                ReferenceCardinality::Single => ReferenceValue::Single(None),
                ReferenceCardinality::Collection => ReferenceValue::Collection(Vec::new()),
            };
            resource.init_reference(descriptor.field.clone(), value);
        }
        Ok(resource)
    }
}

/// Collects type definitions and validates them as a whole.
pub struct ResourceTypeRegistryBuilder {
    types: Vec<ResourceTypeDef>,
}

impl ResourceTypeRegistryBuilder {
    pub fn register(mut self, def: ResourceTypeDef) -> Self {
        self.types.push(def);
        self
    }

    /// Validates uniqueness and override targets, then freezes the registry.
    pub fn build(self) -> Result<ResourceTypeRegistry, RegistryError> {
        let mut types = HashMap::with_capacity(self.types.len());
        for def in self.types {
            for descriptor in def.references() {
                if let Some(source) = &descriptor.override_source {
                    if def.reference(source).is_none() {
                        return Err(RegistryError::MissingOverrideSource {
                            type_name: def.name().to_string(),
                            field: descriptor.field.clone(),
                            source_field: source.clone(),
                        });
                    }
                }
            }
            let name = def.name().to_string();
            if types.insert(name.clone(), def).is_some() {
                return Err(RegistryError::DuplicateType(name));
            }
        }
        Ok(ResourceTypeRegistry { types })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_registers_reference_fields() {
        let registry = ResourceTypeRegistry::builder()
            .register(
                ResourceTypeDef::new("Machine")
                    .with_reference(
                        ReferenceDescriptor::single("driver").with_kind(RelationKind::Driver),
                    )
                    .with_reference(ReferenceDescriptor::collection("parts")),
            )
            .build()
            .unwrap();

        let machine = registry.instantiate("Machine", "press-1", None).unwrap();
        assert!(machine.single("driver").unwrap().is_none());
        assert!(machine.collection("parts").unwrap().is_empty());
    }

    #[test]
    fn override_fields_have_no_storage() {
        let registry = ResourceTypeRegistry::builder()
            .register(
                ResourceTypeDef::new("Cell")
                    .with_reference(ReferenceDescriptor::collection("children"))
                    .with_reference(
                        ReferenceDescriptor::collection("machines")
                            .overriding("children")
                            .auto_saved(),
                    ),
            )
            .build()
            .unwrap();

        let cell = registry.instantiate("Cell", "cell-1", None).unwrap();
        assert!(cell.collection("children").unwrap().is_empty());
        assert!(cell.collection("machines").is_err());
    }

    #[test]
    fn missing_override_source_is_rejected() {
        let result = ResourceTypeRegistry::builder()
            .register(
                ResourceTypeDef::new("Cell").with_reference(
                    ReferenceDescriptor::collection("machines").overriding("children"),
                ),
            )
            .build();
        assert!(matches!(
            result,
            Err(RegistryError::MissingOverrideSource { .. })
        ));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let result = ResourceTypeRegistry::builder()
            .register(ResourceTypeDef::new("Machine"))
            .register(ResourceTypeDef::new("Machine"))
            .build();
        assert!(matches!(result, Err(RegistryError::DuplicateType(_))));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = ResourceTypeRegistry::builder().build().unwrap();
        assert!(matches!(
            registry.instantiate("Machine", "press-1", None),
            Err(RegistryError::UnknownType(_))
        ));
    }

    #[test]
    fn instantiate_applies_the_default_extension() {
        use serde_json::json;

        let registry = ResourceTypeRegistry::builder()
            .register(
                ResourceTypeDef::new("Machine").with_extension(json!({ "slots": 0 })),
            )
            .build()
            .unwrap();

        let fresh = registry.instantiate("Machine", "press-1", None).unwrap();
        assert_eq!(fresh.extension_data, json!({ "slots": 0 }));

        let stored = registry
            .instantiate("Machine", "press-1", Some(json!({ "slots": 4 })))
            .unwrap();
        assert_eq!(stored.extension_data, json!({ "slots": 4 }));
    }

    #[test]
    fn instance_starts_with_type_capabilities() {
        let registry = ResourceTypeRegistry::builder()
            .register(
                ResourceTypeDef::new("Machine")
                    .with_capabilities(Capabilities::single("assemble")),
            )
            .register(ResourceTypeDef::new("Gateway"))
            .build()
            .unwrap();

        let machine = registry.instantiate("Machine", "press-1", None).unwrap();
        assert_eq!(machine.capabilities, Capabilities::single("assemble"));

        let gateway = registry.instantiate("Gateway", "gw-1", None).unwrap();
        assert!(gateway.capabilities.is_null());
    }
}
