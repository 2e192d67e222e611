//! core::resource
//!
//! Resources, primary keys, and per-type descriptors.
//!
//! # Architecture
//!
//! A [`Resource`] is a typed bag of properties. Properties are exposed as a
//! `BTreeMap<String, serde_json::Value>` so that queries and primary-key
//! comparisons work over any resource type without reflection.
//!
//! Each resource type registers a [`ResourceDescriptor`] naming the
//! properties that form its natural (primary) key. The
//! [`ResourceTypeRegistry`] is built once at startup and handed to the store.
//!
//! # Invariants
//!
//! - The internal id is `None` until a store persists the resource
//! - Two resources of different types never share a primary key
//! - Equality of state ignores the internal id
//!
//! # Example
//!
//! ```
//! use infragraph::core::resource::{Resource, ResourceDescriptor, ResourceTypeRegistry};
//! use infragraph::core::types::ResourceType;
//!
//! let machine = ResourceType::new("Machine").unwrap();
//! let registry = ResourceTypeRegistry::new()
//!     .with(ResourceDescriptor::new(machine.clone(), ["name"]));
//!
//! let a = Resource::new(machine.clone()).with_property("name", "h1.example.com");
//! let b = Resource::new(machine).with_property("name", "h1.example.com")
//!     .with_property("publicIp", "10.0.0.1");
//!
//! assert_eq!(registry.primary_key(&a), registry.primary_key(&b));
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ResourceId, ResourceType};

/// Property map of a resource.
pub type Properties = BTreeMap<String, Value>;

/// A typed, user-visible entity in the infrastructure graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Internal id, assigned by the store on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,

    /// Concrete kind of this resource.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Typed properties.
    #[serde(default)]
    pub properties: Properties,
}

impl Resource {
    /// Create a resource with no properties and no id.
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            id: None,
            resource_type,
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Return a copy carrying the given internal id.
    ///
    /// Only stores should assign ids.
    pub fn with_id(mut self, id: ResourceId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set or replace a property.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Get a property value.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Get a property as a string slice, if it is a JSON string.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    /// Whether a property is absent or JSON null.
    pub fn property_is_null(&self, name: &str) -> bool {
        self.properties.get(name).map_or(true, Value::is_null)
    }

    /// Whether two resources carry the same type and properties.
    ///
    /// The internal id is not compared.
    pub fn same_state(&self, other: &Resource) -> bool {
        self.resource_type == other.resource_type && self.properties == other.properties
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {}", self.resource_type, id),
            None => write!(f, "{} (unsaved)", self.resource_type),
        }
    }
}

/// The natural key of a resource: its type plus the values of its
/// primary-key properties.
///
/// Missing properties participate as JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    resource_type: ResourceType,
    values: Vec<(String, String)>,
}

impl PrimaryKey {
    /// The resource type half of the key.
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.resource_type)?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, ")")
    }
}

/// Describes how to identify resources of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// The described type.
    pub resource_type: ResourceType,
    /// Property names forming the primary key, in key order.
    pub primary_key: Vec<String>,
}

impl ResourceDescriptor {
    /// Create a descriptor.
    pub fn new<I, S>(resource_type: ResourceType, primary_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_type,
            primary_key: primary_key.into_iter().map(Into::into).collect(),
        }
    }

    /// Compute the primary key of a resource of this type.
    pub fn primary_key_of(&self, resource: &Resource) -> PrimaryKey {
        let values = self
            .primary_key
            .iter()
            .map(|name| {
                let value = resource.property(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value.to_string())
            })
            .collect();
        PrimaryKey {
            resource_type: resource.resource_type.clone(),
            values,
        }
    }
}

/// Descriptors for every known resource type.
#[derive(Debug, Clone, Default)]
pub struct ResourceTypeRegistry {
    descriptors: HashMap<ResourceType, ResourceDescriptor>,
}

impl ResourceTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with(mut self, descriptor: ResourceDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Register (or replace) a descriptor.
    pub fn register(&mut self, descriptor: ResourceDescriptor) {
        self.descriptors
            .insert(descriptor.resource_type.clone(), descriptor);
    }

    /// Look up the descriptor of a type.
    pub fn descriptor(&self, resource_type: &ResourceType) -> Option<&ResourceDescriptor> {
        self.descriptors.get(resource_type)
    }

    /// Whether a type is registered.
    pub fn contains(&self, resource_type: &ResourceType) -> bool {
        self.descriptors.contains_key(resource_type)
    }

    /// Compute the primary key of a resource.
    ///
    /// Returns `None` if the resource's type is not registered.
    pub fn primary_key(&self, resource: &Resource) -> Option<PrimaryKey> {
        self.descriptor(&resource.resource_type)
            .map(|d| d.primary_key_of(resource))
    }

    /// Iterate over registered types in a stable order.
    pub fn types(&self) -> Vec<&ResourceType> {
        let mut types: Vec<_> = self.descriptors.keys().collect();
        types.sort();
        types
    }
}
