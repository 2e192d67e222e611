//! store::traits
//!
//! Resource store contract.
//!
//! # Design
//!
//! The engine never touches persisted state directly; every read and write
//! goes through [`ResourceStore`]. A store owns resources, links and tags,
//! assigns internal ids, evaluates queries, and can produce and restore a
//! full [`StoreSnapshot`] for transaction rollback.
//!
//! Link and tag mutations are idempotent: `link_add` on an existing triple
//! and `link_delete` on a missing one both return `Ok(false)`.
//!
//! # Example
//!
//! ```ignore
//! use infragraph::store::{ResourceQuery, ResourceStore};
//!
//! fn managers(store: &dyn ResourceStore, employee: ResourceId) -> Result<Vec<Resource>, StoreError> {
//!     store.link_find_all_by_from_resource_and_link_type(employee, &LinkType::new("MANAGER")?)
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::lock::LockError;
use crate::core::resource::{Resource, ResourceTypeRegistry};
use crate::core::types::{Fingerprint, LinkType, ResourceId, ResourceType, TagName};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource type has no registered descriptor.
    #[error("resource type not registered: {0}")]
    UnknownResourceType(ResourceType),

    /// No resource with this id.
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// Another resource of the same type already uses this primary key.
    #[error("primary key already in use: {0}")]
    PrimaryKeyCollision(String),

    /// Failed to read the state file.
    #[error("failed to read state file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the state file.
    #[error("failed to parse state file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    /// Failed to write the state file.
    #[error("failed to write state file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize state.
    #[error("failed to serialize state: {0}")]
    SerializeError(String),

    /// State file lock could not be taken.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}

/// A stored link triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkRecord {
    pub from: ResourceId,
    pub link_type: LinkType,
    pub to: ResourceId,
}

impl LinkRecord {
    /// Whether this link touches the given resource on either end.
    pub fn touches(&self, id: ResourceId) -> bool {
        self.from == id || self.to == id
    }

    /// The endpoint opposite to `id`, if the link touches it.
    pub fn other_end(&self, id: ResourceId) -> Option<ResourceId> {
        if self.from == id {
            Some(self.to)
        } else if self.to == id {
            Some(self.from)
        } else {
            None
        }
    }
}

/// A stored tag pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagRecord {
    pub resource: ResourceId,
    pub tag: TagName,
}

/// A link with both endpoints resolved to full resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedLink {
    pub from: Resource,
    pub link_type: LinkType,
    pub to: Resource,
}

impl RelatedLink {
    /// The endpoint opposite to `id`.
    pub fn other_end(&self, id: ResourceId) -> &Resource {
        if self.from.id == Some(id) {
            &self.to
        } else {
            &self.from
        }
    }
}

/// Filter for [`ResourceStore::query`].
///
/// All set criteria must match: type equality, property equality (missing
/// properties match JSON `null`), and presence of every listed tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagName>,
}

impl ResourceQuery {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one type.
    pub fn of_type(resource_type: ResourceType) -> Self {
        Self {
            resource_type: Some(resource_type),
            ..Self::default()
        }
    }

    /// Require a property value.
    pub fn property_equals(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Require a tag.
    pub fn tagged(mut self, tag: TagName) -> Self {
        self.tags.push(tag);
        self
    }

    /// Evaluate the filter against a resource and its tags.
    pub fn matches(&self, resource: &Resource, tags: &[&TagName]) -> bool {
        if let Some(t) = &self.resource_type {
            if &resource.resource_type != t {
                return false;
            }
        }
        let properties_match = self.properties.iter().all(|(name, expected)| {
            resource.property(name).unwrap_or(&Value::Null) == expected
        });
        properties_match && self.tags.iter().all(|t| tags.contains(&t))
    }
}

/// A full copy of store contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Next id the store will hand out.
    pub next_id: u64,
    /// Resources, each carrying its id.
    pub resources: Vec<Resource>,
    pub links: Vec<LinkRecord>,
    pub tags: Vec<TagRecord>,
}

impl StoreSnapshot {
    /// Fingerprint of the graph content (resources, links, tags).
    ///
    /// Order-insensitive: collections are sorted before hashing. The id
    /// counter is not part of the fingerprint.
    pub fn fingerprint(&self) -> Result<Fingerprint, StoreError> {
        let mut resources: Vec<&Resource> = self.resources.iter().collect();
        resources.sort_by_key(|r| r.id);
        let mut links: Vec<&LinkRecord> = self.links.iter().collect();
        links.sort();
        let mut tags: Vec<&TagRecord> = self.tags.iter().collect();
        tags.sort();

        let canonical = serde_json::to_vec(&(resources, links, tags))
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;
        Ok(Fingerprint::compute(&canonical))
    }
}

/// Typed CRUD, link, tag and query storage for resources.
///
/// Implementations must keep ids stable for the life of a resource and
/// must remove a resource's links and tags when the resource is deleted.
pub trait ResourceStore {
    /// Descriptors used for primary-key resolution.
    fn types(&self) -> &ResourceTypeRegistry;

    /// Find a resource by internal id.
    fn resource_find(&self, id: ResourceId) -> Result<Option<Resource>, StoreError>;

    /// Find the stored resource sharing `resource`'s type and primary key.
    fn resource_find_by_primary_key(
        &self,
        resource: &Resource,
    ) -> Result<Option<Resource>, StoreError>;

    /// Persist a new resource and return it with its assigned id.
    fn resource_add(&mut self, resource: Resource) -> Result<Resource, StoreError>;

    /// Replace the state of an existing resource, keeping its id.
    fn resource_update(
        &mut self,
        previous_id: ResourceId,
        resource: Resource,
    ) -> Result<Resource, StoreError>;

    /// Delete a resource with its links and tags. Returns whether it existed.
    fn resource_delete(&mut self, id: ResourceId) -> Result<bool, StoreError>;

    /// Add a link. Returns `false` if it already existed.
    fn link_add(
        &mut self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError>;

    /// Delete a link. Returns `false` if it did not exist.
    fn link_delete(
        &mut self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError>;

    /// Whether a link exists.
    fn link_exists(
        &self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError>;

    /// Add a tag. Returns `false` if it already existed.
    fn tag_add(&mut self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError>;

    /// Delete a tag. Returns `false` if it did not exist.
    fn tag_delete(&mut self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError>;

    /// Whether a tag exists.
    fn tag_exists(&self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError>;

    /// Every link touching a resource, in either direction.
    fn link_find_all_related_by_resource(
        &self,
        id: ResourceId,
    ) -> Result<Vec<RelatedLink>, StoreError>;

    /// Targets of the links of one type leaving `from`.
    fn link_find_all_by_from_resource_and_link_type(
        &self,
        from: ResourceId,
        link_type: &LinkType,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Sources of the links of one type arriving at `to`.
    fn link_find_all_by_link_type_and_to_resource(
        &self,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Tags of a resource.
    fn tags_of(&self, id: ResourceId) -> Result<Vec<TagName>, StoreError>;

    /// Resources matching a filter, in id order.
    fn query(&self, query: &ResourceQuery) -> Result<Vec<Resource>, StoreError>;

    /// Deep copy of all resources, links and tags.
    fn snapshot(&self) -> Result<StoreSnapshot, StoreError>;

    /// Replace all contents with a snapshot.
    fn restore(&mut self, snapshot: StoreSnapshot) -> Result<(), StoreError>;
}
