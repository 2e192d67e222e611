//! engine::changes
//!
//! The changes batch: a staged, write-only set of graph mutations.
//!
//! # Architecture
//!
//! Callers and handlers never mutate the store directly. They stage
//! mutations into a [`ChangesBatch`], which the apply step drains in a
//! fixed order and then leaves empty. Staging never fails; references to
//! resources are resolved (by id, else by primary key) only when the batch
//! is applied.
//!
//! A batch is a single-use work order, not an event log.
//!
//! # Example
//!
//! ```
//! use infragraph::core::resource::Resource;
//! use infragraph::core::types::{LinkType, ResourceType};
//! use infragraph::engine::ChangesBatch;
//!
//! let employee = ResourceType::new("Employee").unwrap();
//! let alain = Resource::new(employee.clone()).with_property("name", "alain");
//! let bernard = Resource::new(employee).with_property("name", "bernard");
//!
//! let mut changes = ChangesBatch::new();
//! changes.resource_add(alain.clone());
//! changes.resource_add(bernard.clone());
//! changes.link_add(&bernard, LinkType::new("MANAGER").unwrap(), &alain);
//! assert!(changes.has_changes());
//! assert_eq!(changes.len(), 3);
//! ```

use serde::{Deserialize, Serialize};

use crate::core::resource::Resource;
use crate::core::types::{LinkType, ResourceId, TagName};

/// A staged resource replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUpdate {
    /// Id of the resource being replaced.
    pub previous_id: ResourceId,
    /// Full new state; the id field is ignored.
    pub resource: Resource,
}

/// A staged link mutation. Endpoints are resolved at apply time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkChange {
    pub from: Resource,
    pub link_type: LinkType,
    pub to: Resource,
}

/// A staged tag mutation. The resource is resolved at apply time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagChange {
    pub resource: Resource,
    pub tag: TagName,
}

/// Pending graph mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChangesBatch {
    resources_to_add: Vec<Resource>,
    resources_to_update: Vec<ResourceUpdate>,
    resources_to_delete: Vec<ResourceId>,
    resources_to_refresh: Vec<ResourceId>,
    links_to_add: Vec<LinkChange>,
    links_to_delete: Vec<LinkChange>,
    tags_to_add: Vec<TagChange>,
    tags_to_delete: Vec<TagChange>,
}

impl ChangesBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new resource. Its primary key must be free when applied.
    pub fn resource_add(&mut self, resource: Resource) {
        self.resources_to_add.push(resource);
    }

    /// Stage a wholesale replacement of resource `previous_id`.
    pub fn resource_update(&mut self, previous_id: ResourceId, resource: Resource) {
        self.resources_to_update.push(ResourceUpdate {
            previous_id,
            resource,
        });
    }

    /// Stage a resource deletion.
    pub fn resource_delete(&mut self, id: ResourceId) {
        self.resources_to_delete.push(id);
    }

    /// Ask for a check-and-fix pass on a resource.
    pub fn resource_refresh(&mut self, id: ResourceId) {
        self.resources_to_refresh.push(id);
    }

    /// Stage a link addition.
    pub fn link_add(&mut self, from: &Resource, link_type: LinkType, to: &Resource) {
        self.links_to_add.push(LinkChange {
            from: from.clone(),
            link_type,
            to: to.clone(),
        });
    }

    /// Stage a link deletion.
    pub fn link_delete(&mut self, from: &Resource, link_type: LinkType, to: &Resource) {
        self.links_to_delete.push(LinkChange {
            from: from.clone(),
            link_type,
            to: to.clone(),
        });
    }

    /// Stage a tag addition.
    pub fn tag_add(&mut self, resource: &Resource, tag: TagName) {
        self.tags_to_add.push(TagChange {
            resource: resource.clone(),
            tag,
        });
    }

    /// Stage a tag deletion.
    pub fn tag_delete(&mut self, resource: &Resource, tag: TagName) {
        self.tags_to_delete.push(TagChange {
            resource: resource.clone(),
            tag,
        });
    }

    /// Drop every staged mutation.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Move the contents out, leaving this batch empty.
    pub fn take(&mut self) -> ChangesBatch {
        std::mem::take(self)
    }

    /// Whether anything is staged.
    pub fn has_changes(&self) -> bool {
        self.len() > 0
    }

    /// Total number of staged mutations.
    pub fn len(&self) -> usize {
        self.resources_to_add.len()
            + self.resources_to_update.len()
            + self.resources_to_delete.len()
            + self.resources_to_refresh.len()
            + self.links_to_add.len()
            + self.links_to_delete.len()
            + self.tags_to_add.len()
            + self.tags_to_delete.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        !self.has_changes()
    }

    pub fn resources_to_add(&self) -> &[Resource] {
        &self.resources_to_add
    }

    pub fn resources_to_update(&self) -> &[ResourceUpdate] {
        &self.resources_to_update
    }

    pub fn resources_to_delete(&self) -> &[ResourceId] {
        &self.resources_to_delete
    }

    pub fn resources_to_refresh(&self) -> &[ResourceId] {
        &self.resources_to_refresh
    }

    pub fn links_to_add(&self) -> &[LinkChange] {
        &self.links_to_add
    }

    pub fn links_to_delete(&self) -> &[LinkChange] {
        &self.links_to_delete
    }

    pub fn tags_to_add(&self) -> &[TagChange] {
        &self.tags_to_add
    }

    pub fn tags_to_delete(&self) -> &[TagChange] {
        &self.tags_to_delete
    }

    /// Split into owned queues, in apply order.
    pub(crate) fn into_parts(self) -> BatchParts {
        BatchParts {
            refresh: self.resources_to_refresh,
            delete_resources: self.resources_to_delete,
            delete_links: self.links_to_delete,
            delete_tags: self.tags_to_delete,
            add_resources: self.resources_to_add,
            add_links: self.links_to_add,
            add_tags: self.tags_to_add,
            update_resources: self.resources_to_update,
        }
    }
}

/// Owned queues of a batch, consumed by the apply step.
pub(crate) struct BatchParts {
    pub refresh: Vec<ResourceId>,
    pub delete_resources: Vec<ResourceId>,
    pub delete_links: Vec<LinkChange>,
    pub delete_tags: Vec<TagChange>,
    pub add_resources: Vec<Resource>,
    pub add_links: Vec<LinkChange>,
    pub add_tags: Vec<TagChange>,
    pub update_resources: Vec<ResourceUpdate>,
}
