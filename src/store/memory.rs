//! store::memory
//!
//! In-memory resource store.
//!
//! # Architecture
//!
//! Resources are kept in a `BTreeMap` keyed by id, so iteration order is
//! creation order. Links and tags are plain vectors in insertion order,
//! which lets handlers reason about "the most recent link" of a type.
//! Lookups are linear scans; this backend targets graphs of modest size.
//!
//! # Invariants
//!
//! - Ids start at 1 and only increase
//! - No two resources share a primary key
//! - Links and tags only reference existing resources
//! - No duplicate link triples or tag pairs

use std::collections::BTreeMap;

use super::traits::{
    LinkRecord, RelatedLink, ResourceQuery, ResourceStore, StoreError, StoreSnapshot, TagRecord,
};
use crate::core::resource::{PrimaryKey, Resource, ResourceTypeRegistry};
use crate::core::types::{LinkType, ResourceId, TagName};

/// Resource store held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    types: ResourceTypeRegistry,
    next_id: u64,
    resources: BTreeMap<ResourceId, Resource>,
    links: Vec<LinkRecord>,
    tags: Vec<TagRecord>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new(types: ResourceTypeRegistry) -> Self {
        Self {
            types,
            next_id: 1,
            resources: BTreeMap::new(),
            links: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Create a store pre-populated from a snapshot.
    pub fn from_snapshot(
        types: ResourceTypeRegistry,
        snapshot: StoreSnapshot,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(types);
        store.restore(snapshot)?;
        Ok(store)
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the store holds no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// All stored links in insertion order.
    pub fn links(&self) -> &[LinkRecord] {
        &self.links
    }

    fn primary_key(&self, resource: &Resource) -> Result<PrimaryKey, StoreError> {
        self.types
            .primary_key(resource)
            .ok_or_else(|| StoreError::UnknownResourceType(resource.resource_type.clone()))
    }

    fn find_id_by_primary_key(&self, key: &PrimaryKey) -> Result<Option<ResourceId>, StoreError> {
        for (id, stored) in &self.resources {
            if &stored.resource_type != key.resource_type() {
                continue;
            }
            if &self.primary_key(stored)? == key {
                return Ok(Some(*id));
            }
        }
        Ok(None)
    }

    fn require(&self, id: ResourceId) -> Result<&Resource, StoreError> {
        self.resources.get(&id).ok_or(StoreError::NotFound(id))
    }

    fn resolve_all(&self, ids: impl Iterator<Item = ResourceId>) -> Result<Vec<Resource>, StoreError> {
        ids.map(|id| self.require(id).cloned()).collect()
    }
}

impl ResourceStore for InMemoryStore {
    fn types(&self) -> &ResourceTypeRegistry {
        &self.types
    }

    fn resource_find(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        Ok(self.resources.get(&id).cloned())
    }

    fn resource_find_by_primary_key(
        &self,
        resource: &Resource,
    ) -> Result<Option<Resource>, StoreError> {
        let key = self.primary_key(resource)?;
        Ok(self
            .find_id_by_primary_key(&key)?
            .and_then(|id| self.resources.get(&id).cloned()))
    }

    fn resource_add(&mut self, resource: Resource) -> Result<Resource, StoreError> {
        let key = self.primary_key(&resource)?;
        if self.find_id_by_primary_key(&key)?.is_some() {
            return Err(StoreError::PrimaryKeyCollision(key.to_string()));
        }

        let id = ResourceId::new(self.next_id);
        self.next_id += 1;
        let stored = resource.with_id(id);
        self.resources.insert(id, stored.clone());
        Ok(stored)
    }

    fn resource_update(
        &mut self,
        previous_id: ResourceId,
        resource: Resource,
    ) -> Result<Resource, StoreError> {
        self.require(previous_id)?;
        let key = self.primary_key(&resource)?;
        if let Some(other) = self.find_id_by_primary_key(&key)? {
            if other != previous_id {
                return Err(StoreError::PrimaryKeyCollision(key.to_string()));
            }
        }

        let stored = resource.with_id(previous_id);
        self.resources.insert(previous_id, stored.clone());
        Ok(stored)
    }

    fn resource_delete(&mut self, id: ResourceId) -> Result<bool, StoreError> {
        if self.resources.remove(&id).is_none() {
            return Ok(false);
        }
        self.links.retain(|l| !l.touches(id));
        self.tags.retain(|t| t.resource != id);
        Ok(true)
    }

    fn link_add(
        &mut self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError> {
        self.require(from)?;
        self.require(to)?;
        if self.link_exists(from, link_type, to)? {
            return Ok(false);
        }
        self.links.push(LinkRecord {
            from,
            link_type: link_type.clone(),
            to,
        });
        Ok(true)
    }

    fn link_delete(
        &mut self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError> {
        let before = self.links.len();
        self.links
            .retain(|l| !(l.from == from && &l.link_type == link_type && l.to == to));
        Ok(self.links.len() != before)
    }

    fn link_exists(
        &self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .links
            .iter()
            .any(|l| l.from == from && &l.link_type == link_type && l.to == to))
    }

    fn tag_add(&mut self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError> {
        self.require(resource)?;
        if self.tag_exists(resource, tag)? {
            return Ok(false);
        }
        self.tags.push(TagRecord {
            resource,
            tag: tag.clone(),
        });
        Ok(true)
    }

    fn tag_delete(&mut self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError> {
        let before = self.tags.len();
        self.tags
            .retain(|t| !(t.resource == resource && &t.tag == tag));
        Ok(self.tags.len() != before)
    }

    fn tag_exists(&self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError> {
        Ok(self
            .tags
            .iter()
            .any(|t| t.resource == resource && &t.tag == tag))
    }

    fn link_find_all_related_by_resource(
        &self,
        id: ResourceId,
    ) -> Result<Vec<RelatedLink>, StoreError> {
        self.links
            .iter()
            .filter(|l| l.touches(id))
            .map(|l| {
                Ok(RelatedLink {
                    from: self.require(l.from)?.clone(),
                    link_type: l.link_type.clone(),
                    to: self.require(l.to)?.clone(),
                })
            })
            .collect()
    }

    fn link_find_all_by_from_resource_and_link_type(
        &self,
        from: ResourceId,
        link_type: &LinkType,
    ) -> Result<Vec<Resource>, StoreError> {
        self.resolve_all(
            self.links
                .iter()
                .filter(|l| l.from == from && &l.link_type == link_type)
                .map(|l| l.to),
        )
    }

    fn link_find_all_by_link_type_and_to_resource(
        &self,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<Vec<Resource>, StoreError> {
        self.resolve_all(
            self.links
                .iter()
                .filter(|l| l.to == to && &l.link_type == link_type)
                .map(|l| l.from),
        )
    }

    fn tags_of(&self, id: ResourceId) -> Result<Vec<TagName>, StoreError> {
        Ok(self
            .tags
            .iter()
            .filter(|t| t.resource == id)
            .map(|t| t.tag.clone())
            .collect())
    }

    fn query(&self, query: &ResourceQuery) -> Result<Vec<Resource>, StoreError> {
        Ok(self
            .resources
            .values()
            .filter(|r| {
                let tags: Vec<&TagName> = self
                    .tags
                    .iter()
                    .filter(|t| Some(t.resource) == r.id)
                    .map(|t| &t.tag)
                    .collect();
                query.matches(r, &tags)
            })
            .cloned()
            .collect())
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(StoreSnapshot {
            next_id: self.next_id,
            resources: self.resources.values().cloned().collect(),
            links: self.links.clone(),
            tags: self.tags.clone(),
        })
    }

    fn restore(&mut self, snapshot: StoreSnapshot) -> Result<(), StoreError> {
        let mut resources = BTreeMap::new();
        for resource in snapshot.resources {
            let id = resource.id.ok_or_else(|| {
                StoreError::SerializeError(format!("snapshot resource without id: {}", resource))
            })?;
            resources.insert(id, resource);
        }
        let highest = resources.keys().next_back().map_or(0, |id| id.get());

        self.next_id = snapshot.next_id.max(highest + 1);
        self.resources = resources;
        self.links = snapshot.links;
        self.tags = snapshot.tags;
        Ok(())
    }
}
