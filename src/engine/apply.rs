//! engine::apply
//!
//! Applies a [`ChangesBatch`] to the store.
//!
//! # Order
//!
//! A batch is applied in a fixed order, then left empty:
//!
//! 1. refresh requests
//! 2. resource deletions, then link deletions, then tag deletions
//! 3. resource additions, then link additions, then tag additions
//! 4. resource updates
//!
//! # Refresh propagation
//!
//! - Deleting a resource flags everything transitively reachable from it
//!   (over links, in both directions) for refresh
//! - Adding or updating a resource flags its direct neighbors
//! - Adding or deleting a link flags both endpoints
//! - Adding or deleting a tag flags the tagged resource
//!
//! Link and tag mutations that change nothing (duplicate add, missing
//! delete) are skipped without notification.

use tracing::debug;

use super::changes::{ChangesBatch, LinkChange, ResourceUpdate, TagChange};
use super::context::TransactionContext;
use super::hooks::Hooks;
use super::EngineError;
use crate::core::graph::reachable_from;
use crate::core::resource::Resource;
use crate::core::types::ResourceId;
use crate::store::{ResourceStore, StoreError};

/// Apply and clear a batch.
///
/// # Errors
///
/// - [`EngineError::ResourcePrimaryKeyCollision`] if an add or update
///   would duplicate a primary key
/// - [`EngineError::ResourceNotFound`] if an update, link, or tag refers
///   to a resource that does not resolve
/// - [`EngineError::ResourceTypeChanged`] if an update changes the type
/// - [`EngineError::Store`] for backend failures
pub fn apply_changes<S: ResourceStore + ?Sized>(
    store: &mut S,
    context: &mut TransactionContext,
    hooks: &Hooks,
    changes: &mut ChangesBatch,
) -> Result<(), EngineError> {
    let batch = changes.take();
    if batch.is_empty() {
        return Ok(());
    }
    debug!(tx = %context.tx_id(), mutations = batch.len(), "applying changes");

    let parts = batch.into_parts();
    let mut applier = Applier {
        store,
        context,
        hooks,
    };

    for id in parts.refresh {
        applier.context.mark_needs_refresh(id);
    }
    for id in parts.delete_resources {
        applier.delete_resource(id)?;
    }
    for link in &parts.delete_links {
        applier.delete_link(link)?;
    }
    for tag in &parts.delete_tags {
        applier.delete_tag(tag)?;
    }
    for resource in parts.add_resources {
        applier.add_resource(resource)?;
    }
    for link in &parts.add_links {
        applier.add_link(link)?;
    }
    for tag in &parts.add_tags {
        applier.add_tag(tag)?;
    }
    for update in parts.update_resources {
        applier.update_resource(update)?;
    }
    Ok(())
}

struct Applier<'a, S: ResourceStore + ?Sized> {
    store: &'a mut S,
    context: &'a mut TransactionContext,
    hooks: &'a Hooks,
}

impl<S: ResourceStore + ?Sized> Applier<'_, S> {
    /// Resolve a reference by id when it carries one, else by primary key.
    fn resolve(&self, reference: &Resource) -> Result<Option<Resource>, EngineError> {
        let found = match reference.id {
            Some(id) => self.store.resource_find(id)?,
            None => self.store.resource_find_by_primary_key(reference)?,
        };
        Ok(found)
    }

    fn require(&self, reference: &Resource) -> Result<Resource, EngineError> {
        self.resolve(reference)?
            .ok_or_else(|| EngineError::ResourceNotFound(self.describe(reference)))
    }

    fn describe(&self, reference: &Resource) -> String {
        match (reference.id, self.store.types().primary_key(reference)) {
            (Some(id), _) => format!("{} {}", reference.resource_type, id),
            (None, Some(key)) => key.to_string(),
            (None, None) => reference.to_string(),
        }
    }

    fn neighbors(&self, id: ResourceId) -> Result<Vec<ResourceId>, StoreError> {
        Ok(self
            .store
            .link_find_all_related_by_resource(id)?
            .iter()
            .filter_map(|link| link.other_end(id).id)
            .collect())
    }

    fn refresh_neighbors(&mut self, id: ResourceId) -> Result<(), EngineError> {
        for neighbor in self.neighbors(id)? {
            if neighbor != id {
                self.context.mark_needs_refresh(neighbor);
            }
        }
        Ok(())
    }

    fn delete_resource(&mut self, id: ResourceId) -> Result<(), EngineError> {
        if self.context.is_removed(id) {
            debug!(%id, "already deleted in this transaction");
            return Ok(());
        }
        let Some(resource) = self.store.resource_find(id)? else {
            debug!(%id, "delete of unknown resource skipped");
            return Ok(());
        };

        let previous_links = self.store.link_find_all_related_by_resource(id)?;
        let reachable = reachable_from([id], |n| self.neighbors(n))?;
        for other in reachable {
            if other != id {
                self.context.mark_needs_refresh(other);
            }
        }

        self.store.resource_delete(id)?;
        self.context.stats.counters.resources_deleted += 1;
        let context = &*self.context;
        self.hooks
            .notify(|h| h.resource_deleted(context, &resource));
        self.context.mark_deleted(resource, previous_links);
        Ok(())
    }

    fn delete_link(&mut self, change: &LinkChange) -> Result<(), EngineError> {
        let (Some(from), Some(to)) = (self.resolve(&change.from)?, self.resolve(&change.to)?)
        else {
            debug!(link_type = %change.link_type, "link delete with unresolved endpoint skipped");
            return Ok(());
        };
        let (from_id, to_id) = (stored_id(&from)?, stored_id(&to)?);
        if !self.store.link_delete(from_id, &change.link_type, to_id)? {
            return Ok(());
        }

        self.context.stats.counters.links_deleted += 1;
        self.context.mark_needs_refresh(from_id);
        self.context.mark_needs_refresh(to_id);
        let context = &*self.context;
        self.hooks
            .notify(|h| h.link_deleted(context, &from, &change.link_type, &to));
        Ok(())
    }

    fn delete_tag(&mut self, change: &TagChange) -> Result<(), EngineError> {
        let Some(resource) = self.resolve(&change.resource)? else {
            debug!(tag = %change.tag, "tag delete on unresolved resource skipped");
            return Ok(());
        };
        let id = stored_id(&resource)?;
        if !self.store.tag_delete(id, &change.tag)? {
            return Ok(());
        }

        self.context.stats.counters.tags_deleted += 1;
        self.context.mark_needs_refresh(id);
        let context = &*self.context;
        self.hooks
            .notify(|h| h.tag_deleted(context, &resource, &change.tag));
        Ok(())
    }

    fn add_resource(&mut self, mut resource: Resource) -> Result<(), EngineError> {
        resource.id = None;
        if self.store.resource_find_by_primary_key(&resource)?.is_some() {
            return Err(EngineError::ResourcePrimaryKeyCollision(
                self.describe(&resource),
            ));
        }

        let stored = self.store.resource_add(resource)?;
        let id = stored_id(&stored)?;
        self.context.stats.counters.resources_added += 1;
        self.context.mark_added(id);
        self.refresh_neighbors(id)?;
        let context = &*self.context;
        self.hooks.notify(|h| h.resource_added(context, &stored));
        Ok(())
    }

    fn add_link(&mut self, change: &LinkChange) -> Result<(), EngineError> {
        let from = self.require(&change.from)?;
        let to = self.require(&change.to)?;
        let (from_id, to_id) = (stored_id(&from)?, stored_id(&to)?);
        if !self.store.link_add(from_id, &change.link_type, to_id)? {
            return Ok(());
        }

        self.context.stats.counters.links_added += 1;
        self.context.mark_needs_refresh(from_id);
        self.context.mark_needs_refresh(to_id);
        let context = &*self.context;
        self.hooks
            .notify(|h| h.link_added(context, &from, &change.link_type, &to));
        Ok(())
    }

    fn add_tag(&mut self, change: &TagChange) -> Result<(), EngineError> {
        let resource = self.require(&change.resource)?;
        let id = stored_id(&resource)?;
        if !self.store.tag_add(id, &change.tag)? {
            return Ok(());
        }

        self.context.stats.counters.tags_added += 1;
        self.context.mark_needs_refresh(id);
        let context = &*self.context;
        self.hooks
            .notify(|h| h.tag_added(context, &resource, &change.tag));
        Ok(())
    }

    fn update_resource(&mut self, update: ResourceUpdate) -> Result<(), EngineError> {
        let ResourceUpdate {
            previous_id,
            mut resource,
        } = update;
        let previous = self.store.resource_find(previous_id)?.ok_or_else(|| {
            EngineError::ResourceNotFound(format!("{} {}", resource.resource_type, previous_id))
        })?;
        if previous.resource_type != resource.resource_type {
            return Err(EngineError::ResourceTypeChanged {
                resource: previous.to_string(),
                new_type: resource.resource_type,
            });
        }
        resource.id = None;
        if let Some(existing) = self.store.resource_find_by_primary_key(&resource)? {
            if existing.id != Some(previous_id) {
                return Err(EngineError::ResourcePrimaryKeyCollision(
                    self.describe(&resource),
                ));
            }
        }
        if previous.same_state(&resource) {
            debug!(id = %previous_id, "update without changes skipped");
            return Ok(());
        }

        let current = self.store.resource_update(previous_id, resource)?;
        self.context.stats.record_update(&current);
        self.context.mark_updated(previous.clone());
        self.refresh_neighbors(previous_id)?;
        let context = &*self.context;
        self.hooks
            .notify(|h| h.resource_updated(context, &previous, &current));
        Ok(())
    }
}

fn stored_id(resource: &Resource) -> Result<ResourceId, EngineError> {
    resource
        .id
        .ok_or_else(|| EngineError::ResourceNotFound(resource.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::{ResourceDescriptor, ResourceTypeRegistry};
    use crate::core::types::{LinkType, ResourceType, TagName};
    use crate::engine::hooks::ChangesHook;
    use crate::store::InMemoryStore;
    use std::sync::{Arc, Mutex};

    fn employee_type() -> ResourceType {
        ResourceType::new("Employee").unwrap()
    }

    fn employee(name: &str) -> Resource {
        Resource::new(employee_type()).with_property("name", name)
    }

    fn manager() -> LinkType {
        LinkType::new("MANAGER").unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new(
            ResourceTypeRegistry::new().with(ResourceDescriptor::new(employee_type(), ["name"])),
        )
    }

    fn apply(
        store: &mut InMemoryStore,
        ctx: &mut TransactionContext,
        mut changes: ChangesBatch,
    ) -> Result<(), EngineError> {
        apply_changes(store, ctx, &Hooks::new(), &mut changes)
    }

    fn id_of(store: &InMemoryStore, name: &str) -> ResourceId {
        store
            .resource_find_by_primary_key(&employee(name))
            .unwrap()
            .and_then(|r| r.id)
            .unwrap()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ChangesHook for Recorder {
        fn resource_added(&self, _c: &TransactionContext, r: &Resource) {
            let name = r.property_str("name").unwrap_or_default();
            self.0.lock().unwrap().push(format!("added {}", name));
        }

        fn resource_updated(&self, _c: &TransactionContext, _p: &Resource, r: &Resource) {
            let name = r.property_str("name").unwrap_or_default();
            self.0.lock().unwrap().push(format!("updated {}", name));
        }

        fn link_added(
            &self,
            _c: &TransactionContext,
            _from: &Resource,
            link_type: &LinkType,
            _to: &Resource,
        ) {
            self.0.lock().unwrap().push(format!("link {}", link_type));
        }
    }

    mod ordering {
        use super::*;

        #[test]
        fn batch_is_cleared() {
            let mut store = store();
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.resource_add(employee("alain"));
            apply_changes(&mut store, &mut ctx, &Hooks::new(), &mut changes).unwrap();
            assert!(changes.is_empty());
        }

        #[test]
        fn links_resolve_resources_added_in_same_batch() {
            let mut store = store();
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.link_add(&employee("bernard"), manager(), &employee("alain"));
            changes.resource_add(employee("alain"));
            changes.resource_add(employee("bernard"));
            apply(&mut store, &mut ctx, changes).unwrap();

            let bernard = id_of(&store, "bernard");
            let alain = id_of(&store, "alain");
            assert!(store.link_exists(bernard, &manager(), alain).unwrap());
        }

        #[test]
        fn delete_then_add_in_one_batch_replaces() {
            let mut store = store();
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.resource_add(employee("alain"));
            apply(&mut store, &mut ctx, changes).unwrap();
            let old = id_of(&store, "alain");

            let mut changes = ChangesBatch::new();
            changes.resource_add(employee("alain").with_property("title", "ceo"));
            changes.resource_delete(old);
            apply(&mut store, &mut ctx, changes).unwrap();
            assert_ne!(id_of(&store, "alain"), old);
        }

        #[test]
        fn hooks_see_fixed_order() {
            let mut store = store();
            let recorder = Arc::new(Recorder::default());
            let mut hooks = Hooks::new();
            hooks.push(recorder.clone());

            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.resource_add(employee("alain"));
            apply_changes(&mut store, &mut ctx, &hooks, &mut changes).unwrap();
            let alain = id_of(&store, "alain");

            let mut changes = ChangesBatch::new();
            changes.resource_update(alain, employee("alain").with_property("title", "ceo"));
            changes.link_add(&employee("bernard"), manager(), &employee("alain"));
            changes.resource_add(employee("bernard"));
            apply_changes(&mut store, &mut ctx, &hooks, &mut changes).unwrap();

            assert_eq!(
                *recorder.0.lock().unwrap(),
                vec!["added alain", "added bernard", "link MANAGER", "updated alain"]
            );
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn duplicate_primary_key_is_collision() {
            let mut store = store();
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.resource_add(employee("alain"));
            changes.resource_add(employee("alain"));
            let err = apply(&mut store, &mut ctx, changes).unwrap_err();
            assert!(matches!(err, EngineError::ResourcePrimaryKeyCollision(_)));
            assert!(err.to_string().contains("alain"));
        }

        #[test]
        fn link_to_unknown_resource_is_not_found() {
            let mut store = store();
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.resource_add(employee("alain"));
            changes.link_add(&employee("alain"), manager(), &employee("ghost"));
            let err = apply(&mut store, &mut ctx, changes).unwrap_err();
            assert!(matches!(err, EngineError::ResourceNotFound(_)));
        }

        #[test]
        fn update_of_missing_id_is_not_found() {
            let mut store = store();
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.resource_update(ResourceId::new(42), employee("alain"));
            assert!(matches!(
                apply(&mut store, &mut ctx, changes),
                Err(EngineError::ResourceNotFound(_))
            ));
        }

        #[test]
        fn update_cannot_change_type() {
            let other = ResourceType::new("Contractor").unwrap();
            let mut store = InMemoryStore::new(
                ResourceTypeRegistry::new()
                    .with(ResourceDescriptor::new(employee_type(), ["name"]))
                    .with(ResourceDescriptor::new(other.clone(), ["name"])),
            );
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.resource_add(employee("alain"));
            apply(&mut store, &mut ctx, changes).unwrap();

            let mut changes = ChangesBatch::new();
            changes.resource_update(
                id_of(&store, "alain"),
                Resource::new(other).with_property("name", "alain"),
            );
            assert!(matches!(
                apply(&mut store, &mut ctx, changes),
                Err(EngineError::ResourceTypeChanged { .. })
            ));
        }

        #[test]
        fn update_into_taken_key_is_collision() {
            let mut store = store();
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            changes.resource_add(employee("alain"));
            changes.resource_add(employee("bernard"));
            apply(&mut store, &mut ctx, changes).unwrap();

            let mut changes = ChangesBatch::new();
            changes.resource_update(id_of(&store, "bernard"), employee("alain"));
            assert!(matches!(
                apply(&mut store, &mut ctx, changes),
                Err(EngineError::ResourcePrimaryKeyCollision(_))
            ));
        }
    }

    mod refresh {
        use super::*;

        fn chain(store: &mut InMemoryStore) -> TransactionContext {
            let mut ctx = TransactionContext::new();
            let mut changes = ChangesBatch::new();
            for name in ["alain", "bernard", "cecile"] {
                changes.resource_add(employee(name));
            }
            changes.link_add(&employee("bernard"), manager(), &employee("alain"));
            changes.link_add(&employee("cecile"), manager(), &employee("bernard"));
            apply(store, &mut ctx, changes).unwrap();
            TransactionContext::new()
        }

        #[test]
        fn delete_flags_transitively_reachable() {
            let mut store = store();
            let mut ctx = chain(&mut store);
            let alain = id_of(&store, "alain");
            let bernard = id_of(&store, "bernard");
            let cecile = id_of(&store, "cecile");

            let mut changes = ChangesBatch::new();
            changes.resource_delete(alain);
            apply(&mut store, &mut ctx, changes).unwrap();

            assert!(ctx.needs_refresh().contains(bernard));
            assert!(ctx.needs_refresh().contains(cecile));
            assert!(ctx.deleted().contains(alain));
            assert!(!ctx.needs_refresh().contains(alain));
            assert_eq!(ctx.deleted().len(), 1);
        }

        #[test]
        fn double_delete_is_recorded_once() {
            let mut store = store();
            let mut ctx = chain(&mut store);
            let alain = id_of(&store, "alain");

            let mut changes = ChangesBatch::new();
            changes.resource_delete(alain);
            changes.resource_delete(alain);
            apply(&mut store, &mut ctx, changes).unwrap();
            assert_eq!(ctx.stats.counters.resources_deleted, 1);
        }

        #[test]
        fn update_flags_direct_neighbors_only() {
            let mut store = store();
            let mut ctx = chain(&mut store);
            let alain = id_of(&store, "alain");
            let bernard = id_of(&store, "bernard");
            let cecile = id_of(&store, "cecile");

            let mut changes = ChangesBatch::new();
            changes.resource_update(alain, employee("alain").with_property("title", "ceo"));
            apply(&mut store, &mut ctx, changes).unwrap();

            assert!(ctx.updated().contains(alain));
            assert!(ctx.needs_refresh().contains(bernard));
            assert!(!ctx.needs_refresh().contains(cecile));
        }

        #[test]
        fn no_op_update_is_skipped() {
            let mut store = store();
            let mut ctx = chain(&mut store);
            let alain = id_of(&store, "alain");

            let mut changes = ChangesBatch::new();
            changes.resource_update(alain, employee("alain"));
            apply(&mut store, &mut ctx, changes).unwrap();
            assert!(!ctx.has_pending_work());
            assert_eq!(ctx.stats.counters.resources_updated, 0);
        }

        #[test]
        fn duplicate_link_and_tag_are_silent() {
            let mut store = store();
            let mut ctx = chain(&mut store);
            let prod = TagName::new("prod").unwrap();

            let mut changes = ChangesBatch::new();
            changes.link_add(&employee("bernard"), manager(), &employee("alain"));
            changes.tag_delete(&employee("alain"), prod);
            changes.link_delete(&employee("alain"), manager(), &employee("ghost"));
            apply(&mut store, &mut ctx, changes).unwrap();
            assert!(!ctx.has_pending_work());
        }

        #[test]
        fn tag_add_flags_resource() {
            let mut store = store();
            let mut ctx = chain(&mut store);
            let alain = id_of(&store, "alain");

            let mut changes = ChangesBatch::new();
            changes.tag_add(&employee("alain"), TagName::new("prod").unwrap());
            apply(&mut store, &mut ctx, changes).unwrap();
            assert!(ctx.needs_refresh().contains(alain));
            assert_eq!(ctx.stats.counters.tags_added, 1);
        }
    }
}
