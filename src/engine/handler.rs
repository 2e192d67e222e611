//! engine::handler
//!
//! Per-resource-type reconciliation handlers.
//!
//! # Architecture
//!
//! A [`ResourceHandler`] watches one resource type. When a resource of that
//! type is added, updated, deleted, or flagged for refresh, the reconcile
//! loop invokes the matching callback. Handlers read the store through
//! [`HandlerServices`] and express every change by staging it in a
//! [`ChangesBatch`]; the loop applies that batch right after the call.
//!
//! Handlers must converge: once the graph satisfies a handler's rules it
//! must stage nothing. A handler that keeps staging changes will trip the
//! loop deadline and roll the transaction back.
//!
//! # Example
//!
//! ```
//! use infragraph::core::resource::Resource;
//! use infragraph::core::types::ResourceType;
//! use infragraph::engine::{ChangesBatch, HandlerServices, ResourceHandler};
//!
//! struct Lowercase(ResourceType);
//!
//! impl ResourceHandler for Lowercase {
//!     fn name(&self) -> &str {
//!         "lowercase"
//!     }
//!
//!     fn resource_type(&self) -> &ResourceType {
//!         &self.0
//!     }
//!
//!     fn check_and_fix(
//!         &self,
//!         _services: &HandlerServices<'_>,
//!         changes: &mut ChangesBatch,
//!         resource: &Resource,
//!     ) -> anyhow::Result<()> {
//!         if let (Some(id), Some(name)) = (resource.id, resource.property_str("name")) {
//!             let lower = name.to_lowercase();
//!             if lower != name {
//!                 let mut fixed = resource.clone();
//!                 fixed.set_property("name", lower);
//!                 changes.resource_update(id, fixed);
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::changes::ChangesBatch;
use super::context::{TransactionContext, UserIdentity};
use crate::core::resource::Resource;
use crate::core::types::ResourceType;
use crate::store::{RelatedLink, ResourceStore};

/// Read-only view handed to handlers.
pub struct HandlerServices<'a> {
    store: &'a dyn ResourceStore,
    context: &'a TransactionContext,
}

impl<'a> HandlerServices<'a> {
    pub fn new(store: &'a dyn ResourceStore, context: &'a TransactionContext) -> Self {
        Self { store, context }
    }

    /// The store, as currently mutated by this transaction.
    pub fn store(&self) -> &'a dyn ResourceStore {
        self.store
    }

    pub fn tx_id(&self) -> Uuid {
        self.context.tx_id()
    }

    pub fn user(&self) -> Option<&'a UserIdentity> {
        self.context.user()
    }
}

/// Reconciliation logic for one resource type.
///
/// `on_added` and `on_updated` default to [`check_and_fix`]; `on_deleted`
/// and `check_and_fix` default to doing nothing.
///
/// [`check_and_fix`]: ResourceHandler::check_and_fix
pub trait ResourceHandler: Send + Sync {
    /// Name used in logs, errors, and timing reports.
    fn name(&self) -> &str;

    /// The watched resource type.
    fn resource_type(&self) -> &ResourceType;

    fn on_added(
        &self,
        services: &HandlerServices<'_>,
        changes: &mut ChangesBatch,
        resource: &Resource,
    ) -> anyhow::Result<()> {
        self.check_and_fix(services, changes, resource)
    }

    fn on_updated(
        &self,
        services: &HandlerServices<'_>,
        changes: &mut ChangesBatch,
        _previous: &Resource,
        current: &Resource,
    ) -> anyhow::Result<()> {
        self.check_and_fix(services, changes, current)
    }

    /// Called after deletion, with the links the resource had.
    fn on_deleted(
        &self,
        _services: &HandlerServices<'_>,
        _changes: &mut ChangesBatch,
        _resource: &Resource,
        _previous_links: &[RelatedLink],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Bring the graph around `resource` back in line with this handler's rules.
    fn check_and_fix(
        &self,
        _services: &HandlerServices<'_>,
        _changes: &mut ChangesBatch,
        _resource: &Resource,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handlers grouped by watched type, in registration order.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    by_type: HashMap<ResourceType, Vec<Arc<dyn ResourceHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.by_type
            .entry(handler.resource_type().clone())
            .or_default()
            .push(handler);
    }

    /// Handlers watching a type; empty if none.
    pub fn handlers_for(&self, resource_type: &ResourceType) -> &[Arc<dyn ResourceHandler>] {
        self.by_type
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total registered handlers.
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self
            .by_type
            .values()
            .flatten()
            .map(|h| h.name())
            .collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::{ResourceDescriptor, ResourceTypeRegistry};
    use crate::core::types::ResourceId;
    use crate::store::InMemoryStore;

    fn machine() -> ResourceType {
        ResourceType::new("Machine").unwrap()
    }

    struct Touch(ResourceType, &'static str);

    impl ResourceHandler for Touch {
        fn name(&self) -> &str {
            self.1
        }

        fn resource_type(&self) -> &ResourceType {
            &self.0
        }

        fn check_and_fix(
            &self,
            _services: &HandlerServices<'_>,
            changes: &mut ChangesBatch,
            resource: &Resource,
        ) -> anyhow::Result<()> {
            changes.resource_refresh(resource.id.unwrap_or(ResourceId::new(0)));
            Ok(())
        }
    }

    #[test]
    fn lookup_by_type_keeps_order() {
        let registry = HandlerRegistry::new()
            .with(Arc::new(Touch(machine(), "a")))
            .with(Arc::new(Touch(machine(), "b")))
            .with(Arc::new(Touch(ResourceType::new("Domain").unwrap(), "c")));

        let names: Vec<_> = registry
            .handlers_for(&machine())
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.len(), 3);
        assert!(registry
            .handlers_for(&ResourceType::new("Website").unwrap())
            .is_empty());
    }

    #[test]
    fn added_and_updated_default_to_check_and_fix() {
        let store = InMemoryStore::new(
            ResourceTypeRegistry::new().with(ResourceDescriptor::new(machine(), ["name"])),
        );
        let ctx = TransactionContext::new();
        let services = HandlerServices::new(&store, &ctx);
        let handler = Touch(machine(), "touch");
        let r = Resource::new(machine()).with_id(ResourceId::new(5));

        let mut changes = ChangesBatch::new();
        handler.on_added(&services, &mut changes, &r).unwrap();
        handler.on_updated(&services, &mut changes, &r, &r).unwrap();
        handler.on_deleted(&services, &mut changes, &r, &[]).unwrap();
        assert_eq!(changes.resources_to_refresh().len(), 2);
        assert_eq!(services.tx_id(), ctx.tx_id());
    }
}
