//! engine::hooks
//!
//! Observers of transaction lifecycle and individual mutations.
//!
//! # Architecture
//!
//! A [`ChangesHook`] is notified synchronously, in registration order:
//!
//! - once at transaction start, with a chance to fill in the context
//!   (e.g. the acting user)
//! - for every mutation the apply step performs on the store
//! - once at the end, with the outcome
//!
//! Hooks observe; they cannot veto or stage changes. Every method has a
//! no-op default so a hook implements only what it cares about.
//!
//! Mutation notifications fire as mutations are applied, so a hook may see
//! mutations of a transaction that is later rolled back. [`rolled_back`]
//! is always the last call for such a transaction.
//!
//! [`rolled_back`]: ChangesHook::rolled_back

use std::sync::Arc;

use super::context::TransactionContext;
use super::stats::LoopReport;
use super::EngineError;
use crate::core::resource::Resource;
use crate::core::types::{LinkType, TagName};

/// Lifecycle and mutation observer.
pub trait ChangesHook: Send + Sync {
    /// Called before anything is applied.
    fn fill_context(&self, _context: &mut TransactionContext) {}

    fn resource_added(&self, _context: &TransactionContext, _resource: &Resource) {}

    fn resource_updated(
        &self,
        _context: &TransactionContext,
        _previous: &Resource,
        _current: &Resource,
    ) {
    }

    fn resource_deleted(&self, _context: &TransactionContext, _resource: &Resource) {}

    fn link_added(
        &self,
        _context: &TransactionContext,
        _from: &Resource,
        _link_type: &LinkType,
        _to: &Resource,
    ) {
    }

    fn link_deleted(
        &self,
        _context: &TransactionContext,
        _from: &Resource,
        _link_type: &LinkType,
        _to: &Resource,
    ) {
    }

    fn tag_added(&self, _context: &TransactionContext, _resource: &Resource, _tag: &TagName) {}

    fn tag_deleted(&self, _context: &TransactionContext, _resource: &Resource, _tag: &TagName) {}

    /// The transaction reached a fixpoint and is committed.
    fn success(&self, _context: &TransactionContext) {}

    /// The transaction hit the loop deadline. Followed by `rolled_back`.
    fn failure_infinite(&self, _context: &TransactionContext, _report: &LoopReport) {}

    /// The transaction failed and the store was restored.
    fn rolled_back(&self, _context: &TransactionContext, _error: &EngineError) {}
}

/// Ordered collection of hooks.
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: Vec<Arc<dyn ChangesHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Arc<dyn ChangesHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Let every hook fill in the context, in order.
    pub fn fill_context(&self, context: &mut TransactionContext) {
        for hook in &self.hooks {
            hook.fill_context(context);
        }
    }

    /// Call `f` on every hook, in order.
    pub fn notify(&self, f: impl Fn(&dyn ChangesHook)) {
        for hook in &self.hooks {
            f(hook.as_ref());
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("count", &self.hooks.len())
            .finish()
    }
}
