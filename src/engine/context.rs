//! engine::context
//!
//! Per-transaction bookkeeping.
//!
//! # Architecture
//!
//! A [`TransactionContext`] is created for every executed batch and owned
//! by that transaction alone. It carries:
//!
//! - the transaction id and the acting user, filled in by hooks
//! - four work queues (added, updated, deleted, needs-refresh), each an
//!   insertion-ordered queue with a membership set
//! - the set of ids already deleted in this transaction
//! - [`ExecutionStats`] for the top-N report
//!
//! # Invariants
//!
//! - A resource id sits in at most one of the four queues at a time
//! - An id deleted in this transaction is never queued for refresh
//! - An update to a resource queued as added folds into the add

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stats::ExecutionStats;
use crate::core::resource::Resource;
use crate::core::types::ResourceId;
use crate::store::RelatedLink;

/// Who is acting in a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Kind of actor, e.g. `user` or `plugin`.
    pub user_type: String,
    pub user_name: String,
}

impl UserIdentity {
    pub fn new(user_type: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_type: user_type.into(),
            user_name: user_name.into(),
        }
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user_type, self.user_name)
    }
}

/// A deleted resource together with the links it had before deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedResource {
    pub resource: Resource,
    pub previous_links: Vec<RelatedLink>,
}

/// An insertion-ordered queue of resource ids with O(1) membership.
#[derive(Debug, Clone)]
pub struct WorkQueue<T> {
    items: VecDeque<(ResourceId, T)>,
    members: HashSet<ResourceId>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            members: HashSet::new(),
        }
    }
}

impl<T> WorkQueue<T> {
    /// Enqueue unless already present. Returns whether it was enqueued.
    pub fn push(&mut self, id: ResourceId, item: T) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.items.push_back((id, item));
        true
    }

    /// Remove an id, returning its payload.
    pub fn remove(&mut self, id: ResourceId) -> Option<T> {
        if !self.members.remove(&id) {
            return None;
        }
        let pos = self.items.iter().position(|(i, _)| *i == id)?;
        self.items.remove(pos).map(|(_, item)| item)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queued ids, in order.
    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.items.iter().map(|(id, _)| *id)
    }

    /// Take the whole queue, leaving it empty.
    ///
    /// Items enqueued after this call belong to the next drain.
    pub fn take_all(&mut self) -> Vec<(ResourceId, T)> {
        self.members.clear();
        self.items.drain(..).collect()
    }
}

/// State of one transaction.
#[derive(Debug)]
pub struct TransactionContext {
    tx_id: Uuid,
    started_at: DateTime<Utc>,
    user: Option<UserIdentity>,
    added: WorkQueue<()>,
    updated: WorkQueue<Resource>,
    deleted: WorkQueue<DeletedResource>,
    needs_refresh: WorkQueue<()>,
    removed_in_transaction: HashSet<ResourceId>,
    pub stats: ExecutionStats,
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionContext {
    /// Start a fresh transaction context with a new id.
    pub fn new() -> Self {
        Self {
            tx_id: Uuid::new_v4(),
            started_at: Utc::now(),
            user: None,
            added: WorkQueue::default(),
            updated: WorkQueue::default(),
            deleted: WorkQueue::default(),
            needs_refresh: WorkQueue::default(),
            removed_in_transaction: HashSet::new(),
            stats: ExecutionStats::default(),
        }
    }

    pub fn tx_id(&self) -> Uuid {
        self.tx_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: UserIdentity) {
        self.user = Some(user);
    }

    /// Queue a freshly added resource.
    pub fn mark_added(&mut self, id: ResourceId) {
        self.needs_refresh.remove(id);
        self.added.push(id, ());
    }

    /// Queue an updated resource with its state before the update.
    ///
    /// Returns `false` when the update folded into a pending add or a
    /// pending update, which keeps the earliest previous state.
    pub fn mark_updated(&mut self, previous: Resource) -> bool {
        let Some(id) = previous.id else {
            return false;
        };
        if self.added.contains(id) || self.updated.contains(id) {
            return false;
        }
        self.needs_refresh.remove(id);
        self.updated.push(id, previous)
    }

    /// Queue a deleted resource.
    ///
    /// Returns `false` if it was already deleted in this transaction.
    pub fn mark_deleted(&mut self, resource: Resource, previous_links: Vec<RelatedLink>) -> bool {
        let Some(id) = resource.id else {
            return false;
        };
        if !self.removed_in_transaction.insert(id) {
            return false;
        }
        self.added.remove(id);
        self.updated.remove(id);
        self.needs_refresh.remove(id);
        self.deleted.push(
            id,
            DeletedResource {
                resource,
                previous_links,
            },
        )
    }

    /// Queue a check-and-fix pass, unless the resource is already queued
    /// for any reason or was deleted.
    pub fn mark_needs_refresh(&mut self, id: ResourceId) -> bool {
        if self.is_queued(id) || self.is_removed(id) {
            return false;
        }
        self.needs_refresh.push(id, ())
    }

    /// Whether the id was deleted in this transaction.
    pub fn is_removed(&self, id: ResourceId) -> bool {
        self.removed_in_transaction.contains(&id)
    }

    /// Whether the id is in any of the four queues.
    pub fn is_queued(&self, id: ResourceId) -> bool {
        self.added.contains(id)
            || self.updated.contains(id)
            || self.deleted.contains(id)
            || self.needs_refresh.contains(id)
    }

    pub fn has_pending_work(&self) -> bool {
        self.pending_len() > 0
    }

    /// Total queued items.
    pub fn pending_len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len() + self.needs_refresh.len()
    }

    pub fn added(&self) -> &WorkQueue<()> {
        &self.added
    }

    pub fn updated(&self) -> &WorkQueue<Resource> {
        &self.updated
    }

    pub fn deleted(&self) -> &WorkQueue<DeletedResource> {
        &self.deleted
    }

    pub fn needs_refresh(&self) -> &WorkQueue<()> {
        &self.needs_refresh
    }

    pub(crate) fn take_added(&mut self) -> Vec<(ResourceId, ())> {
        self.added.take_all()
    }

    pub(crate) fn take_updated(&mut self) -> Vec<(ResourceId, Resource)> {
        self.updated.take_all()
    }

    pub(crate) fn take_deleted(&mut self) -> Vec<(ResourceId, DeletedResource)> {
        self.deleted.take_all()
    }

    pub(crate) fn take_needs_refresh(&mut self) -> Vec<(ResourceId, ())> {
        self.needs_refresh.take_all()
    }
}
