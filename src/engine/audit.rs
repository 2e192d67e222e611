//! engine::audit
//!
//! An audit trail hook.
//!
//! # Architecture
//!
//! [`AuditLog`] is a [`ChangesHook`] that records every applied mutation
//! of a transaction as an [`AuditEvent`]. Events are buffered per
//! transaction and only become part of the log when the transaction
//! commits; a rolled back transaction leaves a single `rolled_back` entry
//! (preceded by `infinite_loop` when the deadline tripped).
//!
//! Entries carry the transaction id, the acting user and an RFC 3339
//! timestamp, and export as JSON lines.
//!
//! # Example
//!
//! ```ignore
//! let audit = Arc::new(AuditLog::new().with_identity(UserIdentity::new("user", "alice")));
//! let executor = ChangeExecutor::new(store, handlers).with_hook(audit.clone());
//! executor.execute(changes)?;
//! print!("{}", audit.to_json_lines()?);
//! ```

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::{TransactionContext, UserIdentity};
use super::hooks::ChangesHook;
use super::stats::LoopReport;
use super::EngineError;
use crate::core::resource::Resource;
use crate::core::types::{LinkType, TagName};

/// One audited occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    ResourceAdded {
        resource: Resource,
    },
    ResourceUpdated {
        previous: Resource,
        current: Resource,
    },
    ResourceDeleted {
        resource: Resource,
    },
    LinkAdded {
        from: Resource,
        link_type: LinkType,
        to: Resource,
    },
    LinkDeleted {
        from: Resource,
        link_type: LinkType,
        to: Resource,
    },
    TagAdded {
        resource: Resource,
        tag: TagName,
    },
    TagDeleted {
        resource: Resource,
        tag: TagName,
    },
    /// The transaction committed.
    Committed {
        mutations: usize,
    },
    /// The loop deadline tripped.
    InfiniteLoop {
        report: String,
    },
    /// The transaction failed and was undone.
    RolledBack {
        reason: String,
    },
}

impl AuditEvent {
    /// Short kind name, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::ResourceAdded { .. } => "resource_added",
            AuditEvent::ResourceUpdated { .. } => "resource_updated",
            AuditEvent::ResourceDeleted { .. } => "resource_deleted",
            AuditEvent::LinkAdded { .. } => "link_added",
            AuditEvent::LinkDeleted { .. } => "link_deleted",
            AuditEvent::TagAdded { .. } => "tag_added",
            AuditEvent::TagDeleted { .. } => "tag_deleted",
            AuditEvent::Committed { .. } => "committed",
            AuditEvent::InfiniteLoop { .. } => "infinite_loop",
            AuditEvent::RolledBack { .. } => "rolled_back",
        }
    }
}

/// An audit event with its transaction envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub tx_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// In-memory audit trail.
#[derive(Debug, Default)]
pub struct AuditLog {
    identity: Option<UserIdentity>,
    pending: Mutex<Vec<AuditEntry>>,
    committed: Mutex<Vec<AuditEntry>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp transactions with this identity unless one is already set.
    pub fn with_identity(mut self, identity: UserIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Committed log, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        guard(&self.committed).clone()
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        guard(&self.committed).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export the committed log, one JSON object per line.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in guard(&self.committed).iter() {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    fn entry(context: &TransactionContext, event: AuditEvent) -> AuditEntry {
        AuditEntry {
            tx_id: context.tx_id(),
            user: context.user().cloned(),
            timestamp: Utc::now(),
            event,
        }
    }

    fn record(&self, context: &TransactionContext, event: AuditEvent) {
        guard(&self.pending).push(Self::entry(context, event));
    }

    /// Drop buffered entries of other transactions and return the rest.
    fn take_pending(&self, context: &TransactionContext) -> Vec<AuditEntry> {
        let mut pending = std::mem::take(&mut *guard(&self.pending));
        pending.retain(|e| e.tx_id == context.tx_id());
        pending
    }
}

impl ChangesHook for AuditLog {
    fn fill_context(&self, context: &mut TransactionContext) {
        if context.user().is_none() {
            if let Some(identity) = &self.identity {
                context.set_user(identity.clone());
            }
        }
    }

    fn resource_added(&self, context: &TransactionContext, resource: &Resource) {
        self.record(
            context,
            AuditEvent::ResourceAdded {
                resource: resource.clone(),
            },
        );
    }

    fn resource_updated(&self, context: &TransactionContext, previous: &Resource, current: &Resource) {
        self.record(
            context,
            AuditEvent::ResourceUpdated {
                previous: previous.clone(),
                current: current.clone(),
            },
        );
    }

    fn resource_deleted(&self, context: &TransactionContext, resource: &Resource) {
        self.record(
            context,
            AuditEvent::ResourceDeleted {
                resource: resource.clone(),
            },
        );
    }

    fn link_added(
        &self,
        context: &TransactionContext,
        from: &Resource,
        link_type: &LinkType,
        to: &Resource,
    ) {
        self.record(
            context,
            AuditEvent::LinkAdded {
                from: from.clone(),
                link_type: link_type.clone(),
                to: to.clone(),
            },
        );
    }

    fn link_deleted(
        &self,
        context: &TransactionContext,
        from: &Resource,
        link_type: &LinkType,
        to: &Resource,
    ) {
        self.record(
            context,
            AuditEvent::LinkDeleted {
                from: from.clone(),
                link_type: link_type.clone(),
                to: to.clone(),
            },
        );
    }

    fn tag_added(&self, context: &TransactionContext, resource: &Resource, tag: &TagName) {
        self.record(
            context,
            AuditEvent::TagAdded {
                resource: resource.clone(),
                tag: tag.clone(),
            },
        );
    }

    fn tag_deleted(&self, context: &TransactionContext, resource: &Resource, tag: &TagName) {
        self.record(
            context,
            AuditEvent::TagDeleted {
                resource: resource.clone(),
                tag: tag.clone(),
            },
        );
    }

    fn success(&self, context: &TransactionContext) {
        let mut entries = self.take_pending(context);
        let mutations = entries.len();
        entries.push(Self::entry(context, AuditEvent::Committed { mutations }));
        guard(&self.committed).extend(entries);
    }

    fn failure_infinite(&self, context: &TransactionContext, report: &LoopReport) {
        self.take_pending(context);
        guard(&self.committed).push(Self::entry(
            context,
            AuditEvent::InfiniteLoop {
                report: report.to_string(),
            },
        ));
    }

    fn rolled_back(&self, context: &TransactionContext, error: &EngineError) {
        self.take_pending(context);
        guard(&self.committed).push(Self::entry(
            context,
            AuditEvent::RolledBack {
                reason: error.to_string(),
            },
        ));
    }
}
