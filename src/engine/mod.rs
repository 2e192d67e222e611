//! engine
//!
//! Transactional reconciliation of the resource graph.
//!
//! # Architecture
//!
//! A transaction moves through a fixed lifecycle:
//!
//! ```text
//! ChangesBatch -> apply -> [dispatch to handlers -> apply]* -> commit
//!                                  |                              |
//!                                  +---- error / timeout -> rollback
//! ```
//!
//! - [`changes`] - staged mutations
//! - [`apply`] - applies a batch to the store in a fixed order
//! - [`context`] - per-transaction work queues and identity
//! - [`handler`] - per-type reconciliation logic
//! - [`reconcile`] - the fixpoint loop
//! - [`rollback`] - snapshot and restore
//! - [`exec`] - the transactional executor
//! - [`hooks`] / [`audit`] - observers
//!
//! # Invariants
//!
//! - Handlers never mutate the store directly; they stage changes
//! - A transaction either converges and commits, or is fully undone
//! - A loop that does not converge within the configured timeout fails
//!   with [`EngineError::InfiniteUpdateLoop`]

pub mod apply;
pub mod audit;
pub mod changes;
pub mod context;
pub mod exec;
pub mod handler;
pub mod hooks;
pub mod reconcile;
pub mod rollback;
pub mod stats;

pub use apply::apply_changes;
pub use audit::{AuditEntry, AuditEvent, AuditLog};
pub use changes::{ChangesBatch, LinkChange, ResourceUpdate, TagChange};
pub use context::{DeletedResource, TransactionContext, UserIdentity, WorkQueue};
pub use exec::{ChangeExecutor, ExecutionSummary};
pub use handler::{HandlerRegistry, HandlerServices, ResourceHandler};
pub use hooks::{ChangesHook, Hooks};
pub use reconcile::{LoopState, Reconciler};
pub use rollback::{Rollback, RollbackError};
pub use stats::{ExecutionStats, LoopReport, MutationCounters};

use thiserror::Error;

use crate::core::types::ResourceType;
use crate::store::StoreError;

/// Errors that abort a transaction.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced resource does not resolve.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// An add or update would duplicate a primary key.
    #[error("primary key collision: {0}")]
    ResourcePrimaryKeyCollision(String),

    /// An update tried to change the resource type.
    #[error("cannot change type of {resource} to {new_type}")]
    ResourceTypeChanged {
        resource: String,
        new_type: ResourceType,
    },

    /// The reconcile loop did not converge in time.
    #[error("infinite update loop: {0}")]
    InfiniteUpdateLoop(Box<LoopReport>),

    /// A handler callback failed.
    #[error("handler '{handler}' failed on {resource}: {source}")]
    Handler {
        handler: String,
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    /// The store backend failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The failed transaction could not be undone.
    #[error("rollback failed after '{cause}': {source}")]
    RollbackFailed {
        cause: Box<EngineError>,
        #[source]
        source: RollbackError,
    },

    /// A previous transaction panicked while holding the store.
    #[error("store unavailable: a previous transaction panicked")]
    StoreUnavailable,
}

impl EngineError {
    /// Whether this is the loop-timeout failure.
    pub fn is_infinite_loop(&self) -> bool {
        matches!(self, EngineError::InfiniteUpdateLoop(_))
    }
}
