//! engine::exec
//!
//! The transactional change executor.
//!
//! # Architecture
//!
//! [`ChangeExecutor`] is the only public entry point that mutates a store.
//! It owns the store, the handler registry, the hooks and the engine
//! settings. One call to [`execute`](ChangeExecutor::execute) is one
//! transaction.
//!
//! # Executor Contract
//!
//! The executor MUST:
//! 1. Hold the store exclusively for the whole transaction
//! 2. Create a fresh [`TransactionContext`] and let hooks fill it
//! 3. Capture a rollback point before the first mutation
//! 4. Apply the batch and run the reconcile loop to a fixpoint
//! 5. On success: notify `success` and report an [`ExecutionSummary`]
//! 6. On any error: restore the rollback point, notify `rolled_back`,
//!    and return the error
//!
//! # Invariants
//!
//! - Either every mutation of a transaction is kept or none is
//! - Concurrent `execute` calls are serialized
//!
//! # Example
//!
//! ```
//! use infragraph::core::resource::{Resource, ResourceDescriptor, ResourceTypeRegistry};
//! use infragraph::core::types::ResourceType;
//! use infragraph::engine::{ChangeExecutor, ChangesBatch, HandlerRegistry};
//! use infragraph::store::InMemoryStore;
//!
//! let machine = ResourceType::new("Machine").unwrap();
//! let types = ResourceTypeRegistry::new()
//!     .with(ResourceDescriptor::new(machine.clone(), ["name"]));
//! let executor = ChangeExecutor::new(InMemoryStore::new(types), HandlerRegistry::new());
//!
//! let mut changes = ChangesBatch::new();
//! changes.resource_add(Resource::new(machine).with_property("name", "h1"));
//! let summary = executor.execute(changes).unwrap();
//! assert_eq!(summary.counters.resources_added, 1);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::changes::ChangesBatch;
use super::context::TransactionContext;
use super::handler::{HandlerRegistry, ResourceHandler};
use super::hooks::{ChangesHook, Hooks};
use super::reconcile::Reconciler;
use super::rollback::Rollback;
use super::stats::MutationCounters;
use super::EngineError;
use crate::core::config::EngineSettings;
use crate::core::types::{Fingerprint, ResourceId};
use crate::store::ResourceStore;

/// Outcome of a committed transaction.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub tx_id: Uuid,
    pub counters: MutationCounters,
    pub elapsed: Duration,
    /// Distinct resources dispatched for check-and-fix, in first-dispatch order.
    pub refreshed: Vec<ResourceId>,
    /// Store fingerprint after commit.
    pub fingerprint: Fingerprint,
}

impl ExecutionSummary {
    /// Whether the transaction changed the store at all.
    pub fn changed(&self) -> bool {
        self.counters.changed_anything()
    }
}

/// Applies changes batches transactionally.
pub struct ChangeExecutor<S: ResourceStore> {
    store: Mutex<S>,
    handlers: HandlerRegistry,
    hooks: Hooks,
    settings: EngineSettings,
}

impl<S: ResourceStore> ChangeExecutor<S> {
    /// Create an executor with default settings and no hooks.
    pub fn new(store: S, handlers: HandlerRegistry) -> Self {
        Self {
            store: Mutex::new(store),
            handlers,
            hooks: Hooks::new(),
            settings: EngineSettings::default(),
        }
    }

    /// Builder-style settings override.
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builder-style hook registration. Hooks run in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn ChangesHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Builder-style handler registration.
    pub fn with_handler(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.handlers.register(handler);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, S>, EngineError> {
        self.store.lock().map_err(|_| EngineError::StoreUnavailable)
    }

    /// Read from the store between transactions.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R, EngineError> {
        let store = self.lock_store()?;
        Ok(f(&store))
    }

    /// Take the store back.
    pub fn into_store(self) -> Result<S, EngineError> {
        self.store
            .into_inner()
            .map_err(|_| EngineError::StoreUnavailable)
    }

    /// Execute one transaction.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`]. When an error is returned, the store holds
    /// exactly what it held before the call.
    pub fn execute(&self, changes: ChangesBatch) -> Result<ExecutionSummary, EngineError> {
        let started = Instant::now();
        let mut store = self.lock_store()?;

        // Fresh context; hooks may set the user
        let mut context = TransactionContext::new();
        self.hooks.fill_context(&mut context);
        let tx = context.tx_id();

        // Early return for empty batches
        if !changes.has_changes() {
            debug!(%tx, "empty batch, nothing to execute");
            self.hooks.notify(|h| h.success(&context));
            return Ok(ExecutionSummary {
                tx_id: tx,
                counters: MutationCounters::default(),
                elapsed: started.elapsed(),
                refreshed: Vec::new(),
                fingerprint: store.snapshot()?.fingerprint()?,
            });
        }

        let rollback = Rollback::capture(&*store)?;
        info!(
            %tx,
            user = %context.user().map(|u| u.to_string()).unwrap_or_default(),
            mutations = changes.len(),
            "transaction started"
        );

        let outcome = Reconciler::new(
            &mut *store,
            &mut context,
            &self.handlers,
            &self.hooks,
            &self.settings,
        )
        .run(changes);

        match outcome {
            Ok(()) => {
                let fingerprint = store.snapshot()?.fingerprint()?;
                self.hooks.notify(|h| h.success(&context));
                info!(
                    %tx,
                    passes = context.stats.counters.passes,
                    handler_calls = context.stats.counters.handler_calls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "transaction committed"
                );
                Ok(ExecutionSummary {
                    tx_id: tx,
                    counters: context.stats.counters.clone(),
                    elapsed: started.elapsed(),
                    refreshed: context.stats.refresh_dispatched().to_vec(),
                    fingerprint,
                })
            }
            Err(error) => {
                warn!(%tx, error = %error, "transaction failed, rolling back");
                if let Err(source) = rollback.restore(&mut *store) {
                    return Err(EngineError::RollbackFailed {
                        cause: Box::new(error),
                        source,
                    });
                }
                self.hooks.notify(|h| h.rolled_back(&context, &error));
                Err(error)
            }
        }
    }
}

impl<S: ResourceStore + std::fmt::Debug> std::fmt::Debug for ChangeExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeExecutor")
            .field("store", &self.store)
            .field("handlers", &self.handlers)
            .field("hooks", &self.hooks)
            .field("settings", &self.settings)
            .finish()
    }
}
