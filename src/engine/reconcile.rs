//! engine::reconcile
//!
//! The fixpoint loop.
//!
//! # Architecture
//!
//! After the initial batch is applied, the loop repeats passes until every
//! work queue is empty. A pass drains, in order:
//!
//! 1. updated resources -> `on_updated`
//! 2. deleted resources -> `on_deleted`
//! 3. added resources -> `on_added`
//! 4. resources needing refresh -> `check_and_fix`
//!
//! Each drain takes the whole queue at once. The batch a handler stages is
//! applied immediately after the call, so the next handler sees its
//! effects. Anything enqueued while draining is picked up by a later pass.
//!
//! # Termination
//!
//! Before each drain the elapsed time is compared with the configured
//! deadline. If work is still pending past the deadline, the loop stops
//! with [`EngineError::InfiniteUpdateLoop`] carrying a [`LoopReport`].
//!
//! # States
//!
//! ```text
//! Applying -> DispatchingUpdates -> DispatchingDeletes -> DispatchingAdds
//!          -> DispatchingRefreshes -> (work left? next pass : Converged)
//! any dispatch state -> TimedOut
//! ```
//!
//! [`LoopReport`]: super::stats::LoopReport

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, trace};

use super::apply::apply_changes;
use super::changes::ChangesBatch;
use super::context::TransactionContext;
use super::handler::{HandlerRegistry, HandlerServices, ResourceHandler};
use super::hooks::Hooks;
use super::EngineError;
use crate::core::config::EngineSettings;
use crate::core::resource::Resource;
use crate::core::types::ResourceId;
use crate::store::ResourceStore;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Applying,
    DispatchingUpdates,
    DispatchingDeletes,
    DispatchingAdds,
    DispatchingRefreshes,
    Converged,
    TimedOut,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopState::Applying => "applying",
            LoopState::DispatchingUpdates => "dispatching-updates",
            LoopState::DispatchingDeletes => "dispatching-deletes",
            LoopState::DispatchingAdds => "dispatching-adds",
            LoopState::DispatchingRefreshes => "dispatching-refreshes",
            LoopState::Converged => "converged",
            LoopState::TimedOut => "timed-out",
        };
        write!(f, "{}", s)
    }
}

/// Drives one transaction from its initial batch to a fixpoint.
pub struct Reconciler<'a, S: ResourceStore> {
    store: &'a mut S,
    context: &'a mut TransactionContext,
    handlers: &'a HandlerRegistry,
    hooks: &'a Hooks,
    settings: &'a EngineSettings,
    started: Instant,
    state: LoopState,
}

impl<'a, S: ResourceStore> Reconciler<'a, S> {
    pub fn new(
        store: &'a mut S,
        context: &'a mut TransactionContext,
        handlers: &'a HandlerRegistry,
        hooks: &'a Hooks,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            store,
            context,
            handlers,
            hooks,
            settings,
            started: Instant::now(),
            state: LoopState::Applying,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Apply `changes`, then dispatch until nothing is left to do.
    pub fn run(&mut self, mut changes: ChangesBatch) -> Result<(), EngineError> {
        self.transition(LoopState::Applying);
        apply_changes(&mut *self.store, &mut *self.context, self.hooks, &mut changes)?;

        while self.context.has_pending_work() {
            self.context.stats.counters.passes += 1;
            trace!(
                tx = %self.context.tx_id(),
                pass = self.context.stats.counters.passes,
                pending = self.context.pending_len(),
                "starting pass"
            );
            self.drain_updates()?;
            self.drain_deletes()?;
            self.drain_adds()?;
            self.drain_refreshes()?;
        }

        self.transition(LoopState::Converged);
        Ok(())
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            trace!(from = %self.state, to = %next, "loop state");
            self.state = next;
        }
    }

    fn check_deadline(&mut self) -> Result<(), EngineError> {
        let elapsed = self.started.elapsed();
        if !self.context.has_pending_work() || elapsed < self.settings.infinite_loop_timeout {
            return Ok(());
        }

        self.transition(LoopState::TimedOut);
        let report = self.context.stats.report(
            self.settings.report_top_n,
            elapsed,
            self.context.pending_len(),
        );
        error!(tx = %self.context.tx_id(), "{}", report);
        let context = &*self.context;
        self.hooks.notify(|h| h.failure_infinite(context, &report));
        Err(EngineError::InfiniteUpdateLoop(Box::new(report)))
    }

    /// Re-read a queued resource. `None` means it was deleted later in
    /// this transaction and should be skipped.
    fn current(&self, id: ResourceId) -> Result<Option<Resource>, EngineError> {
        match self.store.resource_find(id)? {
            Some(resource) => Ok(Some(resource)),
            None if self.context.is_removed(id) => Ok(None),
            None => Err(EngineError::ResourceNotFound(id.to_string())),
        }
    }

    fn drain_updates(&mut self) -> Result<(), EngineError> {
        self.check_deadline()?;
        self.transition(LoopState::DispatchingUpdates);
        let handlers = self.handlers;

        for (id, previous) in self.context.take_updated() {
            let Some(current) = self.current(id)? else {
                continue;
            };
            for handler in handlers.handlers_for(&current.resource_type) {
                self.invoke(handler, &current, |h, services, changes| {
                    h.on_updated(services, changes, &previous, &current)
                })?;
            }
        }
        Ok(())
    }

    fn drain_deletes(&mut self) -> Result<(), EngineError> {
        self.check_deadline()?;
        self.transition(LoopState::DispatchingDeletes);
        let handlers = self.handlers;

        for (_, deleted) in self.context.take_deleted() {
            let resource = &deleted.resource;
            for handler in handlers.handlers_for(&resource.resource_type) {
                self.invoke(handler, resource, |h, services, changes| {
                    h.on_deleted(services, changes, resource, &deleted.previous_links)
                })?;
            }
        }
        Ok(())
    }

    fn drain_adds(&mut self) -> Result<(), EngineError> {
        self.check_deadline()?;
        self.transition(LoopState::DispatchingAdds);
        let handlers = self.handlers;

        for (id, ()) in self.context.take_added() {
            let Some(current) = self.current(id)? else {
                continue;
            };
            for handler in handlers.handlers_for(&current.resource_type) {
                self.invoke(handler, &current, |h, services, changes| {
                    h.on_added(services, changes, &current)
                })?;
            }
        }
        Ok(())
    }

    fn drain_refreshes(&mut self) -> Result<(), EngineError> {
        self.check_deadline()?;
        self.transition(LoopState::DispatchingRefreshes);
        let handlers = self.handlers;

        for (id, ()) in self.context.take_needs_refresh() {
            let Some(current) = self.store.resource_find(id)? else {
                debug!(%id, "refresh of vanished resource skipped");
                continue;
            };
            self.context.stats.record_refresh(id);
            for handler in handlers.handlers_for(&current.resource_type) {
                self.invoke(handler, &current, |h, services, changes| {
                    h.check_and_fix(services, changes, &current)
                })?;
            }
        }
        Ok(())
    }

    /// Run one handler callback and apply what it staged.
    fn invoke<F>(
        &mut self,
        handler: &Arc<dyn ResourceHandler>,
        resource: &Resource,
        call: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(
            &dyn ResourceHandler,
            &HandlerServices<'_>,
            &mut ChangesBatch,
        ) -> anyhow::Result<()>,
    {
        let mut changes = ChangesBatch::new();
        let started = Instant::now();
        let result = {
            let services = HandlerServices::new(&*self.store, &*self.context);
            call(handler.as_ref(), &services, &mut changes)
        };
        self.context
            .stats
            .record_handler(handler.name(), started.elapsed());

        result.map_err(|source| EngineError::Handler {
            handler: handler.name().to_string(),
            resource: resource.to_string(),
            source,
        })?;

        if changes.has_changes() {
            trace!(handler = handler.name(), mutations = changes.len(), "handler staged changes");
            let dispatching = self.state;
            self.transition(LoopState::Applying);
            apply_changes(&mut *self.store, &mut *self.context, self.hooks, &mut changes)?;
            self.transition(dispatching);
        }
        Ok(())
    }
}
