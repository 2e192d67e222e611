//! engine::stats
//!
//! Per-transaction counters and the report produced when a transaction
//! fails to reach a fixpoint.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::core::resource::Resource;
use crate::core::types::ResourceId;

/// Mutation and dispatch counts for one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationCounters {
    pub resources_added: u64,
    pub resources_updated: u64,
    pub resources_deleted: u64,
    pub links_added: u64,
    pub links_deleted: u64,
    pub tags_added: u64,
    pub tags_deleted: u64,
    pub handler_calls: u64,
    pub passes: u64,
}

impl MutationCounters {
    /// Whether any mutation reached the store.
    pub fn changed_anything(&self) -> bool {
        self.resources_added
            + self.resources_updated
            + self.resources_deleted
            + self.links_added
            + self.links_deleted
            + self.tags_added
            + self.tags_deleted
            > 0
    }
}

#[derive(Debug, Clone, Default)]
struct HandlerTiming {
    calls: u64,
    total: Duration,
}

/// Running statistics for a transaction.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub counters: MutationCounters,
    update_counts: HashMap<ResourceId, (String, u64)>,
    handler_timings: HashMap<String, HandlerTiming>,
    refresh_dispatched: Vec<ResourceId>,
    refresh_seen: HashSet<ResourceId>,
}

impl ExecutionStats {
    /// Count an applied update against its resource.
    pub fn record_update(&mut self, resource: &Resource) {
        self.counters.resources_updated += 1;
        if let Some(id) = resource.id {
            let entry = self
                .update_counts
                .entry(id)
                .or_insert_with(|| (resource.to_string(), 0));
            entry.1 += 1;
        }
    }

    /// Record one handler invocation.
    pub fn record_handler(&mut self, handler: &str, elapsed: Duration) {
        self.counters.handler_calls += 1;
        let timing = self.handler_timings.entry(handler.to_string()).or_default();
        timing.calls += 1;
        timing.total += elapsed;
    }

    /// Record that a resource was dispatched for check-and-fix.
    ///
    /// Each id is kept once, however often it is dispatched.
    pub fn record_refresh(&mut self, id: ResourceId) {
        if self.refresh_seen.insert(id) {
            self.refresh_dispatched.push(id);
        }
    }

    /// Distinct ids dispatched for check-and-fix, in first-dispatch order.
    pub fn refresh_dispatched(&self) -> &[ResourceId] {
        &self.refresh_dispatched
    }

    /// How many times a resource was updated.
    pub fn update_count(&self, id: ResourceId) -> u64 {
        self.update_counts.get(&id).map_or(0, |(_, n)| *n)
    }

    /// Top-N report of the most updated resources and the slowest handlers.
    pub fn report(&self, top_n: usize, elapsed: Duration, pending: usize) -> LoopReport {
        let mut most_updated: Vec<UpdateHotspot> = self
            .update_counts
            .values()
            .map(|(resource, updates)| UpdateHotspot {
                resource: resource.clone(),
                updates: *updates,
            })
            .collect();
        most_updated.sort_by(|a, b| {
            b.updates
                .cmp(&a.updates)
                .then_with(|| a.resource.cmp(&b.resource))
        });
        most_updated.truncate(top_n);

        let mut slowest_handlers: Vec<HandlerHotspot> = self
            .handler_timings
            .iter()
            .map(|(handler, t)| HandlerHotspot {
                handler: handler.clone(),
                calls: t.calls,
                total: t.total,
            })
            .collect();
        slowest_handlers.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| a.handler.cmp(&b.handler))
        });
        slowest_handlers.truncate(top_n);

        LoopReport {
            elapsed,
            passes: self.counters.passes,
            pending,
            most_updated,
            slowest_handlers,
        }
    }
}

/// A resource that was updated repeatedly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateHotspot {
    pub resource: String,
    pub updates: u64,
}

/// A handler and its accumulated run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerHotspot {
    pub handler: String,
    pub calls: u64,
    pub total: Duration,
}

/// Diagnostics for a transaction that did not converge in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    pub elapsed: Duration,
    pub passes: u64,
    /// Queued items still waiting for dispatch.
    pub pending: usize,
    pub most_updated: Vec<UpdateHotspot>,
    pub slowest_handlers: Vec<HandlerHotspot>,
}

impl fmt::Display for LoopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no fixpoint after {}ms and {} passes ({} items pending)",
            self.elapsed.as_millis(),
            self.passes,
            self.pending
        )?;
        if !self.most_updated.is_empty() {
            write!(f, "\n  most updated resources:")?;
            for h in &self.most_updated {
                write!(f, "\n    {} ({} updates)", h.resource, h.updates)?;
            }
        }
        if !self.slowest_handlers.is_empty() {
            write!(f, "\n  slowest handlers:")?;
            for h in &self.slowest_handlers {
                write!(
                    f,
                    "\n    {} ({} calls, {}ms)",
                    h.handler,
                    h.calls,
                    h.total.as_millis()
                )?;
            }
        }
        Ok(())
    }
}
