//! Integration tests for the reconcile engine.
//!
//! These tests drive [`ChangeExecutor`] end to end against an
//! [`InMemoryStore`] with small example handlers (org chart managers,
//! machine/domain dependencies, a deliberately non-converging toggle).

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use infragraph::core::config::EngineSettings;
use infragraph::core::resource::{Resource, ResourceDescriptor, ResourceTypeRegistry};
use infragraph::core::types::{Fingerprint, LinkType, ResourceId, ResourceType, TagName};
use infragraph::engine::{
    AuditEvent, AuditLog, ChangeExecutor, ChangesBatch, ChangesHook, EngineError,
    HandlerRegistry, HandlerServices, ResourceHandler, TransactionContext, UserIdentity,
};
use infragraph::store::{InMemoryStore, ResourceQuery, ResourceStore};

// =============================================================================
// Fixtures
// =============================================================================

fn employee_type() -> ResourceType {
    ResourceType::new("Employee").unwrap()
}

fn machine_type() -> ResourceType {
    ResourceType::new("Machine").unwrap()
}

fn domain_type() -> ResourceType {
    ResourceType::new("Domain").unwrap()
}

fn manager() -> LinkType {
    LinkType::new("MANAGER").unwrap()
}

fn employee(name: &str) -> Resource {
    Resource::new(employee_type()).with_property("name", name)
}

fn types() -> ResourceTypeRegistry {
    ResourceTypeRegistry::new()
        .with(ResourceDescriptor::new(employee_type(), ["name"]))
        .with(ResourceDescriptor::new(machine_type(), ["name"]))
        .with(ResourceDescriptor::new(domain_type(), ["name"]))
}

fn executor(handlers: HandlerRegistry) -> ChangeExecutor<InMemoryStore> {
    ChangeExecutor::new(InMemoryStore::new(types()), handlers)
}

fn id_of(executor: &ChangeExecutor<InMemoryStore>, resource: &Resource) -> ResourceId {
    executor
        .read(|s| s.resource_find_by_primary_key(resource).unwrap())
        .unwrap()
        .and_then(|r| r.id)
        .expect("resource should exist")
}

fn fingerprint(executor: &ChangeExecutor<InMemoryStore>) -> Fingerprint {
    executor
        .read(|s| s.snapshot().unwrap().fingerprint().unwrap())
        .unwrap()
}

fn managers_of(executor: &ChangeExecutor<InMemoryStore>, name: &str) -> Vec<String> {
    let id = id_of(executor, &employee(name));
    executor
        .read(|s| {
            s.link_find_all_by_from_resource_and_link_type(id, &manager())
                .unwrap()
        })
        .unwrap()
        .iter()
        .filter_map(|r| r.property_str("name").map(str::to_string))
        .collect()
}

/// Keeps only the most recently linked MANAGER of an employee.
struct SingleManager(ResourceType);

impl ResourceHandler for SingleManager {
    fn name(&self) -> &str {
        "single-manager"
    }

    fn resource_type(&self) -> &ResourceType {
        &self.0
    }

    fn check_and_fix(
        &self,
        services: &HandlerServices<'_>,
        changes: &mut ChangesBatch,
        resource: &Resource,
    ) -> anyhow::Result<()> {
        let Some(id) = resource.id else {
            return Ok(());
        };
        let managers = services
            .store()
            .link_find_all_by_from_resource_and_link_type(id, &manager())?;
        if let Some((_newest, older)) = managers.split_last() {
            for old in older {
                changes.link_delete(resource, manager(), old);
            }
        }
        Ok(())
    }
}

/// Machines without a public IP depend on a domain named after them,
/// labels reversed.
struct MachineDomain(ResourceType);

fn reverse_name(name: &str) -> String {
    name.rsplit('.').collect::<Vec<_>>().join(".")
}

impl ResourceHandler for MachineDomain {
    fn name(&self) -> &str {
        "machine-domain"
    }

    fn resource_type(&self) -> &ResourceType {
        &self.0
    }

    fn check_and_fix(
        &self,
        services: &HandlerServices<'_>,
        changes: &mut ChangesBatch,
        machine: &Resource,
    ) -> anyhow::Result<()> {
        let (Some(id), Some(name)) = (machine.id, machine.property_str("name")) else {
            return Ok(());
        };
        if !machine.property_is_null("publicIp") {
            return Ok(());
        }

        let uses = LinkType::new("USES")?;
        let wanted = Resource::new(domain_type()).with_property("name", reverse_name(name));
        match services.store().resource_find_by_primary_key(&wanted)? {
            Some(domain) => {
                let linked = match domain.id {
                    Some(domain_id) => services.store().link_exists(id, &uses, domain_id)?,
                    None => false,
                };
                if !linked {
                    changes.link_add(machine, uses, &domain);
                }
            }
            None => {
                changes.resource_add(wanted.clone());
                changes.link_add(machine, uses, &wanted);
            }
        }
        Ok(())
    }
}

/// Flips `enabled` on every call and never settles.
struct Toggle(ResourceType);

impl ResourceHandler for Toggle {
    fn name(&self) -> &str {
        "toggle"
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
        if let Some(id) = resource.id {
            let enabled = resource
                .property("enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            changes.resource_update(id, resource.clone().with_property("enabled", !enabled));
        }
        Ok(())
    }
}

#[derive(Default)]
struct UpdateRecorder(Mutex<Vec<ResourceId>>);

impl ChangesHook for UpdateRecorder {
    fn resource_updated(&self, _c: &TransactionContext, _previous: &Resource, current: &Resource) {
        if let Some(id) = current.id {
            self.0.lock().unwrap().push(id);
        }
    }
}

// =============================================================================
// Org chart scenarios
// =============================================================================

mod org_chart {
    use super::*;

    fn seeded() -> ChangeExecutor<InMemoryStore> {
        let executor = executor(
            HandlerRegistry::new().with(Arc::new(SingleManager(employee_type()))),
        );
        let mut changes = ChangesBatch::new();
        changes.resource_add(employee("Alain"));
        changes.resource_add(employee("Bernard"));
        changes.link_add(&employee("Bernard"), manager(), &employee("Alain"));
        executor.execute(changes).unwrap();
        executor
    }

    #[test]
    fn link_is_queryable_after_commit() {
        let executor = seeded();
        assert_eq!(managers_of(&executor, "Bernard"), vec!["Alain"]);
    }

    #[test]
    fn handler_keeps_single_manager() {
        let executor = seeded();

        let mut changes = ChangesBatch::new();
        changes.resource_add(employee("Cecille"));
        changes.link_add(&employee("Bernard"), manager(), &employee("Cecille"));
        let summary = executor.execute(changes).unwrap();

        assert_eq!(managers_of(&executor, "Bernard"), vec!["Cecille"]);
        assert_eq!(summary.counters.links_added, 1);
        assert_eq!(summary.counters.links_deleted, 1);

        // Bernard is checked twice: after the new link and after the old one goes
        let bernard = id_of(&executor, &employee("Bernard"));
        let checks = summary.refreshed.iter().filter(|id| **id == bernard).count();
        assert_eq!(checks, 1);
        assert!(summary.counters.passes >= 2);
    }

    #[test]
    fn deleting_manager_refreshes_report() {
        let executor = seeded();
        let alain = id_of(&executor, &employee("Alain"));
        let bernard = id_of(&executor, &employee("Bernard"));

        let mut changes = ChangesBatch::new();
        changes.resource_delete(alain);
        let summary = executor.execute(changes).unwrap();

        assert!(managers_of(&executor, "Bernard").is_empty());
        assert!(summary.refreshed.contains(&bernard));
        assert!(!summary.refreshed.contains(&alain));
    }

    #[test]
    fn tags_round_trip_through_batches() {
        let executor = seeded();
        let prod = TagName::new("prod").unwrap();

        let mut changes = ChangesBatch::new();
        changes.tag_add(&employee("Alain"), prod.clone());
        changes.tag_add(&employee("Alain"), prod.clone());
        executor.execute(changes).unwrap();

        let tagged = executor
            .read(|s| s.query(&ResourceQuery::all().tagged(prod.clone())).unwrap())
            .unwrap();
        assert_eq!(tagged.len(), 1);

        let mut changes = ChangesBatch::new();
        changes.tag_delete(&employee("Alain"), prod.clone());
        changes.tag_delete(&employee("Alain"), prod.clone());
        let summary = executor.execute(changes).unwrap();
        assert_eq!(summary.counters.tags_deleted, 1);
    }
}

// =============================================================================
// Machine / domain dependency
// =============================================================================

mod machine_domain {
    use super::*;

    fn machine(name: &str) -> Resource {
        Resource::new(machine_type())
            .with_property("name", name)
            .with_property("publicIp", serde_json::Value::Null)
    }

    #[test]
    fn converges_to_single_domain() {
        let handler = Arc::new(MachineDomain(machine_type()));
        let executor = executor(HandlerRegistry::new().with(handler.clone()));

        let mut changes = ChangesBatch::new();
        changes.resource_add(machine("h1.example.com"));
        executor.execute(changes).unwrap();

        let domains = executor
            .read(|s| s.query(&ResourceQuery::of_type(domain_type())).unwrap())
            .unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].property_str("name"), Some("com.example.h1"));

        // A fresh check on the converged graph stages nothing
        let stored = executor
            .read(|s| s.resource_find_by_primary_key(&machine("h1.example.com")).unwrap())
            .unwrap()
            .unwrap();
        let staged = executor
            .read(|s| {
                let ctx = TransactionContext::new();
                let services = HandlerServices::new(s, &ctx);
                let mut changes = ChangesBatch::new();
                handler
                    .check_and_fix(&services, &mut changes, &stored)
                    .unwrap();
                changes
            })
            .unwrap();
        assert!(!staged.has_changes());
    }

    #[test]
    fn refresh_of_converged_machine_is_noop() {
        let executor =
            executor(HandlerRegistry::new().with(Arc::new(MachineDomain(machine_type()))));
        let mut changes = ChangesBatch::new();
        changes.resource_add(machine("h1.example.com"));
        executor.execute(changes).unwrap();
        let before = fingerprint(&executor);

        let mut changes = ChangesBatch::new();
        changes.resource_refresh(id_of(&executor, &machine("h1.example.com")));
        let summary = executor.execute(changes).unwrap();

        assert!(!summary.changed());
        assert_eq!(summary.counters.passes, 1);
        assert_eq!(fingerprint(&executor), before);
    }

    #[test]
    fn machine_with_public_ip_needs_no_domain() {
        let executor =
            executor(HandlerRegistry::new().with(Arc::new(MachineDomain(machine_type()))));
        let mut changes = ChangesBatch::new();
        changes.resource_add(machine("h2.example.com").with_property("publicIp", "10.0.0.2"));
        executor.execute(changes).unwrap();

        let domains = executor
            .read(|s| s.query(&ResourceQuery::of_type(domain_type())).unwrap())
            .unwrap();
        assert!(domains.is_empty());
    }
}

// =============================================================================
// Transaction boundary
// =============================================================================

mod transactions {
    use super::*;

    #[test]
    fn non_converging_handler_times_out_and_rolls_back() {
        let executor = executor(HandlerRegistry::new().with(Arc::new(Toggle(machine_type()))))
            .with_settings(EngineSettings::default().with_timeout(Duration::from_millis(200)));

        let mut seed = ChangesBatch::new();
        seed.resource_add(employee("Alain"));
        executor.execute(seed).unwrap();
        let before = fingerprint(&executor);

        let mut changes = ChangesBatch::new();
        changes.resource_add(Resource::new(machine_type()).with_property("name", "flappy"));
        let err = executor.execute(changes).unwrap_err();

        match &err {
            EngineError::InfiniteUpdateLoop(report) => {
                assert!(report.elapsed >= Duration::from_millis(200));
                assert_eq!(report.slowest_handlers[0].handler, "toggle");
                assert!(report.most_updated[0].updates > 1);
            }
            other => panic!("expected infinite loop, got {:?}", other),
        }
        assert_eq!(fingerprint(&executor), before);
    }

    #[test]
    fn collision_rolls_back_earlier_mutations() {
        let executor = executor(HandlerRegistry::new());
        let mut seed = ChangesBatch::new();
        seed.resource_add(employee("Alain"));
        executor.execute(seed).unwrap();
        let before = fingerprint(&executor);

        let mut changes = ChangesBatch::new();
        changes.resource_add(employee("Bernard"));
        changes.resource_add(employee("Cecille"));
        changes.resource_add(employee("Bernard"));
        changes.link_add(&employee("Bernard"), manager(), &employee("Alain"));
        let err = executor.execute(changes).unwrap_err();

        assert!(matches!(err, EngineError::ResourcePrimaryKeyCollision(_)));
        assert_eq!(fingerprint(&executor), before);
        let all = executor
            .read(|s| s.query(&ResourceQuery::all()).unwrap())
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn handler_error_propagates_and_rolls_back() {
        struct Refuse(ResourceType);

        impl ResourceHandler for Refuse {
            fn name(&self) -> &str {
                "refuse"
            }

            fn resource_type(&self) -> &ResourceType {
                &self.0
            }

            fn on_added(
                &self,
                _s: &HandlerServices<'_>,
                _c: &mut ChangesBatch,
                _r: &Resource,
            ) -> anyhow::Result<()> {
                anyhow::bail!("quota exceeded")
            }
        }

        let executor = executor(HandlerRegistry::new().with(Arc::new(Refuse(employee_type()))));
        let mut changes = ChangesBatch::new();
        changes.resource_add(employee("Alain"));
        let err = executor.execute(changes).unwrap_err();

        assert!(err.to_string().contains("quota exceeded"));
        assert!(err.to_string().contains("refuse"));
        assert_eq!(executor.read(|s| s.len()).unwrap(), 0);
    }

    #[test]
    fn concurrent_executes_are_serialized() {
        let executor = Arc::new(executor(HandlerRegistry::new()));
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let executor = Arc::clone(&executor);
                thread::spawn(move || {
                    for i in 0..10 {
                        let mut changes = ChangesBatch::new();
                        changes.resource_add(employee(&format!("w{}-{}", t, i)));
                        executor.execute(changes).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(executor.read(|s| s.len()).unwrap(), 40);
    }
}

// =============================================================================
// Refresh propagation and hooks
// =============================================================================

mod propagation {
    use super::*;

    #[test]
    fn delete_refreshes_transitive_chain() {
        let executor = executor(HandlerRegistry::new());
        let next = LinkType::new("NEXT").unwrap();

        let mut changes = ChangesBatch::new();
        for name in ["A", "B", "C", "D"] {
            changes.resource_add(employee(name));
        }
        changes.link_add(&employee("A"), next.clone(), &employee("B"));
        changes.link_add(&employee("B"), next.clone(), &employee("C"));
        changes.link_add(&employee("C"), next.clone(), &employee("D"));
        executor.execute(changes).unwrap();

        let ids: Vec<ResourceId> = ["A", "C", "D"]
            .iter()
            .map(|n| id_of(&executor, &employee(n)))
            .collect();
        let b = id_of(&executor, &employee("B"));

        let mut changes = ChangesBatch::new();
        changes.resource_delete(b);
        let summary = executor.execute(changes).unwrap();

        for id in ids {
            assert!(summary.refreshed.contains(&id), "{} not refreshed", id);
        }
    }

    #[test]
    fn identical_update_is_not_notified() {
        let recorder = Arc::new(UpdateRecorder::default());
        let executor = executor(HandlerRegistry::new()).with_hook(recorder.clone());

        let mut changes = ChangesBatch::new();
        changes.resource_add(employee("Alain").with_property("title", "ceo"));
        executor.execute(changes).unwrap();
        let alain = id_of(&executor, &employee("Alain"));

        let mut changes = ChangesBatch::new();
        changes.resource_update(alain, employee("Alain").with_property("title", "ceo"));
        let summary = executor.execute(changes).unwrap();
        assert!(!summary.changed());
        assert!(summary.refreshed.is_empty());
        assert!(recorder.0.lock().unwrap().is_empty());

        let mut changes = ChangesBatch::new();
        changes.resource_update(alain, employee("Alain").with_property("title", "chair"));
        executor.execute(changes).unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), vec![alain]);
    }

    #[test]
    fn audit_log_records_identity_and_outcome() {
        let audit = Arc::new(AuditLog::new().with_identity(UserIdentity::new("user", "ops")));
        let executor = executor(HandlerRegistry::new()).with_hook(audit.clone());

        let mut changes = ChangesBatch::new();
        changes.resource_add(employee("Alain"));
        executor.execute(changes).unwrap();

        let mut failing = ChangesBatch::new();
        failing.resource_add(employee("Alain"));
        executor.execute(failing).unwrap_err();

        let kinds: Vec<&str> = audit.entries().iter().map(|e| e.event.kind()).collect();
        assert_eq!(kinds, vec!["resource_added", "committed", "rolled_back"]);
        assert!(audit
            .entries()
            .iter()
            .all(|e| e.user.as_ref().map(|u| u.user_name.as_str()) == Some("ops")));
        assert!(matches!(
            audit.entries()[1].event,
            AuditEvent::Committed { mutations: 1 }
        ));
    }
}
