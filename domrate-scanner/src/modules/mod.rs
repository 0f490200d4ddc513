//! Module capability trait and the fixed registration table (§4.6).
//!
//! The module set is discovered from an explicit registration table rather
//! than filesystem/plugin scanning, per the design note in §9: the DAG is
//! known in full at startup.

mod builtin;

use domrate_common::errors::{DomRateError, ModuleError};
use domrate_common::persistence::Persistence;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Which statement a module's `queries` should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Create,
    Insert,
    Select,
}

/// Capability set every data-source module presents (§6).
///
/// `run` is synchronous: these are deterministic stand-ins with no real
/// network calls, so there is nothing to `.await`. The scheduler executes
/// each ready module on its own scoped thread (§5), so `Send + Sync` is
/// required but no `async_trait` machinery is needed.
pub trait Module: Send + Sync {
    /// Stable registration name, also used as the persistence record key.
    fn name(&self) -> &'static str;

    /// Monotone code version, reconciled against the stored version at
    /// startup.
    fn version(&self) -> u64;

    /// Names of modules this one depends on. Declared, not transitive.
    fn dependencies(&self) -> &'static [&'static str];

    /// Schema-shaped statements for `kind`, used at registry construction
    /// time (`Create`) and left available for a future read-back surface
    /// (`Insert`/`Select`). The shipped [`domrate_common::persistence::Persistence`]
    /// store is schemaless JSONL, so these are descriptive rather than
    /// executed against a real engine — logged at registration so the
    /// capability is still visibly exercised.
    fn queries(&self, kind: QueryKind) -> Vec<String>;

    /// Perform the module's work, idempotent under re-execution with the
    /// same `(request_id, domain)`. May record a [`domrate_common::types::ModuleRecord`]
    /// via `persistence.insert_module_record`.
    fn run(
        &self,
        persistence: &dyn Persistence,
        request_id: u64,
        domain: &str,
        attempt: u32,
    ) -> Result<(), ModuleError>;

    fn dependencies_set(&self) -> BTreeSet<String> {
        self.dependencies().iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Visited,
}

/// The fixed set of modules known at scanner startup, validated for
/// dependency soundness and version-reconciled against persistence.
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Build the registry from the 18 builtin modules, honoring `norun`.
    pub fn with_builtins(norun: &BTreeSet<String>) -> Result<Self, DomRateError> {
        Self::new(builtin::all(), norun)
    }

    /// Build and validate a registry from an explicit module set.
    ///
    /// Modules named in `norun` are never instantiated/registered; any
    /// *other* module that declares a dependency on an excluded name fails
    /// startup (§4.6: "fail if any dependency is in `norun`").
    pub fn new(
        candidates: Vec<Arc<dyn Module>>,
        norun: &BTreeSet<String>,
    ) -> Result<Self, DomRateError> {
        let mut modules = BTreeMap::new();
        for module in candidates {
            if norun.contains(module.name()) {
                debug!(module = module.name(), "module excluded by norun");
                continue;
            }
            for statement in module.queries(QueryKind::Create) {
                debug!(module = module.name(), statement = %statement, "module schema");
            }
            modules.insert(module.name().to_string(), module);
        }

        let registry = Self { modules };
        registry.validate_dependencies(norun)?;
        info!(count = registry.modules.len(), "module registry built");
        Ok(registry)
    }

    fn validate_dependencies(&self, norun: &BTreeSet<String>) -> Result<(), DomRateError> {
        let mut states: BTreeMap<String, VisitState> = BTreeMap::new();
        for name in self.modules.keys() {
            self.walk(name, norun, &mut states, &mut Vec::new())?;
        }
        Ok(())
    }

    /// DFS with a per-walk "currently on stack" set (§9 design note): two
    /// modules that both transitively depend on a third, unrelated module
    /// must not be mistaken for a cycle, which a single shared accumulator
    /// would do.
    fn walk(
        &self,
        name: &str,
        norun: &BTreeSet<String>,
        states: &mut BTreeMap<String, VisitState>,
        stack: &mut Vec<String>,
    ) -> Result<(), DomRateError> {
        match states.get(name) {
            Some(VisitState::Visited) => return Ok(()),
            Some(VisitState::Visiting) => {
                return Err(DomRateError::CyclicDependency {
                    module: name.to_string(),
                });
            }
            None => {}
        }

        states.insert(name.to_string(), VisitState::Visiting);
        stack.push(name.to_string());

        let module = self.modules.get(name).ok_or_else(|| DomRateError::UnknownModule {
            module: name.to_string(),
        })?;

        for dependency in module.dependencies() {
            if norun.contains(*dependency) {
                return Err(DomRateError::ExcludedDependency {
                    module: name.to_string(),
                    dependency: (*dependency).to_string(),
                });
            }
            if !self.modules.contains_key(*dependency) {
                return Err(DomRateError::UnknownDependency {
                    module: name.to_string(),
                    dependency: (*dependency).to_string(),
                });
            }
            self.walk(dependency, norun, states, stack)?;
        }

        stack.pop();
        states.insert(name.to_string(), VisitState::Visited);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn all_names(&self) -> BTreeSet<String> {
        self.modules.keys().cloned().collect()
    }

    /// Reconcile every registered module's stored version against its code
    /// version (§4.6): insert if absent, upgrade if stale, fatal if the
    /// stored version is ahead of the running code.
    pub fn reconcile_versions(&self, persistence: &dyn Persistence) -> Result<(), DomRateError> {
        for module in self.modules.values() {
            let code_version = module.version();
            let stored = persistence
                .get_module_version(module.name())
                .map_err(|e| DomRateError::Persistence { detail: e.to_string() })?;
            match stored {
                None => persistence
                    .set_module_version(module.name(), code_version)
                    .map_err(|e| DomRateError::Persistence { detail: e.to_string() })?,
                Some(stored) if stored < code_version => persistence
                    .set_module_version(module.name(), code_version)
                    .map_err(|e| DomRateError::Persistence { detail: e.to_string() })?,
                Some(stored) if stored > code_version => {
                    return Err(DomRateError::ModuleVersionRegressed {
                        module: module.name().to_string(),
                        stored,
                        code: code_version,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domrate_common::JsonlPersistence;

    struct Leaf(&'static str);
    impl Module for Leaf {
        fn name(&self) -> &'static str {
            self.0
        }
        fn version(&self) -> u64 {
            1
        }
        fn dependencies(&self) -> &'static [&'static str] {
            &[]
        }
        fn queries(&self, _kind: QueryKind) -> Vec<String> {
            vec![]
        }
        fn run(&self, _p: &dyn Persistence, _r: u64, _d: &str, _a: u32) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    struct DependsOn(&'static str, &'static [&'static str]);
    impl Module for DependsOn {
        fn name(&self) -> &'static str {
            self.0
        }
        fn version(&self) -> u64 {
            1
        }
        fn dependencies(&self) -> &'static [&'static str] {
            self.1
        }
        fn queries(&self, _kind: QueryKind) -> Vec<String> {
            vec![]
        }
        fn run(&self, _p: &dyn Persistence, _r: u64, _d: &str, _a: u32) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    #[test]
    fn diamond_shaped_dependencies_are_not_a_false_cycle() {
        // A and B both depend on C; neither depends on the other.
        let modules: Vec<Arc<dyn Module>> = vec![
            Arc::new(Leaf("C")),
            Arc::new(DependsOn("A", &["C"])),
            Arc::new(DependsOn("B", &["C"])),
        ];
        let registry = ModuleRegistry::new(modules, &BTreeSet::new()).unwrap();
        assert!(registry.contains("A"));
        assert!(registry.contains("B"));
        assert!(registry.contains("C"));
    }

    #[test]
    fn genuine_cycle_is_rejected() {
        let modules: Vec<Arc<dyn Module>> =
            vec![Arc::new(DependsOn("A", &["B"])), Arc::new(DependsOn("B", &["A"]))];
        let err = ModuleRegistry::new(modules, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, DomRateError::CyclicDependency { .. }));
    }

    #[test]
    fn dependency_on_norun_module_is_fatal() {
        let modules: Vec<Arc<dyn Module>> =
            vec![Arc::new(Leaf("Nmap")), Arc::new(DependsOn("A", &["Nmap"]))];
        let norun: BTreeSet<String> = BTreeSet::from(["Nmap".to_string()]);
        let err = ModuleRegistry::new(modules, &norun).unwrap_err();
        assert!(matches!(err, DomRateError::ExcludedDependency { .. }));
    }

    #[test]
    fn dependency_on_unknown_module_is_fatal() {
        let modules: Vec<Arc<dyn Module>> = vec![Arc::new(DependsOn("A", &["Ghost"]))];
        let err = ModuleRegistry::new(modules, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, DomRateError::UnknownDependency { .. }));
    }

    #[test]
    fn builtins_validate_cleanly_with_default_norun() {
        let norun: BTreeSet<String> =
            BTreeSet::from(["MXToolbox".to_string(), "Traceroute".to_string(), "Nmap".to_string()]);
        let registry = ModuleRegistry::with_builtins(&norun).unwrap();
        assert_eq!(registry.all_names().len(), 15);
        assert!(!registry.contains("Nmap"));
    }

    mod dag_proptests {
        use super::*;
        use proptest::prelude::*;

        fn leak_str(s: String) -> &'static str {
            Box::leak(s.into_boxed_str())
        }

        struct Node {
            name: &'static str,
            deps: &'static [&'static str],
        }
        impl Module for Node {
            fn name(&self) -> &'static str {
                self.name
            }
            fn version(&self) -> u64 {
                1
            }
            fn dependencies(&self) -> &'static [&'static str] {
                self.deps
            }
            fn queries(&self, _kind: QueryKind) -> Vec<String> {
                vec![]
            }
            fn run(&self, _p: &dyn Persistence, _r: u64, _d: &str, _a: u32) -> Result<(), ModuleError> {
                Ok(())
            }
        }

        /// Build `count` nodes named `M0..Mcount`, where node `i`'s
        /// dependency bitmask is restricted to bits `0..i` — so the graph is
        /// acyclic by construction no matter how dense the mask is, letting
        /// the bitmask alone decide the shape (diamond, wide fanout, deep
        /// chain) without ever producing a genuine cycle.
        fn build_acyclic(count: usize, masks: &[u32]) -> Vec<Arc<dyn Module>> {
            let names: Vec<&'static str> = (0..count).map(|i| leak_str(format!("M{i}"))).collect();
            (0..count)
                .map(|i| {
                    let lower_bits = if i == 0 { 0 } else { masks[i] & ((1u32 << i) - 1) };
                    let deps: Vec<&'static str> =
                        (0..i).filter(|j| lower_bits & (1 << j) != 0).map(|j| names[j]).collect();
                    let deps: &'static [&'static str] = Box::leak(deps.into_boxed_slice());
                    Arc::new(Node { name: names[i], deps }) as Arc<dyn Module>
                })
                .collect()
        }

        proptest! {
            #[test]
            fn acyclic_graphs_of_any_shape_always_validate(
                count in 2usize..9,
                masks in prop::collection::vec(any::<u32>(), 9),
            ) {
                let modules = build_acyclic(count, &masks);
                let registry = ModuleRegistry::new(modules, &BTreeSet::new());
                prop_assert!(registry.is_ok());
            }

            #[test]
            fn adding_a_back_edge_to_an_acyclic_graph_is_always_rejected(
                count in 3usize..9,
                masks in prop::collection::vec(any::<u32>(), 9),
            ) {
                let mut modules = build_acyclic(count, &masks);
                // Force a back edge from the last node to the first,
                // guaranteeing at least one cycle regardless of the
                // forward edges the bitmasks produced.
                let last = modules.pop().unwrap();
                let name = last.name();
                let mut deps: Vec<&'static str> = last.dependencies().to_vec();
                deps.push("M0");
                let deps: &'static [&'static str] = Box::leak(deps.into_boxed_slice());
                modules.push(Arc::new(Node { name, deps }));
                // Give M0 a dependency back on the last node to close the cycle.
                let first = modules.remove(0);
                let cyclic_dep: &'static str = leak_str(format!("M{}", count - 1));
                let mut first_deps: Vec<&'static str> = first.dependencies().to_vec();
                first_deps.push(cyclic_dep);
                let first_deps: &'static [&'static str] = Box::leak(first_deps.into_boxed_slice());
                modules.insert(0, Arc::new(Node { name: first.name(), deps: first_deps }));

                let err = ModuleRegistry::new(modules, &BTreeSet::new()).unwrap_err();
                prop_assert!(matches!(err, DomRateError::CyclicDependency { .. }));
            }
        }
    }

    #[test]
    fn version_reconciliation_inserts_then_upgrades_then_rejects_regression() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonlPersistence::open(dir.path().join("journal.jsonl")).unwrap();
        let modules: Vec<Arc<dyn Module>> = vec![Arc::new(Leaf("ASN"))];
        let registry = ModuleRegistry::new(modules, &BTreeSet::new()).unwrap();

        registry.reconcile_versions(&persistence).unwrap();
        assert_eq!(persistence.get_module_version("ASN").unwrap(), Some(1));

        persistence.set_module_version("ASN", 5).unwrap();
        let err = registry.reconcile_versions(&persistence).unwrap_err();
        assert!(matches!(err, DomRateError::ModuleVersionRegressed { .. }));
    }
}
