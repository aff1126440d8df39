//! Pass orchestration.
//!
//! One [`IncrementalOptimizer`] instance retains the class hierarchy, the
//! static-like namespace index, and the interface-type index across runs.
//! Each call to [`update`](IncrementalOptimizer::update) runs two phases:
//!
//! 1. **UPDATE PASS** — reconcile the retained state with the new linking
//!    unit: refresh ancestor lists, reconcile static-like namespaces, walk
//!    the hierarchy for deletions and changes, insert additions. Every
//!    mutation tags the methods registered against the mutated record.
//! 2. **PROCESS PASS** — drain the scheduled-method queue and re-optimize
//!    each method through the intra-method optimizer; hook calls made
//!    during optimization re-register the method's dependencies.
//!
//! The first run of an instance is *batch mode* (no root class established
//! yet): deletion bookkeeping is skipped and the caller tables are empty, so
//! no invalidation work happens at all.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use lattice_ir::{ClassName, LinkedClass, LinkingUnit, MemberNamespace, MethodName};

use crate::class::{add_class_subtree, ClassNode};
use crate::collops::Parallelism;
use crate::container::StaticsArray;
use crate::hooks::OptimizerCore;
use crate::interface::{InterfaceIndex, InterfaceType};
use crate::method::{MethodImpl, Shared};
use crate::{Config, Result};

/// Counters for the last completed (or failed) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub batch: bool,
    pub methods_scheduled: usize,
    pub methods_processed: usize,
    pub classes_added: usize,
    pub classes_removed: usize,
}

/// Read-only view of the orchestrator state handed to the update walks.
pub(crate) struct UpdateEnv<'a> {
    pub(crate) shared: &'a Arc<Shared>,
    pub(crate) new_classes: &'a FxHashMap<ClassName, &'a LinkedClass>,
    pub(crate) statics: &'a FxHashMap<ClassName, Arc<StaticsArray>>,
    pub(crate) interfaces: &'a InterfaceIndex,
}

impl UpdateEnv<'_> {
    pub(crate) fn static_like_method(
        &self,
        class: &ClassName,
        namespace: MemberNamespace,
        method: &MethodName,
    ) -> Option<Arc<MethodImpl>> {
        self.statics
            .get(class)
            .and_then(|statics| statics.namespace(namespace).get(method))
    }
}

pub struct IncrementalOptimizer {
    parallelism: Parallelism,
    core: Arc<dyn OptimizerCore>,
    shared: Arc<Shared>,
    classes: FxHashMap<ClassName, Arc<ClassNode>>,
    object_class: Option<Arc<ClassNode>>,
    statics: FxHashMap<ClassName, Arc<StaticsArray>>,
    interfaces: InterfaceIndex,
    last_stats: RunStats,
}

impl IncrementalOptimizer {
    pub fn new(config: Config, core: Arc<dyn OptimizerCore>) -> IncrementalOptimizer {
        IncrementalOptimizer {
            parallelism: Parallelism::from_config(config.parallel),
            core,
            shared: Shared::new(),
            classes: FxHashMap::default(),
            object_class: None,
            statics: FxHashMap::default(),
            interfaces: InterfaceIndex::new(),
            last_stats: RunStats::default(),
        }
    }

    /// Counters of the most recent run. After a failed run the process
    /// counter stays at zero.
    pub fn last_run_stats(&self) -> RunStats {
        self.last_stats
    }

    /// Optimize a linking unit, reusing every method optimization whose
    /// inputs did not change since the previous run.
    ///
    /// Not re-entrant; a failure in the intra-method optimizer propagates
    /// and leaves the substrate consistent, with the failed methods still
    /// scheduled for the next run.
    pub fn update(&mut self, unit: LinkingUnit) -> Result<LinkingUnit> {
        let batch = self.object_class.is_none();
        let span = tracing::info_span!("incremental_optimizer", batch);
        let _guard = span.enter();

        let mut stats = RunStats {
            batch,
            ..RunStats::default()
        };
        self.update_pass(&unit, &mut stats);
        stats.methods_scheduled = self.shared.pending();
        debug!(
            scheduled = stats.methods_scheduled,
            classes_added = stats.classes_added,
            classes_removed = stats.classes_removed,
            "update pass complete"
        );
        self.last_stats = stats;

        let processed = self.process_pass()?;
        self.last_stats.methods_processed = processed;
        debug!(optimized = processed, "process pass complete");

        Ok(self.rebuild(unit))
    }

    fn update_pass(&mut self, unit: &LinkingUnit, stats: &mut RunStats) {
        let batch = self.object_class.is_none();
        let new_classes: FxHashMap<ClassName, &LinkedClass> = unit
            .class_defs
            .iter()
            .map(|class| (class.encoded_name.clone(), class))
            .collect();

        // Refresh ancestor lists. The record tags its ancestor askers when
        // the list actually changed.
        for linked in &unit.class_defs {
            self.interfaces
                .get_or_create(&linked.encoded_name)
                .set_ancestors(linked.ancestors.clone());
        }

        // Static-like namespaces.
        if !batch {
            let dead: Vec<ClassName> = self
                .statics
                .keys()
                .filter(|name| !new_classes.contains_key(*name))
                .cloned()
                .collect();
            for name in dead {
                if let Some(statics) = self.statics.remove(&name) {
                    for container in statics.iter() {
                        container.delete_all();
                    }
                }
            }

            // Safe to run concurrently: the namespace arrays are distinct
            // instances and tagging is atomic on each method.
            let retained: Vec<(Arc<StaticsArray>, &LinkedClass, Arc<InterfaceType>)> = self
                .statics
                .iter()
                .map(|(name, statics)| {
                    (
                        Arc::clone(statics),
                        new_classes[name],
                        self.interfaces.get_or_create(name),
                    )
                })
                .collect();
            let shared = &self.shared;
            self.parallelism
                .for_each(retained, |(statics, linked, interface)| {
                    for container in statics.iter() {
                        let diff = container.update_with(linked, shared);
                        for method in diff.names() {
                            interface.tag_static_callers_of(container.namespace(), method);
                        }
                    }
                });
        }
        for linked in &unit.class_defs {
            if !self.statics.contains_key(&linked.encoded_name) {
                let statics = StaticsArray::new(&linked.encoded_name);
                let interface = self.interfaces.get_or_create(&linked.encoded_name);
                for container in statics.iter() {
                    let diff = container.update_with(linked, &self.shared);
                    for method in &diff.added {
                        interface.tag_static_callers_of(container.namespace(), method);
                    }
                }
                self.statics.insert(linked.encoded_name.clone(), statics);
            }
        }

        // Class deletions and retained-class changes.
        let mut removed: Vec<ClassName> = Vec::new();
        if !batch {
            let object = Arc::clone(
                self.object_class
                    .as_ref()
                    .expect("incremental mode without an established root"),
            );
            let object_ok = new_classes
                .get(object.name())
                .map_or(false, |lc| lc.kind.is_optimizer_class() && lc.super_class.is_none());
            assert!(
                object_ok,
                "the root class `{}` was deleted from the unit",
                object.name()
            );
            {
                let env = UpdateEnv {
                    shared: &self.shared,
                    new_classes: &new_classes,
                    statics: &self.statics,
                    interfaces: &self.interfaces,
                };
                object.walk_for_changes(&env, &FxHashSet::default(), &mut removed);
            }
            for name in &removed {
                self.classes.remove(name);
            }
            stats.classes_removed = removed.len();
        }

        // Class additions, grouped by immediate superclass.
        let added: Vec<&LinkedClass> = unit
            .class_defs
            .iter()
            .filter(|lc| {
                lc.kind.is_optimizer_class() && !self.classes.contains_key(&lc.encoded_name)
            })
            .collect();
        let expected = added.len();
        let mut roots: Vec<&LinkedClass> = Vec::new();
        let mut buckets: FxHashMap<ClassName, Vec<&LinkedClass>> = FxHashMap::default();
        for linked in added {
            match &linked.super_class {
                Some(parent) => buckets.entry(parent.clone()).or_default().push(linked),
                None => roots.push(linked),
            }
        }

        let created: Vec<Arc<ClassNode>> = {
            let env = UpdateEnv {
                shared: &self.shared,
                new_classes: &new_classes,
                statics: &self.statics,
                interfaces: &self.interfaces,
            };
            if batch {
                if expected == 0 {
                    Vec::new()
                } else {
                    assert_eq!(
                        roots.len(),
                        1,
                        "the first unit must contain exactly one class without a superclass"
                    );
                    let mut out = Vec::new();
                    add_class_subtree(&env, None, roots[0], &buckets, &mut out);
                    out
                }
            } else {
                assert!(
                    roots.is_empty(),
                    "a class without a superclass can only appear in the first unit"
                );
                // Parallel across distinct existing parents; children of
                // classes that are themselves new are reached by recursion.
                let groups: Vec<(Arc<ClassNode>, Vec<&LinkedClass>)> = buckets
                    .iter()
                    .filter_map(|(parent, children)| {
                        self.classes
                            .get(parent)
                            .map(|class| (Arc::clone(class), children.clone()))
                    })
                    .collect();
                self.parallelism.flat_map(groups, |(parent, children)| {
                    let mut out = Vec::new();
                    for linked in children {
                        add_class_subtree(&env, Some(&parent), linked, &buckets, &mut out);
                    }
                    out
                })
            }
        };
        assert_eq!(
            created.len(),
            expected,
            "some added classes name an unknown superclass"
        );
        for class in &created {
            if class.superclass().is_none() {
                self.object_class = Some(Arc::clone(class));
            }
            self.classes.insert(class.name().clone(), Arc::clone(class));
        }
        stats.classes_added = created.len();
    }

    fn process_pass(&mut self) -> Result<usize> {
        let scheduled = self.shared.drain();
        let count = scheduled.len();
        let parallelism = self.parallelism;
        let this: &IncrementalOptimizer = self;
        let result = parallelism.try_for_each(scheduled.clone(), |method| method.process(this));
        if let Err(error) = result {
            // Anything still tagged keeps its place in line for the next
            // run.
            let survivors: Vec<_> = scheduled
                .into_iter()
                .filter(|method| method.is_tagged() && !method.is_deleted())
                .collect();
            self.shared.requeue(survivors);
            return Err(error);
        }
        Ok(count)
    }

    /// Rebuild the unit with optimized method definitions substituted in.
    /// Public-instance methods of hierarchy classes come from the class
    /// container; everything else, including interface default methods,
    /// comes from the static-like slot.
    fn rebuild(&self, unit: LinkingUnit) -> LinkingUnit {
        let class_defs = unit
            .class_defs
            .iter()
            .map(|linked| {
                let methods = linked
                    .methods
                    .iter()
                    .map(|versioned| {
                        let def = &versioned.value;
                        let namespace = def.flags.namespace;
                        let method = if namespace == MemberNamespace::PublicInstance
                            && linked.kind.is_optimizer_class()
                        {
                            self.classes
                                .get(&linked.encoded_name)
                                .and_then(|class| class.own_method(&def.encoded_name))
                        } else {
                            self.statics.get(&linked.encoded_name).and_then(|statics| {
                                statics.namespace(namespace).get(&def.encoded_name)
                            })
                        };
                        let method = method.unwrap_or_else(|| {
                            panic!(
                                "method `{}.{}` missing from its container",
                                linked.encoded_name, def.encoded_name
                            )
                        });
                        method.optimized_def().unwrap_or_else(|| {
                            panic!(
                                "method `{}.{}` was never optimized",
                                linked.encoded_name, def.encoded_name
                            )
                        })
                    })
                    .collect();
                linked.optimized(methods)
            })
            .collect();
        LinkingUnit { class_defs, ..unit }
    }

    pub(crate) fn core(&self) -> &dyn OptimizerCore {
        &*self.core
    }

    pub(crate) fn class(&self, name: &ClassName) -> Option<Arc<ClassNode>> {
        self.classes.get(name).cloned()
    }

    pub(crate) fn interface(&self, name: &ClassName) -> Arc<InterfaceType> {
        self.interfaces.get_or_create(name)
    }

    pub(crate) fn static_like_method(
        &self,
        class: &ClassName,
        namespace: MemberNamespace,
        method: &MethodName,
    ) -> Option<Arc<MethodImpl>> {
        self.statics
            .get(class)
            .and_then(|statics| statics.namespace(namespace).get(method))
    }
}
