//! Interface-type records and the caller-dependency tables.
//!
//! One record exists per linked class or interface encoded name. The record
//! is the single source of truth for bidirectional subscriptions: methods
//! register here while they optimize (PROCESS PASS), and the update walks
//! tag registered methods here when the record mutates (UPDATE PASS). The
//! two phases never overlap, but every table is lock-protected so that
//! registrations from concurrently optimizing methods stay safe.
//!
//! Caller sets hold weak method handles keyed by the method's id, so a
//! tagged method can remove itself in O(1) per record and the sets never
//! extend a deleted method's lifetime.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use lattice_ir::{ClassName, MemberNamespace, MethodName};

use crate::class::ClassNode;
use crate::method::{DepKey, Dependency, MethodImpl};

pub(crate) struct InterfaceType {
    name: ClassName,
    me: Weak<InterfaceType>,
    /// Self plus transitive supers and superinterfaces, refreshed first
    /// thing every UPDATE PASS.
    ancestors: RwLock<Vec<ClassName>>,
    instantiated_subclasses: Mutex<FxHashMap<ClassName, Weak<ClassNode>>>,
    ancestor_askers: Mutex<FxHashMap<u64, Weak<MethodImpl>>>,
    dynamic_callers: Mutex<FxHashMap<MethodName, FxHashMap<u64, Weak<MethodImpl>>>>,
    static_callers: Mutex<FxHashMap<(MemberNamespace, MethodName), FxHashMap<u64, Weak<MethodImpl>>>>,
}

impl InterfaceType {
    pub(crate) fn new(name: ClassName) -> Arc<InterfaceType> {
        Arc::new_cyclic(|me| InterfaceType {
            name,
            me: me.clone(),
            ancestors: RwLock::new(Vec::new()),
            instantiated_subclasses: Mutex::new(FxHashMap::default()),
            ancestor_askers: Mutex::new(FxHashMap::default()),
            dynamic_callers: Mutex::new(FxHashMap::default()),
            static_callers: Mutex::new(FxHashMap::default()),
        })
    }

    fn arc(&self) -> Arc<InterfaceType> {
        self.me.upgrade().expect("interface record outlived its index")
    }

    pub(crate) fn ancestors(&self) -> Vec<ClassName> {
        self.ancestors.read().clone()
    }

    /// Overwrite the ancestor list. Methods that asked for the previous
    /// list are tagged iff the list actually changed.
    pub(crate) fn set_ancestors(&self, ancestors: Vec<ClassName>) {
        let changed = {
            let mut current = self.ancestors.write();
            if *current != ancestors {
                *current = ancestors;
                true
            } else {
                false
            }
        };
        if changed {
            self.tag_ancestor_askers();
        }
    }

    pub(crate) fn add_instantiated_subclass(&self, class: &Arc<ClassNode>) {
        self.instantiated_subclasses
            .lock()
            .insert(class.name().clone(), Arc::downgrade(class));
    }

    pub(crate) fn remove_instantiated_subclass(&self, name: &ClassName) {
        self.instantiated_subclasses.lock().remove(name);
    }

    pub(crate) fn instantiated_subclasses(&self) -> Vec<Arc<ClassNode>> {
        self.instantiated_subclasses
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn register_ancestor_asker(&self, asker: &MethodImpl) {
        self.ancestor_askers.lock().insert(asker.id(), asker.weak());
        asker.record_dependency(
            DepKey::Interface(self.name.clone()),
            Dependency::Interface(self.arc()),
        );
    }

    pub(crate) fn register_dynamic_caller(&self, method: &MethodName, caller: &MethodImpl) {
        self.dynamic_callers
            .lock()
            .entry(method.clone())
            .or_default()
            .insert(caller.id(), caller.weak());
        caller.record_dependency(
            DepKey::Interface(self.name.clone()),
            Dependency::Interface(self.arc()),
        );
    }

    pub(crate) fn register_static_caller(
        &self,
        namespace: MemberNamespace,
        method: &MethodName,
        caller: &MethodImpl,
    ) {
        self.static_callers
            .lock()
            .entry((namespace, method.clone()))
            .or_default()
            .insert(caller.id(), caller.weak());
        caller.record_dependency(
            DepKey::Interface(self.name.clone()),
            Dependency::Interface(self.arc()),
        );
    }

    pub(crate) fn tag_ancestor_askers(&self) {
        let askers = std::mem::take(&mut *self.ancestor_askers.lock());
        tag_all(askers);
    }

    pub(crate) fn tag_dynamic_callers_of(&self, method: &MethodName) {
        let callers = self.dynamic_callers.lock().remove(method);
        if let Some(callers) = callers {
            tag_all(callers);
        }
    }

    pub(crate) fn tag_static_callers_of(&self, namespace: MemberNamespace, method: &MethodName) {
        let callers = self
            .static_callers
            .lock()
            .remove(&(namespace, method.clone()));
        if let Some(callers) = callers {
            tag_all(callers);
        }
    }

    /// Remove a method from every table of this record. Called exactly once
    /// per registered method, from its tag/delete sweep.
    pub(crate) fn unregister_dependee(&self, id: u64) {
        self.ancestor_askers.lock().remove(&id);
        for callers in self.dynamic_callers.lock().values_mut() {
            callers.remove(&id);
        }
        for callers in self.static_callers.lock().values_mut() {
            callers.remove(&id);
        }
    }

    #[cfg(test)]
    pub(crate) fn has_dynamic_caller(&self, method: &MethodName, id: u64) -> bool {
        self.dynamic_callers
            .lock()
            .get(method)
            .is_some_and(|set| set.contains_key(&id))
    }

    #[cfg(test)]
    pub(crate) fn has_static_caller(
        &self,
        namespace: MemberNamespace,
        method: &MethodName,
        id: u64,
    ) -> bool {
        self.static_callers
            .lock()
            .get(&(namespace, method.clone()))
            .is_some_and(|set| set.contains_key(&id))
    }

    #[cfg(test)]
    pub(crate) fn has_instantiated_subclass(&self, name: &ClassName) -> bool {
        self.instantiated_subclasses.lock().contains_key(name)
    }
}

/// The tables are detached before tagging so a tagged method's unregister
/// sweep never re-enters a held lock.
fn tag_all(callers: FxHashMap<u64, Weak<MethodImpl>>) {
    for weak in callers.into_values() {
        if let Some(method) = weak.upgrade() {
            method.tag();
        }
    }
}

/// The interface-type index: one concurrently accessible record per encoded
/// name. Records are created on demand and persist for the lifetime of the
/// optimizer, even across deletion of the class they describe.
pub(crate) struct InterfaceIndex {
    map: RwLock<FxHashMap<ClassName, Arc<InterfaceType>>>,
}

impl InterfaceIndex {
    pub(crate) fn new() -> InterfaceIndex {
        InterfaceIndex {
            map: RwLock::new(FxHashMap::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &ClassName) -> Option<Arc<InterfaceType>> {
        self.map.read().get(name).cloned()
    }

    pub(crate) fn get_or_create(&self, name: &ClassName) -> Arc<InterfaceType> {
        if let Some(interface) = self.map.read().get(name) {
            return Arc::clone(interface);
        }
        Arc::clone(
            self.map
                .write()
                .entry(name.clone())
                .or_insert_with(|| InterfaceType::new(name.clone())),
        )
    }
}
