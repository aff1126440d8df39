//! The instantiable class hierarchy.
//!
//! Classes (never interfaces) form a single tree rooted at the `Object`
//! class, linked by immediate-superclass edges. Each node owns the
//! public-instance method container for its class; everything else lives in
//! the static-like namespaces owned by the orchestrator.
//!
//! The walks in this module implement the incremental part of a run: they
//! reconcile retained nodes with the new linking unit, tag every method
//! whose optimization may have been invalidated, delete subtrees that no
//! longer exist (or whose superclass changed), and insert additions under
//! their parents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use lattice_ir::names::{NO_ARG_CTOR, PREDEF_MODULE_CLASS};
use lattice_ir::{
    ClassName, FieldDef, LinkedClass, MemberNamespace, MethodName, RecordField, RecordType,
    RecordValue, Tree,
};

use crate::container::MethodContainer;
use crate::incremental::UpdateEnv;
use crate::interface::InterfaceType;
use crate::method::MethodImpl;

pub(crate) struct ClassNode {
    name: ClassName,
    me: Weak<ClassNode>,
    superclass: Option<Arc<ClassNode>>,
    /// Strict ancestors, nearest first (superclass .. root).
    ancestor_chain: SmallVec<[Arc<ClassNode>; 8]>,
    subclasses: Mutex<Vec<Arc<ClassNode>>>,
    /// Interface records for the flat ancestor set, including self.
    interfaces: Mutex<FxHashMap<ClassName, Arc<InterfaceType>>>,
    is_instantiated: AtomicBool,
    is_module_class: AtomicBool,
    has_elidable_module_accessor: AtomicBool,
    is_inlineable: AtomicBool,
    fields: Mutex<Vec<FieldDef>>,
    try_new_inlineable: Mutex<Option<RecordValue>>,
    /// Public-instance methods; all other namespaces are static-like.
    methods: MethodContainer,
}

impl ClassNode {
    pub(crate) fn new(name: ClassName, superclass: Option<Arc<ClassNode>>) -> Arc<ClassNode> {
        let ancestor_chain: SmallVec<[Arc<ClassNode>; 8]> = match &superclass {
            Some(parent) => {
                let mut chain = SmallVec::with_capacity(parent.ancestor_chain.len() + 1);
                chain.push(Arc::clone(parent));
                chain.extend(parent.ancestor_chain.iter().cloned());
                chain
            }
            None => SmallVec::new(),
        };
        Arc::new_cyclic(|me| ClassNode {
            methods: MethodContainer::new_class_methods(name.clone()),
            name,
            me: me.clone(),
            superclass,
            ancestor_chain,
            subclasses: Mutex::new(Vec::new()),
            interfaces: Mutex::new(FxHashMap::default()),
            is_instantiated: AtomicBool::new(false),
            is_module_class: AtomicBool::new(false),
            has_elidable_module_accessor: AtomicBool::new(false),
            is_inlineable: AtomicBool::new(false),
            fields: Mutex::new(Vec::new()),
            try_new_inlineable: Mutex::new(None),
        })
    }

    pub(crate) fn name(&self) -> &ClassName {
        &self.name
    }

    pub(crate) fn superclass(&self) -> Option<&Arc<ClassNode>> {
        self.superclass.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn is_instantiated(&self) -> bool {
        self.is_instantiated.load(Ordering::Relaxed)
    }

    pub(crate) fn has_elidable_module_accessor(&self) -> bool {
        self.has_elidable_module_accessor.load(Ordering::Relaxed)
    }

    pub(crate) fn try_new_inlineable(&self) -> Option<RecordValue> {
        self.try_new_inlineable.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn subclasses(&self) -> Vec<Arc<ClassNode>> {
        self.subclasses.lock().clone()
    }

    fn arc(&self) -> Arc<ClassNode> {
        self.me.upgrade().expect("class node outlived its table")
    }

    /// Method this class declares itself, without walking the chain.
    pub(crate) fn own_method(&self, name: &MethodName) -> Option<Arc<MethodImpl>> {
        self.methods.get(name)
    }

    /// Resolve a publicly dispatched method on this class, walking up the
    /// superclass chain.
    pub(crate) fn lookup_method(&self, name: &MethodName) -> Option<Arc<MethodImpl>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method);
        }
        self.ancestor_chain
            .iter()
            .find_map(|class| class.methods.get(name))
    }

    /// Merged method map of the whole chain, parent methods overridden by
    /// child ones. Deliberately uncached: consulted only on
    /// instantiation-state transitions.
    pub(crate) fn all_methods(&self) -> FxHashMap<MethodName, Arc<MethodImpl>> {
        let mut out = FxHashMap::default();
        for class in self.ancestor_chain.iter().rev() {
            class.methods.collect_into(&mut out);
        }
        self.methods.collect_into(&mut out);
        out
    }

    fn all_method_names(&self) -> Vec<MethodName> {
        self.all_methods().into_keys().collect()
    }

    /// The parent chain root to leaf, ending with this class.
    fn reverse_chain_with_self(&self) -> impl Iterator<Item = &ClassNode> + '_ {
        self.ancestor_chain
            .iter()
            .rev()
            .map(|class| &**class)
            .chain(std::iter::once(self))
    }

    /// Process the change set of a retained class, then recurse into the
    /// subclass tree, deleting subtrees that did not survive.
    pub(crate) fn walk_for_changes(
        &self,
        env: &UpdateEnv<'_>,
        parent_changes: &FxHashSet<MethodName>,
        removed: &mut Vec<ClassName>,
    ) {
        let linked = env.new_classes[&self.name];

        let diff = self.methods.update_with(linked, env.shared);
        self.is_module_class
            .store(linked.kind.is_module_class(), Ordering::Relaxed);
        *self.fields.lock() = linked.fields.clone();

        // A child inherits every parent-level attribute change except the
        // names it overrides locally, plus every change at this level.
        let mut changes: FxHashSet<MethodName> = parent_changes
            .iter()
            .filter(|&name| !self.methods.contains(name))
            .cloned()
            .collect();
        changes.extend(diff.names().cloned());

        let old_interfaces = std::mem::take(&mut *self.interfaces.lock());
        let new_interfaces: FxHashMap<ClassName, Arc<InterfaceType>> = linked
            .ancestors
            .iter()
            .map(|ancestor| (ancestor.clone(), env.interfaces.get_or_create(ancestor)))
            .collect();
        *self.interfaces.lock() = new_interfaces.clone();

        let was = self.is_instantiated.load(Ordering::Relaxed);
        let now = linked.has_instances;
        assert!(
            !(was && !now),
            "class `{}` lost its instances outside the deletion pass",
            self.name
        );
        self.is_instantiated.store(now, Ordering::Relaxed);

        if !was && now {
            let me = self.arc();
            let all_names = self.all_method_names();
            for interface in new_interfaces.values() {
                interface.add_instantiated_subclass(&me);
                for name in &all_names {
                    interface.tag_dynamic_callers_of(name);
                }
            }
        } else if was && now {
            if same_keys(&old_interfaces, &new_interfaces) {
                for interface in new_interfaces.values() {
                    for name in &changes {
                        interface.tag_dynamic_callers_of(name);
                    }
                }
            } else {
                let me = self.arc();
                let all_names = self.all_method_names();
                for (key, interface) in &old_interfaces {
                    if !new_interfaces.contains_key(key) {
                        interface.remove_instantiated_subclass(&self.name);
                        for name in &all_names {
                            interface.tag_dynamic_callers_of(name);
                        }
                    }
                }
                for (key, interface) in &new_interfaces {
                    if !old_interfaces.contains_key(key) {
                        interface.add_instantiated_subclass(&me);
                        for name in &all_names {
                            interface.tag_dynamic_callers_of(name);
                        }
                    } else {
                        for name in &changes {
                            interface.tag_dynamic_callers_of(name);
                        }
                    }
                }
            }
        }

        let my_interface = env.interfaces.get_or_create(&self.name);
        for name in &changes {
            my_interface.tag_static_callers_of(MemberNamespace::PublicInstance, name);
        }

        self.update_module_accessor_elidability(env);
        self.update_record_inlineability(env, linked);

        let children = std::mem::take(&mut *self.subclasses.lock());
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            let survives = env.new_classes.get(child.name()).is_some_and(|lc| {
                lc.kind.is_optimizer_class() && lc.super_class.as_ref() == Some(&self.name)
            });
            if survives {
                child.walk_for_changes(env, &changes, removed);
                kept.push(child);
            } else {
                child.delete_subtree(removed);
            }
        }
        *self.subclasses.lock() = kept;
    }

    /// First-time setup of a freshly inserted class.
    fn setup(&self, env: &UpdateEnv<'_>, linked: &LinkedClass) {
        let diff = self.methods.update_with(linked, env.shared);
        self.is_module_class
            .store(linked.kind.is_module_class(), Ordering::Relaxed);
        *self.fields.lock() = linked.fields.clone();

        let interfaces: FxHashMap<ClassName, Arc<InterfaceType>> = linked
            .ancestors
            .iter()
            .map(|ancestor| (ancestor.clone(), env.interfaces.get_or_create(ancestor)))
            .collect();

        if linked.has_instances {
            self.is_instantiated.store(true, Ordering::Relaxed);
            let me = self.arc();
            let all_names = self.all_method_names();
            for interface in interfaces.values() {
                interface.add_instantiated_subclass(&me);
                for name in &all_names {
                    interface.tag_dynamic_callers_of(name);
                }
            }
        }
        *self.interfaces.lock() = interfaces;

        // Interface records persist across runs, so callers may already be
        // registered against names that previously resolved to nothing.
        let my_interface = env.interfaces.get_or_create(&self.name);
        for name in &diff.added {
            my_interface.tag_static_callers_of(MemberNamespace::PublicInstance, name);
        }

        self.update_module_accessor_elidability(env);
        self.update_record_inlineability(env, linked);
    }

    /// Delete this class and every transitive subclass: mark their methods
    /// deleted, run the no-longer-instantiated bookkeeping, and clear the
    /// downward links so the detached nodes can be freed.
    pub(crate) fn delete_subtree(&self, removed: &mut Vec<ClassName>) {
        let was_instantiated = self.is_instantiated.swap(false, Ordering::Relaxed);
        let all_names = if was_instantiated {
            self.all_method_names()
        } else {
            Vec::new()
        };

        let children = std::mem::take(&mut *self.subclasses.lock());
        for child in children {
            child.delete_subtree(removed);
        }

        self.methods.delete_all();

        let interfaces = std::mem::take(&mut *self.interfaces.lock());
        if was_instantiated {
            for interface in interfaces.values() {
                interface.remove_instantiated_subclass(&self.name);
                for name in &all_names {
                    interface.tag_dynamic_callers_of(name);
                }
            }
        }

        removed.push(self.name.clone());
    }

    fn update_module_accessor_elidability(&self, env: &UpdateEnv<'_>) {
        let elidable = self.name.as_str() == PREDEF_MODULE_CLASS
            || (self.is_module_class.load(Ordering::Relaxed) && {
                let ctor = MethodName::from(NO_ARG_CTOR);
                env.static_like_method(&self.name, MemberNamespace::Constructor, &ctor)
                    .is_some_and(|method| is_elidable_constructor(env, &method))
            });
        self.has_elidable_module_accessor
            .store(elidable, Ordering::Relaxed);
    }

    fn update_record_inlineability(&self, env: &UpdateEnv<'_>, linked: &LinkedClass) {
        let inlineable = linked.optimizer_hints.inline;
        self.is_inlineable.store(inlineable, Ordering::Relaxed);

        let new_value = inlineable.then(|| {
            // Non-static fields of the whole parent chain, root to leaf,
            // each at its type's zero value.
            let mut fields = Vec::new();
            let mut elems = Vec::new();
            for class in self.reverse_chain_with_self() {
                for field in class.fields.lock().iter().filter(|f| !f.is_static) {
                    fields.push(RecordField {
                        name: field.name.clone(),
                        tpe: field.tpe.clone(),
                    });
                    elems.push(field.tpe.zero_value());
                }
            }
            RecordValue {
                tpe: RecordType { fields },
                elems,
            }
        });

        let changed = {
            let mut current = self.try_new_inlineable.lock();
            if *current != new_value {
                *current = new_value;
                true
            } else {
                false
            }
        };
        if changed {
            if let Some(statics) = env.statics.get(&self.name) {
                let my_interface = env.interfaces.get_or_create(&self.name);
                for ctor in statics.namespace(MemberNamespace::Constructor).method_names() {
                    my_interface.tag_static_callers_of(MemberNamespace::Constructor, &ctor);
                }
            }
        }
    }
}

fn same_keys(
    a: &FxHashMap<ClassName, Arc<InterfaceType>>,
    b: &FxHashMap<ClassName, Arc<InterfaceType>>,
) -> bool {
    a.len() == b.len() && a.keys().all(|key| b.contains_key(key))
}

/// Insert a new class under `parent` (absent only for the `Object` root in
/// batch mode), then recurse into the addition buckets keyed by superclass
/// name. Created nodes are accumulated for registration by the caller.
pub(crate) fn add_class_subtree(
    env: &UpdateEnv<'_>,
    parent: Option<&Arc<ClassNode>>,
    linked: &LinkedClass,
    buckets: &FxHashMap<ClassName, Vec<&LinkedClass>>,
    out: &mut Vec<Arc<ClassNode>>,
) {
    let class = ClassNode::new(linked.encoded_name.clone(), parent.cloned());
    if let Some(parent) = parent {
        parent.subclasses.lock().push(Arc::clone(&class));
    }
    class.setup(env, linked);
    out.push(Arc::clone(&class));
    if let Some(children) = buckets.get(&linked.encoded_name) {
        for child in children {
            add_class_subtree(env, Some(&class), child, buckets, out);
        }
    }
}

fn is_elidable_constructor(env: &UpdateEnv<'_>, method: &MethodImpl) -> bool {
    match method.original_def() {
        Some(def) => def
            .body
            .as_ref()
            .map_or(false, |body| is_elidable_stat(env, body)),
        None => false,
    }
}

fn is_elidable_stat(env: &UpdateEnv<'_>, tree: &Tree) -> bool {
    match tree {
        Tree::Block(stats) => stats.iter().all(|stat| is_elidable_stat(env, stat)),
        Tree::Assign { lhs, rhs } => {
            matches!(&**lhs, Tree::Select { qualifier, .. } if qualifier.is_this())
                && rhs.is_trivially_side_effect_free()
        }
        Tree::StoreModule { .. } => true,
        // Delegation to a super- or same-class constructor that is itself
        // elidable.
        Tree::ApplyStatically {
            receiver,
            class,
            namespace,
            method,
            args,
        } if receiver.is_this()
            && namespace.is_constructor()
            && args.iter().all(Tree::is_trivially_side_effect_free) =>
        {
            env.static_like_method(class, MemberNamespace::Constructor, method)
                .is_some_and(|target| is_elidable_constructor(env, &target))
        }
        // Mixin constructor whose original body is `Skip`.
        Tree::ApplyStatic {
            class,
            namespace,
            method,
            args,
        } if args.iter().all(Tree::is_trivially_side_effect_free) => env
            .static_like_method(class, *namespace, method)
            .and_then(|target| target.original_def())
            .is_some_and(|def| matches!(def.body, Some(Tree::Skip))),
        _ => tree.is_trivially_side_effect_free(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Shared;
    use lattice_ir::{
        hash_method_def, ClassKind, MethodDef, MethodFlags, OptimizerHints, Type, Versioned,
    };

    fn method(name: &str, body: Tree) -> Versioned<MethodDef> {
        let mut def = MethodDef {
            encoded_name: MethodName::from(name),
            flags: MethodFlags::new(MemberNamespace::PublicInstance),
            params: Vec::new(),
            result_type: Type::Unit,
            body: Some(body),
            optimizer_hints: OptimizerHints::default(),
            hash: None,
        };
        def.hash = Some(hash_method_def(&def));
        Versioned::unversioned(def)
    }

    fn linked(name: &str, superclass: Option<&str>, methods: Vec<Versioned<MethodDef>>) -> LinkedClass {
        LinkedClass {
            encoded_name: ClassName::from(name),
            kind: ClassKind::Class,
            super_class: superclass.map(ClassName::from),
            ancestors: Vec::new(),
            has_instances: true,
            fields: Vec::new(),
            methods,
            optimizer_hints: OptimizerHints::default(),
        }
    }

    fn with_methods(class: &Arc<ClassNode>, linked: &LinkedClass) {
        let shared = Shared::new();
        class.methods.update_with(linked, &shared);
    }

    #[test]
    fn lookup_walks_the_parent_chain() {
        let root = ClassNode::new(ClassName::from("O"), None);
        let a = ClassNode::new(ClassName::from("A"), Some(Arc::clone(&root)));
        let b = ClassNode::new(ClassName::from("B"), Some(Arc::clone(&a)));

        with_methods(&a, &linked("A", Some("O"), vec![method("m__V", Tree::Skip)]));

        let m = MethodName::from("m__V");
        let found = b.lookup_method(&m).expect("inherited method");
        assert_eq!(found.owner(), &ClassName::from("A"));
        assert!(root.lookup_method(&m).is_none());
    }

    #[test]
    fn all_methods_prefers_overrides() {
        let root = ClassNode::new(ClassName::from("O"), None);
        let a = ClassNode::new(ClassName::from("A"), Some(Arc::clone(&root)));
        let b = ClassNode::new(ClassName::from("B"), Some(Arc::clone(&a)));

        with_methods(&a, &linked("A", Some("O"), vec![method("m__V", Tree::Skip)]));
        with_methods(
            &b,
            &linked("B", Some("A"), vec![method("m__V", Tree::This)]),
        );

        let merged = b.all_methods();
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[&MethodName::from("m__V")].owner(),
            &ClassName::from("B")
        );
    }
}
