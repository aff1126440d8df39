//! Method containers.
//!
//! Two kinds of container own methods: a `ClassNode` owns the publicly
//! dispatchable instance methods of a hierarchy class, and a static-like
//! namespace owns everything else (constructors, statics, private instance
//! members, and — for interfaces — the public-instance default methods).
//! Both share the reconcile/lookup surface defined here.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use lattice_ir::{ClassName, LinkedClass, MemberNamespace, MethodName};

use crate::method::{MethodImpl, Shared};

/// Per-name outcome of reconciling a container with a linked class.
#[derive(Debug, Default)]
pub(crate) struct ContainerDiff {
    pub(crate) added: Vec<MethodName>,
    pub(crate) changed: Vec<MethodName>,
    pub(crate) deleted: Vec<MethodName>,
}

impl ContainerDiff {
    /// All names whose resolution may have changed.
    pub(crate) fn names(&self) -> impl Iterator<Item = &MethodName> {
        self.added
            .iter()
            .chain(self.changed.iter())
            .chain(self.deleted.iter())
    }
}

pub(crate) struct MethodContainer {
    owner: ClassName,
    namespace: MemberNamespace,
    static_like: bool,
    methods: Mutex<FxHashMap<MethodName, Arc<MethodImpl>>>,
}

impl MethodContainer {
    pub(crate) fn new_class_methods(owner: ClassName) -> MethodContainer {
        MethodContainer {
            owner,
            namespace: MemberNamespace::PublicInstance,
            static_like: false,
            methods: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn new_static_like(owner: ClassName, namespace: MemberNamespace) -> MethodContainer {
        MethodContainer {
            owner,
            namespace,
            static_like: true,
            methods: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn namespace(&self) -> MemberNamespace {
        self.namespace
    }

    /// Reconcile with the methods the linked class declares in this
    /// container's namespace.
    pub(crate) fn update_with(&self, linked: &LinkedClass, shared: &Arc<Shared>) -> ContainerDiff {
        // Public-instance methods of hierarchy classes are owned by the
        // `ClassNode`; the static-like slot exists only so ordinal indexing
        // stays dense.
        let accepts = !(self.static_like
            && self.namespace == MemberNamespace::PublicInstance
            && linked.kind.is_optimizer_class());

        let mut diff = ContainerDiff::default();
        let mut seen: FxHashSet<MethodName> = FxHashSet::default();
        let mut methods = self.methods.lock();

        if accepts {
            for versioned in &linked.methods {
                let def = &versioned.value;
                if def.flags.namespace != self.namespace {
                    continue;
                }
                let name = &def.encoded_name;
                seen.insert(name.clone());
                match methods.get(name) {
                    None => {
                        let method = MethodImpl::new(
                            shared,
                            self.owner.clone(),
                            self.namespace,
                            name.clone(),
                        );
                        method.update_with(versioned);
                        methods.insert(name.clone(), method);
                        diff.added.push(name.clone());
                    }
                    Some(method) => {
                        if method.update_with(versioned) {
                            diff.changed.push(name.clone());
                        }
                    }
                }
            }
        }

        methods.retain(|name, method| {
            if seen.contains(name) {
                true
            } else {
                method.delete();
                diff.deleted.push(name.clone());
                false
            }
        });

        if !accepts {
            debug_assert!(methods.is_empty());
        }

        diff
    }

    pub(crate) fn get(&self, name: &MethodName) -> Option<Arc<MethodImpl>> {
        self.methods.lock().get(name).cloned()
    }

    pub(crate) fn contains(&self, name: &MethodName) -> bool {
        self.methods.lock().contains_key(name)
    }

    pub(crate) fn method_names(&self) -> Vec<MethodName> {
        self.methods.lock().keys().cloned().collect()
    }

    pub(crate) fn collect_into(&self, out: &mut FxHashMap<MethodName, Arc<MethodImpl>>) {
        for (name, method) in self.methods.lock().iter() {
            out.insert(name.clone(), Arc::clone(method));
        }
    }

    /// Mark every method deleted and drop them from the container.
    pub(crate) fn delete_all(&self) {
        let methods = std::mem::take(&mut *self.methods.lock());
        for method in methods.values() {
            method.delete();
        }
    }
}

/// The dense array of static-like namespaces allocated for every linked
/// encoded name, indexed by namespace ordinal.
pub(crate) struct StaticsArray {
    namespaces: [MethodContainer; MemberNamespace::COUNT],
}

impl StaticsArray {
    pub(crate) fn new(owner: &ClassName) -> Arc<StaticsArray> {
        Arc::new(StaticsArray {
            namespaces: MemberNamespace::ALL
                .map(|ns| MethodContainer::new_static_like(owner.clone(), ns)),
        })
    }

    pub(crate) fn namespace(&self, namespace: MemberNamespace) -> &MethodContainer {
        &self.namespaces[namespace.ordinal()]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &MethodContainer> {
        self.namespaces.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_ir::{
        hash_method_def, ClassKind, MethodDef, MethodFlags, OptimizerHints, Tree, Type, Versioned,
    };

    fn method(name: &str, namespace: MemberNamespace, body: Tree) -> Versioned<MethodDef> {
        let mut def = MethodDef {
            encoded_name: MethodName::from(name),
            flags: MethodFlags::new(namespace),
            params: Vec::new(),
            result_type: Type::Unit,
            body: Some(body),
            optimizer_hints: OptimizerHints::default(),
            hash: None,
        };
        def.hash = Some(hash_method_def(&def));
        Versioned::new(Some(format!("{name}-1")), def)
    }

    fn linked(kind: ClassKind, methods: Vec<Versioned<MethodDef>>) -> LinkedClass {
        LinkedClass {
            encoded_name: ClassName::from("A"),
            kind,
            super_class: Some(ClassName::from("O")),
            ancestors: vec![ClassName::from("A"), ClassName::from("O")],
            has_instances: true,
            fields: Vec::new(),
            methods,
            optimizer_hints: OptimizerHints::default(),
        }
    }

    #[test]
    fn reconcile_reports_adds_changes_and_deletes() {
        let shared = Shared::new();
        let container = MethodContainer::new_class_methods(ClassName::from("A"));

        let first = linked(
            ClassKind::Class,
            vec![
                method("m__V", MemberNamespace::PublicInstance, Tree::Skip),
                method("n__V", MemberNamespace::PublicInstance, Tree::Skip),
                // Filtered out: wrong namespace.
                method("init___", MemberNamespace::Constructor, Tree::Skip),
            ],
        );
        let diff = container.update_with(&first, &shared);
        assert_eq!(diff.added.len(), 2);
        assert!(diff.changed.is_empty() && diff.deleted.is_empty());
        assert!(container.contains(&MethodName::from("m__V")));
        assert!(!container.contains(&MethodName::from("init___")));

        // Drop `n`, change `m` to a body with different attributes.
        let branch = Tree::If {
            cond: Box::new(Tree::VarRef("x".to_owned())),
            thenp: Box::new(Tree::Skip),
            elsep: Box::new(Tree::Skip),
        };
        let mut changed = method("m__V", MemberNamespace::PublicInstance, branch);
        changed.version = Some("m__V-2".to_owned());
        let second = linked(ClassKind::Class, vec![changed]);
        let diff = container.update_with(&second, &shared);
        assert!(diff.added.is_empty());
        assert_eq!(diff.changed, vec![MethodName::from("m__V")]);
        assert_eq!(diff.deleted, vec![MethodName::from("n__V")]);
    }

    #[test]
    fn class_kind_leaves_public_statics_slot_empty() {
        let shared = Shared::new();
        let statics = StaticsArray::new(&ClassName::from("A"));
        let unit = linked(
            ClassKind::Class,
            vec![
                method("m__V", MemberNamespace::PublicInstance, Tree::Skip),
                method("init___", MemberNamespace::Constructor, Tree::Skip),
            ],
        );
        for container in statics.iter() {
            container.update_with(&unit, &shared);
        }
        assert!(!statics
            .namespace(MemberNamespace::PublicInstance)
            .contains(&MethodName::from("m__V")));
        assert!(statics
            .namespace(MemberNamespace::Constructor)
            .contains(&MethodName::from("init___")));
    }

    #[test]
    fn interface_defaults_live_in_the_public_instance_slot() {
        let shared = Shared::new();
        let statics = StaticsArray::new(&ClassName::from("I"));
        let unit = linked(
            ClassKind::Interface,
            vec![method("d__V", MemberNamespace::PublicInstance, Tree::Skip)],
        );
        let diff = statics
            .namespace(MemberNamespace::PublicInstance)
            .update_with(&unit, &shared);
        assert_eq!(diff.added, vec![MethodName::from("d__V")]);
    }
}
