//! The seam between this substrate and the intra-method optimizer.
//!
//! The intra-method optimizer is a pure function from `(this type, method
//! definition)` to an optimized definition. Everything it wants to know
//! about the rest of the program goes through [`OptimizationContext`], and
//! every answer first registers the asking method as a dependent of the
//! record that produced it, so a later mutation of that record tags the
//! method for re-optimization.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use lattice_ir::{ClassName, MemberNamespace, MethodDef, MethodName, RecordValue};

use crate::incremental::IncrementalOptimizer;
use crate::method::{MethodImpl, MethodTarget};

/// The intra-method optimizer. Implementations must be thread-safe: methods
/// are optimized in parallel, each through its own context.
pub trait OptimizerCore: Send + Sync {
    fn optimize(
        &self,
        this_class: Option<&ClassName>,
        def: &MethodDef,
        cx: &OptimizationContext<'_>,
    ) -> crate::Result<MethodDef>;
}

/// A core that returns every definition unchanged and consults no hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCore;

impl OptimizerCore for IdentityCore {
    fn optimize(
        &self,
        _this_class: Option<&ClassName>,
        def: &MethodDef,
        _cx: &OptimizationContext<'_>,
    ) -> crate::Result<MethodDef> {
        Ok(def.clone())
    }
}

/// Lookup surface handed to the intra-method optimizer while one method is
/// being optimized. All hooks are safe to call from the optimizing thread;
/// registrations are internally synchronized.
pub struct OptimizationContext<'a> {
    opt: &'a IncrementalOptimizer,
    method: Arc<MethodImpl>,
}

impl<'a> OptimizationContext<'a> {
    pub(crate) fn new(opt: &'a IncrementalOptimizer, method: Arc<MethodImpl>) -> Self {
        OptimizationContext { opt, method }
    }

    /// The body of a previously resolved call target. Registers a body-ask
    /// dependency: editing the target's body re-optimizes this method.
    pub fn get_method_body(&self, target: &MethodTarget) -> MethodDef {
        target.method.register_body_asker(&self.method);
        target
            .method
            .original_def()
            .expect("method target without a definition")
    }

    /// Resolve a virtual call on `interface` to the set of concrete targets
    /// among its instantiated subclasses.
    pub fn dynamic_call_targets(
        &self,
        interface: &ClassName,
        method: &MethodName,
    ) -> Vec<MethodTarget> {
        let record = self.opt.interface(interface);
        record.register_dynamic_caller(method, &self.method);

        let mut seen: FxHashSet<u64> = FxHashSet::default();
        let mut targets = Vec::new();
        for class in record.instantiated_subclasses() {
            if let Some(found) = class.lookup_method(method) {
                if seen.insert(found.id()) {
                    targets.push(MethodTarget { method: found });
                }
            }
        }
        targets
    }

    /// Resolve a statically bound call. Public-instance targets resolve
    /// through the class hierarchy (walking up superclasses); every other
    /// namespace resolves in the class's static-like namespace.
    pub fn static_call_target(
        &self,
        class: &ClassName,
        namespace: MemberNamespace,
        method: &MethodName,
    ) -> Option<MethodTarget> {
        let record = self.opt.interface(class);
        record.register_static_caller(namespace, method, &self.method);

        let found = if namespace == MemberNamespace::PublicInstance {
            match self.opt.class(class) {
                Some(node) => node.lookup_method(method),
                None => self.opt.static_like_method(class, namespace, method),
            }
        } else {
            self.opt.static_like_method(class, namespace, method)
        };
        found.map(|method| MethodTarget { method })
    }

    /// Ancestor list of a class or interface. Registers an ancestor-ask
    /// dependency.
    pub fn ancestors_of(&self, interface: &ClassName) -> Vec<ClassName> {
        let record = self.opt.interface(interface);
        record.register_ancestor_asker(&self.method);
        record.ancestors()
    }

    /// Side-table read; no subscription. Any change to the underlying
    /// answer already tags this method through its constructor static-call
    /// registration.
    pub fn has_elidable_module_accessor(&self, class: &ClassName) -> bool {
        self.opt
            .class(class)
            .map_or(false, |node| node.has_elidable_module_accessor())
    }

    /// Side-table read; no subscription, as above.
    pub fn try_new_inlineable_class(&self, class: &ClassName) -> Option<RecordValue> {
        self.opt.class(class).and_then(|node| node.try_new_inlineable())
    }
}
