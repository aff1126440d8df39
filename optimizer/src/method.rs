//! Per-method state and lifecycle.
//!
//! A [`MethodImpl`] is owned by exactly one method container and lives as
//! long as the container keeps it. It carries the current input definition,
//! the optimized output, and the subscription list used to invalidate the
//! optimization when a consulted record changes.
//!
//! The tag bit is the linearization point of invalidation: the first caller
//! to flip it from clear to set schedules the method and performs the
//! one-shot unregistration from every dependency record. `tag` is safe
//! against itself and against `delete` on the same instance.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use lattice_ir::{ClassName, MemberNamespace, MethodDef, MethodName, OptimizerHints, Tree, Versioned};

use crate::incremental::IncrementalOptimizer;
use crate::interface::InterfaceType;

/// Attributes of a method observable by the intra-method optimizer. A
/// change in attributes invalidates callers even when they never asked for
/// the body itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodAttributes {
    pub inlineable: bool,
    pub is_forwarder: bool,
}

impl MethodAttributes {
    pub(crate) fn compute(def: &MethodDef) -> MethodAttributes {
        fn trivial_arg(tree: &Tree) -> bool {
            matches!(tree, Tree::This | Tree::VarRef(_))
        }

        let is_forwarder = match &def.body {
            Some(Tree::Apply { receiver, args, .. })
            | Some(Tree::ApplyStatically { receiver, args, .. }) => {
                trivial_arg(receiver) && args.iter().all(trivial_arg)
            }
            Some(Tree::ApplyStatic { args, .. }) | Some(Tree::New { args, .. }) => {
                args.iter().all(trivial_arg)
            }
            _ => false,
        };

        let trivial_body = match &def.body {
            Some(Tree::Skip) | Some(Tree::Literal(_)) | Some(Tree::This) => true,
            // Parameterless field getter.
            Some(Tree::Select { qualifier, .. }) => qualifier.is_this() && def.params.is_empty(),
            // Simple field setter.
            Some(Tree::Assign { lhs, rhs }) => {
                matches!(&**lhs, Tree::Select { qualifier, .. } if qualifier.is_this())
                    && matches!(&**rhs, Tree::VarRef(_))
            }
            _ => false,
        };

        let hints = def.optimizer_hints;
        MethodAttributes {
            inlineable: !hints.noinline && (hints.inline || is_forwarder || trivial_body),
            is_forwarder,
        }
    }
}

/// Scheduler and identity source shared by every method of one optimizer
/// instance.
pub(crate) struct Shared {
    queue: Mutex<Vec<Arc<MethodImpl>>>,
    next_method_id: AtomicU64,
}

impl Shared {
    pub(crate) fn new() -> Arc<Shared> {
        Arc::new(Shared {
            queue: Mutex::new(Vec::new()),
            next_method_id: AtomicU64::new(0),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_method_id.fetch_add(1, Ordering::Relaxed)
    }

    fn schedule(&self, method: Arc<MethodImpl>) {
        self.queue.lock().push(method);
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn drain(&self) -> Vec<Arc<MethodImpl>> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub(crate) fn requeue(&self, methods: Vec<Arc<MethodImpl>>) {
        self.queue.lock().extend(methods);
    }
}

/// A dependency record this method subscribed to.
pub(crate) enum Dependency {
    Interface(Arc<InterfaceType>),
    Method(Arc<MethodImpl>),
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    Interface(ClassName),
    Method(u64),
}

struct MethodState {
    last_in_version: Option<String>,
    optimizer_hints: OptimizerHints,
    original_def: Option<MethodDef>,
    optimized_def: Option<Versioned<MethodDef>>,
    last_out_version: u64,
    attributes: MethodAttributes,
}

pub(crate) struct MethodImpl {
    owner: ClassName,
    namespace: MemberNamespace,
    encoded_name: MethodName,
    id: u64,
    me: Weak<MethodImpl>,
    shared: Arc<Shared>,
    tagged: AtomicBool,
    deleted: AtomicBool,
    state: Mutex<MethodState>,
    /// Methods that asked for this method's body during their last
    /// optimization; this record is itself a dependency record.
    body_askers: Mutex<FxHashMap<u64, Weak<MethodImpl>>>,
    /// Records this method subscribed to, swept on tag or delete.
    registered_to: Mutex<FxHashMap<DepKey, Dependency>>,
}

impl MethodImpl {
    pub(crate) fn new(
        shared: &Arc<Shared>,
        owner: ClassName,
        namespace: MemberNamespace,
        encoded_name: MethodName,
    ) -> Arc<MethodImpl> {
        let id = shared.next_id();
        Arc::new_cyclic(|me| MethodImpl {
            owner,
            namespace,
            encoded_name,
            id,
            me: me.clone(),
            shared: Arc::clone(shared),
            tagged: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            state: Mutex::new(MethodState {
                last_in_version: None,
                optimizer_hints: OptimizerHints::default(),
                original_def: None,
                optimized_def: None,
                last_out_version: 0,
                attributes: MethodAttributes::default(),
            }),
            body_askers: Mutex::new(FxHashMap::default()),
            registered_to: Mutex::new(FxHashMap::default()),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn owner(&self) -> &ClassName {
        &self.owner
    }

    pub(crate) fn namespace(&self) -> MemberNamespace {
        self.namespace
    }

    pub(crate) fn encoded_name(&self) -> &MethodName {
        &self.encoded_name
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Relaxed)
    }

    pub(crate) fn is_tagged(&self) -> bool {
        self.tagged.load(Ordering::Relaxed)
    }

    pub(crate) fn attributes(&self) -> MethodAttributes {
        self.state.lock().attributes
    }

    pub(crate) fn original_def(&self) -> Option<MethodDef> {
        self.state.lock().original_def.clone()
    }

    pub(crate) fn optimized_def(&self) -> Option<Versioned<MethodDef>> {
        self.state.lock().optimized_def.clone()
    }

    pub(crate) fn optimizer_hints(&self) -> OptimizerHints {
        self.state.lock().optimizer_hints
    }

    fn arc(&self) -> Arc<MethodImpl> {
        self.me.upgrade().expect("method accessed after its last owner dropped it")
    }

    pub(crate) fn weak(&self) -> Weak<MethodImpl> {
        self.me.clone()
    }

    /// Reconcile with the incoming definition. Returns whether the method
    /// attributes changed.
    pub(crate) fn update_with(&self, linked: &Versioned<MethodDef>) -> bool {
        assert!(
            !self.is_deleted(),
            "method `{}.{}` updated after deletion",
            self.owner,
            self.encoded_name
        );

        let mut state = self.state.lock();
        if state.last_in_version.is_some() && state.last_in_version == linked.version {
            return false;
        }
        state.last_in_version = linked.version.clone();

        let new_def = &linked.value;
        let body_changed = match &state.original_def {
            None => true,
            // The hash is authoritative; a missing hash on either side
            // counts as a change.
            Some(old) => match (old.hash, new_def.hash) {
                (Some(a), Some(b)) => a != b,
                _ => true,
            },
        };
        if !body_changed {
            return false;
        }

        self.tag_body_askers();
        let old_attributes = state.attributes;
        state.optimizer_hints = new_def.optimizer_hints;
        state.original_def = Some(new_def.clone());
        state.attributes = MethodAttributes::compute(new_def);
        let attrs_changed = state.attributes != old_attributes;
        drop(state);

        self.tag();
        attrs_changed
    }

    pub(crate) fn delete(&self) {
        assert!(
            !self.deleted.swap(true, Ordering::AcqRel),
            "method `{}.{}` deleted twice",
            self.owner,
            self.encoded_name
        );
        if self.protect_tag() {
            self.unregister_from_everywhere();
        }
    }

    /// Mark this method as needing re-optimization. The clear-to-set
    /// transition of the tag bit schedules the method exactly once and
    /// sweeps its subscriptions.
    pub(crate) fn tag(&self) {
        if self.protect_tag() {
            self.unregister_from_everywhere();
            self.shared.schedule(self.arc());
        }
    }

    fn protect_tag(&self) -> bool {
        !self.tagged.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn tag_body_askers(&self) {
        let askers = std::mem::take(&mut *self.body_askers.lock());
        for weak in askers.into_values() {
            if let Some(asker) = weak.upgrade() {
                asker.tag();
            }
        }
    }

    fn unregister_from_everywhere(&self) {
        let deps = std::mem::take(&mut *self.registered_to.lock());
        for dep in deps.into_values() {
            match dep {
                Dependency::Interface(interface) => interface.unregister_dependee(self.id),
                Dependency::Method(target) => target.unregister_body_asker(self.id),
            }
        }
    }

    pub(crate) fn record_dependency(&self, key: DepKey, dep: Dependency) {
        self.registered_to.lock().insert(key, dep);
    }

    /// Register `asker` as depending on this method's body.
    pub(crate) fn register_body_asker(&self, asker: &MethodImpl) {
        self.body_askers.lock().insert(asker.id, asker.me.clone());
        asker.record_dependency(DepKey::Method(self.id), Dependency::Method(self.arc()));
    }

    pub(crate) fn unregister_body_asker(&self, id: u64) {
        self.body_askers.lock().remove(&id);
    }

    /// Optimize this method through the intra-method optimizer. Runs during
    /// PROCESS PASS only; re-registration happens through the hook calls the
    /// core makes on the context.
    pub(crate) fn process(&self, opt: &IncrementalOptimizer) -> crate::Result<()> {
        if self.is_deleted() {
            return Ok(());
        }

        let def = self
            .state
            .lock()
            .original_def
            .clone()
            .expect("processing a method that was never updated");
        let this_class = self.namespace.has_this().then(|| self.owner.clone());
        let cx = crate::hooks::OptimizationContext::new(opt, self.arc());
        let optimized = opt.core().optimize(this_class.as_ref(), &def, &cx)?;

        let mut state = self.state.lock();
        state.last_out_version += 1;
        state.optimized_def = Some(Versioned::new(
            Some(state.last_out_version.to_string()),
            optimized,
        ));
        drop(state);
        self.tagged.store(false, Ordering::Release);
        Ok(())
    }
}

/// Opaque handle on a concrete method implementation, handed to the
/// intra-method optimizer as a call target.
#[derive(Clone)]
pub struct MethodTarget {
    pub(crate) method: Arc<MethodImpl>,
}

impl MethodTarget {
    pub fn owner(&self) -> &ClassName {
        self.method.owner()
    }

    pub fn namespace(&self) -> MemberNamespace {
        self.method.namespace()
    }

    pub fn method_name(&self) -> &MethodName {
        self.method.encoded_name()
    }

    pub fn attributes(&self) -> MethodAttributes {
        self.method.attributes()
    }

    pub fn optimizer_hints(&self) -> OptimizerHints {
        self.method.optimizer_hints()
    }

    pub fn inlineable(&self) -> bool {
        self.attributes().inlineable
    }

    pub fn is_forwarder(&self) -> bool {
        self.attributes().is_forwarder
    }
}

impl PartialEq for MethodTarget {
    fn eq(&self, other: &MethodTarget) -> bool {
        self.method.id == other.method.id
    }
}

impl Eq for MethodTarget {}

impl fmt::Debug for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MethodTarget({}.{})",
            self.method.owner(),
            self.method.encoded_name()
        )
    }
}
