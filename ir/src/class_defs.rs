//! Linked class and method definitions exchanged with the linker.

use crate::hashing::TreeHash;
use crate::names::{ClassName, MethodName};
use crate::namespace::MemberNamespace;
use crate::trees::Tree;
use crate::types::{FieldDef, Type};

/// A value paired with an optional stable version token.
///
/// Two versioned values carrying the same `Some` version are treated as
/// equal without inspecting the payload; `None` never matches anything.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: Option<String>,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(version: Option<String>, value: T) -> Self {
        Versioned { version, value }
    }

    pub fn unversioned(value: T) -> Self {
        Versioned { version: None, value }
    }

    pub fn same_version<U>(&self, other: &Versioned<U>) -> bool {
        self.version.is_some() && self.version == other.version
    }
}

/// Inlining hints attached by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizerHints {
    pub inline: bool,
    pub noinline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodFlags {
    pub namespace: MemberNamespace,
}

impl MethodFlags {
    pub fn new(namespace: MemberNamespace) -> Self {
        MethodFlags { namespace }
    }

    pub fn is_constructor(self) -> bool {
        self.namespace.is_constructor()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub tpe: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub encoded_name: MethodName,
    pub flags: MethodFlags,
    pub params: Vec<ParamDef>,
    pub result_type: Type,
    /// Absent for abstract methods.
    pub body: Option<Tree>,
    pub optimizer_hints: OptimizerHints,
    /// Content hash stamped by the frontend; authoritative for change
    /// detection when present on both sides of a comparison.
    pub hash: Option<TreeHash>,
}

impl MethodDef {
    pub fn namespace(&self) -> MemberNamespace {
        self.flags.namespace
    }
}

/// Kind of a linked class. `JSClass` and `NativeJSClass` are carried through
/// the optimizer untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    ModuleClass,
    HijackedClass,
    Interface,
    JSClass,
    NativeJSClass,
}

impl ClassKind {
    /// Kinds that participate in the instantiable class hierarchy. All other
    /// kinds only carry statically resolved members.
    pub fn is_optimizer_class(self) -> bool {
        matches!(
            self,
            ClassKind::Class | ClassKind::ModuleClass | ClassKind::HijackedClass
        )
    }

    pub fn is_module_class(self) -> bool {
        self == ClassKind::ModuleClass
    }
}

/// A class as produced by the linker frontend for one run.
#[derive(Debug, Clone)]
pub struct LinkedClass {
    pub encoded_name: ClassName,
    pub kind: ClassKind,
    /// Absent only for the root `Object` class.
    pub super_class: Option<ClassName>,
    /// Self plus all transitive superclasses and superinterfaces.
    pub ancestors: Vec<ClassName>,
    /// Whether the linker observed any allocation of this class.
    pub has_instances: bool,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<Versioned<MethodDef>>,
    pub optimizer_hints: OptimizerHints,
}

impl LinkedClass {
    /// Rebuild this class with its method list replaced by optimized
    /// versions.
    pub fn optimized(&self, methods: Vec<Versioned<MethodDef>>) -> LinkedClass {
        LinkedClass {
            methods,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleKind {
    #[default]
    NoModule,
    CommonJSModule,
    ESModule,
}

/// Frontend configuration carried through the optimizer unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreSpec {
    pub module_kind: ModuleKind,
}

/// Entry point invoked when a module is loaded; passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInitializer {
    pub module_class: ClassName,
    pub main_method: MethodName,
}

/// The complete batch of linked classes input to a single optimizer run.
#[derive(Debug, Clone)]
pub struct LinkingUnit {
    pub core_spec: CoreSpec,
    pub class_defs: Vec<LinkedClass>,
    pub module_initializers: Vec<ModuleInitializer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_equality_shortcut() {
        let a: Versioned<u32> = Versioned::new(Some("3".to_owned()), 1);
        let b: Versioned<u32> = Versioned::new(Some("3".to_owned()), 2);
        let c: Versioned<u32> = Versioned::new(Some("4".to_owned()), 1);
        assert!(a.same_version(&b));
        assert!(!a.same_version(&c));
    }

    #[test]
    fn unversioned_never_matches() {
        let a: Versioned<u32> = Versioned::unversioned(1);
        let b: Versioned<u32> = Versioned::unversioned(1);
        assert!(!a.same_version(&b));
    }

    #[test]
    fn optimizer_class_kinds() {
        assert!(ClassKind::Class.is_optimizer_class());
        assert!(ClassKind::ModuleClass.is_optimizer_class());
        assert!(ClassKind::HijackedClass.is_optimizer_class());
        assert!(!ClassKind::Interface.is_optimizer_class());
        assert!(!ClassKind::JSClass.is_optimizer_class());
    }
}
