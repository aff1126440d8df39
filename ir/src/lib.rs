//! Intermediate representation consumed by the lattice linker.
//!
//! This crate defines the data model exchanged between the linker frontend
//! and the incremental optimizer: encoded names, member namespaces, method
//! body trees, field and record types, linked class definitions, and the
//! structural content hashing used to detect changed method bodies across
//! runs.
//!
//! The IR is class-based and nominally typed. Classes form a single
//! inheritance tree; interfaces contribute to a flat ancestor list carried
//! on every [`LinkedClass`].

pub mod class_defs;
pub mod hashing;
pub mod names;
pub mod namespace;
pub mod trees;
pub mod types;

pub use class_defs::{
    ClassKind, CoreSpec, LinkedClass, LinkingUnit, MethodDef, MethodFlags, ModuleInitializer,
    ModuleKind, OptimizerHints, ParamDef, Versioned,
};
pub use hashing::{hash_method_def, TreeHash};
pub use names::{ClassName, FieldName, MethodName};
pub use namespace::MemberNamespace;
pub use trees::{Literal, Tree};
pub use types::{FieldDef, RecordField, RecordType, RecordValue, Type};
