//! Method body trees.
//!
//! A deliberately small statement/expression language: just enough structure
//! for the optimizer to recognize forwarders, trivial constructors, module
//! initialization patterns, and call sites that need dependency tracking.

use crate::names::{ClassName, FieldName, MethodName};
use crate::namespace::MemberNamespace;
use crate::types::RecordValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Null,
    Undefined,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Skip,
    Block(Vec<Tree>),
    Literal(Literal),
    /// Reference to a local variable or parameter.
    VarRef(String),
    This,
    Select {
        qualifier: Box<Tree>,
        field: FieldName,
    },
    Assign {
        lhs: Box<Tree>,
        rhs: Box<Tree>,
    },
    /// Publish `value` as the singleton instance of the module `class`.
    StoreModule {
        class: ClassName,
        value: Box<Tree>,
    },
    LoadModule {
        class: ClassName,
    },
    /// Virtual dispatch on the receiver's run-time class.
    Apply {
        receiver: Box<Tree>,
        method: MethodName,
        args: Vec<Tree>,
    },
    /// Statically bound call to an instance member of a known class.
    ApplyStatically {
        receiver: Box<Tree>,
        class: ClassName,
        namespace: MemberNamespace,
        method: MethodName,
        args: Vec<Tree>,
    },
    /// Call to a static member.
    ApplyStatic {
        class: ClassName,
        namespace: MemberNamespace,
        method: MethodName,
        args: Vec<Tree>,
    },
    New {
        class: ClassName,
        ctor: MethodName,
        args: Vec<Tree>,
    },
    If {
        cond: Box<Tree>,
        thenp: Box<Tree>,
        elsep: Box<Tree>,
    },
    RecordValue(RecordValue),
}

impl Tree {
    /// Leaf whose evaluation has no observable effect.
    pub fn is_trivially_side_effect_free(&self) -> bool {
        matches!(
            self,
            Tree::VarRef(_) | Tree::Literal(_) | Tree::This | Tree::Skip
        )
    }

    /// Whether this tree is the `this` reference.
    pub fn is_this(&self) -> bool {
        matches!(self, Tree::This)
    }
}
