//! Structural hashing of method definitions.
//!
//! The optimizer compares the hash of the previously seen definition with
//! the hash of the incoming one to decide whether a method body changed.
//! The digest covers everything the optimizer can observe about a method:
//! name, namespace, signature, hints, and the full body tree.

use std::fmt;

use crate::class_defs::MethodDef;
use crate::trees::{Literal, Tree};
use crate::types::{RecordType, RecordValue, Type};

/// Content hash of a method definition.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeHash([u8; 32]);

impl TreeHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeHash(")?;
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Compute the structural hash of a method definition.
pub fn hash_method_def(def: &MethodDef) -> TreeHash {
    let mut hasher = Hasher::default();
    hasher.str(def.encoded_name.as_str());
    hasher.u8(def.flags.namespace.ordinal() as u8);
    hasher.usize(def.params.len());
    for param in &def.params {
        hasher.str(&param.name);
        hasher.tpe(&param.tpe);
    }
    hasher.tpe(&def.result_type);
    hasher.u8(def.optimizer_hints.inline as u8);
    hasher.u8(def.optimizer_hints.noinline as u8);
    match &def.body {
        None => hasher.u8(0),
        Some(body) => {
            hasher.u8(1);
            hasher.tree(body);
        }
    }
    TreeHash(*hasher.inner.finalize().as_bytes())
}

#[derive(Default)]
struct Hasher {
    inner: blake3::Hasher,
}

impl Hasher {
    fn u8(&mut self, value: u8) {
        self.inner.update(&[value]);
    }

    fn usize(&mut self, value: usize) {
        self.inner.update(&(value as u64).to_le_bytes());
    }

    fn str(&mut self, value: &str) {
        self.usize(value.len());
        self.inner.update(value.as_bytes());
    }

    fn trees(&mut self, trees: &[Tree]) {
        self.usize(trees.len());
        for tree in trees {
            self.tree(tree);
        }
    }

    fn tree(&mut self, tree: &Tree) {
        match tree {
            Tree::Skip => self.u8(0),
            Tree::Block(stats) => {
                self.u8(1);
                self.trees(stats);
            }
            Tree::Literal(lit) => {
                self.u8(2);
                self.literal(lit);
            }
            Tree::VarRef(name) => {
                self.u8(3);
                self.str(name);
            }
            Tree::This => self.u8(4),
            Tree::Select { qualifier, field } => {
                self.u8(5);
                self.tree(qualifier);
                self.str(field.as_str());
            }
            Tree::Assign { lhs, rhs } => {
                self.u8(6);
                self.tree(lhs);
                self.tree(rhs);
            }
            Tree::StoreModule { class, value } => {
                self.u8(7);
                self.str(class.as_str());
                self.tree(value);
            }
            Tree::LoadModule { class } => {
                self.u8(8);
                self.str(class.as_str());
            }
            Tree::Apply {
                receiver,
                method,
                args,
            } => {
                self.u8(9);
                self.tree(receiver);
                self.str(method.as_str());
                self.trees(args);
            }
            Tree::ApplyStatically {
                receiver,
                class,
                namespace,
                method,
                args,
            } => {
                self.u8(10);
                self.tree(receiver);
                self.str(class.as_str());
                self.u8(namespace.ordinal() as u8);
                self.str(method.as_str());
                self.trees(args);
            }
            Tree::ApplyStatic {
                class,
                namespace,
                method,
                args,
            } => {
                self.u8(11);
                self.str(class.as_str());
                self.u8(namespace.ordinal() as u8);
                self.str(method.as_str());
                self.trees(args);
            }
            Tree::New { class, ctor, args } => {
                self.u8(12);
                self.str(class.as_str());
                self.str(ctor.as_str());
                self.trees(args);
            }
            Tree::If { cond, thenp, elsep } => {
                self.u8(13);
                self.tree(cond);
                self.tree(thenp);
                self.tree(elsep);
            }
            Tree::RecordValue(value) => {
                self.u8(14);
                self.record_value(value);
            }
        }
    }

    fn literal(&mut self, lit: &Literal) {
        match lit {
            Literal::Boolean(v) => {
                self.u8(0);
                self.u8(*v as u8);
            }
            Literal::Int(v) => {
                self.u8(1);
                self.inner.update(&v.to_le_bytes());
            }
            Literal::Long(v) => {
                self.u8(2);
                self.inner.update(&v.to_le_bytes());
            }
            Literal::Float(v) => {
                self.u8(3);
                self.inner.update(&v.to_bits().to_le_bytes());
            }
            Literal::Double(v) => {
                self.u8(4);
                self.inner.update(&v.to_bits().to_le_bytes());
            }
            Literal::Str(v) => {
                self.u8(5);
                self.str(v);
            }
            Literal::Null => self.u8(6),
            Literal::Undefined => self.u8(7),
        }
    }

    fn tpe(&mut self, tpe: &Type) {
        match tpe {
            Type::Any => self.u8(0),
            Type::Unit => self.u8(1),
            Type::Boolean => self.u8(2),
            Type::Int => self.u8(3),
            Type::Long => self.u8(4),
            Type::Float => self.u8(5),
            Type::Double => self.u8(6),
            Type::Str => self.u8(7),
            Type::Class(name) => {
                self.u8(8);
                self.str(name.as_str());
            }
            Type::Record(record) => {
                self.u8(9);
                self.record_type(record);
            }
            Type::Null => self.u8(10),
            Type::Nothing => self.u8(11),
        }
    }

    fn record_type(&mut self, record: &RecordType) {
        self.usize(record.fields.len());
        for field in &record.fields {
            self.str(field.name.as_str());
            self.tpe(&field.tpe);
        }
    }

    fn record_value(&mut self, value: &RecordValue) {
        self.record_type(&value.tpe);
        self.trees(&value.elems);
    }
}
