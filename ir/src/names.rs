//! Encoded names.
//!
//! Every class, interface, method, and field is identified by an opaque
//! encoded name string. Encoded names are stable across linker runs and are
//! the unit of identity for incremental matching, so they are kept behind
//! cheap-to-clone shared strings.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

macro_rules! encoded_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(name: impl Into<Arc<str>>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self::new(name)
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self::new(name)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), &*self.0)
            }
        }
    };
}

encoded_name! {
    /// Encoded name of a class or interface.
    ClassName
}

encoded_name! {
    /// Encoded name of a method, including its signature suffix.
    MethodName
}

encoded_name! {
    /// Encoded name of a field.
    FieldName
}

/// Encoded name of the no-argument constructor.
pub const NO_ARG_CTOR: &str = "init___";

/// The one module class whose accessor is elidable by fiat.
pub const PREDEF_MODULE_CLASS: &str = "s_Predef$";

/// Runtime class implementing 64-bit integer arithmetic.
pub const RUNTIME_LONG_CLASS: &str = "sjsr_RuntimeLong";

/// Exception class thrown by null-check dispatch helpers.
pub const NULL_POINTER_EXCEPTION_CLASS: &str = "jl_NullPointerException";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_cheap_and_equal() {
        let a = ClassName::from("jl_Object");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "jl_Object");
    }

    #[test]
    fn borrowed_str_lookup() {
        use std::collections::HashMap;
        let mut map: HashMap<MethodName, u32> = HashMap::new();
        map.insert(MethodName::from("toString__T"), 1);
        assert_eq!(map.get("toString__T"), Some(&1));
    }

    #[test]
    fn display_is_bare() {
        assert_eq!(FieldName::from("value$1").to_string(), "value$1");
    }
}
