//! Runtime facilities the optimizer relies on.
//!
//! Optimized bodies may introduce calls the original program never made
//! (desugared long arithmetic, synthesized null checks). The linker must
//! keep these reachable regardless of what the optimizer deletes, so the
//! set is declared here and exposed on the public surface.

use lattice_ir::names::{NO_ARG_CTOR, NULL_POINTER_EXCEPTION_CLASS, RUNTIME_LONG_CLASS};
use lattice_ir::{ClassName, MethodName};

/// A facility the linker must preserve for optimized output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolRequirement {
    /// Every method of the class must stay callable.
    CallMethods { class: ClassName },
    /// The class must stay instantiable through the given constructor.
    InstantiateClass {
        class: ClassName,
        constructor: MethodName,
    },
}

/// The facilities used by optimized method bodies.
pub fn symbol_requirements() -> Vec<SymbolRequirement> {
    vec![
        SymbolRequirement::CallMethods {
            class: ClassName::from(RUNTIME_LONG_CLASS),
        },
        SymbolRequirement::InstantiateClass {
            class: ClassName::from(NULL_POINTER_EXCEPTION_CLASS),
            constructor: MethodName::from(NO_ARG_CTOR),
        },
    ]
}
