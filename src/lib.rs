//! Lattice linker — whole-program linking for a class-based, nominally
//! typed IR, with incremental method optimization.
//!
//! The crates in this workspace:
//!
//! - [`ir`] (`lattice-ir`): the IR surface — encoded names, member
//!   namespaces, method body trees, linked class definitions, and
//!   structural content hashing.
//! - [`optimizer`] (`lattice-optimizer`): the incremental method optimizer.
//!   Feed it a linking unit per run; it re-optimizes only the methods whose
//!   inputs changed and proves reuse correct for the rest.
//!
//! The usual entry point is [`IncrementalOptimizer`] together with an
//! implementation of [`OptimizerCore`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use lattice_linker::{Config, IdentityCore, IncrementalOptimizer};
//! use lattice_linker::ir::{CoreSpec, LinkingUnit};
//!
//! let mut optimizer = IncrementalOptimizer::new(Config::default(), Arc::new(IdentityCore));
//! let unit = LinkingUnit {
//!     core_spec: CoreSpec::default(),
//!     class_defs: Vec::new(),
//!     module_initializers: Vec::new(),
//! };
//! let optimized = optimizer.update(unit).unwrap();
//! assert!(optimized.class_defs.is_empty());
//! ```

pub use lattice_ir as ir;
pub use lattice_optimizer as optimizer;

pub use lattice_optimizer::{
    symbol_requirements, Config, IdentityCore, IncrementalOptimizer, MethodAttributes,
    MethodTarget, OptimizationContext, OptimizerCore, OptimizerError, Result, RunStats,
    SymbolRequirement,
};
