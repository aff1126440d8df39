//! Incremental method optimizer for the lattice linker.
//!
//! The optimizer accepts a linking unit — the complete batch of linked
//! classes for one run — and returns an equivalent unit in which every
//! method body has been replaced by an optimized version. Across successive
//! runs it recomputes only the methods whose inputs changed, and proves
//! reuse correct for everything else through a dependency-tracking
//! substrate:
//!
//! - a class hierarchy retained between runs, rooted at the `Object` class;
//! - per-class static-like namespaces for constructors and static members;
//! - one interface-type record per encoded name holding ancestor lists,
//!   instantiated subclasses, and the caller tables methods subscribe to
//!   while they are optimized;
//! - a two-pass `update` protocol: an UPDATE PASS that reconciles the
//!   hierarchy with the new unit and tags every method whose optimization
//!   may have been invalidated, then a PROCESS PASS that re-optimizes the
//!   tagged methods in parallel.
//!
//! The intra-method optimizer itself is external: implement
//! [`OptimizerCore`] and hand it to [`IncrementalOptimizer::new`]. During
//! optimization the core looks up call targets through
//! [`OptimizationContext`]; each lookup registers the method as a dependent
//! of whatever it consulted, so a later change tags it for re-optimization.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use lattice_ir::{CoreSpec, LinkingUnit};
//! use lattice_optimizer::{Config, IdentityCore, IncrementalOptimizer};
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

mod class;
mod collops;
mod container;
mod hooks;
mod incremental;
mod interface;
mod method;
mod symbols;

pub use hooks::{IdentityCore, OptimizationContext, OptimizerCore};
pub use incremental::{IncrementalOptimizer, RunStats};
pub use method::{MethodAttributes, MethodTarget};
pub use symbols::{symbol_requirements, SymbolRequirement};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("optimization of `{method}` in `{class}` failed: {message}")]
    MethodOptimization {
        class: String,
        method: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Construction-time configuration for [`IncrementalOptimizer`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Optimize scheduled methods on the work-stealing thread pool instead
    /// of sequentially.
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config { parallel: true }
    }
}
