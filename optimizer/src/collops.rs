//! Collection operations behind the parallelism switch.
//!
//! Every bulk operation of the two passes goes through this module so that
//! a sequential and a work-stealing backend exist side by side. The choice
//! is made once at construction time and never leaks out of the crate.

use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Parallelism {
    Sequential,
    WorkStealing,
}

impl Parallelism {
    pub(crate) fn from_config(parallel: bool) -> Parallelism {
        if parallel {
            Parallelism::WorkStealing
        } else {
            Parallelism::Sequential
        }
    }

    pub(crate) fn for_each<T, F>(self, items: Vec<T>, f: F)
    where
        T: Send,
        F: Fn(T) + Send + Sync,
    {
        match self {
            Parallelism::Sequential => items.into_iter().for_each(f),
            Parallelism::WorkStealing => items.into_par_iter().for_each(f),
        }
    }

    /// Apply `f` to every item, stopping at the first error. Under the
    /// work-stealing backend in-flight items still complete; which error is
    /// returned is unspecified.
    pub(crate) fn try_for_each<T, E, F>(self, items: Vec<T>, f: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(T) -> Result<(), E> + Send + Sync,
    {
        match self {
            Parallelism::Sequential => items.into_iter().try_for_each(f),
            Parallelism::WorkStealing => items.into_par_iter().try_for_each(f),
        }
    }

    pub(crate) fn flat_map<T, U, F>(self, items: Vec<T>, f: F) -> Vec<U>
    where
        T: Send,
        U: Send,
        F: Fn(T) -> Vec<U> + Send + Sync,
    {
        match self {
            Parallelism::Sequential => items.into_iter().flat_map(f).collect(),
            Parallelism::WorkStealing => items.into_par_iter().flat_map_iter(f).collect(),
        }
    }
}
