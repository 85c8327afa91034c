//! Class archive remapping.
//!
//! This module handles:
//! - Building the input class hierarchy for inherited member lookups
//! - Finding package-private symbols that renaming moves across packages
//! - Rewriting constant pools, members and attributes of each class
//! - Carrying resources over and fixing `META-INF`
//! - Writing the output archive atomically

pub mod access;
mod attributes;
pub mod class;
pub mod context;
pub mod engine;
pub mod hierarchy;
pub mod locals;
pub mod meta_inf;
pub mod sink;

pub use class::{ClassRemapper, RemappedClass};
pub use context::RemapContext;
pub use engine::{RemapOptions, RemapReport, Remapper};
pub use meta_inf::NonClassCopyMode;
