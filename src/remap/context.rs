//! Read-only state shared by every class remapping worker.

use std::borrow::Cow;

use super::access::WidenSet;
use super::engine::RemapOptions;
use super::hierarchy::ClassHierarchy;
use crate::mapping::{ClassMapper, MappingIndex};

/// Everything a worker needs to remap one class.
#[derive(Debug, Clone, Copy)]
pub struct RemapContext<'a> {
    /// Rename tables
    pub index: &'a MappingIndex,
    /// Input class hierarchy
    pub hierarchy: &'a ClassHierarchy,
    /// Symbols to widen to public
    pub widen: &'a WidenSet,
    /// Engine options
    pub options: &'a RemapOptions,
}

impl<'a> RemapContext<'a> {
    /// Target name of a field reference, looked up through the hierarchy.
    pub fn resolve_field(&self, owner: &str, name: &str, descriptor: &str) -> Option<&'a str> {
        self.hierarchy
            .resolve_field(self.index, owner, name, descriptor)
    }

    /// Target name of a method reference, looked up through the hierarchy.
    pub fn resolve_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&'a str> {
        self.hierarchy
            .resolve_method(self.index, owner, name, descriptor)
    }
}

impl ClassMapper for RemapContext<'_> {
    fn map_class(&self, name: &str) -> Option<Cow<'_, str>> {
        self.index.map_class(name)
    }
}
