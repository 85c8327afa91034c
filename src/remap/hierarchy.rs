//! Class hierarchy of the input, used to resolve inherited member references.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::classfile::{AccessFlags, ClassFile};
use crate::mapping::MappingIndex;

/// A declared field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Member name
    pub name: String,
    /// Member descriptor
    pub descriptor: String,
    /// Access flags
    pub access: AccessFlags,
}

/// The parts of a class the hierarchy needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// Internal name
    pub name: String,
    /// Superclass, if any
    pub super_name: Option<String>,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Class access flags
    pub access: AccessFlags,
    /// Declared fields
    pub fields: Vec<MemberInfo>,
    /// Declared methods
    pub methods: Vec<MemberInfo>,
}

impl ClassInfo {
    /// Extracts hierarchy information from a parsed class.
    pub fn from_class(class: &ClassFile) -> Option<Self> {
        let members = |members: &[crate::classfile::Member]| -> Vec<MemberInfo> {
            members
                .iter()
                .filter_map(|m| {
                    Some(MemberInfo {
                        name: class.pool.utf8(m.name)?.into_owned(),
                        descriptor: class.pool.utf8(m.descriptor)?.into_owned(),
                        access: m.access,
                    })
                })
                .collect()
        };

        Some(Self {
            name: class.name()?.into_owned(),
            super_name: class.super_name().map(|s| s.into_owned()),
            interfaces: class.interface_names().map(|s| s.into_owned()).collect(),
            access: class.access,
            fields: members(&class.fields),
            methods: members(&class.methods),
        })
    }

    /// Returns a declared field.
    pub fn field(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Returns a declared method.
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

/// All input classes by internal name.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: HashMap<String, ClassInfo>,
}

impl ClassHierarchy {
    /// Builds the hierarchy from class infos.
    pub fn new(infos: impl IntoIterator<Item = ClassInfo>) -> Self {
        Self {
            classes: infos.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    /// Returns a class of the input.
    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// Returns true if `name` is part of the input.
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if the hierarchy has no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Visits `owner` and its supertypes breadth-first until `visit` returns `Some`.
    fn walk<'a, T>(&'a self, owner: &'a str, mut visit: impl FnMut(&'a str) -> Option<T>) -> Option<T> {
        let mut queue = VecDeque::from([owner]);
        let mut seen = HashSet::new();
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(found) = visit(name) {
                return Some(found);
            }
            if let Some(info) = self.classes.get(name) {
                queue.extend(info.super_name.as_deref());
                queue.extend(info.interfaces.iter().map(String::as_str));
            }
        }
        None
    }

    /// Resolves the target name of a field reference through the hierarchy.
    ///
    /// The search stops at the first class that maps or declares the field.
    pub fn resolve_field<'i>(
        &self,
        index: &'i MappingIndex,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<&'i str> {
        self.walk(owner, |class| {
            if let Some(target) = index.field(class, name, descriptor) {
                return Some(Some(target));
            }
            self.get(class)
                .and_then(|c| c.field(name, descriptor))
                .map(|_| None)
        })
        .flatten()
    }

    /// Resolves the target name of a method reference through the hierarchy.
    ///
    /// Overriding methods take the name mapped on the nearest supertype.
    /// Constructors and static initializers are never renamed.
    pub fn resolve_method<'i>(
        &self,
        index: &'i MappingIndex,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<&'i str> {
        if name.starts_with('<') {
            return None;
        }
        let is_private = |class: &str| {
            self.get(class)
                .and_then(|c| c.method(name, descriptor))
                .is_some_and(|m| m.access.is_private())
        };
        if is_private(owner) {
            return index.method(owner, name, descriptor);
        }
        // Private methods of supertypes are not inherited.
        self.walk(owner, |class| {
            if class != owner && is_private(class) {
                None
            } else {
                index.method(class, name, descriptor)
            }
        })
    }

    /// Finds the class declaring a field reachable from `owner`.
    pub fn declaring_field(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(&ClassInfo, &MemberInfo)> {
        self.walk(owner, |class| {
            let info = self.get(class)?;
            info.field(name, descriptor).map(|m| (info, m))
        })
    }

    /// Finds the class declaring a method reachable from `owner`.
    pub fn declaring_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(&ClassInfo, &MemberInfo)> {
        self.walk(owner, |class| {
            let info = self.get(class)?;
            info.method(name, descriptor).map(|m| (info, m))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassBuilder;
    use crate::mapping::MappingTable;

    const TABLE: &str = "tiny\t2\t0\tintermediary\tnamed\n\
c\ta\tcom/example/Base\n\
\tm\t()V\tb\trun\n\
\tf\tI\tc\tcount\n\
c\td\tcom/example/Child\n";

    fn hierarchy() -> ClassHierarchy {
        let base = ClassBuilder::new("a", Some("java/lang/Object"))
            .field(AccessFlags::PROTECTED, "c", "I")
            .method(AccessFlags::PUBLIC, "b", "()V", Vec::new())
            .build();
        let child = ClassBuilder::new("d", Some("a"))
            .field(AccessFlags::PRIVATE, "e", "I")
            .build();
        let shadow = ClassBuilder::new("s", Some("a"))
            .field(AccessFlags::PUBLIC, "c", "I")
            .method(AccessFlags::PUBLIC, "b", "()V", Vec::new())
            .build();
        ClassHierarchy::new(
            [base, child, shadow]
                .iter()
                .filter_map(ClassInfo::from_class),
        )
    }

    fn index() -> MappingIndex {
        let table = MappingTable::parse(TABLE).unwrap();
        MappingIndex::build(&table, "intermediary", "named").unwrap()
    }

    #[test]
    fn test_inherited_members_resolve() {
        let (h, idx) = (hierarchy(), index());
        assert_eq!(h.resolve_method(&idx, "d", "b", "()V"), Some("run"));
        assert_eq!(h.resolve_field(&idx, "d", "c", "I"), Some("count"));
        assert_eq!(h.resolve_field(&idx, "d", "e", "I"), None);
        assert_eq!(h.resolve_method(&idx, "d", "<init>", "()V"), None);
    }

    #[test]
    fn test_shadowing_field_stops_search() {
        let (h, idx) = (hierarchy(), index());
        assert_eq!(h.resolve_field(&idx, "s", "c", "I"), None);
    }

    #[test]
    fn test_override_takes_supertype_name() {
        let (h, idx) = (hierarchy(), index());
        assert_eq!(h.resolve_method(&idx, "s", "b", "()V"), Some("run"));
    }

    #[test]
    fn test_declaring_member() {
        let h = hierarchy();
        let (owner, field) = h.declaring_field("d", "c", "I").unwrap();
        assert_eq!(owner.name, "a");
        assert_eq!(field.access, AccessFlags::PROTECTED);
        assert!(h.declaring_method("d", "zz", "()V").is_none());
    }
}
