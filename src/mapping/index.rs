//! Lookup tables built from a [`MappingTable`] for one remapping direction.
//!
//! The index is built once and then shared read-only by every remapping
//! worker. Keys are always in the source namespace, including member
//! descriptors, which the table stores in its first namespace and which are
//! translated here.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use super::descriptor::{remap_descriptor, ClassMapper};
use super::tiny::MappingTable;
use crate::error::Result;

/// A member identified by owner, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    /// Internal name of the declaring class
    pub owner: String,
    /// Member name
    pub name: String,
    /// Member descriptor
    pub descriptor: String,
}

impl MemberKey {
    /// Creates a key from borrowed parts.
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// A problem found while building the index or remapping classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// One class is mapped to two different names.
    DuplicateClass {
        /// Source name
        name: String,
        /// Target kept
        kept: String,
        /// Target ignored
        ignored: String,
    },
    /// One member is mapped to two different names.
    DuplicateMember {
        /// Source member
        member: MemberKey,
        /// Target name kept
        kept: String,
        /// Target name ignored
        ignored: String,
    },
    /// Two members of one class end up with the same name and descriptor.
    NameClash {
        /// Target class
        class: String,
        /// Target name and descriptor
        target: String,
        /// Source names of the clashing members
        sources: (String, String),
    },
    /// Two classes end up with the same name or output entry.
    DuplicateTarget {
        /// Shared target
        target: String,
        /// Source names that collide
        sources: (String, String),
    },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::DuplicateClass {
                name,
                kept,
                ignored,
            } => write!(f, "class {name} mapped to both {kept} and {ignored}"),
            Conflict::DuplicateMember {
                member,
                kept,
                ignored,
            } => write!(f, "member {member} mapped to both {kept} and {ignored}"),
            Conflict::NameClash {
                class,
                target,
                sources,
            } => write!(
                f,
                "{} and {} both become {class}.{target}",
                sources.0, sources.1
            ),
            Conflict::DuplicateTarget { target, sources } => {
                write!(f, "{} and {} both become {target}", sources.0, sources.1)
            }
        }
    }
}

/// Column-to-column class renames used while building the index.
struct ColumnMapper<'a>(&'a HashMap<&'a str, &'a str>);

impl ClassMapper for ColumnMapper<'_> {
    fn map_class(&self, name: &str) -> Option<Cow<'_, str>> {
        self.0.get(name).map(|s| Cow::Borrowed(*s))
    }
}

/// Read-only rename tables for one direction of a mapping table.
#[derive(Debug, Clone, Default)]
pub struct MappingIndex {
    from: String,
    to: String,
    classes: HashMap<String, String>,
    fields: HashMap<MemberKey, String>,
    fields_by_name: HashMap<(String, String), String>,
    methods: HashMap<MemberKey, String>,
    no_arg_methods: HashMap<(String, String), String>,
    conflicts: Vec<Conflict>,
}

impl MappingIndex {
    /// Builds the index mapping namespace `from` onto namespace `to`.
    pub fn build(table: &MappingTable, from: &str, to: &str) -> Result<Self> {
        let from_ns = table.namespace_index(from)?;
        let to_ns = table.namespace_index(to)?;

        // Member descriptors are written in the first namespace.
        let first_to_from: HashMap<&str, &str> = table
            .classes
            .iter()
            .map(|c| (c.name(0), c.name(from_ns)))
            .collect();
        let desc_mapper = ColumnMapper(&first_to_from);

        let mut index = Self {
            from: from.to_string(),
            to: to.to_string(),
            ..Default::default()
        };

        for class in &table.classes {
            let src = class.name(from_ns);
            let dst = class.name(to_ns);
            index.insert_class(src, dst);

            for field in &class.fields {
                let desc = remap_descriptor(&field.descriptor, &desc_mapper);
                let key = MemberKey::new(src, field.name(from_ns), &desc);
                let target = field.name(to_ns);
                index
                    .fields_by_name
                    .entry((key.owner.clone(), key.name.clone()))
                    .or_insert_with(|| target.to_string());
                index.insert_member(true, key, target);
            }
            for method in &class.methods {
                let desc = remap_descriptor(&method.descriptor, &desc_mapper);
                let key = MemberKey::new(src, method.name(from_ns), &desc);
                let target = method.name(to_ns);
                if desc.starts_with("()") {
                    index
                        .no_arg_methods
                        .entry((key.owner.clone(), key.name.clone()))
                        .or_insert_with(|| target.to_string());
                }
                index.insert_member(false, key, target);
            }
        }

        index.check_class_targets();

        debug!(
            from,
            to,
            classes = index.classes.len(),
            fields = index.fields.len(),
            methods = index.methods.len(),
            "built mapping index"
        );
        Ok(index)
    }

    fn insert_class(&mut self, src: &str, dst: &str) {
        match self.classes.get(src) {
            Some(existing) if existing != dst => {
                let conflict = Conflict::DuplicateClass {
                    name: src.to_string(),
                    kept: existing.clone(),
                    ignored: dst.to_string(),
                };
                warn!("{conflict}");
                self.conflicts.push(conflict);
            }
            Some(_) => {}
            None => {
                self.classes.insert(src.to_string(), dst.to_string());
            }
        }
    }

    /// Records every pair of classes renamed onto the same target.
    fn check_class_targets(&mut self) {
        let mut renames: Vec<(&String, &String)> =
            self.classes.iter().map(|(src, dst)| (dst, src)).collect();
        renames.sort();

        let clashes: Vec<Conflict> = renames
            .windows(2)
            .filter(|pair| pair[0].0 == pair[1].0)
            .map(|pair| Conflict::DuplicateTarget {
                target: pair[0].0.clone(),
                sources: (pair[0].1.clone(), pair[1].1.clone()),
            })
            .collect();
        for conflict in &clashes {
            warn!("{conflict}");
        }
        self.conflicts.extend(clashes);
    }

    fn insert_member(&mut self, field: bool, key: MemberKey, target: &str) {
        let table = if field {
            &mut self.fields
        } else {
            &mut self.methods
        };
        match table.get(&key) {
            Some(existing) if existing != target => {
                let conflict = Conflict::DuplicateMember {
                    member: key,
                    kept: existing.clone(),
                    ignored: target.to_string(),
                };
                warn!("{conflict}");
                self.conflicts.push(conflict);
            }
            Some(_) => {}
            None => {
                table.insert(key, target.to_string());
            }
        }
    }

    /// Source namespace label.
    pub fn from_namespace(&self) -> &str {
        &self.from
    }

    /// Target namespace label.
    pub fn to_namespace(&self) -> &str {
        &self.to
    }

    /// Number of class rows.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of field and method rows.
    pub fn member_count(&self) -> usize {
        self.fields.len() + self.methods.len()
    }

    /// Conflicts found while building.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Returns true if `name` has a class row of its own.
    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Returns the target name of a field declared exactly on `owner`.
    ///
    /// Falls back to a name-only match when the descriptor differs.
    pub fn field(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        let key = MemberKey::new(owner, name, descriptor);
        self.fields
            .get(&key)
            .or_else(|| {
                self.fields_by_name
                    .get(&(owner.to_string(), name.to_string()))
            })
            .map(String::as_str)
    }

    /// Returns the target name of a method declared exactly on `owner`.
    pub fn method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.methods
            .get(&MemberKey::new(owner, name, descriptor))
            .map(String::as_str)
    }

    /// Returns the target name of a no-argument method, whatever its return type.
    ///
    /// Annotation elements are referenced by name only.
    pub fn annotation_element(&self, owner: &str, name: &str) -> Option<&str> {
        self.no_arg_methods
            .get(&(owner.to_string(), name.to_string()))
            .map(String::as_str)
    }
}

impl ClassMapper for MappingIndex {
    /// Maps a class name, deriving nested class names from their outer class.
    fn map_class(&self, name: &str) -> Option<Cow<'_, str>> {
        if let Some(mapped) = self.classes.get(name) {
            return Some(Cow::Borrowed(mapped.as_str()));
        }
        let split = name.rfind('$')?;
        let (outer, suffix) = name.split_at(split);
        let mapped_outer = self.map_class(outer)?;
        Some(Cow::Owned(format!("{mapped_outer}{suffix}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "tiny\t2\t0\tnamed\tintermediary\n\
c\tnet/minecraft/world/Level\ta\n\
\tf\tLnet/minecraft/world/Level;\tparent\tb\n\
\tm\t(Lnet/minecraft/world/Level;)V\ttick\tc\n\
\tm\t()I\tsize\td\n\
c\tnet/minecraft/world/Entity\tb\n\
c\tnet/minecraft/world/Other\ta\n";

    fn index() -> MappingIndex {
        let table = MappingTable::parse(TABLE).unwrap();
        MappingIndex::build(&table, "intermediary", "named").unwrap()
    }

    #[test]
    fn test_descriptors_keyed_in_source_namespace() {
        let index = index();
        assert_eq!(index.method("a", "c", "(La;)V"), Some("tick"));
        assert_eq!(index.field("a", "b", "La;"), Some("parent"));
        assert_eq!(index.field("a", "b", "I"), Some("parent"));
        assert_eq!(index.method("a", "c", "(Lnet/minecraft/world/Level;)V"), None);
        assert_eq!(index.annotation_element("a", "d"), Some("size"));
    }

    #[test]
    fn test_duplicate_class_is_recorded() {
        let index = index();
        assert_eq!(index.map_class("a").unwrap(), "net/minecraft/world/Level");
        assert!(matches!(
            &index.conflicts()[0],
            Conflict::DuplicateClass { name, .. } if name == "a"
        ));
    }

    #[test]
    fn test_shared_target_is_recorded() {
        let table = MappingTable::parse(
            "tiny\t2\t0\tintermediary\tnamed\n\
c\tclass_1\tcom/example/Level\n\
c\tclass_2\tcom/example/Level\n\
c\tclass_3\tcom/example/Entity\n",
        )
        .unwrap();
        let index = MappingIndex::build(&table, "intermediary", "named").unwrap();

        assert_eq!(
            index.conflicts(),
            &[Conflict::DuplicateTarget {
                target: "com/example/Level".to_string(),
                sources: ("class_1".to_string(), "class_2".to_string()),
            }]
        );
    }

    #[test]
    fn test_inner_class_fallback() {
        let index = index();
        assert_eq!(
            index.map_class("a$1").unwrap(),
            "net/minecraft/world/Level$1"
        );
        assert_eq!(
            index.map_class("b$Inner$2").unwrap(),
            "net/minecraft/world/Entity$Inner$2"
        );
        assert!(index.map_class("zz$1").is_none());
        assert!(index.map_class("java/lang/Object").is_none());
    }

    #[test]
    fn test_unknown_namespace_fails() {
        let table = MappingTable::parse(TABLE).unwrap();
        assert!(MappingIndex::build(&table, "spigot", "named").is_err());
    }
}
