//! Package access widening.
//!
//! Renaming can move two classes that shared a package into different
//! packages. Package-private classes and members reached across such a split
//! are made public.

use std::collections::HashSet;

use rayon::prelude::*;

use super::hierarchy::ClassHierarchy;
use crate::classfile::{ClassFile, Constant};
use crate::mapping::{remap_class_name, ClassMapper, MemberKey};
use crate::util::package_of;

/// Classes and members whose access must be widened, keyed by source name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidenSet {
    classes: HashSet<String>,
    members: HashSet<MemberKey>,
}

impl WidenSet {
    /// Finds every package-private symbol that is referenced across a package split.
    pub fn analyze<M: ClassMapper + Sync + ?Sized>(
        classes: &[ClassFile],
        hierarchy: &ClassHierarchy,
        mapper: &M,
    ) -> Self {
        classes
            .par_iter()
            .map(|class| analyze_class(class, hierarchy, mapper))
            .reduce(WidenSet::default, WidenSet::merge)
    }

    /// Returns true if class `name` must become public.
    pub fn class(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    /// Returns true if the member must become public.
    pub fn member(&self, owner: &str, name: &str, descriptor: &str) -> bool {
        !self.members.is_empty()
            && self
                .members
                .contains(&MemberKey::new(owner, name, descriptor))
    }

    /// Number of widened symbols.
    pub fn len(&self) -> usize {
        self.classes.len() + self.members.len()
    }

    /// Returns true if nothing needs widening.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.members.is_empty()
    }

    fn merge(mut self, other: Self) -> Self {
        self.classes.extend(other.classes);
        self.members.extend(other.members);
        self
    }
}

fn analyze_class<M: ClassMapper + ?Sized>(
    class: &ClassFile,
    hierarchy: &ClassHierarchy,
    mapper: &M,
) -> WidenSet {
    let mut set = WidenSet::default();
    let Some(this) = class.name() else {
        return set;
    };
    let mapped_package = |name: &str| package_of(&remap_class_name(name, mapper)).to_string();
    let this_package = mapped_package(&this);

    for (index, entry) in class.pool.iter() {
        match entry {
            Constant::Class { .. } => {
                let Some(name) = class.pool.class_name(index) else {
                    continue;
                };
                let name = element_class(&name);
                if let Some(info) = hierarchy.get(name) {
                    if info.access.is_package_private() && mapped_package(name) != this_package {
                        set.classes.insert(name.to_string());
                    }
                }
            }
            Constant::Fieldref { .. }
            | Constant::Methodref { .. }
            | Constant::InterfaceMethodref { .. } => {
                let Some((owner, name, desc)) = class.pool.member_ref(index) else {
                    continue;
                };
                if owner.starts_with('[') {
                    continue;
                }
                let declaring = if matches!(entry, Constant::Fieldref { .. }) {
                    hierarchy.declaring_field(&owner, &name, &desc)
                } else {
                    hierarchy.declaring_method(&owner, &name, &desc)
                };
                if let Some((info, member)) = declaring {
                    if member.access.is_package_private()
                        && mapped_package(&info.name) != this_package
                    {
                        set.members
                            .insert(MemberKey::new(&info.name, &name, &desc));
                    }
                }
            }
            _ => {}
        }
    }
    set
}

/// Strips array dimensions from a class constant (`[[La/B;` -> `a/B`).
fn element_class(name: &str) -> &str {
    let element = name.trim_start_matches('[');
    if element.len() == name.len() {
        return name;
    }
    element
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{AccessFlags, ClassBuilder};
    use crate::remap::hierarchy::ClassInfo;
    use std::collections::HashMap;

    fn mapper() -> HashMap<String, String> {
        HashMap::from([
            ("a".to_string(), "com/example/api/Api".to_string()),
            ("b".to_string(), "com/example/impl/Helper".to_string()),
        ])
    }

    #[test]
    fn test_split_package_widens_referenced_symbols() {
        let helper = ClassBuilder::new("b", Some("java/lang/Object"))
            .access(AccessFlags::SUPER)
            .method(AccessFlags::STATIC, "c", "()V", Vec::new())
            .method(AccessFlags::PRIVATE, "d", "()V", Vec::new())
            .build();
        let mut api = ClassBuilder::new("a", Some("java/lang/Object"));
        api.member_ref(true, "b", "c", "()V");
        api.member_ref(true, "b", "d", "()V");
        api.class_ref("[Lb;");
        let api = api.build();

        let classes = vec![api, helper];
        let hierarchy = ClassHierarchy::new(classes.iter().filter_map(ClassInfo::from_class));
        let set = WidenSet::analyze(&classes, &hierarchy, &mapper());

        assert!(set.class("b"));
        assert!(set.member("b", "c", "()V"));
        assert!(!set.member("b", "d", "()V"));
        assert!(!set.class("a"));
    }

    #[test]
    fn test_same_package_needs_nothing() {
        let helper = ClassBuilder::new("b", None)
            .access(AccessFlags::SUPER)
            .build();
        let mut api = ClassBuilder::new("a", None);
        api.class_ref("b");
        let classes = vec![api.build(), helper];
        let hierarchy = ClassHierarchy::new(classes.iter().filter_map(ClassInfo::from_class));

        let set = WidenSet::analyze(&classes, &hierarchy, &HashMap::<String, String>::new());
        assert!(set.is_empty());
    }

    #[test]
    fn test_element_class() {
        assert_eq!(element_class("[[La/B;"), "a/B");
        assert_eq!(element_class("[I"), "I");
        assert_eq!(element_class("a/B"), "a/B");
    }
}
