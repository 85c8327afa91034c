//! Remapping of a single class file.
//!
//! The output pool starts as a copy of the input pool. Entries are never
//! removed or reordered, so every index held by bytecode stays valid;
//! renamed strings are appended and the entries referring to them are
//! repointed.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::warn;

use super::context::RemapContext;
use crate::classfile::{
    ClassFile, Constant, ConstantPool, Member, ATTR_BOOTSTRAP_METHODS, LAMBDA_METAFACTORY,
};
use crate::error::{Error, Result};
use crate::mapping::descriptor::{object_type, return_type};
use crate::mapping::{remap_class_name, remap_descriptor, Conflict};
use crate::util::ByteReader;

/// Why a class or attribute could not be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Fault {
    /// The input does not have the expected structure.
    Malformed(&'static str),
    /// The constant pool has no room for a new entry.
    Overflow,
}

pub(super) type FaultResult<T> = std::result::Result<T, Fault>;

pub(super) const TRUNCATED: Fault = Fault::Malformed("truncated attribute");

/// A rewritten class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemappedClass {
    /// Internal name before remapping
    pub source_name: String,
    /// Internal name after remapping
    pub name: String,
    /// Serialized class file
    pub bytes: Vec<u8>,
    /// Member name clashes found in this class
    pub conflicts: Vec<Conflict>,
}

impl RemappedClass {
    /// Returns true if the class itself was renamed.
    pub fn renamed(&self) -> bool {
        self.source_name != self.name
    }
}

/// Rewrites one class against a shared [`RemapContext`].
pub struct ClassRemapper<'a> {
    pub(super) ctx: RemapContext<'a>,
    pub(super) src: &'a ConstantPool,
    pub(super) out: ConstantPool,
    pub(super) this_name: String,
    pub(super) mapped_name: String,
    bootstrap: Vec<(u16, Vec<u16>)>,
    conflicts: Vec<Conflict>,
}

impl<'a> ClassRemapper<'a> {
    /// Remaps `class`. `origin` names the input in error messages.
    pub fn remap(
        ctx: RemapContext<'a>,
        class: &'a ClassFile,
        origin: &str,
    ) -> Result<RemappedClass> {
        let this_name = class
            .name()
            .ok_or_else(|| Error::class_file(origin, 0, "this_class is not a class constant"))?
            .into_owned();
        let mapped_name = remap_class_name(&this_name, &ctx).into_owned();

        let remapper = ClassRemapper {
            ctx,
            src: &class.pool,
            out: class.pool.clone(),
            this_name: this_name.clone(),
            mapped_name,
            bootstrap: bootstrap_methods(class),
            conflicts: Vec::new(),
        };
        remapper.run(class).map_err(|fault| match fault {
            Fault::Overflow => Error::ConstantPoolOverflow { class: this_name },
            Fault::Malformed(reason) => Error::class_file(origin, 0, reason),
        })
    }

    fn run(mut self, class: &ClassFile) -> FaultResult<RemappedClass> {
        self.remap_pool()?;
        let fields = self.remap_members(&class.fields, false)?;
        let methods = self.remap_members(&class.methods, true)?;
        let attributes = self.remap_attributes(&class.attributes)?;

        let access = if self.ctx.widen.class(&self.this_name) {
            class.access.widened()
        } else {
            class.access
        };

        let remapped = ClassFile {
            minor_version: class.minor_version,
            major_version: class.major_version,
            pool: self.out,
            access,
            this_class: class.this_class,
            super_class: class.super_class,
            interfaces: class.interfaces.clone(),
            fields,
            methods,
            attributes,
        };

        Ok(RemappedClass {
            source_name: self.this_name,
            name: self.mapped_name,
            bytes: remapped.to_bytes(),
            conflicts: self.conflicts,
        })
    }

    pub(super) fn utf8(&mut self, value: &str) -> FaultResult<u16> {
        self.out.intern_utf8(value).ok_or(Fault::Overflow)
    }

    pub(super) fn name_and_type(&mut self, name: &str, descriptor: &str) -> FaultResult<u16> {
        self.out
            .intern_name_and_type(name, descriptor)
            .ok_or(Fault::Overflow)
    }

    // =========================================================================
    // Constant pool
    // =========================================================================

    fn remap_pool(&mut self) -> FaultResult<()> {
        let src = self.src;
        let ctx = self.ctx;

        for (index, entry) in src.iter() {
            let replacement = match *entry {
                Constant::Class { name } => {
                    let Some(old) = src.utf8(name) else {
                        continue;
                    };
                    match remap_class_name(&old, &ctx) {
                        Cow::Owned(new) => Some(Constant::Class {
                            name: self.utf8(&new)?,
                        }),
                        Cow::Borrowed(_) => None,
                    }
                }
                Constant::Fieldref { class, .. } => self
                    .member_ref(index, false)?
                    .map(|name_and_type| Constant::Fieldref {
                        class,
                        name_and_type,
                    }),
                Constant::Methodref { class, .. } => self
                    .member_ref(index, true)?
                    .map(|name_and_type| Constant::Methodref {
                        class,
                        name_and_type,
                    }),
                Constant::InterfaceMethodref { class, .. } => self
                    .member_ref(index, true)?
                    .map(|name_and_type| Constant::InterfaceMethodref {
                        class,
                        name_and_type,
                    }),
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    let lambda = src
                        .name_and_type(name_and_type)
                        .and_then(|(name, desc)| self.lambda_target(bootstrap, &name, &desc));
                    self.retype(name_and_type, lambda)?
                        .map(|name_and_type| Constant::InvokeDynamic {
                            bootstrap,
                            name_and_type,
                        })
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => self
                    .retype(name_and_type, None)?
                    .map(|name_and_type| Constant::Dynamic {
                        bootstrap,
                        name_and_type,
                    }),
                Constant::MethodType { descriptor } => {
                    let Some(old) = src.utf8(descriptor) else {
                        continue;
                    };
                    match remap_descriptor(&old, &ctx) {
                        Cow::Owned(new) => Some(Constant::MethodType {
                            descriptor: self.utf8(&new)?,
                        }),
                        Cow::Borrowed(_) => None,
                    }
                }
                _ => None,
            };

            if let Some(constant) = replacement {
                if let Some(slot) = self.out.get_mut(index) {
                    *slot = constant;
                }
            }
        }
        Ok(())
    }

    /// Returns the new `NameAndType` for a field or method reference, if it changes.
    fn member_ref(&mut self, index: u16, method: bool) -> FaultResult<Option<u16>> {
        let src = self.src;
        let ctx = self.ctx;
        let Some((owner, name, desc)) = src.member_ref(index) else {
            return Ok(None);
        };

        // Array types only inherit from Object.
        let new_name = if owner.starts_with('[') {
            None
        } else if method {
            ctx.resolve_method(&owner, &name, &desc)
        } else {
            ctx.resolve_field(&owner, &name, &desc)
        };
        let new_desc = remap_descriptor(&desc, &ctx);
        if new_name.is_none() && matches!(new_desc, Cow::Borrowed(_)) {
            return Ok(None);
        }
        self.name_and_type(new_name.unwrap_or(&name), &new_desc)
            .map(Some)
    }

    /// Returns a `NameAndType` with the descriptor remapped and optionally a new name.
    fn retype(&mut self, name_and_type: u16, new_name: Option<&str>) -> FaultResult<Option<u16>> {
        let src = self.src;
        let ctx = self.ctx;
        let Some((name, desc)) = src.name_and_type(name_and_type) else {
            return Ok(None);
        };
        let new_desc = remap_descriptor(&desc, &ctx);
        if new_name.is_none() && matches!(new_desc, Cow::Borrowed(_)) {
            return Ok(None);
        }
        self.name_and_type(new_name.unwrap_or(&name), &new_desc)
            .map(Some)
    }

    /// Resolves the interface method a `LambdaMetafactory` call site implements.
    fn lambda_target(&self, bootstrap: u16, name: &str, desc: &str) -> Option<&'a str> {
        let (handle, args) = self.bootstrap.get(bootstrap as usize)?;
        let owner = match *self.src.get(*handle)? {
            Constant::MethodHandle { reference, .. } => self.src.member_ref(reference)?.0,
            _ => return None,
        };
        if owner != LAMBDA_METAFACTORY {
            return None;
        }

        let interface = object_type(return_type(desc)?)?;
        let sam = match *self.src.get(*args.first()?)? {
            Constant::MethodType { descriptor } => self.src.utf8(descriptor)?,
            _ => return None,
        };
        self.ctx.resolve_method(interface, name, &sam)
    }

    // =========================================================================
    // Declared members
    // =========================================================================

    fn remap_members(&mut self, members: &[Member], methods: bool) -> FaultResult<Vec<Member>> {
        let src = self.src;
        let ctx = self.ctx;
        let this = self.this_name.clone();
        let mut targets: HashMap<(String, String), String> = HashMap::new();
        let mut remapped = Vec::with_capacity(members.len());

        for member in members {
            let name = src
                .utf8(member.name)
                .ok_or(Fault::Malformed("member name is not a UTF-8 constant"))?;
            let desc = src
                .utf8(member.descriptor)
                .ok_or(Fault::Malformed("member descriptor is not a UTF-8 constant"))?;

            let new_name = if methods {
                ctx.resolve_method(&this, &name, &desc)
            } else {
                ctx.resolve_field(&this, &name, &desc)
            };
            let new_desc = remap_descriptor(&desc, &ctx);

            let mut out = Member {
                access: member.access,
                name: member.name,
                descriptor: member.descriptor,
                attributes: self.remap_attributes(&member.attributes)?,
            };
            if let Some(new_name) = new_name {
                out.name = self.utf8(new_name)?;
            }
            if let Cow::Owned(new_desc) = &new_desc {
                out.descriptor = self.utf8(new_desc)?;
            }
            if ctx.widen.member(&this, &name, &desc) {
                out.access = member.access.widened();
            }

            let target = (new_name.unwrap_or(&name).to_string(), new_desc.into_owned());
            if let Some(previous) = targets.insert(target.clone(), name.to_string()) {
                let conflict = Conflict::NameClash {
                    class: self.mapped_name.clone(),
                    target: format!("{}{}", target.0, target.1),
                    sources: (previous, name.into_owned()),
                };
                warn!("Name clash: {}", conflict);
                self.conflicts.push(conflict);
            }
            remapped.push(out);
        }
        Ok(remapped)
    }
}

/// Reads `(method handle, arguments)` pairs from the `BootstrapMethods` attribute.
fn bootstrap_methods(class: &ClassFile) -> Vec<(u16, Vec<u16>)> {
    let Some(attr) = class
        .attributes
        .iter()
        .find(|a| class.attribute_name(a).as_deref() == Some(ATTR_BOOTSTRAP_METHODS))
    else {
        return Vec::new();
    };

    let mut r = ByteReader::new(&attr.data);
    let mut methods = Vec::new();
    let Some(count) = r.u16() else {
        return methods;
    };
    for _ in 0..count {
        let (Some(handle), Some(arg_count)) = (r.u16(), r.u16()) else {
            break;
        };
        let args: Option<Vec<u16>> = (0..arg_count).map(|_| r.u16()).collect();
        let Some(args) = args else {
            break;
        };
        methods.push((handle, args));
    }
    methods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{AccessFlags, Attribute, ClassBuilder, REF_INVOKE_STATIC};
    use crate::mapping::{MappingIndex, MappingTable};
    use crate::remap::access::WidenSet;
    use crate::remap::engine::RemapOptions;
    use crate::remap::hierarchy::{ClassHierarchy, ClassInfo};
    use crate::util::put_u16;

    const TABLE: &str = "tiny\t2\t0\tintermediary\tnamed\n\
c\tnet/minecraft/class_1\tnet/minecraft/world/Level\n\
\tf\tI\tfield_1\tseaLevel\n\
\tm\t(Lnet/minecraft/class_1;)V\tmethod_1\tsetNeighbor\n\
c\tnet/minecraft/class_2\tnet/minecraft/world/Tickable\n\
\tm\t()V\tmethod_2\ttick\n";

    fn index() -> MappingIndex {
        MappingIndex::build(&MappingTable::parse(TABLE).unwrap(), "intermediary", "named").unwrap()
    }

    fn remap(classes: &[ClassFile], target: usize) -> RemappedClass {
        let index = index();
        let hierarchy = ClassHierarchy::new(classes.iter().filter_map(ClassInfo::from_class));
        let widen = WidenSet::default();
        let options = RemapOptions::default();
        let ctx = RemapContext {
            index: &index,
            hierarchy: &hierarchy,
            widen: &widen,
            options: &options,
        };
        ClassRemapper::remap(ctx, &classes[target], "test.class").unwrap()
    }

    fn level() -> ClassFile {
        ClassBuilder::new("net/minecraft/class_1", Some("java/lang/Object"))
            .field(AccessFlags::PUBLIC, "field_1", "I")
            .method(
                AccessFlags::PUBLIC,
                "method_1",
                "(Lnet/minecraft/class_1;)V",
                Vec::new(),
            )
            .build()
    }

    #[test]
    fn test_declared_members_and_name_are_renamed() {
        let out = remap(&[level()], 0);
        assert!(out.renamed());
        assert_eq!(out.name, "net/minecraft/world/Level");

        let class = ClassFile::parse(&out.bytes, "out").unwrap();
        assert_eq!(class.name().unwrap(), "net/minecraft/world/Level");
        assert_eq!(class.pool.utf8(class.fields[0].name).unwrap(), "seaLevel");
        assert_eq!(class.pool.utf8(class.methods[0].name).unwrap(), "setNeighbor");
        assert_eq!(
            class.pool.utf8(class.methods[0].descriptor).unwrap(),
            "(Lnet/minecraft/world/Level;)V"
        );
    }

    #[test]
    fn test_references_are_repointed_without_moving_indices() {
        let mut user = ClassBuilder::new("com/example/User", Some("java/lang/Object"));
        let field_ref = user.member_ref(false, "net/minecraft/class_1", "field_1", "I");
        let method_ref = user.member_ref(
            true,
            "net/minecraft/class_1",
            "method_1",
            "(Lnet/minecraft/class_1;)V",
        );
        // A string constant sharing the obfuscated text must not change.
        let string_utf8 = user.utf8("field_1");
        let user = user.build();
        let original_len = user.pool.len();

        let out = remap(&[level(), user], 1);
        assert!(!out.renamed());
        let class = ClassFile::parse(&out.bytes, "out").unwrap();

        let (owner, name, desc) = class.pool.member_ref(field_ref).unwrap();
        assert_eq!(owner, "net/minecraft/world/Level");
        assert_eq!(name, "seaLevel");
        assert_eq!(desc, "I");
        let (_, name, desc) = class.pool.member_ref(method_ref).unwrap();
        assert_eq!(name, "setNeighbor");
        assert_eq!(desc, "(Lnet/minecraft/world/Level;)V");
        assert_eq!(class.pool.utf8(string_utf8).unwrap(), "field_1");
        assert!(class.pool.len() > original_len);
    }

    #[test]
    fn test_lambda_interface_method_is_renamed() {
        let mut builder = ClassBuilder::new("com/example/Lambdas", Some("java/lang/Object"));
        let factory = builder.member_ref(
            true,
            LAMBDA_METAFACTORY,
            "metafactory",
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
        );
        let mut class = builder.build();
        let handle = class
            .pool
            .append(Constant::MethodHandle {
                kind: REF_INVOKE_STATIC,
                reference: factory,
            })
            .unwrap();
        let sam_desc = class.pool.intern_utf8("()V").unwrap();
        let sam = class
            .pool
            .append(Constant::MethodType {
                descriptor: sam_desc,
            })
            .unwrap();
        let nat = class
            .pool
            .intern_name_and_type("method_2", "()Lnet/minecraft/class_2;")
            .unwrap();
        let indy = class
            .pool
            .append(Constant::InvokeDynamic {
                bootstrap: 0,
                name_and_type: nat,
            })
            .unwrap();
        let mut bsm = Vec::new();
        put_u16(&mut bsm, 1);
        put_u16(&mut bsm, handle);
        put_u16(&mut bsm, 1);
        put_u16(&mut bsm, sam);
        let bsm_name = class.pool.intern_utf8(ATTR_BOOTSTRAP_METHODS).unwrap();
        class.attributes.push(Attribute {
            name: bsm_name,
            data: bsm,
        });

        let tickable = ClassBuilder::new("net/minecraft/class_2", Some("java/lang/Object"))
            .access(AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT)
            .method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "method_2", "()V", Vec::new())
            .build();

        let out = remap(&[class, tickable], 0);
        let parsed = ClassFile::parse(&out.bytes, "out").unwrap();
        let Some(Constant::InvokeDynamic { name_and_type, .. }) = parsed.pool.get(indy) else {
            panic!("invokedynamic entry moved");
        };
        let (name, desc) = parsed.pool.name_and_type(*name_and_type).unwrap();
        assert_eq!(name, "tick");
        assert_eq!(desc, "()Lnet/minecraft/world/Tickable;");
    }

    #[test]
    fn test_name_clash_is_reported() {
        let table = "tiny\t2\t0\tintermediary\tnamed\n\
c\ta\tcom/example/A\n\
\tf\tI\tb\tvalue\n\
\tf\tI\tc\tvalue\n";
        let index =
            MappingIndex::build(&MappingTable::parse(table).unwrap(), "intermediary", "named")
                .unwrap();
        let class = ClassBuilder::new("a", Some("java/lang/Object"))
            .field(AccessFlags::PRIVATE, "b", "I")
            .field(AccessFlags::PRIVATE, "c", "I")
            .build();
        let hierarchy = ClassHierarchy::new(ClassInfo::from_class(&class));
        let widen = WidenSet::default();
        let options = RemapOptions::default();
        let ctx = RemapContext {
            index: &index,
            hierarchy: &hierarchy,
            widen: &widen,
            options: &options,
        };

        let out = ClassRemapper::remap(ctx, &class, "a.class").unwrap();
        assert_eq!(out.conflicts.len(), 1);
        assert!(matches!(&out.conflicts[0], Conflict::NameClash { class, .. } if class == "com/example/A"));
    }
}
