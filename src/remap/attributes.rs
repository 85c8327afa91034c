//! Attribute rewriting.
//!
//! Every rewrite replaces a constant pool index in place, so attribute
//! lengths never change. `Code` and `Record` hold nested attribute tables and
//! are re-serialized around them.

use std::borrow::Cow;
use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

use super::class::{ClassRemapper, Fault, FaultResult, TRUNCATED};
use super::locals::{is_valid_local_name, LocalNamer};
use crate::classfile::*;
use crate::mapping::descriptor::object_type;
use crate::mapping::{remap_class_name, remap_descriptor, remap_signature};
use crate::util::{basename, patch_u16, put_u16, ByteReader};

/// Reads an attribute payload while allowing index patches behind the cursor.
struct Patcher<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> Patcher<'b> {
    fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self) -> FaultResult<u8> {
        let value = *self.buf.get(self.pos).ok_or(TRUNCATED)?;
        self.pos += 1;
        Ok(value)
    }

    fn u16(&mut self) -> FaultResult<u16> {
        let bytes = self.buf.get(self.pos..self.pos + 2).ok_or(TRUNCATED)?;
        self.pos += 2;
        Ok(BigEndian::read_u16(bytes))
    }

    fn skip(&mut self, len: usize) -> FaultResult<()> {
        if self.pos + len > self.buf.len() {
            return Err(TRUNCATED);
        }
        self.pos += len;
        Ok(())
    }

    fn set(&mut self, offset: usize, value: u16) {
        patch_u16(self.buf, offset, value);
    }
}

/// How a UTF-8 constant referenced from an attribute is rewritten.
#[derive(Clone, Copy)]
enum Text {
    Descriptor,
    Signature,
}

/// Local variable renames keyed by `(start_pc, length, slot)`.
type LocalRenames = HashMap<(u16, u16, u16), u16>;

impl ClassRemapper<'_> {
    /// Rewrites an attribute table. Malformed attributes are kept as they are.
    pub(super) fn remap_attributes(
        &mut self,
        attributes: &[Attribute],
    ) -> FaultResult<Vec<Attribute>> {
        let mut locals = LocalRenames::new();
        attributes
            .iter()
            .map(|attr| self.remap_attribute(attr, &mut locals))
            .collect()
    }

    fn remap_attribute(
        &mut self,
        attr: &Attribute,
        locals: &mut LocalRenames,
    ) -> FaultResult<Attribute> {
        let src = self.src;
        let Some(kind) = src.utf8(attr.name) else {
            return Ok(attr.clone());
        };

        let mut data = attr.data.clone();
        let result = match &*kind {
            ATTR_SIGNATURE => self.rewrite_index(&mut Patcher::new(&mut data), Text::Signature),
            ATTR_SOURCE_FILE => self.source_file(&mut data),
            ATTR_INNER_CLASSES => self.inner_classes(&mut data),
            ATTR_ENCLOSING_METHOD => self.enclosing_method(&mut data),
            ATTR_CODE => self.code(&attr.data).map(|rebuilt| data = rebuilt),
            ATTR_RECORD => self.record(&attr.data).map(|rebuilt| data = rebuilt),
            ATTR_LOCAL_VARIABLE_TABLE => self.local_variables(&mut data, locals),
            ATTR_LOCAL_VARIABLE_TYPE_TABLE => self.local_variable_types(&mut data, locals),
            ATTR_ANNOTATION_DEFAULT => self.element_value(&mut Patcher::new(&mut data)),
            ATTR_RUNTIME_VISIBLE_ANNOTATIONS | ATTR_RUNTIME_INVISIBLE_ANNOTATIONS => {
                self.annotations(&mut Patcher::new(&mut data))
            }
            ATTR_RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            | ATTR_RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                let mut p = Patcher::new(&mut data);
                p.u8()
                    .and_then(|params| (0..params).try_for_each(|_| self.annotations(&mut p)))
            }
            ATTR_RUNTIME_VISIBLE_TYPE_ANNOTATIONS | ATTR_RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
                let mut p = Patcher::new(&mut data);
                p.u16()
                    .and_then(|count| (0..count).try_for_each(|_| self.type_annotation(&mut p)))
            }
            _ => return Ok(attr.clone()),
        };

        match result {
            Ok(()) => Ok(Attribute {
                name: attr.name,
                data,
            }),
            Err(Fault::Malformed(reason)) => {
                warn!(
                    "Leaving malformed {} attribute in {} unchanged: {}",
                    kind, self.this_name, reason
                );
                Ok(attr.clone())
            }
            Err(Fault::Overflow) => Err(Fault::Overflow),
        }
    }

    /// Rewrites the UTF-8 index under the cursor.
    fn rewrite_index(&mut self, p: &mut Patcher<'_>, text: Text) -> FaultResult<()> {
        let src = self.src;
        let ctx = self.ctx;
        let at = p.pos;
        let index = p.u16()?;
        let old = src
            .utf8(index)
            .ok_or(Fault::Malformed("expected a UTF-8 constant"))?;
        let new = match text {
            Text::Descriptor => remap_descriptor(&old, &ctx),
            Text::Signature => remap_signature(&old, &ctx),
        };
        if let Cow::Owned(new) = new {
            let index = self.utf8(&new)?;
            p.set(at, index);
        }
        Ok(())
    }

    // =========================================================================
    // Class structure
    // =========================================================================

    fn source_file(&mut self, data: &mut [u8]) -> FaultResult<()> {
        if !self.ctx.options.rebuild_source_filenames || self.mapped_name == self.this_name {
            return Ok(());
        }
        let src = self.src;
        let mut p = Patcher::new(data);
        let index = p.u16()?;
        let old = src.utf8(index).unwrap_or_default();
        let extension = old.rfind('.').map_or(".java", |dot| &old[dot..]);

        let top_level = basename(&self.mapped_name)
            .split('$')
            .next()
            .unwrap_or_default();
        let name = format!("{top_level}{extension}");
        if name != old {
            let index = self.utf8(&name)?;
            p.set(0, index);
        }
        Ok(())
    }

    fn inner_classes(&mut self, data: &mut [u8]) -> FaultResult<()> {
        let src = self.src;
        let ctx = self.ctx;
        let mut p = Patcher::new(data);
        let count = p.u16()?;

        for _ in 0..count {
            let inner = p.u16()?;
            let outer = p.u16()?;
            let name_at = p.pos;
            let inner_name = p.u16()?;
            let flags_at = p.pos;
            let flags = p.u16()?;

            let Some(inner_src) = src.class_name(inner) else {
                continue;
            };
            if ctx.widen.class(&inner_src) {
                let flags = AccessFlags::from_bits_retain(flags)
                    .difference(AccessFlags::PRIVATE | AccessFlags::PROTECTED)
                    | AccessFlags::PUBLIC;
                p.set(flags_at, flags.bits());
            }

            // Anonymous classes have no simple name.
            if inner_name == 0 {
                continue;
            }
            let Cow::Owned(mapped) = remap_class_name(&inner_src, &ctx) else {
                continue;
            };
            let after_outer = (outer != 0)
                .then(|| src.class_name(outer))
                .flatten()
                .and_then(|o| {
                    let mapped_outer = remap_class_name(&o, &ctx);
                    mapped
                        .strip_prefix(&*mapped_outer)
                        .and_then(|rest| rest.strip_prefix('$'))
                        .map(str::to_string)
                });
            let simple = after_outer.unwrap_or_else(|| {
                let base = basename(&mapped);
                base.rsplit('$').next().unwrap_or(base).to_string()
            });

            if src.utf8(inner_name).as_deref() != Some(simple.as_str()) {
                let index = self.utf8(&simple)?;
                p.set(name_at, index);
            }
        }
        Ok(())
    }

    fn enclosing_method(&mut self, data: &mut [u8]) -> FaultResult<()> {
        let src = self.src;
        let ctx = self.ctx;
        let mut p = Patcher::new(data);
        let class = p.u16()?;
        let method_at = p.pos;
        let method = p.u16()?;
        if method == 0 {
            return Ok(());
        }

        let owner = src
            .class_name(class)
            .ok_or(Fault::Malformed("enclosing class is not a class constant"))?;
        let (name, desc) = src
            .name_and_type(method)
            .ok_or(Fault::Malformed("enclosing method is not a name-and-type constant"))?;
        let new_name = ctx.resolve_method(&owner, &name, &desc);
        let new_desc = remap_descriptor(&desc, &ctx);
        if new_name.is_some() || matches!(new_desc, Cow::Owned(_)) {
            let index = self.name_and_type(new_name.unwrap_or(&name), &new_desc)?;
            p.set(method_at, index);
        }
        Ok(())
    }

    fn record(&mut self, data: &[u8]) -> FaultResult<Vec<u8>> {
        let src = self.src;
        let ctx = self.ctx;
        let this = self.this_name.clone();
        let mut r = ByteReader::new(data);
        let count = r.u16().ok_or(TRUNCATED)?;

        let mut out = Vec::with_capacity(data.len());
        put_u16(&mut out, count);
        for _ in 0..count {
            let name = r.u16().ok_or(TRUNCATED)?;
            let desc = r.u16().ok_or(TRUNCATED)?;
            let attributes = read_attribute_table(&mut r).ok_or(TRUNCATED)?;

            let old_name = src
                .utf8(name)
                .ok_or(Fault::Malformed("record component name is not a UTF-8 constant"))?;
            let old_desc = src
                .utf8(desc)
                .ok_or(Fault::Malformed("record component type is not a UTF-8 constant"))?;

            let name = match ctx.resolve_field(&this, &old_name, &old_desc) {
                Some(new) => self.utf8(new)?,
                None => name,
            };
            let desc = match remap_descriptor(&old_desc, &ctx) {
                Cow::Owned(new) => self.utf8(&new)?,
                Cow::Borrowed(_) => desc,
            };
            put_u16(&mut out, name);
            put_u16(&mut out, desc);
            let attributes = self.remap_attributes(&attributes)?;
            write_attributes(&mut out, &attributes);
        }
        Ok(out)
    }

    // =========================================================================
    // Code
    // =========================================================================

    fn code(&mut self, data: &[u8]) -> FaultResult<Vec<u8>> {
        let mut r = ByteReader::new(data);
        r.bytes(4).ok_or(TRUNCATED)?;
        let code_len = r.u32().ok_or(TRUNCATED)? as usize;
        r.bytes(code_len).ok_or(TRUNCATED)?;
        let handlers = r.u16().ok_or(TRUNCATED)? as usize;
        r.bytes(handlers * 8).ok_or(TRUNCATED)?;
        let head = r.offset();
        let attributes = read_attribute_table(&mut r).ok_or(TRUNCATED)?;

        // Type table entries take the names chosen for the matching variable table entries.
        let src = self.src;
        let is_lvt = |a: &Attribute| src.utf8(a.name).as_deref() == Some(ATTR_LOCAL_VARIABLE_TABLE);
        let mut locals = LocalRenames::new();
        let mut remapped = attributes.clone();
        for (slot, attr) in attributes.iter().enumerate().filter(|(_, a)| is_lvt(a)) {
            remapped[slot] = self.remap_attribute(attr, &mut locals)?;
        }
        for (slot, attr) in attributes.iter().enumerate().filter(|(_, a)| !is_lvt(a)) {
            remapped[slot] = self.remap_attribute(attr, &mut locals)?;
        }

        let mut out = data[..head].to_vec();
        write_attributes(&mut out, &remapped);
        Ok(out)
    }

    fn local_variables(&mut self, data: &mut [u8], locals: &mut LocalRenames) -> FaultResult<()> {
        let src = self.src;
        let ctx = self.ctx;
        let entries = read_local_entries(&mut Patcher::new(data))?;
        let mut p = Patcher::new(data);

        let names: Vec<Cow<'_, str>> = entries
            .iter()
            .map(|e| src.utf8(e.name).unwrap_or_default())
            .collect();
        let mut namer = LocalNamer::new(names.iter().map(|n| n.as_ref()));

        for (entry, name) in entries.iter().zip(&names) {
            let old_desc = src
                .utf8(entry.descriptor)
                .ok_or(Fault::Malformed("local variable type is not a UTF-8 constant"))?;
            let new_desc = remap_descriptor(&old_desc, &ctx);
            if let Cow::Owned(desc) = &new_desc {
                let index = self.utf8(desc)?;
                p.set(entry.descriptor_at, index);
            }

            if ctx.options.rename_invalid_locals && !is_valid_local_name(name) {
                let fresh = namer.fresh(&new_desc);
                let index = self.utf8(&fresh)?;
                p.set(entry.name_at, index);
                locals.insert((entry.start, entry.length, entry.slot), index);
            }
        }
        Ok(())
    }

    fn local_variable_types(&mut self, data: &mut [u8], locals: &LocalRenames) -> FaultResult<()> {
        let entries = read_local_entries(&mut Patcher::new(data))?;
        let mut p = Patcher::new(data);
        for entry in &entries {
            p.pos = entry.descriptor_at;
            self.rewrite_index(&mut p, Text::Signature)?;
            if let Some(&name) = locals.get(&(entry.start, entry.length, entry.slot)) {
                p.set(entry.name_at, name);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Annotations
    // =========================================================================

    fn annotations(&mut self, p: &mut Patcher<'_>) -> FaultResult<()> {
        let count = p.u16()?;
        (0..count).try_for_each(|_| self.annotation(p))
    }

    fn type_annotation(&mut self, p: &mut Patcher<'_>) -> FaultResult<()> {
        match p.u8()? {
            0x13..=0x15 => {}
            0x00 | 0x01 | 0x16 => p.skip(1)?,
            0x10..=0x12 | 0x17 | 0x42..=0x46 => p.skip(2)?,
            0x47..=0x4B => p.skip(3)?,
            0x40 | 0x41 => {
                let len = p.u16()? as usize;
                p.skip(len * 6)?;
            }
            _ => return Err(Fault::Malformed("unknown type annotation target")),
        }
        let path_len = p.u8()? as usize;
        p.skip(path_len * 2)?;
        self.annotation(p)
    }

    fn annotation(&mut self, p: &mut Patcher<'_>) -> FaultResult<()> {
        let src = self.src;
        let ctx = self.ctx;
        let type_at = p.pos;
        let type_index = p.u16()?;
        let type_desc = src
            .utf8(type_index)
            .ok_or(Fault::Malformed("annotation type is not a UTF-8 constant"))?;
        if let Cow::Owned(new) = remap_descriptor(&type_desc, &ctx) {
            let index = self.utf8(&new)?;
            p.set(type_at, index);
        }

        let owner = object_type(&type_desc);
        let pairs = p.u16()?;
        for _ in 0..pairs {
            let name_at = p.pos;
            let name_index = p.u16()?;
            if let Some(owner) = owner {
                let name = src
                    .utf8(name_index)
                    .ok_or(Fault::Malformed("element name is not a UTF-8 constant"))?;
                if let Some(new) = ctx.index.annotation_element(owner, &name) {
                    let index = self.utf8(new)?;
                    p.set(name_at, index);
                }
            }
            self.element_value(p)?;
        }
        Ok(())
    }

    fn element_value(&mut self, p: &mut Patcher<'_>) -> FaultResult<()> {
        match p.u8()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => p.skip(2),
            b'e' => {
                let src = self.src;
                let ctx = self.ctx;
                let type_at = p.pos;
                let type_index = p.u16()?;
                let name_at = p.pos;
                let name_index = p.u16()?;
                let type_desc = src
                    .utf8(type_index)
                    .ok_or(Fault::Malformed("enum type is not a UTF-8 constant"))?;
                let name = src
                    .utf8(name_index)
                    .ok_or(Fault::Malformed("enum constant is not a UTF-8 constant"))?;

                if let Some(new) = object_type(&type_desc)
                    .and_then(|owner| ctx.resolve_field(owner, &name, &type_desc))
                {
                    let index = self.utf8(new)?;
                    p.set(name_at, index);
                }
                if let Cow::Owned(new) = remap_descriptor(&type_desc, &ctx) {
                    let index = self.utf8(&new)?;
                    p.set(type_at, index);
                }
                Ok(())
            }
            b'c' => self.rewrite_index(p, Text::Descriptor),
            b'@' => self.annotation(p),
            b'[' => {
                let count = p.u16()?;
                (0..count).try_for_each(|_| self.element_value(p))
            }
            _ => Err(Fault::Malformed("unknown element value tag")),
        }
    }
}

/// One `LocalVariableTable` or `LocalVariableTypeTable` entry.
struct LocalEntry {
    start: u16,
    length: u16,
    name: u16,
    name_at: usize,
    descriptor: u16,
    descriptor_at: usize,
    slot: u16,
}

fn read_local_entries(p: &mut Patcher<'_>) -> FaultResult<Vec<LocalEntry>> {
    let count = p.u16()?;
    (0..count)
        .map(|_| {
            let start = p.u16()?;
            let length = p.u16()?;
            let name_at = p.pos;
            let name = p.u16()?;
            let descriptor_at = p.pos;
            let descriptor = p.u16()?;
            let slot = p.u16()?;
            Ok(LocalEntry {
                start,
                length,
                name,
                name_at,
                descriptor,
                descriptor_at,
                slot,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingIndex, MappingTable};
    use crate::remap::access::WidenSet;
    use crate::remap::context::RemapContext;
    use crate::remap::engine::RemapOptions;
    use crate::remap::hierarchy::{ClassHierarchy, ClassInfo};

    const TABLE: &str = "tiny\t2\t0\tintermediary\tnamed\n\
c\tnet/minecraft/class_1\tnet/minecraft/world/Level\n\
c\tnet/minecraft/class_1$class_3\tnet/minecraft/world/Level$Chunk\n\
c\tnet/minecraft/class_4\tnet/minecraft/world/Marker\n\
\tm\t()I\tmethod_4\tpriority\n\
c\tnet/minecraft/class_5\tnet/minecraft/world/Mode\n\
\tf\tLnet/minecraft/class_5;\tfield_5\tSURVIVAL\n";

    fn remap(class: &ClassFile) -> ClassFile {
        let index =
            MappingIndex::build(&MappingTable::parse(TABLE).unwrap(), "intermediary", "named")
                .unwrap();
        let hierarchy = ClassHierarchy::new(ClassInfo::from_class(class));
        let widen = WidenSet::default();
        let options = RemapOptions::default();
        let ctx = RemapContext {
            index: &index,
            hierarchy: &hierarchy,
            widen: &widen,
            options: &options,
        };
        let out = ClassRemapper::remap(ctx, class, "test.class").unwrap();
        ClassFile::parse(&out.bytes, "out").unwrap()
    }

    fn attribute<'c>(class: &'c ClassFile, attributes: &'c [Attribute], name: &str) -> &'c [u8] {
        &attributes
            .iter()
            .find(|a| class.pool.utf8(a.name).as_deref() == Some(name))
            .unwrap()
            .data
    }

    fn u16_at(data: &[u8], offset: usize) -> u16 {
        BigEndian::read_u16(&data[offset..])
    }

    #[test]
    fn test_signature_and_source_file() {
        let mut builder = ClassBuilder::new("net/minecraft/class_1", Some("java/lang/Object"));
        let sig = builder
            .utf8("Ljava/lang/Object;Ljava/util/function/Supplier<Lnet/minecraft/class_1;>;");
        let source = builder.utf8("class_1.java");
        let class = builder
            .attribute(ATTR_SIGNATURE, sig.to_be_bytes().to_vec())
            .attribute(ATTR_SOURCE_FILE, source.to_be_bytes().to_vec())
            .build();

        let out = remap(&class);
        let sig = attribute(&out, &out.attributes, ATTR_SIGNATURE);
        assert_eq!(
            out.pool.utf8(u16_at(sig, 0)).unwrap(),
            "Ljava/lang/Object;Ljava/util/function/Supplier<Lnet/minecraft/world/Level;>;"
        );
        let source = attribute(&out, &out.attributes, ATTR_SOURCE_FILE);
        assert_eq!(out.pool.utf8(u16_at(source, 0)).unwrap(), "Level.java");
    }

    #[test]
    fn test_source_file_of_nested_class_names_top_level() {
        let mut builder =
            ClassBuilder::new("net/minecraft/class_1$class_3", Some("java/lang/Object"));
        let source = builder.utf8("class_1.kt");
        let inner = builder.class_ref("net/minecraft/class_1$class_3");
        let outer = builder.class_ref("net/minecraft/class_1");
        let simple = builder.utf8("class_3");
        let mut inner_classes = Vec::new();
        for value in [1, inner, outer, simple, AccessFlags::STATIC.bits()] {
            put_u16(&mut inner_classes, value);
        }
        let class = builder
            .attribute(ATTR_SOURCE_FILE, source.to_be_bytes().to_vec())
            .attribute(ATTR_INNER_CLASSES, inner_classes)
            .build();

        let out = remap(&class);
        let source = attribute(&out, &out.attributes, ATTR_SOURCE_FILE);
        assert_eq!(out.pool.utf8(u16_at(source, 0)).unwrap(), "Level.kt");
        let inner_classes = attribute(&out, &out.attributes, ATTR_INNER_CLASSES);
        assert_eq!(out.pool.utf8(u16_at(inner_classes, 6)).unwrap(), "Chunk");
    }

    #[test]
    fn test_invalid_locals_are_renamed_consistently() {
        let mut builder = ClassBuilder::new("com/example/Locals", Some("java/lang/Object"));
        let snowman = builder.utf8("\u{2603}");
        let level = builder.utf8("Lnet/minecraft/class_1;");
        let this_name = builder.utf8("this");
        let this_type = builder.utf8("Lcom/example/Locals;");
        let lvt_name = builder.utf8(ATTR_LOCAL_VARIABLE_TABLE);
        let lvtt_name = builder.utf8(ATTR_LOCAL_VARIABLE_TYPE_TABLE);
        let code_name = builder.utf8(ATTR_CODE);

        let mut lvt = Vec::new();
        for value in [2, 0, 1, this_name, this_type, 0, 0, 1, snowman, level, 1] {
            put_u16(&mut lvt, value);
        }
        let mut lvtt = Vec::new();
        for value in [1, 0, 1, snowman, level, 1] {
            put_u16(&mut lvtt, value);
        }
        let mut code = vec![0, 1, 0, 2, 0, 0, 0, 1, 0xB1, 0, 0];
        write_attributes(
            &mut code,
            &[
                Attribute {
                    name: lvtt_name,
                    data: lvtt,
                },
                Attribute {
                    name: lvt_name,
                    data: lvt,
                },
            ],
        );
        let class = builder
            .method(
                AccessFlags::PUBLIC,
                "run",
                "()V",
                vec![Attribute {
                    name: code_name,
                    data: code,
                }],
            )
            .build();

        let out = remap(&class);
        let code = attribute(&out, &out.methods[0].attributes, ATTR_CODE);
        let mut r = ByteReader::new(&code[11..]);
        let nested = read_attribute_table(&mut r).unwrap();
        let lvt = attribute(&out, &nested, ATTR_LOCAL_VARIABLE_TABLE);
        let lvtt = attribute(&out, &nested, ATTR_LOCAL_VARIABLE_TYPE_TABLE);

        // Second entry: name at offset 2 + 10 + 4, type right after.
        assert_eq!(out.pool.utf8(u16_at(lvt, 6)).unwrap(), "this");
        assert_eq!(out.pool.utf8(u16_at(lvt, 16)).unwrap(), "level");
        assert_eq!(
            out.pool.utf8(u16_at(lvt, 18)).unwrap(),
            "Lnet/minecraft/world/Level;"
        );
        assert_eq!(out.pool.utf8(u16_at(lvtt, 6)).unwrap(), "level");
        assert_eq!(code.len(), class_code_len(&class));
    }

    fn class_code_len(class: &ClassFile) -> usize {
        attribute(class, &class.methods[0].attributes, ATTR_CODE).len()
    }

    #[test]
    fn test_annotation_types_elements_and_enums() {
        let mut builder = ClassBuilder::new("com/example/Annotated", Some("java/lang/Object"));
        let marker = builder.utf8("Lnet/minecraft/class_4;");
        let element = builder.utf8("method_4");
        let mode = builder.utf8("Lnet/minecraft/class_5;");
        let survival = builder.utf8("field_5");
        let class_value = builder.utf8("Lnet/minecraft/class_1;");
        let value = builder.utf8("value");

        let mut data = Vec::new();
        put_u16(&mut data, 1);
        put_u16(&mut data, marker);
        put_u16(&mut data, 3);
        put_u16(&mut data, element);
        data.push(b'I');
        put_u16(&mut data, 0);
        put_u16(&mut data, value);
        data.push(b'e');
        put_u16(&mut data, mode);
        put_u16(&mut data, survival);
        put_u16(&mut data, value);
        data.push(b'c');
        put_u16(&mut data, class_value);
        let class = builder
            .attribute(ATTR_RUNTIME_VISIBLE_ANNOTATIONS, data.clone())
            .build();

        let out = remap(&class);
        let ann = attribute(&out, &out.attributes, ATTR_RUNTIME_VISIBLE_ANNOTATIONS);
        assert_eq!(ann.len(), data.len());
        assert_eq!(out.pool.utf8(u16_at(ann, 2)).unwrap(), "Lnet/minecraft/world/Marker;");
        assert_eq!(out.pool.utf8(u16_at(ann, 6)).unwrap(), "priority");
        assert_eq!(out.pool.utf8(u16_at(ann, 14)).unwrap(), "Lnet/minecraft/world/Mode;");
        assert_eq!(out.pool.utf8(u16_at(ann, 16)).unwrap(), "SURVIVAL");
        assert_eq!(out.pool.utf8(u16_at(ann, 21)).unwrap(), "Lnet/minecraft/world/Level;");
    }

    #[test]
    fn test_malformed_attribute_is_kept() {
        let class = ClassBuilder::new("net/minecraft/class_1", Some("java/lang/Object"))
            .attribute(ATTR_RUNTIME_VISIBLE_ANNOTATIONS, vec![0, 1, 0])
            .build();
        let out = remap(&class);
        assert_eq!(
            attribute(&out, &out.attributes, ATTR_RUNTIME_VISIBLE_ANNOTATIONS),
            &[0, 1, 0]
        );
    }
}
