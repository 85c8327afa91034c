//! Constant pool model.
//!
//! Entries keep their original indices for the lifetime of the pool. The
//! remapper never rewrites an entry that bytecode might reference by a
//! different meaning; it appends new `Utf8`/`NameAndType` entries through the
//! `intern_*` functions and repoints the referencing entries instead.

use std::borrow::Cow;
use std::collections::HashMap;

use super::constants::*;
use crate::error::{Error, Result};
use crate::util::{
    decode_modified_utf8, encode_modified_utf8, put_u16, put_u32, put_u64, ByteReader,
};

/// Largest index a constant pool can hold.
const MAX_POOL_SIZE: usize = u16::MAX as usize;

/// A single constant pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)] // Variants mirror the JVMS constant kinds
pub enum Constant {
    /// Index 0 and the second slot of long/double entries
    Unusable,
    /// Raw modified UTF-8 bytes
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class { name: u16 },
    String { value: u16 },
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { descriptor: u16 },
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module { name: u16 },
    Package { name: u16 },
}

impl Constant {
    /// Returns true for entries that occupy two pool slots.
    #[inline]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    /// For member references, returns `(class, name_and_type)`.
    #[inline]
    pub fn member_ref(&self) -> Option<(u16, u16)> {
        match *self {
            Constant::Fieldref {
                class,
                name_and_type,
            }
            | Constant::Methodref {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodref {
                class,
                name_and_type,
            } => Some((class, name_and_type)),
            _ => None,
        }
    }
}

/// A class file constant pool.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    utf8_lookup: HashMap<Vec<u8>, u16>,
    nat_lookup: HashMap<(u16, u16), u16>,
    class_lookup: HashMap<u16, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool holding only the unusable slot 0.
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            utf8_lookup: HashMap::new(),
            nat_lookup: HashMap::new(),
            class_lookup: HashMap::new(),
        }
    }

    /// Parses a constant pool, leaving the reader positioned after it.
    pub fn parse(r: &mut ByteReader<'_>, class_name: &str) -> Result<Self> {
        let eof = |r: &ByteReader<'_>| {
            Error::class_file(class_name, r.offset(), "truncated constant pool")
        };

        let count = r.u16().ok_or_else(|| eof(r))? as usize;
        let mut pool = Self::new();
        pool.entries.reserve(count + 16);

        while pool.entries.len() < count {
            let tag_offset = r.offset();
            let tag = r.u8().ok_or_else(|| eof(r))?;
            let entry = match tag {
                CONSTANT_UTF8 => {
                    let len = r.u16().ok_or_else(|| eof(r))? as usize;
                    Constant::Utf8(r.bytes(len).ok_or_else(|| eof(r))?.to_vec())
                }
                CONSTANT_INTEGER => Constant::Integer(r.u32().ok_or_else(|| eof(r))?),
                CONSTANT_FLOAT => Constant::Float(r.u32().ok_or_else(|| eof(r))?),
                CONSTANT_LONG => Constant::Long(r.u64().ok_or_else(|| eof(r))?),
                CONSTANT_DOUBLE => Constant::Double(r.u64().ok_or_else(|| eof(r))?),
                CONSTANT_CLASS => Constant::Class {
                    name: r.u16().ok_or_else(|| eof(r))?,
                },
                CONSTANT_STRING => Constant::String {
                    value: r.u16().ok_or_else(|| eof(r))?,
                },
                CONSTANT_FIELDREF | CONSTANT_METHODREF | CONSTANT_INTERFACE_METHODREF => {
                    let class = r.u16().ok_or_else(|| eof(r))?;
                    let name_and_type = r.u16().ok_or_else(|| eof(r))?;
                    match tag {
                        CONSTANT_FIELDREF => Constant::Fieldref {
                            class,
                            name_and_type,
                        },
                        CONSTANT_METHODREF => Constant::Methodref {
                            class,
                            name_and_type,
                        },
                        _ => Constant::InterfaceMethodref {
                            class,
                            name_and_type,
                        },
                    }
                }
                CONSTANT_NAME_AND_TYPE => Constant::NameAndType {
                    name: r.u16().ok_or_else(|| eof(r))?,
                    descriptor: r.u16().ok_or_else(|| eof(r))?,
                },
                CONSTANT_METHOD_HANDLE => Constant::MethodHandle {
                    kind: r.u8().ok_or_else(|| eof(r))?,
                    reference: r.u16().ok_or_else(|| eof(r))?,
                },
                CONSTANT_METHOD_TYPE => Constant::MethodType {
                    descriptor: r.u16().ok_or_else(|| eof(r))?,
                },
                CONSTANT_DYNAMIC | CONSTANT_INVOKE_DYNAMIC => {
                    let bootstrap = r.u16().ok_or_else(|| eof(r))?;
                    let name_and_type = r.u16().ok_or_else(|| eof(r))?;
                    if tag == CONSTANT_DYNAMIC {
                        Constant::Dynamic {
                            bootstrap,
                            name_and_type,
                        }
                    } else {
                        Constant::InvokeDynamic {
                            bootstrap,
                            name_and_type,
                        }
                    }
                }
                CONSTANT_MODULE => Constant::Module {
                    name: r.u16().ok_or_else(|| eof(r))?,
                },
                CONSTANT_PACKAGE => Constant::Package {
                    name: r.u16().ok_or_else(|| eof(r))?,
                },
                other => {
                    return Err(Error::class_file(
                        class_name,
                        tag_offset,
                        format!("unknown constant pool tag {other}"),
                    ))
                }
            };

            let wide = entry.is_wide();
            pool.push_indexed(entry);
            if wide {
                pool.entries.push(Constant::Unusable);
            }
        }

        Ok(pool)
    }

    /// Serializes the pool, including its count.
    pub fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.entries.len() as u16);
        for entry in &self.entries[1..] {
            match entry {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    out.push(CONSTANT_UTF8);
                    put_u16(out, bytes.len() as u16);
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) => {
                    out.push(CONSTANT_INTEGER);
                    put_u32(out, *v);
                }
                Constant::Float(v) => {
                    out.push(CONSTANT_FLOAT);
                    put_u32(out, *v);
                }
                Constant::Long(v) => {
                    out.push(CONSTANT_LONG);
                    put_u64(out, *v);
                }
                Constant::Double(v) => {
                    out.push(CONSTANT_DOUBLE);
                    put_u64(out, *v);
                }
                Constant::Class { name } => {
                    out.push(CONSTANT_CLASS);
                    put_u16(out, *name);
                }
                Constant::String { value } => {
                    out.push(CONSTANT_STRING);
                    put_u16(out, *value);
                }
                Constant::Fieldref {
                    class,
                    name_and_type,
                } => {
                    out.push(CONSTANT_FIELDREF);
                    put_u16(out, *class);
                    put_u16(out, *name_and_type);
                }
                Constant::Methodref {
                    class,
                    name_and_type,
                } => {
                    out.push(CONSTANT_METHODREF);
                    put_u16(out, *class);
                    put_u16(out, *name_and_type);
                }
                Constant::InterfaceMethodref {
                    class,
                    name_and_type,
                } => {
                    out.push(CONSTANT_INTERFACE_METHODREF);
                    put_u16(out, *class);
                    put_u16(out, *name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    out.push(CONSTANT_NAME_AND_TYPE);
                    put_u16(out, *name);
                    put_u16(out, *descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    out.push(CONSTANT_METHOD_HANDLE);
                    out.push(*kind);
                    put_u16(out, *reference);
                }
                Constant::MethodType { descriptor } => {
                    out.push(CONSTANT_METHOD_TYPE);
                    put_u16(out, *descriptor);
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.push(CONSTANT_DYNAMIC);
                    put_u16(out, *bootstrap);
                    put_u16(out, *name_and_type);
                }
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.push(CONSTANT_INVOKE_DYNAMIC);
                    put_u16(out, *bootstrap);
                    put_u16(out, *name_and_type);
                }
                Constant::Module { name } => {
                    out.push(CONSTANT_MODULE);
                    put_u16(out, *name);
                }
                Constant::Package { name } => {
                    out.push(CONSTANT_PACKAGE);
                    put_u16(out, *name);
                }
            }
        }
    }

    /// Number of slots, including the unusable slot 0.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the pool holds no usable entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Returns the entry at `index`.
    #[inline]
    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    /// Returns a mutable reference to the entry at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: u16) -> Option<&mut Constant> {
        self.entries.get_mut(index as usize)
    }

    /// Iterates over `(index, entry)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    /// Returns the decoded string of a `Utf8` entry.
    pub fn utf8(&self, index: u16) -> Option<Cow<'_, str>> {
        match self.get(index)? {
            Constant::Utf8(bytes) => decode_modified_utf8(bytes),
            _ => None,
        }
    }

    /// Returns the name of a `Class` entry.
    pub fn class_name(&self, index: u16) -> Option<Cow<'_, str>> {
        match *self.get(index)? {
            Constant::Class { name } => self.utf8(name),
            _ => None,
        }
    }

    /// Returns `(name, descriptor)` of a `NameAndType` entry.
    pub fn name_and_type(&self, index: u16) -> Option<(Cow<'_, str>, Cow<'_, str>)> {
        match *self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Some((self.utf8(name)?, self.utf8(descriptor)?))
            }
            _ => None,
        }
    }

    /// Returns `(owner, name, descriptor)` of a field or method reference.
    pub fn member_ref(&self, index: u16) -> Option<(Cow<'_, str>, Cow<'_, str>, Cow<'_, str>)> {
        let (class, nat) = self.get(index)?.member_ref()?;
        let owner = self.class_name(class)?;
        let (name, desc) = self.name_and_type(nat)?;
        Some((owner, name, desc))
    }

    /// Returns the index of a `Utf8` entry holding `value`, appending one if needed.
    pub fn intern_utf8(&mut self, value: &str) -> Option<u16> {
        let bytes = encode_modified_utf8(value);
        if bytes.len() > u16::MAX as usize {
            return None;
        }
        if let Some(&index) = self.utf8_lookup.get(&bytes) {
            return Some(index);
        }
        self.push(Constant::Utf8(bytes))
    }

    /// Returns the index of a `NameAndType` entry, appending one if needed.
    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Option<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        if let Some(&index) = self.nat_lookup.get(&(name, descriptor)) {
            return Some(index);
        }
        self.push(Constant::NameAndType { name, descriptor })
    }

    /// Returns the index of a `Class` entry naming `name`, appending one if needed.
    pub fn intern_class(&mut self, name: &str) -> Option<u16> {
        let name = self.intern_utf8(name)?;
        if let Some(&index) = self.class_lookup.get(&name) {
            return Some(index);
        }
        self.push(Constant::Class { name })
    }

    /// Appends an entry without interning. Returns `None` when the pool is full.
    pub fn append(&mut self, entry: Constant) -> Option<u16> {
        self.push(entry)
    }

    fn push(&mut self, entry: Constant) -> Option<u16> {
        if self.entries.len() >= MAX_POOL_SIZE {
            return None;
        }
        Some(self.push_indexed(entry))
    }

    /// Appends an entry and records it in the interning tables.
    ///
    /// The first occurrence of a value wins so existing indices are preferred.
    fn push_indexed(&mut self, entry: Constant) -> u16 {
        let index = self.entries.len() as u16;
        match &entry {
            Constant::Utf8(bytes) => {
                self.utf8_lookup.entry(bytes.clone()).or_insert(index);
            }
            Constant::NameAndType { name, descriptor } => {
                self.nat_lookup.entry((*name, *descriptor)).or_insert(index);
            }
            Constant::Class { name } => {
                self.class_lookup.entry(*name).or_insert(index);
            }
            _ => {}
        }
        self.entries.push(entry);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, 6);
        // #1 Utf8 "Foo"
        out.push(CONSTANT_UTF8);
        put_u16(&mut out, 3);
        out.extend_from_slice(b"Foo");
        // #2 Class #1
        out.push(CONSTANT_CLASS);
        put_u16(&mut out, 1);
        // #3-#4 Long
        out.push(CONSTANT_LONG);
        put_u64(&mut out, 42);
        // #5 String #1
        out.push(CONSTANT_STRING);
        put_u16(&mut out, 1);
        out
    }

    #[test]
    fn test_parse_and_write_preserves_bytes() {
        let bytes = sample_pool_bytes();
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes), "Foo").unwrap();

        assert_eq!(pool.len(), 6);
        assert_eq!(pool.class_name(2).unwrap(), "Foo");
        assert_eq!(pool.get(4), Some(&Constant::Unusable));

        let mut out = Vec::new();
        pool.write(&mut out);
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_intern_reuses_existing_entries() {
        let bytes = sample_pool_bytes();
        let mut pool = ConstantPool::parse(&mut ByteReader::new(&bytes), "Foo").unwrap();

        assert_eq!(pool.intern_utf8("Foo"), Some(1));
        assert_eq!(pool.intern_class("Foo"), Some(2));

        let bar = pool.intern_utf8("Bar").unwrap();
        assert_eq!(bar, 6);
        assert_eq!(pool.intern_utf8("Bar"), Some(bar));

        let nat = pool.intern_name_and_type("Bar", "I").unwrap();
        let (name, desc) = pool.name_and_type(nat).unwrap();
        assert_eq!(name, "Bar");
        assert_eq!(desc, "I");
        assert_eq!(pool.intern_name_and_type("Bar", "I"), Some(nat));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut bytes = Vec::new();
        put_u16(&mut bytes, 2);
        bytes.push(2);
        let err = ConstantPool::parse(&mut ByteReader::new(&bytes), "Broken").unwrap_err();
        assert!(matches!(err, Error::InvalidClassFile { offset: 2, .. }));
    }
}
