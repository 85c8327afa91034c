//! JVM class file codec.
//!
//! Parses a class file into a constant pool plus raw member/attribute
//! structures, and writes it back. Attribute payloads are kept as bytes; the
//! remapper decodes the ones it rewrites.

mod constants;
mod pool;

pub use constants::*;
pub use pool::*;

use std::borrow::Cow;

use zerocopy::byteorder::big_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::util::{put_u16, put_u32, ByteReader};

/// Fixed-size class file prologue.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ClassFileHeader {
    /// Magic number (CLASS_MAGIC)
    pub magic: U32,
    /// Minor version
    pub minor_version: U16,
    /// Major version (52 = Java 8, 61 = Java 17, 65 = Java 21)
    pub major_version: U16,
}

impl ClassFileHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 8;

    /// Reads the header from the start of a class file.
    pub fn read(data: &[u8]) -> Option<Self> {
        Self::read_from_prefix(data).ok().map(|(header, _)| header)
    }

    /// Returns true if the magic number matches.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic.get() == CLASS_MAGIC
    }
}

/// A raw attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Constant pool index of the attribute name
    pub name: u16,
    /// Attribute payload
    pub data: Vec<u8>,
}

/// A field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Access flags
    pub access: AccessFlags,
    /// Constant pool index of the member name
    pub name: u16,
    /// Constant pool index of the descriptor
    pub descriptor: u16,
    /// Member attributes
    pub attributes: Vec<Attribute>,
}

/// A parsed class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// Constant pool
    pub pool: ConstantPool,
    /// Class access flags
    pub access: AccessFlags,
    /// `Class` index of this class
    pub this_class: u16,
    /// `Class` index of the superclass (0 for java/lang/Object and module-info)
    pub super_class: u16,
    /// `Class` indices of implemented interfaces
    pub interfaces: Vec<u16>,
    /// Declared fields
    pub fields: Vec<Member>,
    /// Declared methods
    pub methods: Vec<Member>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parses a class file. `origin` names the input in error messages.
    pub fn parse(data: &[u8], origin: &str) -> Result<Self> {
        let header = ClassFileHeader::read(data)
            .ok_or_else(|| Error::class_file(origin, 0, "file too small for header"))?;
        if !header.is_valid() {
            return Err(Error::class_file(
                origin,
                0,
                format!("bad magic {:#010x}", header.magic.get()),
            ));
        }

        let mut r = ByteReader::new(&data[ClassFileHeader::SIZE..]);
        let pool = ConstantPool::parse(&mut r, origin)?;

        let eof = |r: &ByteReader<'_>| {
            Error::class_file(
                origin,
                ClassFileHeader::SIZE + r.offset(),
                "unexpected end of class file",
            )
        };

        let access = AccessFlags::from_bits_retain(r.u16().ok_or_else(|| eof(&r))?);
        let this_class = r.u16().ok_or_else(|| eof(&r))?;
        let super_class = r.u16().ok_or_else(|| eof(&r))?;

        let interface_count = r.u16().ok_or_else(|| eof(&r))?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u16().ok_or_else(|| eof(&r))?);
        }

        let fields = parse_members(&mut r).ok_or_else(|| eof(&r))?;
        let methods = parse_members(&mut r).ok_or_else(|| eof(&r))?;
        let attributes = parse_attributes(&mut r).ok_or_else(|| eof(&r))?;

        Ok(Self {
            minor_version: header.minor_version.get(),
            major_version: header.major_version.get(),
            pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serializes the class file.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4096);
        put_u32(&mut out, CLASS_MAGIC);
        put_u16(&mut out, self.minor_version);
        put_u16(&mut out, self.major_version);
        self.pool.write(&mut out);
        put_u16(&mut out, self.access.bits());
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_u16(&mut out, self.interfaces.len() as u16);
        for &iface in &self.interfaces {
            put_u16(&mut out, iface);
        }
        write_members(&mut out, &self.fields);
        write_members(&mut out, &self.methods);
        write_attributes(&mut out, &self.attributes);
        out
    }

    /// Returns the internal name of this class.
    pub fn name(&self) -> Option<Cow<'_, str>> {
        self.pool.class_name(self.this_class)
    }

    /// Returns the internal name of the superclass, if any.
    pub fn super_name(&self) -> Option<Cow<'_, str>> {
        if self.super_class == 0 {
            None
        } else {
            self.pool.class_name(self.super_class)
        }
    }

    /// Returns the internal names of the implemented interfaces.
    pub fn interface_names(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.interfaces
            .iter()
            .filter_map(|&i| self.pool.class_name(i))
    }

    /// Returns the decoded name of an attribute.
    pub fn attribute_name(&self, attr: &Attribute) -> Option<Cow<'_, str>> {
        self.pool.utf8(attr.name)
    }
}

fn parse_attributes(r: &mut ByteReader<'_>) -> Option<Vec<Attribute>> {
    let count = r.u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = r.u16()?;
        let len = r.u32()? as usize;
        let data = r.bytes(len)?.to_vec();
        attributes.push(Attribute { name, data });
    }
    Some(attributes)
}

fn parse_members(r: &mut ByteReader<'_>) -> Option<Vec<Member>> {
    let count = r.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = AccessFlags::from_bits_retain(r.u16()?);
        let name = r.u16()?;
        let descriptor = r.u16()?;
        let attributes = parse_attributes(r)?;
        members.push(Member {
            access,
            name,
            descriptor,
            attributes,
        });
    }
    Some(members)
}

/// Parses a nested attribute table (as found inside `Code` and `Record`).
pub fn read_attribute_table(r: &mut ByteReader<'_>) -> Option<Vec<Attribute>> {
    parse_attributes(r)
}

/// Writes an attribute table, including its count.
pub fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) {
    put_u16(out, attributes.len() as u16);
    for attr in attributes {
        put_u16(out, attr.name);
        put_u32(out, attr.data.len() as u32);
        out.extend_from_slice(&attr.data);
    }
}

fn write_members(out: &mut Vec<u8>, members: &[Member]) {
    put_u16(out, members.len() as u16);
    for member in members {
        put_u16(out, member.access.bits());
        put_u16(out, member.name);
        put_u16(out, member.descriptor);
        write_attributes(out, &member.attributes);
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles class files from names rather than pool indices.
///
/// Used to synthesize inputs; the remapper itself works on parsed files.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    /// Starts a class with the given internal name and superclass.
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class(name).unwrap_or(0);
        let super_class = super_name
            .and_then(|s| pool.intern_class(s))
            .unwrap_or(0);
        Self {
            class: ClassFile {
                minor_version: 0,
                major_version: 61,
                pool,
                access: AccessFlags::PUBLIC | AccessFlags::SUPER,
                this_class,
                super_class,
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                attributes: Vec::new(),
            },
        }
    }

    /// Sets the class access flags.
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.class.access = access;
        self
    }

    /// Adds an implemented interface.
    pub fn interface(mut self, name: &str) -> Self {
        if let Some(index) = self.class.pool.intern_class(name) {
            self.class.interfaces.push(index);
        }
        self
    }

    /// Adds a field.
    pub fn field(mut self, access: AccessFlags, name: &str, descriptor: &str) -> Self {
        let member = self.member(access, name, descriptor, Vec::new());
        self.class.fields.push(member);
        self
    }

    /// Adds a method with the given attributes.
    pub fn method(
        mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        attributes: Vec<Attribute>,
    ) -> Self {
        let member = self.member(access, name, descriptor, attributes);
        self.class.methods.push(member);
        self
    }

    /// Adds a class-level attribute.
    pub fn attribute(mut self, name: &str, data: Vec<u8>) -> Self {
        let name = self.class.pool.intern_utf8(name).unwrap_or(0);
        self.class.attributes.push(Attribute { name, data });
        self
    }

    /// Interns a UTF-8 constant and returns its index.
    pub fn utf8(&mut self, value: &str) -> u16 {
        self.class.pool.intern_utf8(value).unwrap_or(0)
    }

    /// Interns a `Class` constant and returns its index.
    pub fn class_ref(&mut self, name: &str) -> u16 {
        self.class.pool.intern_class(name).unwrap_or(0)
    }

    /// Interns a field or method reference and returns its index.
    pub fn member_ref(&mut self, method: bool, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class_ref(owner);
        let nat = self
            .class
            .pool
            .intern_name_and_type(name, descriptor)
            .unwrap_or(0);
        let entry = if method {
            Constant::Methodref {
                class,
                name_and_type: nat,
            }
        } else {
            Constant::Fieldref {
                class,
                name_and_type: nat,
            }
        };
        self.class.pool.append(entry).unwrap_or(0)
    }

    /// Finishes the class.
    pub fn build(self) -> ClassFile {
        self.class
    }

    fn member(
        &mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        attributes: Vec<Attribute>,
    ) -> Member {
        Member {
            access,
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_read() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x41, 0xFF];
        let header = ClassFileHeader::read(&data).unwrap();
        assert!(header.is_valid());
        assert_eq!(header.major_version.get(), 65);
        assert!(ClassFileHeader::read(&data[..4]).is_none());
    }

    #[test]
    fn test_builder_round_trip() {
        let mut builder = ClassBuilder::new("a/B", Some("java/lang/Object"))
            .interface("java/lang/Runnable")
            .field(AccessFlags::PRIVATE, "c", "I");
        let code_name = builder.utf8(ATTR_CODE);
        let class = builder
            .method(
                AccessFlags::PUBLIC,
                "run",
                "()V",
                vec![Attribute {
                    name: code_name,
                    data: vec![0, 1, 0, 1, 0, 0, 0, 1, 0xB1, 0, 0, 0, 0],
                }],
            )
            .build();

        let bytes = class.to_bytes();
        let parsed = ClassFile::parse(&bytes, "a/B.class").unwrap();

        assert_eq!(parsed.name().unwrap(), "a/B");
        assert_eq!(parsed.super_name().unwrap(), "java/lang/Object");
        assert_eq!(
            parsed.interface_names().collect::<Vec<_>>(),
            vec!["java/lang/Runnable"]
        );
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.methods[0].attributes[0].data.len(), 13);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = ClassFile::parse(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 1], "x.class").unwrap_err();
        assert!(matches!(err, Error::InvalidClassFile { offset: 0, .. }));
    }

    #[test]
    fn test_rejects_truncated_body() {
        let mut bytes = ClassBuilder::new("a/B", None).build().to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(ClassFile::parse(&bytes, "a/B.class").is_err());
    }
}
