//! Descriptor and generic signature rewriting.
//!
//! Both functions borrow the input unchanged when no class name inside it is
//! renamed, so the remapper can skip interning for the common case.

use std::borrow::Cow;
use std::collections::HashMap;

/// Maps internal class names.
pub trait ClassMapper {
    /// Returns the new name for `name`, or `None` when it is not renamed.
    fn map_class(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl ClassMapper for HashMap<String, String> {
    fn map_class(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|s| Cow::Borrowed(s.as_str()))
    }
}

/// Remaps an internal class name, which may be an array descriptor.
pub fn remap_class_name<'a, M: ClassMapper + ?Sized>(name: &'a str, mapper: &M) -> Cow<'a, str> {
    if name.starts_with('[') {
        return remap_descriptor(name, mapper);
    }
    match mapper.map_class(name) {
        Some(mapped) if mapped != name => Cow::Owned(mapped.into_owned()),
        _ => Cow::Borrowed(name),
    }
}

/// Remaps every class name in a field or method descriptor.
///
/// Malformed descriptors are returned unchanged.
pub fn remap_descriptor<'a, M: ClassMapper + ?Sized>(desc: &'a str, mapper: &M) -> Cow<'a, str> {
    let bytes = desc.as_bytes();
    if memchr::memchr(b'L', bytes).is_none() {
        return Cow::Borrowed(desc);
    }

    let mut out = String::with_capacity(desc.len() + 16);
    let mut changed = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'L' => {
                let end = match memchr::memchr(b';', &bytes[i..]) {
                    Some(rel) => i + rel,
                    None => return Cow::Borrowed(desc),
                };
                let name = &desc[i + 1..end];
                out.push('L');
                match mapper.map_class(name) {
                    Some(mapped) if mapped != name => {
                        out.push_str(&mapped);
                        changed = true;
                    }
                    _ => out.push_str(name),
                }
                out.push(';');
                i = end + 1;
            }
            b @ (b'(' | b')' | b'[' | b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z'
            | b'V') => {
                out.push(b as char);
                i += 1;
            }
            _ => return Cow::Borrowed(desc),
        }
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(desc)
    }
}

/// Returns the return type of a method descriptor.
pub fn return_type(desc: &str) -> Option<&str> {
    desc.rfind(')').map(|pos| &desc[pos + 1..])
}

/// Returns the class name of an object type descriptor (`Lfoo/Bar;` -> `foo/Bar`).
pub fn object_type(desc: &str) -> Option<&str> {
    desc.strip_prefix('L')?.strip_suffix(';')
}

// =============================================================================
// Generic Signatures
// =============================================================================

/// Remaps every class name in a class, method or field generic signature.
///
/// Inner class suffixes (`Outer<T>.Inner`) are remapped through the full
/// binary name `Outer$Inner`. Malformed signatures are returned unchanged.
pub fn remap_signature<'a, M: ClassMapper + ?Sized>(sig: &'a str, mapper: &M) -> Cow<'a, str> {
    if !sig.contains('L') {
        return Cow::Borrowed(sig);
    }
    let mut parser = SignatureRemapper {
        src: sig,
        pos: 0,
        out: String::with_capacity(sig.len() + 16),
        changed: false,
        mapper,
    };
    match parser.signature() {
        Some(()) if parser.pos == sig.len() && parser.changed => Cow::Owned(parser.out),
        _ => Cow::Borrowed(sig),
    }
}

struct SignatureRemapper<'s, 'm, M: ClassMapper + ?Sized> {
    src: &'s str,
    pos: usize,
    out: String,
    changed: bool,
    mapper: &'m M,
}

impl<M: ClassMapper + ?Sized> SignatureRemapper<'_, '_, M> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.out.push(b as char);
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        (self.bump()? == byte).then_some(())
    }

    /// Reads an identifier up to (not including) any of `stops`.
    fn identifier(&mut self, stops: &[u8]) -> Option<&str> {
        let start = self.pos;
        let rest = &self.src.as_bytes()[start..];
        let len = rest.iter().position(|b| stops.contains(b))?;
        self.pos += len;
        Some(&self.src[start..start + len])
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }
        if self.peek() == Some(b'(') {
            self.bump();
            while self.peek()? != b')' {
                self.type_signature()?;
            }
            self.bump();
            self.type_signature()?;
            while self.peek() == Some(b'^') {
                self.bump();
                self.type_signature()?;
            }
        } else {
            while self.peek().is_some() {
                self.type_signature()?;
            }
        }
        Some(())
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            let name = self.identifier(b":")?.to_string();
            self.out.push_str(&name);
            // Class bound (possibly empty), then interface bounds.
            while self.peek() == Some(b':') {
                self.bump();
                if matches!(self.peek()?, b'L' | b'T' | b'[') {
                    self.type_signature()?;
                }
            }
        }
        self.bump();
        Some(())
    }

    fn type_signature(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => {
                self.bump();
            }
            b'[' => {
                self.bump();
                self.type_signature()?;
            }
            b'T' => {
                self.bump();
                let name = self.identifier(b";")?.to_string();
                self.out.push_str(&name);
                self.expect(b';')?;
            }
            b'L' => self.class_type()?,
            _ => return None,
        }
        Some(())
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let outer = self.identifier(b"<.;")?.to_string();
        let mut mapped_outer = self.map(&outer);
        self.out.push_str(&mapped_outer);
        let mut original = outer;

        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    self.bump();
                    let simple = self.identifier(b"<.;")?.to_string();
                    original = format!("{original}${simple}");
                    let mapped = self.map(&original);
                    let prefix = format!("{mapped_outer}$");
                    let new_simple = match mapped.strip_prefix(&prefix) {
                        Some(rest) => rest.to_string(),
                        None => mapped.rsplit('$').next().unwrap_or(&simple).to_string(),
                    };
                    if new_simple != simple {
                        self.changed = true;
                    }
                    self.out.push_str(&new_simple);
                    mapped_outer = mapped;
                }
                b';' => {
                    self.bump();
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => {
                    self.bump();
                }
                b'+' | b'-' => {
                    self.bump();
                    self.type_signature()?;
                }
                _ => self.type_signature()?,
            }
        }
        self.bump();
        Some(())
    }

    fn map(&mut self, name: &str) -> String {
        match self.mapper.map_class(name) {
            Some(mapped) if mapped != name => {
                self.changed = true;
                mapped.into_owned()
            }
            _ => name.to_string(),
        }
    }
}
