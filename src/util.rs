//! Utility functions for binary data processing.
//!
//! This module provides the primitives shared by the class file codec and the
//! extraction stages:
//! - Big-endian cursor reads and buffer writes (using byteorder)
//! - Modified UTF-8 decoding/encoding as used by JVM constant pools
//! - SHA-256 helpers for verifying extracted and downloaded files

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

// =============================================================================
// Big-Endian Cursor
// =============================================================================

/// A bounds-checked big-endian reader over a byte slice.
///
/// Every read returns `None` when the slice is exhausted; callers turn that
/// into a parse error carrying [`ByteReader::offset`].
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current position within the slice.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Reads a single byte.
    #[inline]
    pub fn u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.offset)?;
        self.offset += 1;
        Some(b)
    }

    /// Reads a big-endian u16.
    #[inline]
    pub fn u16(&mut self) -> Option<u16> {
        let bytes = self.bytes(2)?;
        Some(BigEndian::read_u16(bytes))
    }

    /// Reads a big-endian u32.
    #[inline]
    pub fn u32(&mut self) -> Option<u32> {
        let bytes = self.bytes(4)?;
        Some(BigEndian::read_u32(bytes))
    }

    /// Reads a big-endian u64.
    #[inline]
    pub fn u64(&mut self) -> Option<u64> {
        let bytes = self.bytes(8)?;
        Some(BigEndian::read_u64(bytes))
    }

    /// Borrows the next `len` bytes.
    #[inline]
    pub fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let slice = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(slice)
    }
}

// =============================================================================
// Big-Endian Writes
// =============================================================================

/// Appends a big-endian u16.
#[inline(always)]
pub fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian u32.
#[inline(always)]
pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian u64.
#[inline(always)]
pub fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Overwrites a big-endian u16 at `offset`.
///
/// # Panics
///
/// Panics if `offset + 2 > buf.len()`.
#[inline(always)]
pub fn patch_u16(buf: &mut [u8], offset: usize, value: u16) {
    BigEndian::write_u16(&mut buf[offset..], value);
}

// =============================================================================
// Modified UTF-8
// =============================================================================

/// Decodes a JVM modified UTF-8 string.
///
/// ASCII input (the overwhelming majority of symbol names) is borrowed
/// without copying. Returns `None` for byte sequences that cannot be
/// represented as a Rust string, such as unpaired surrogates; such constants
/// are left untouched by the remapper.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if bytes.is_ascii() && memchr::memchr(0, bytes).is_none() {
        return std::str::from_utf8(bytes).ok().map(Cow::Borrowed);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return None;
            }
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1)?;
            if b1 & 0xC0 != 0x80 {
                return None;
            }
            units.push((((b0 & 0x1F) as u16) << 6) | (b1 & 0x3F) as u16);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = *bytes.get(i + 1)?;
            let b2 = *bytes.get(i + 2)?;
            if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                return None;
            }
            units.push(
                (((b0 & 0x0F) as u16) << 12) | (((b1 & 0x3F) as u16) << 6) | (b2 & 0x3F) as u16,
            );
            i += 3;
        } else {
            return None;
        }
    }

    String::from_utf16(&units).ok().map(Cow::Owned)
}

/// Encodes a string as JVM modified UTF-8.
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    if value.is_ascii() && memchr::memchr(0, value.as_bytes()).is_none() {
        return value.as_bytes().to_vec();
    }

    let mut out = Vec::with_capacity(value.len() + 8);
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

// =============================================================================
// Hashing
// =============================================================================

/// Returns the lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Returns the lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Returns true if `path` exists and its SHA-256 equals `expected` (hex, any case).
pub fn file_matches_hash(path: &Path, expected: &str) -> bool {
    path.is_file()
        && sha256_file(path)
            .map(|actual| actual.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
}

/// Writes `data` to a temporary file beside `target` and renames it into place.
///
/// Missing parent directories are created. Readers never observe a partially
/// written `target`.
pub fn write_atomically(target: &Path, data: &[u8]) -> Result<()> {
    let dir = parent_dir(target);
    fs::create_dir_all(dir).map_err(|e| Error::CreateDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let write_err = |e: io::Error| Error::FileWrite {
        path: target.to_path_buf(),
        source: e,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(data).map_err(write_err)?;
    tmp.persist(target).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Returns the directory containing `path`, or `.` for bare file names.
pub fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Returns the last path segment of a slash-separated name.
#[inline]
pub fn basename(name: &str) -> &str {
    match memchr::memrchr(b'/', name.as_bytes()) {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Returns the package portion of an internal class name (empty for the default package).
#[inline]
pub fn package_of(name: &str) -> &str {
    match memchr::memrchr(b'/', name.as_bytes()) {
        Some(pos) => &name[..pos],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_reader() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x41, 0x07];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.u32(), Some(0xCAFEBABE));
        assert_eq!(r.u16(), Some(0x41));
        assert_eq!(r.u8(), Some(7));
        assert_eq!(r.u8(), None);
        assert_eq!(r.offset(), 7);
    }

    #[test]
    fn test_byte_reader_bounds() {
        let data = [0x01, 0x02, 0x03];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.u32(), None);
        assert_eq!(r.offset(), 0);
        assert_eq!(r.bytes(3), Some(&data[..]));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_modified_utf8_ascii_is_borrowed() {
        let decoded = decode_modified_utf8(b"net/minecraft/Foo").unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded, "net/minecraft/Foo");
    }

    #[test]
    fn test_modified_utf8_nul_and_supplementary() {
        // NUL is encoded as C0 80, U+1F600 as a surrogate pair of 3-byte units.
        let text = "a\u{0}b\u{1F600}";
        let encoded = encode_modified_utf8(text);
        assert_eq!(&encoded[..4], &[b'a', 0xC0, 0x80, b'b']);
        assert_eq!(encoded.len(), 4 + 6);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
    }

    #[test]
    fn test_modified_utf8_rejects_lone_surrogate() {
        // 0xD800 on its own.
        assert!(decode_modified_utf8(&[0xED, 0xA0, 0x80]).is_none());
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_package_and_basename() {
        assert_eq!(package_of("a/b/C"), "a/b");
        assert_eq!(package_of("C"), "");
        assert_eq!(basename("a/b/C"), "C");
        assert_eq!(basename("C"), "C");
    }
}
