//! Namespace label normalization for the embedded mapping resource.
//!
//! Bundles name their namespaces after the toolchain that produced them. The
//! remapper addresses them by a fixed canonical pair instead, so the header of
//! the embedded table is rewritten before use. Only header fields are
//! touched; every byte after the header line is copied verbatim.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::util::write_atomically;

/// Location of the mapping table inside the primary artifact.
pub const MAPPINGS_RESOURCE: &str = "META-INF/mappings/reobf.tiny";

/// Canonical label of the human-readable namespace.
pub const NAMED_NAMESPACE: &str = "named";

/// Canonical label of the raw namespace.
pub const INTERMEDIARY_NAMESPACE: &str = "intermediary";

/// An ambiguous namespace label and the canonical label that replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespacePair {
    /// Label as written by the bundle
    pub ambiguous: &'static str,
    /// Label the rest of the pipeline uses
    pub canonical: &'static str,
}

/// Human-readable side of the table.
pub const READABLE_NAMESPACE: NamespacePair = NamespacePair {
    ambiguous: "mojang+yarn",
    canonical: NAMED_NAMESPACE,
};

/// Raw side of the table.
pub const RAW_NAMESPACE: NamespacePair = NamespacePair {
    ambiguous: "spigot",
    canonical: INTERMEDIARY_NAMESPACE,
};

/// Both canonical pairs, in the order they are applied.
pub const CANONICAL_PAIRS: [NamespacePair; 2] = [READABLE_NAMESPACE, RAW_NAMESPACE];

/// Outcome of a normalization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    /// File the normalized table was written to
    pub output: PathBuf,
    /// Pairs that were found and replaced
    pub replaced: Vec<NamespacePair>,
    /// Pairs whose ambiguous label was absent from the header
    pub missing: Vec<NamespacePair>,
    /// Size of the written table in bytes
    pub size: usize,
}

/// Rewrites the namespace labels in the header of a mapping table.
///
/// Each pair replaces the first header field that equals its ambiguous
/// label. Returns the new text and the pairs that were applied.
pub fn normalize_header(text: &[u8], pairs: &[NamespacePair]) -> (Vec<u8>, Vec<NamespacePair>) {
    let header_end = memchr::memchr(b'\n', text).unwrap_or(text.len());
    let (header, rest) = text.split_at(header_end);
    let (header, cr) = match header.strip_suffix(b"\r") {
        Some(stripped) => (stripped, &b"\r"[..]),
        None => (header, &b""[..]),
    };

    let mut fields: Vec<&[u8]> = header.split(|&b| b == b'\t').collect();
    // Namespace labels start after the format marker fields.
    let first_label = if fields.first().copied() == Some(&b"tiny"[..]) {
        3
    } else {
        1
    };

    let mut applied = Vec::new();
    for pair in pairs {
        let slot = fields
            .iter()
            .enumerate()
            .skip(first_label)
            .find(|(_, f)| **f == pair.ambiguous.as_bytes())
            .map(|(i, _)| i);
        if let Some(i) = slot {
            fields[i] = pair.canonical.as_bytes();
            applied.push(*pair);
        }
    }

    let mut out = Vec::with_capacity(text.len() + 16);
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(b'\t');
        }
        out.extend_from_slice(field);
    }
    out.extend_from_slice(cr);
    out.extend_from_slice(rest);
    (out, applied)
}

/// Reads the mapping resource of `primary` and writes the normalized table to `target`.
///
/// An existing file at `target` is replaced atomically.
pub fn normalize_mappings(primary: &Path, target: &Path) -> Result<NormalizeReport> {
    let text = read_mappings_resource(primary)?;
    let (normalized, replaced) = normalize_header(&text, &CANONICAL_PAIRS);

    let missing: Vec<NamespacePair> = CANONICAL_PAIRS
        .iter()
        .filter(|p| !replaced.contains(p))
        .copied()
        .collect();
    for pair in &missing {
        warn!(
            label = pair.ambiguous,
            "mapping header has no '{}' namespace, leaving it unchanged", pair.ambiguous
        );
    }

    write_atomically(target, &normalized)?;
    info!(
        "Normalized {} ({} bytes) into {}",
        MAPPINGS_RESOURCE,
        normalized.len(),
        target.display()
    );

    Ok(NormalizeReport {
        output: target.to_path_buf(),
        replaced,
        missing,
        size: normalized.len(),
    })
}

/// Returns the raw bytes of the embedded mapping resource.
pub fn read_mappings_resource(primary: &Path) -> Result<Vec<u8>> {
    let file = File::open(primary).map_err(|e| Error::FileOpen {
        path: primary.to_path_buf(),
        source: e,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| Error::zip(primary, e))?;

    let mut entry = match archive.by_name(MAPPINGS_RESOURCE) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(Error::PrimaryArtifactNotFound {
                path: primary.to_path_buf(),
                resource: MAPPINGS_RESOURCE.to_string(),
            })
        }
        Err(e) => return Err(Error::zip(primary, e)),
    };

    let mut text = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut text)?;
    debug!(size = text.len(), "read embedded mappings");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const TABLE: &str = "tiny\t2\t0\tmojang+yarn\tspigot\n\
c\tnet/minecraft/spigot/Foo\tspigot\n\
\tm\t()V\tmojang+yarn\tspigot\n";

    fn jar_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_header_labels_replaced_rows_untouched() {
        let (out, applied) = normalize_header(TABLE.as_bytes(), &CANONICAL_PAIRS);
        let out = String::from_utf8(out).unwrap();

        assert_eq!(applied, CANONICAL_PAIRS.to_vec());
        let (header, rows) = out.split_once('\n').unwrap();
        assert_eq!(header, "tiny\t2\t0\tnamed\tintermediary");
        assert_eq!(rows, TABLE.split_once('\n').unwrap().1);
    }

    #[test]
    fn test_missing_label_leaves_header() {
        let text = b"tiny\t2\t0\tofficial\tspigot\r\nc\ta\tb\r\n";
        let (out, applied) = normalize_header(text, &CANONICAL_PAIRS);
        assert_eq!(applied, vec![RAW_NAMESPACE]);
        assert_eq!(out, b"tiny\t2\t0\tofficial\tintermediary\r\nc\ta\tb\r\n");
    }

    #[test]
    fn test_format_marker_fields_are_not_labels() {
        // The version field is not a namespace label.
        let pairs = [NamespacePair {
            ambiguous: "2",
            canonical: "x",
        }];
        let (out, applied) = normalize_header(b"tiny\t2\t0\ta\tb\n", &pairs);
        assert!(applied.is_empty());
        assert_eq!(out, b"tiny\t2\t0\ta\tb\n");
    }

    #[test]
    fn test_normalize_mappings_writes_target() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("server.jar");
        fs::write(&jar, jar_with(&[(MAPPINGS_RESOURCE, TABLE.as_bytes())])).unwrap();

        let target = dir.path().join("work/mappings.tiny");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, b"stale").unwrap();

        let report = normalize_mappings(&jar, &target).unwrap();
        assert!(report.missing.is_empty());

        let written = fs::read_to_string(&target).unwrap();
        assert!(written.starts_with("tiny\t2\t0\tnamed\tintermediary\n"));
        assert_eq!(report.size, written.len());
    }

    #[test]
    fn test_missing_resource_is_reported() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("library.jar");
        fs::write(&jar, jar_with(&[("a/B.class", b"\xCA\xFE\xBA\xBE")])).unwrap();

        let err = normalize_mappings(&jar, &dir.path().join("out.tiny")).unwrap_err();
        assert!(matches!(err, Error::PrimaryArtifactNotFound { .. }));
        assert!(err.to_string().contains("expected primary artifact not found"));
    }
}
