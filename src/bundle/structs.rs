//! Records read from a bundle and the extraction result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default label of the group holding the primary binary.
pub const PRIMARY_GROUP: &str = "versions";

/// Default label of the group holding auxiliary files.
pub const AUXILIARY_GROUP: &str = "libraries";

// =============================================================================
// List Files
// =============================================================================

/// One line of a `versions.list` or `libraries.list` resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Expected SHA-256 of the file (hex)
    pub hash: String,
    /// Logical artifact name
    pub id: String,
    /// Path relative to the group directory
    pub path: String,
}

/// One line of `patches.list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    /// Group the patched file belongs to
    pub group: String,
    /// SHA-256 of the file the patch applies to
    pub original_hash: String,
    /// SHA-256 of the patch itself
    pub patch_hash: String,
    /// SHA-256 of the patched output
    pub output_hash: String,
    /// Path of the original file
    pub original_path: String,
    /// Path of the patch inside the bundle
    pub patch_path: String,
    /// Path of the patched output, relative to the group directory
    pub output_path: String,
}

/// The base binary a bundle patches, as described by `download-context`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadContext {
    /// Expected SHA-256 of the base binary (hex)
    pub hash: String,
    /// Where to download it from
    pub url: String,
    /// File name under the cache directory
    pub file_name: String,
}

impl DownloadContext {
    /// Location of the base binary under a repository directory.
    pub fn output_file(&self, repo: &Path) -> PathBuf {
        repo.join("cache").join(&self.file_name)
    }
}

/// Splits the non-comment lines of a tab-separated list resource.
///
/// Returns `(line number, fields)` pairs, checking each has `arity` fields.
pub(crate) fn split_list<'a>(
    text: &'a str,
    arity: usize,
    bundle: &Path,
    resource: &str,
) -> Result<Vec<(usize, Vec<&'a str>)>> {
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != arity {
            return Err(Error::InvalidListEntry {
                bundle: bundle.to_path_buf(),
                resource: resource.to_string(),
                line: idx + 1,
                reason: format!("expected {} fields, found {}", arity, fields.len()),
            });
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(Error::InvalidListEntry {
                bundle: bundle.to_path_buf(),
                resource: resource.to_string(),
                line: idx + 1,
                reason: "empty field".to_string(),
            });
        }
        rows.push((idx + 1, fields));
    }
    Ok(rows)
}

impl FileEntry {
    /// Parses a `versions.list`/`libraries.list` resource.
    pub fn parse_list(text: &str, bundle: &Path, resource: &str) -> Result<Vec<Self>> {
        Ok(split_list(text, 3, bundle, resource)?
            .into_iter()
            .map(|(_, f)| FileEntry {
                hash: f[0].to_string(),
                id: f[1].to_string(),
                path: f[2].to_string(),
            })
            .collect())
    }
}

impl PatchRecord {
    /// Parses a `patches.list` resource.
    pub fn parse_list(text: &str, bundle: &Path, resource: &str) -> Result<Vec<Self>> {
        Ok(split_list(text, 7, bundle, resource)?
            .into_iter()
            .map(|(_, f)| PatchRecord {
                group: f[0].to_string(),
                original_hash: f[1].to_string(),
                patch_hash: f[2].to_string(),
                output_hash: f[3].to_string(),
                original_path: f[4].to_string(),
                patch_path: f[5].to_string(),
                output_path: f[6].to_string(),
            })
            .collect())
    }
}

impl DownloadContext {
    /// Parses a `download-context` resource. It must hold exactly one entry.
    pub fn parse(text: &str, bundle: &Path, resource: &str) -> Result<Self> {
        let rows = split_list(text, 3, bundle, resource)?;
        match rows.as_slice() {
            [(_, f)] => Ok(DownloadContext {
                hash: f[0].to_string(),
                url: f[1].to_string(),
                file_name: f[2].to_string(),
            }),
            _ => Err(Error::InvalidListEntry {
                bundle: bundle.to_path_buf(),
                resource: resource.to_string(),
                line: rows.get(1).map(|(line, _)| *line).unwrap_or(1),
                reason: format!("expected exactly one entry, found {}", rows.len()),
            }),
        }
    }
}

// =============================================================================
// Output Group Set
// =============================================================================

/// A named file produced by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Logical name
    pub name: String,
    /// Location on disk
    pub path: PathBuf,
}

/// Extraction result: group label -> ordered artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputGroupSet {
    groups: BTreeMap<String, Vec<Artifact>>,
}

impl OutputGroupSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artifact to a group, creating the group if needed.
    pub fn insert(&mut self, group: &str, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.groups.entry(group.to_string()).or_default().push(Artifact {
            name: name.into(),
            path: path.into(),
        });
    }

    /// Declares a group without artifacts.
    pub fn ensure_group(&mut self, group: &str) {
        self.groups.entry(group.to_string()).or_default();
    }

    /// Returns a group's artifacts in list order.
    pub fn group(&self, label: &str) -> Option<&[Artifact]> {
        self.groups.get(label).map(Vec::as_slice)
    }

    /// Returns a group or `GroupNotFound`.
    pub fn require_group(&self, label: &str) -> Result<&[Artifact]> {
        self.group(label).ok_or_else(|| Error::GroupNotFound {
            group: label.to_string(),
        })
    }

    /// Returns the first artifact of `label`: the binary to remap.
    pub fn primary_artifact(&self, label: &str) -> Result<&Artifact> {
        self.require_group(label)?
            .first()
            .ok_or_else(|| Error::EmptyGroup {
                group: label.to_string(),
            })
    }

    /// Iterates over `(label, artifacts)` in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Artifact])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if there are no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lists() {
        let bundle = Path::new("paper.jar");
        let entries = FileEntry::parse_list(
            "# comment\nabc\tpaper:1.20\tpaper-1.20.jar\n\n",
            bundle,
            "versions.list",
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "paper-1.20.jar");

        let patches = PatchRecord::parse_list(
            "versions\ta\tb\tc\tmojang.jar\tpaper.patch\tpaper.jar\n",
            bundle,
            "patches.list",
        )
        .unwrap();
        assert_eq!(patches[0].output_path, "paper.jar");
    }

    #[test]
    fn test_bad_list_line_reports_position() {
        let err = FileEntry::parse_list("a\tb\tc\nbroken\n", Path::new("x.jar"), "libraries.list")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidListEntry { line: 2, .. }));
    }

    #[test]
    fn test_download_context() {
        let ctx = DownloadContext::parse(
            "ffee\thttps://example.org/server.jar\tmojang_1.20.jar\n",
            Path::new("x.jar"),
            "download-context",
        )
        .unwrap();
        assert_eq!(
            ctx.output_file(Path::new("/repo")),
            PathBuf::from("/repo/cache/mojang_1.20.jar")
        );
        assert!(DownloadContext::parse("", Path::new("x.jar"), "download-context").is_err());
    }

    #[test]
    fn test_group_lookup() {
        let mut groups = OutputGroupSet::new();
        groups.ensure_group(AUXILIARY_GROUP);
        groups.insert(PRIMARY_GROUP, "paper", "/repo/versions/paper.jar");

        assert_eq!(
            groups.primary_artifact(PRIMARY_GROUP).unwrap().name,
            "paper"
        );
        assert!(matches!(
            groups.primary_artifact(AUXILIARY_GROUP),
            Err(Error::EmptyGroup { .. })
        ));
        assert!(matches!(
            groups.require_group("missing"),
            Err(Error::GroupNotFound { .. })
        ));
    }
}
