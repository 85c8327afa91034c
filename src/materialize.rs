//! Copies auxiliary artifacts into an output directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::bundle::structs::OutputGroupSet;
use crate::error::{Error, Result};
use crate::util::sha256_file;

/// Summary of a materialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Destination directory
    pub destination: PathBuf,
    /// Files written
    pub copied: Vec<PathBuf>,
    /// Files already up to date
    pub unchanged: Vec<PathBuf>,
}

impl MaterializeReport {
    /// Number of files present in the destination after the run.
    pub fn total(&self) -> usize {
        self.copied.len() + self.unchanged.len()
    }
}

/// Copies every artifact of `group` into `destination`, flat, by file name.
///
/// The directory is created if needed. Files whose content already matches
/// are left alone; any other same-named file is overwritten. A missing
/// group is an error, an empty one is not. Two artifacts sharing a file
/// name fail the run before anything is copied.
pub fn materialize(
    groups: &OutputGroupSet,
    group: &str,
    destination: &Path,
) -> Result<MaterializeReport> {
    let artifacts = groups.require_group(group)?;
    let mut targets = Vec::with_capacity(artifacts.len());
    let mut names = HashSet::new();
    for artifact in artifacts {
        let file_name = artifact
            .path
            .file_name()
            .ok_or_else(|| Error::MissingOutput {
                path: artifact.path.clone(),
            })?;
        if !names.insert(file_name) {
            return Err(Error::DuplicateFileName {
                group: group.to_string(),
                name: file_name.to_string_lossy().into_owned(),
            });
        }
        targets.push(destination.join(file_name));
    }

    fs::create_dir_all(destination).map_err(|e| Error::CreateDir {
        path: destination.to_path_buf(),
        source: e,
    })?;

    let mut report = MaterializeReport {
        destination: destination.to_path_buf(),
        ..Default::default()
    };

    for (artifact, target) in artifacts.iter().zip(targets) {
        if is_same_content(&artifact.path, &target)? {
            debug!("{} is up to date", target.display());
            report.unchanged.push(target);
            continue;
        }

        fs::copy(&artifact.path, &target).map_err(|e| {
            if artifact.path.exists() {
                Error::FileWrite {
                    path: target.clone(),
                    source: e,
                }
            } else {
                Error::MissingOutput {
                    path: artifact.path.clone(),
                }
            }
        })?;
        debug!("Copied {} to {}", artifact.name, target.display());
        report.copied.push(target);
    }

    info!(
        "Materialized {} {} file(s) into {} ({} updated)",
        report.total(),
        group,
        destination.display(),
        report.copied.len()
    );
    Ok(report)
}

fn is_same_content(source: &Path, target: &Path) -> Result<bool> {
    let Ok(target_meta) = fs::metadata(target) else {
        return Ok(false);
    };
    let source_meta = fs::metadata(source).map_err(|_| Error::MissingOutput {
        path: source.to_path_buf(),
    })?;
    if !target_meta.is_file() || source_meta.len() != target_meta.len() {
        return Ok(false);
    }

    let hash = |path: &Path| {
        sha256_file(path).map_err(|e| Error::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })
    };
    Ok(hash(source)? == hash(target)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::structs::AUXILIARY_GROUP;
    use tempfile::TempDir;

    fn groups(dir: &Path, files: &[(&str, &str)]) -> OutputGroupSet {
        let mut groups = OutputGroupSet::new();
        groups.ensure_group(AUXILIARY_GROUP);
        for (name, content) in files {
            let path = dir.join("libraries/org/example").join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            groups.insert(AUXILIARY_GROUP, *name, path);
        }
        groups
    }

    #[test]
    fn test_copies_every_file() {
        let dir = TempDir::new().unwrap();
        let set = groups(
            dir.path(),
            &[("gson.jar", "g"), ("guava.jar", "gu"), ("jopt.jar", "j")],
        );
        let dest = dir.path().join("out/libs");

        let report = materialize(&set, AUXILIARY_GROUP, &dest).unwrap();
        assert_eq!(report.copied.len(), 3);
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 3);
        assert_eq!(fs::read(dest.join("guava.jar")).unwrap(), b"gu");
    }

    #[test]
    fn test_rerun_overwrites_only_changed_files() {
        let dir = TempDir::new().unwrap();
        let set = groups(dir.path(), &[("a.jar", "one"), ("b.jar", "two")]);
        let dest = dir.path().join("libs");
        materialize(&set, AUXILIARY_GROUP, &dest).unwrap();

        fs::write(dir.path().join("libraries/org/example/b.jar"), "TWO!").unwrap();
        let report = materialize(&set, AUXILIARY_GROUP, &dest).unwrap();

        assert_eq!(report.copied, vec![dest.join("b.jar")]);
        assert_eq!(report.unchanged, vec![dest.join("a.jar")]);
        assert_eq!(fs::read(dest.join("b.jar")).unwrap(), b"TWO!");
    }

    #[test]
    fn test_shared_file_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut set = groups(dir.path(), &[("gson.jar", "old")]);
        let other = dir.path().join("libraries/com/google/gson.jar");
        fs::create_dir_all(other.parent().unwrap()).unwrap();
        fs::write(&other, "new").unwrap();
        set.insert(AUXILIARY_GROUP, "gson-2", other);
        let dest = dir.path().join("libs");

        let err = materialize(&set, AUXILIARY_GROUP, &dest).unwrap_err();
        assert!(matches!(err, Error::DuplicateFileName { ref name, .. } if name == "gson.jar"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_missing_and_empty_groups() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("libs");

        let err = materialize(&OutputGroupSet::new(), AUXILIARY_GROUP, &dest).unwrap_err();
        assert!(matches!(err, Error::GroupNotFound { .. }));
        assert!(!dest.exists());

        let set = groups(dir.path(), &[]);
        let report = materialize(&set, AUXILIARY_GROUP, &dest).unwrap();
        assert_eq!(report.total(), 0);
        assert!(dest.is_dir());
    }
}
