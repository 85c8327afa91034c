//! Bundler jar adapter.
//!
//! This is the only place that knows how a bundler jar lays out its
//! manifest, list resources and embedded files. Everything is probed when the
//! jar is opened so that a missing capability is reported before any
//! extraction work starts.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

use super::capability::{BundleCapabilities, Capabilities, Capability};
use super::launcher::PatchLauncher;
use super::structs::*;
use crate::classfile::ClassFileHeader;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::util::{file_matches_hash, sha256_hex, write_atomically};

/// Manifest location.
pub const MANIFEST_RESOURCE: &str = "META-INF/MANIFEST.MF";
/// Patch list location.
pub const PATCHES_RESOURCE: &str = "META-INF/patches.list";
/// Download descriptor location.
pub const DOWNLOAD_CONTEXT_RESOURCE: &str = "META-INF/download-context";

/// Highest class file major version the default runtime accepts (Java 21).
pub const DEFAULT_MAX_CLASS_VERSION: u16 = 65;

/// Options for opening a bundle.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Highest accepted class file major version of the entry point
    pub max_class_version: u16,
    /// Group holding the primary binary
    pub primary_group: String,
    /// Group holding auxiliary files
    pub auxiliary_group: String,
    /// Launcher used when patches must be applied
    pub launcher: PatchLauncher,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            max_class_version: DEFAULT_MAX_CLASS_VERSION,
            primary_group: PRIMARY_GROUP.to_string(),
            auxiliary_group: AUXILIARY_GROUP.to_string(),
            launcher: PatchLauncher::default(),
        }
    }
}

/// A memory-mapped bundler jar.
#[derive(Debug)]
pub struct JarBundle {
    path: PathBuf,
    mmap: Mmap,
    options: BundleOptions,
    capabilities: Capabilities,
    main_class: Option<String>,
    entry_version: Option<u16>,
    patches_list: Option<String>,
    download_context: Option<String>,
    /// (group, list text) for every group list present
    group_lists: Vec<(String, String)>,
}

impl JarBundle {
    /// Opens and probes a bundle.
    ///
    /// Fails with `UnsupportedBundleVersion` when the entry point needs a
    /// newer runtime than `options.max_class_version`.
    pub fn open<P: AsRef<Path>>(path: P, options: BundleOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::FileOpen {
            path: path.clone(),
            source: e,
        })?;
        // SAFETY: The bundle is only read; callers must not modify it while open.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MemoryMap {
            path: path.clone(),
            source: e,
        })?;

        let mut archive =
            ZipArchive::new(Cursor::new(&mmap[..])).map_err(|e| Error::zip(&path, e))?;

        let mut capabilities = Capabilities::empty();

        let main_class = read_optional(&mut archive, &path, MANIFEST_RESOURCE)?
            .and_then(|m| {
                Manifest::parse(&m)
                    .main_attribute("Main-Class")
                    .map(str::to_string)
            });

        let mut entry_version = None;
        if let Some(main) = &main_class {
            let entry = format!("{}.class", main.replace('.', "/"));
            if let Some(data) = read_optional(&mut archive, &path, &entry)? {
                entry_version = ClassFileHeader::read(&data)
                    .filter(|h| h.is_valid())
                    .map(|h| h.major_version.get());
            }
        }
        if entry_version.is_some() {
            capabilities |= Capabilities::ENTRY_POINT
                | Capabilities::FIND_PATCHES
                | Capabilities::FIND_DOWNLOAD_CONTEXT;
        }

        let patches_list = read_optional_text(&mut archive, &path, PATCHES_RESOURCE)?;
        let download_context = read_optional_text(&mut archive, &path, DOWNLOAD_CONTEXT_RESOURCE)?;

        let mut group_lists = Vec::new();
        for group in [&options.primary_group, &options.auxiliary_group] {
            let resource = list_resource(group);
            if let Some(text) = read_optional_text(&mut archive, &path, &resource)? {
                group_lists.push((group.clone(), text));
            }
        }
        if group_lists.iter().any(|(g, _)| *g == options.primary_group) {
            capabilities |= Capabilities::EXTRACT_AND_APPLY;
        }

        if let Some(found) = entry_version {
            if found > options.max_class_version {
                return Err(Error::UnsupportedBundleVersion {
                    bundle: path,
                    found,
                    max_supported: options.max_class_version,
                });
            }
        }

        debug!(
            bundle = %path.display(),
            main_class = main_class.as_deref().unwrap_or("-"),
            capabilities = ?capabilities,
            "probed bundle"
        );
        drop(archive);

        Ok(Self {
            path,
            mmap,
            options,
            capabilities,
            main_class,
            entry_version,
            patches_list,
            download_context,
            group_lists,
        })
    }

    /// Entry point class name from the manifest.
    pub fn main_class(&self) -> Option<&str> {
        self.main_class.as_deref()
    }

    /// Class file major version of the entry point.
    pub fn entry_version(&self) -> Option<u16> {
        self.entry_version
    }

    /// Options the bundle was opened with.
    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    fn archive(&self) -> Result<ZipArchive<Cursor<&[u8]>>> {
        ZipArchive::new(Cursor::new(&self.mmap[..])).map_err(|e| Error::zip(&self.path, e))
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if self.capabilities.contains(capability.flag()) {
            Ok(())
        } else {
            Err(Error::MissingCapability {
                bundle: self.path.clone(),
                capability,
            })
        }
    }

    /// Files each group list declares, in list order.
    pub fn group_entries(&self) -> Result<Vec<(String, Vec<FileEntry>)>> {
        self.group_lists
            .iter()
            .map(|(group, text)| -> Result<(String, Vec<FileEntry>)> {
                let entries = FileEntry::parse_list(text, &self.path, &list_resource(group))?;
                Ok((group.clone(), entries))
            })
            .collect()
    }

    /// Copies every embedded group file into `repo`, skipping up-to-date ones.
    fn extract_embedded(&self, repo: &Path) -> Result<OutputGroupSet> {
        let mut archive = self.archive()?;
        let mut groups = OutputGroupSet::new();
        let mut written = 0usize;

        for (group, entries) in self.group_entries()? {
            groups.ensure_group(&group);
            for entry in entries {
                let target = repo.join(&group).join(&entry.path);
                if file_matches_hash(&target, &entry.hash) {
                    debug!(path = %target.display(), "up to date");
                } else {
                    let name = format!("META-INF/{}/{}", group, entry.path);
                    let data = read_required(&mut archive, &self.path, &name)?;
                    let actual = sha256_hex(&data);
                    if !actual.eq_ignore_ascii_case(&entry.hash) {
                        return Err(Error::HashMismatch {
                            path: PathBuf::from(name),
                            expected: entry.hash,
                            actual,
                        });
                    }
                    write_atomically(&target, &data)?;
                    written += 1;
                }
                groups.insert(&group, entry.id, target);
            }
        }

        info!("Extracted {} embedded file(s) into {}", written, repo.display());
        Ok(groups)
    }

    /// Builds the group set from the lists after an external patch run.
    fn collect_outputs(&self, repo: &Path) -> Result<OutputGroupSet> {
        let mut groups = OutputGroupSet::new();
        for (group, entries) in self.group_entries()? {
            groups.ensure_group(&group);
            for entry in entries {
                let target = repo.join(&group).join(&entry.path);
                if !target.is_file() {
                    return Err(Error::MissingOutput { path: target });
                }
                groups.insert(&group, entry.id, target);
            }
        }
        Ok(groups)
    }
}

impl BundleCapabilities for JarBundle {
    fn identity(&self) -> &Path {
        &self.path
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn find_patches(&self) -> Result<Vec<PatchRecord>> {
        self.require(Capability::FindPatches)?;
        match &self.patches_list {
            Some(text) => PatchRecord::parse_list(text, &self.path, PATCHES_RESOURCE),
            None => Ok(Vec::new()),
        }
    }

    fn find_download_context(&self) -> Result<Option<DownloadContext>> {
        self.require(Capability::FindDownloadContext)?;
        self.download_context
            .as_deref()
            .map(|text| DownloadContext::parse(text, &self.path, DOWNLOAD_CONTEXT_RESOURCE))
            .transpose()
    }

    fn extract_and_apply(
        &self,
        base: Option<&Path>,
        patches: &[PatchRecord],
        repo: &Path,
    ) -> Result<OutputGroupSet> {
        self.require(Capability::ExtractAndApply)?;
        if patches.is_empty() {
            return self.extract_embedded(repo);
        }

        // The launcher resolves the base binary under `repo` on its own.
        if let Some(base) = base {
            debug!(base = %base.display(), "base binary ready for patching");
        }
        self.options.launcher.run(&self.path, repo)?;
        self.collect_outputs(repo)
    }
}

/// Name of the list resource for a group.
fn list_resource(group: &str) -> String {
    format!("META-INF/{group}.list")
}

fn read_optional<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
    name: &str,
) -> Result<Option<Vec<u8>>> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            Ok(Some(data))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(Error::zip(path, e)),
    }
}

fn read_optional_text<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
    name: &str,
) -> Result<Option<String>> {
    Ok(read_optional(archive, path, name)?.map(|d| String::from_utf8_lossy(&d).into_owned()))
}

fn read_required<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
    name: &str,
) -> Result<Vec<u8>> {
    read_optional(archive, path, name)?.ok_or_else(|| Error::MissingOutput {
        path: PathBuf::from(name),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classfile::ClassBuilder;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Builds a bundler jar embedding `primary` and `libs` without patches.
    pub(crate) fn bundle_jar(
        primary: &[u8],
        libs: &[(&str, &[u8])],
        extra: &[(&str, &[u8])],
        major_version: u16,
    ) -> Vec<u8> {
        let mut main = ClassBuilder::new("io/papermc/paperclip/Main", Some("java/lang/Object"))
            .build();
        main.major_version = major_version;

        let mut versions = format!("{}\tpaper:1.20.4\tpaper-1.20.4.jar\n", sha256_hex(primary));
        if primary.is_empty() {
            versions.clear();
        }
        let libraries: String = libs
            .iter()
            .map(|(name, data)| format!("{}\tlib:{}\t{}\n", sha256_hex(data), name, name))
            .collect();

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut put = |name: &str, data: &[u8]| {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        };
        put(
            MANIFEST_RESOURCE,
            b"Manifest-Version: 1.0\r\nMain-Class: io.papermc.paperclip.Main\r\n\r\n",
        );
        put("io/papermc/paperclip/Main.class", &main.to_bytes());
        put("META-INF/versions.list", versions.as_bytes());
        put("META-INF/libraries.list", libraries.as_bytes());
        if !primary.is_empty() {
            put("META-INF/versions/paper-1.20.4.jar", primary);
        }
        for (name, data) in libs {
            put(&format!("META-INF/libraries/{name}"), data);
        }
        for (name, data) in extra {
            put(name, data);
        }
        zip.finish().unwrap().into_inner()
    }

    fn open(dir: &TempDir, jar: Vec<u8>) -> Result<JarBundle> {
        let path = dir.path().join("bundle.jar");
        std::fs::write(&path, jar).unwrap();
        JarBundle::open(path, BundleOptions::default())
    }

    #[test]
    fn test_probe_full_bundle() {
        let dir = TempDir::new().unwrap();
        let bundle = open(&dir, bundle_jar(b"primary", &[], &[], 61)).unwrap();
        assert_eq!(bundle.capabilities(), Capabilities::all());
        assert_eq!(bundle.main_class(), Some("io.papermc.paperclip.Main"));
        assert_eq!(bundle.entry_version(), Some(61));
        assert!(bundle.find_patches().unwrap().is_empty());
        assert!(bundle.find_download_context().unwrap().is_none());
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let err = open(&dir, bundle_jar(b"primary", &[], &[], 66)).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedBundleVersion {
                found: 66,
                max_supported: 65,
                ..
            }
        ));
    }

    #[test]
    fn test_plain_jar_lacks_entry_point() {
        let dir = TempDir::new().unwrap();
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("a.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"x").unwrap();
        let bundle = open(&dir, zip.finish().unwrap().into_inner()).unwrap();

        assert_eq!(
            bundle.capabilities().first_missing(),
            Some(Capability::EntryPoint)
        );
        assert!(matches!(
            bundle.find_patches(),
            Err(Error::MissingCapability {
                capability: Capability::FindPatches,
                ..
            })
        ));
    }

    #[test]
    fn test_extract_embedded_skips_up_to_date_files() {
        let dir = TempDir::new().unwrap();
        let bundle = open(
            &dir,
            bundle_jar(b"primary", &[("gson.jar", b"gson"), ("guava.jar", b"guava")], &[], 61),
        )
        .unwrap();
        let repo = dir.path().join("repo");

        let groups = bundle.extract_and_apply(None, &[], &repo).unwrap();
        let libs = groups.group(AUXILIARY_GROUP).unwrap();
        assert_eq!(libs.len(), 2);
        assert_eq!(std::fs::read(&libs[1].path).unwrap(), b"guava");

        let primary = groups.primary_artifact(PRIMARY_GROUP).unwrap();
        assert_eq!(primary.name, "paper:1.20.4");
        assert_eq!(primary.path, repo.join("versions/paper-1.20.4.jar"));

        // Second run finds everything in place.
        let again = bundle.extract_and_apply(None, &[], &repo).unwrap();
        assert_eq!(again, groups);
    }
}
