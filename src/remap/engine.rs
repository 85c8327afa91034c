//! Whole-archive remapping.
//!
//! Resources are carried over first, then every class is parsed, analysed
//! and rewritten in parallel. Classes are written in sorted order so the
//! same input and mappings always give the same archive.

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memmap2::Mmap;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::access::WidenSet;
use super::class::ClassRemapper;
use super::context::RemapContext;
use super::hierarchy::{ClassHierarchy, ClassInfo};
use super::meta_inf::{fix_manifest, fix_service, NonClassCopyMode, ResourceAction};
use super::sink::OutputSink;
use crate::cancel::CancelToken;
use crate::classfile::ClassFile;
use crate::error::{Error, Result};
use crate::fetch::ProgressFn;
use crate::mapping::{ClassMapper, Conflict, MappingIndex};

const VERSIONS_DIR: &str = "META-INF/versions/";

/// Remapping options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapOptions {
    /// Report conflicts but keep going
    pub ignore_conflicts: bool,
    /// Make package-private symbols public when remapping splits their package
    pub fix_package_access: bool,
    /// Derive `SourceFile` from the remapped class name
    pub rebuild_source_filenames: bool,
    /// Give local variables with unusable names a name derived from their type
    pub rename_invalid_locals: bool,
    /// Worker threads, or the global pool when `None`
    pub threads: Option<usize>,
    /// Treatment of resources
    pub non_class_copy_mode: NonClassCopyMode,
}

impl Default for RemapOptions {
    fn default() -> Self {
        Self {
            ignore_conflicts: true,
            fix_package_access: true,
            rebuild_source_filenames: true,
            rename_invalid_locals: true,
            threads: None,
            non_class_copy_mode: NonClassCopyMode::FixMetaInf,
        }
    }
}

impl RemapOptions {
    /// Sets whether conflicts are only reported.
    pub fn with_ignore_conflicts(mut self, ignore: bool) -> Self {
        self.ignore_conflicts = ignore;
        self
    }

    /// Sets whether package-private access is widened.
    pub fn with_fix_package_access(mut self, fix: bool) -> Self {
        self.fix_package_access = fix;
        self
    }

    /// Sets whether `SourceFile` attributes are rebuilt.
    pub fn with_rebuild_source_filenames(mut self, rebuild: bool) -> Self {
        self.rebuild_source_filenames = rebuild;
        self
    }

    /// Sets whether unusable local variable names are replaced.
    pub fn with_rename_invalid_locals(mut self, rename: bool) -> Self {
        self.rename_invalid_locals = rename;
        self
    }

    /// Sets the worker thread count.
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the resource copy mode.
    pub fn with_non_class_copy_mode(mut self, mode: NonClassCopyMode) -> Self {
        self.non_class_copy_mode = mode;
        self
    }
}

/// Summary of one remapping run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapReport {
    /// Written archive
    pub output: PathBuf,
    /// Class files written
    pub classes: usize,
    /// Classes whose name changed
    pub renamed: usize,
    /// Classes with no mapping
    pub unresolved: usize,
    /// Class files that could not be rewritten and were copied as is
    pub copied_unchanged: usize,
    /// Resources written
    pub resources: usize,
    /// Resources left out
    pub skipped_resources: usize,
    /// Classes and members made public
    pub widened: usize,
    /// Conflicts found in the mappings or the output
    pub conflicts: Vec<Conflict>,
}

/// A class entry after the parallel phase.
enum ClassOutput {
    Remapped {
        path: String,
        bytes: Vec<u8>,
        renamed: bool,
    },
    Unchanged {
        path: String,
        bytes: Vec<u8>,
    },
}

impl ClassOutput {
    fn path(&self) -> &str {
        match self {
            ClassOutput::Remapped { path, .. } | ClassOutput::Unchanged { path, .. } => path,
        }
    }
}

/// A class entry that parsed.
struct InputClass {
    entry: String,
    prefix: String,
    raw: Vec<u8>,
}

/// Result of the parallel class phase.
#[derive(Default)]
struct ClassBatch {
    outputs: Vec<ClassOutput>,
    unresolved: usize,
    widened: usize,
    conflicts: Vec<Conflict>,
}

/// Remaps archives against one [`MappingIndex`].
pub struct Remapper<'a> {
    index: &'a MappingIndex,
    options: RemapOptions,
    progress: Option<Arc<ProgressFn>>,
}

impl std::fmt::Debug for Remapper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remapper")
            .field("from", &self.index.from_namespace())
            .field("to", &self.index.to_namespace())
            .field("options", &self.options)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl<'a> Remapper<'a> {
    /// Creates a remapper with the given options.
    pub fn new(index: &'a MappingIndex, options: RemapOptions) -> Self {
        Self {
            index,
            options,
            progress: None,
        }
    }

    /// Installs a callback reporting remapped classes out of the total.
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Options in use.
    pub fn options(&self) -> &RemapOptions {
        &self.options
    }

    /// Remaps the archive at `input` into `output`.
    ///
    /// `output` is replaced only when the whole run succeeds.
    pub fn remap(&self, input: &Path, output: &Path, cancel: &CancelToken) -> Result<RemapReport> {
        let file = File::open(input).map_err(|e| Error::FileOpen {
            path: input.to_path_buf(),
            source: e,
        })?;
        // SAFETY: The input archive is only read; callers must not modify it while remapping.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MemoryMap {
            path: input.to_path_buf(),
            source: e,
        })?;
        let mut archive =
            ZipArchive::new(Cursor::new(&mmap[..])).map_err(|e| Error::zip(input, e))?;

        let mut class_entries = Vec::new();
        let mut resources = Vec::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| Error::zip(input, e))?;
            let name = entry.name().to_string();
            if !entry.is_dir() && name.ends_with(".class") {
                class_entries.push((index, name));
            } else {
                resources.push((index, name));
            }
        }
        if class_entries.is_empty() {
            return Err(Error::EmptyInput {
                path: input.to_path_buf(),
            });
        }

        info!(
            "Remapping {} ({} classes, {} resources) from {} to {}",
            input.display(),
            class_entries.len(),
            resources.len(),
            self.index.from_namespace(),
            self.index.to_namespace()
        );

        let mut sink = OutputSink::create(output)?;
        let mut report = RemapReport::default();

        for (index, name) in &resources {
            cancel.check()?;
            match self.options.non_class_copy_mode.action(name) {
                ResourceAction::Copy => {
                    if sink.copy_raw(&mut archive, input, *index)? {
                        report.resources += 1;
                    }
                }
                ResourceAction::Skip => {
                    debug!("Leaving out {}", name);
                    report.skipped_resources += 1;
                }
                ResourceAction::FixManifest => {
                    let data = read_entry(&mut archive, input, *index)?;
                    if sink.write(name, &fix_manifest(&data, self.index))? {
                        report.resources += 1;
                    }
                }
                ResourceAction::FixService => {
                    let data = read_entry(&mut archive, input, *index)?;
                    let (path, fixed) = fix_service(name, &data, self.index);
                    if sink.write(&path, &fixed)? {
                        report.resources += 1;
                    }
                }
            }
        }

        let batch = self.in_pool(|| self.remap_classes(&archive, input, &class_entries, cancel))??;
        cancel.check()?;

        let mut conflicts = self.index.conflicts().to_vec();
        conflicts.extend(batch.conflicts);
        if !conflicts.is_empty() {
            if !self.options.ignore_conflicts {
                for conflict in &conflicts {
                    warn!("{conflict}");
                }
                return Err(Error::RemapConflicts {
                    count: conflicts.len(),
                });
            }
            warn!("Ignoring {} remapping conflict(s)", conflicts.len());
        }

        let mut outputs = batch.outputs;
        outputs.sort_by(|a, b| a.path().cmp(b.path()));
        for output in outputs {
            match output {
                ClassOutput::Remapped {
                    path,
                    bytes,
                    renamed,
                } => {
                    if sink.write(&path, &bytes)? {
                        report.classes += 1;
                        report.renamed += usize::from(renamed);
                    }
                }
                ClassOutput::Unchanged { path, bytes } => {
                    if sink.write(&path, &bytes)? {
                        report.classes += 1;
                        report.copied_unchanged += 1;
                    }
                }
            }
        }

        cancel.check()?;
        report.unresolved = batch.unresolved;
        report.widened = batch.widened;
        report.conflicts = conflicts;
        report.output = sink.finish()?;

        info!(
            "Wrote {} ({} classes, {} renamed, {} unresolved, {} resources)",
            report.output.display(),
            report.classes,
            report.renamed,
            report.unresolved,
            report.resources
        );
        Ok(report)
    }

    /// Runs `job` on a dedicated pool when a thread count is configured.
    fn in_pool<T: Send>(&self, job: impl FnOnce() -> T + Send) -> Result<T> {
        match self.options.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {e}")))?;
                Ok(pool.install(job))
            }
            None => Ok(job()),
        }
    }

    fn remap_classes<R: Read + Seek + Clone + Send + Sync>(
        &self,
        archive: &ZipArchive<R>,
        input: &Path,
        entries: &[(usize, String)],
        cancel: &CancelToken,
    ) -> Result<ClassBatch> {
        let mut batch = ClassBatch::default();

        let raw: Vec<(String, Vec<u8>)> = entries
            .par_iter()
            .map_init(
                || archive.clone(),
                |archive, (index, name)| {
                    cancel.check()?;
                    Ok((name.clone(), read_entry(archive, input, *index)?))
                },
            )
            .collect::<Result<_>>()?;

        let mut inputs = Vec::with_capacity(raw.len());
        let mut classes = Vec::with_capacity(raw.len());
        for (entry, bytes) in raw {
            match ClassFile::parse(&bytes, &entry) {
                Ok(class) if class.name().is_some() => {
                    inputs.push(InputClass {
                        prefix: version_prefix(&entry).to_string(),
                        entry,
                        raw: bytes,
                    });
                    classes.push(class);
                }
                Ok(_) => {
                    warn!("Copying {} unchanged: this_class is not a class", entry);
                    batch.outputs.push(ClassOutput::Unchanged { path: entry, bytes });
                }
                Err(e) => {
                    warn!("Copying {} unchanged: {}", entry, e);
                    batch.outputs.push(ClassOutput::Unchanged { path: entry, bytes });
                }
            }
        }
        cancel.check()?;

        // Versioned copies come first so base classes win in the hierarchy.
        let mut order: Vec<usize> = (0..classes.len()).collect();
        order.sort_by_key(|&i| inputs[i].prefix.is_empty());
        let hierarchy = ClassHierarchy::new(
            order
                .iter()
                .filter_map(|&i| ClassInfo::from_class(&classes[i])),
        );

        for name in class_names(&classes) {
            if self.index.map_class(&name).is_none() {
                debug!("No mapping for class {}", name);
                batch.unresolved += 1;
            }
        }

        let widen = if self.options.fix_package_access {
            WidenSet::analyze(&classes, &hierarchy, self.index)
        } else {
            WidenSet::default()
        };
        batch.widened = widen.len();
        if !widen.is_empty() {
            info!("Widening access of {} symbol(s)", widen.len());
        }

        let ctx = RemapContext {
            index: self.index,
            hierarchy: &hierarchy,
            widen: &widen,
            options: &self.options,
        };
        let total = classes.len() as u64;
        let done = AtomicU64::new(0);

        let remapped: Vec<(ClassOutput, Vec<Conflict>)> = classes
            .par_iter()
            .zip(inputs.par_iter())
            .map(|(class, input)| {
                cancel.check()?;
                let result = match ClassRemapper::remap(ctx, class, &input.entry) {
                    Ok(out) => {
                        let output = ClassOutput::Remapped {
                            path: format!("{}{}.class", input.prefix, out.name),
                            renamed: out.renamed(),
                            bytes: out.bytes,
                        };
                        (output, out.conflicts)
                    }
                    Err(e) => {
                        warn!("Copying {} unchanged: {}", input.entry, e);
                        let output = ClassOutput::Unchanged {
                            path: input.entry.clone(),
                            bytes: input.raw.clone(),
                        };
                        (output, Vec::new())
                    }
                };
                let count = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(progress) = &self.progress {
                    progress(count, Some(total));
                }
                Ok(result)
            })
            .collect::<Result<_>>()?;

        // Entries copied before parsing keep their own path.
        let mut origins: Vec<(String, String)> = batch
            .outputs
            .iter()
            .map(|output| (output.path().to_string(), output.path().to_string()))
            .collect();
        for ((output, conflicts), input) in remapped.into_iter().zip(&inputs) {
            origins.push((input.entry.clone(), output.path().to_string()));
            batch.outputs.push(output);
            batch.conflicts.extend(conflicts);
        }
        batch.conflicts.extend(duplicate_targets(origins));
        Ok(batch)
    }
}

/// Reports every pair of input entries written to the same output entry.
fn duplicate_targets(mut origins: Vec<(String, String)>) -> Vec<Conflict> {
    origins.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    origins
        .windows(2)
        .filter(|pair| pair[0].1 == pair[1].1)
        .map(|pair| Conflict::DuplicateTarget {
            target: pair[0].1.clone(),
            sources: (pair[0].0.clone(), pair[1].0.clone()),
        })
        .collect()
}

/// Distinct class names of the input, sorted.
fn class_names(classes: &[ClassFile]) -> Vec<String> {
    let mut names: Vec<String> = classes
        .iter()
        .filter_map(|c| c.name().map(|n| n.into_owned()))
        .collect();
    names.sort();
    names.dedup();
    names
}

/// `META-INF/versions/<n>/` for multi-release entries, otherwise empty.
fn version_prefix(entry: &str) -> &str {
    let Some(rest) = entry.strip_prefix(VERSIONS_DIR) else {
        return "";
    };
    match rest.find('/') {
        Some(pos) => &entry[..VERSIONS_DIR.len() + pos + 1],
        None => "",
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
    index: usize,
) -> Result<Vec<u8>> {
    let mut entry = archive.by_index(index).map_err(|e| Error::zip(path, e))?;
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|e| Error::zip(path, e.into()))?;
    Ok(data)
}
