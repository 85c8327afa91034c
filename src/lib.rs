//! shellex - unpacks server bundler jars into a remapped, ready-to-run layout.
//!
//! A bundler jar carries its server binary and libraries embedded (and
//! sometimes as patches against a downloadable base binary). This library
//! extracts it, normalizes the embedded mapping table and remaps the
//! primary binary's classes into readable names.
//!
//! # Features
//!
//! - Remote or local bundle fetching with SHA-256 verification
//! - Capability probing of the bundle layout before any work starts
//! - Structured Tiny mapping header normalization
//! - Parallel class remapping with hierarchy-aware member lookup
//! - Atomic outputs: nothing half-written is ever visible
//!
//! # Example
//!
//! ```no_run
//! use shellex::{run_pipeline, BundleSource, CancelToken, PipelineConfig};
//!
//! fn main() -> shellex::Result<()> {
//!     let config = PipelineConfig::new(
//!         BundleSource::Local("paper-bundler.jar".into()),
//!         "work",
//!         "server.jar",
//!         "libraries",
//!     );
//!     let report = run_pipeline(&config, &CancelToken::new())?;
//!     println!("{} classes remapped", report.remap.classes);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bundle;
pub mod cancel;
pub mod classfile;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod mapping;
pub mod materialize;
pub mod remap;
pub mod util;

// Re-export main types
pub use bundle::{BundleOptions, Extraction, Introspector, JarBundle};
pub use cancel::CancelToken;
pub use error::{Error, ErrorKind, Result, Stage};
pub use fetch::{FetchOptions, FetchReport, Fetcher, ProgressFn};
pub use materialize::{materialize, MaterializeReport};
pub use remap::{NonClassCopyMode, RemapOptions, RemapReport, Remapper};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use mapping::{load_index, normalize_mappings, NormalizeReport};
use mapping::{INTERMEDIARY_NAMESPACE, NAMED_NAMESPACE};

/// Name of the normalized mapping table inside the repo directory.
const MAPPINGS_WORK_FILE: &str = "mappings/normalized.tiny";

/// Where the bundle comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// Downloaded into the repo directory first
    Remote(String),
    /// Already on disk
    Local(PathBuf),
}

impl BundleSource {
    /// File name the bundle is stored under when it has to be fetched.
    fn file_name(&self) -> String {
        match self {
            BundleSource::Remote(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.rsplit('/').next())
                .filter(|name| !name.is_empty())
                .unwrap_or("bundle.jar")
                .to_string(),
            BundleSource::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "bundle.jar".to_string()),
        }
    }
}

/// Options for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// How the bundle is opened
    pub bundle: BundleOptions,
    /// How the primary binary is remapped
    pub remap: RemapOptions,
    /// How remote files are fetched
    pub fetch: FetchOptions,
    /// Expected SHA-256 of a remote bundle
    pub bundle_sha256: Option<String>,
    /// Namespace the primary binary is written in
    pub from_namespace: String,
    /// Namespace to remap into
    pub to_namespace: String,
    /// Keep the normalized mapping table after remapping
    pub keep_work_files: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            bundle: BundleOptions::default(),
            remap: RemapOptions::default(),
            fetch: FetchOptions::default(),
            bundle_sha256: None,
            from_namespace: INTERMEDIARY_NAMESPACE.to_string(),
            to_namespace: NAMED_NAMESPACE.to_string(),
            keep_work_files: false,
        }
    }
}

impl PipelineOptions {
    /// Sets the remapping options.
    pub fn with_remap(mut self, remap: RemapOptions) -> Self {
        self.remap = remap;
        self
    }

    /// Sets the bundle options.
    pub fn with_bundle(mut self, bundle: BundleOptions) -> Self {
        self.bundle = bundle;
        self
    }

    /// Sets the expected hash of a remote bundle.
    pub fn with_bundle_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.bundle_sha256 = Some(sha256.into());
        self
    }

    /// Sets the remapping direction.
    pub fn with_namespaces(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_namespace = from.into();
        self.to_namespace = to.into();
        self
    }

    /// Keeps intermediate files in the repo directory.
    pub fn with_keep_work_files(mut self, keep: bool) -> Self {
        self.keep_work_files = keep;
        self
    }
}

/// Everything a pipeline run needs. All paths are explicit.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Bundle to unpack
    pub source: BundleSource,
    /// Repository, cache and working directory
    pub repo_dir: PathBuf,
    /// Remapped primary binary
    pub output_jar: PathBuf,
    /// Directory receiving the auxiliary files
    pub libraries_dir: PathBuf,
    /// Run options
    pub options: PipelineOptions,
    /// Byte progress of downloads
    pub fetch_progress: Option<Arc<ProgressFn>>,
    /// Class progress of remapping
    pub remap_progress: Option<Arc<ProgressFn>>,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("source", &self.source)
            .field("repo_dir", &self.repo_dir)
            .field("output_jar", &self.output_jar)
            .field("libraries_dir", &self.libraries_dir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PipelineConfig {
    /// Creates a configuration with default options.
    pub fn new(
        source: BundleSource,
        repo_dir: impl Into<PathBuf>,
        output_jar: impl Into<PathBuf>,
        libraries_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            repo_dir: repo_dir.into(),
            output_jar: output_jar.into(),
            libraries_dir: libraries_dir.into(),
            options: PipelineOptions::default(),
            fetch_progress: None,
            remap_progress: None,
        }
    }

    /// Sets the run options.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Installs progress callbacks for downloads and remapping.
    pub fn with_progress(
        mut self,
        fetch: Option<Arc<ProgressFn>>,
        remap: Option<Arc<ProgressFn>>,
    ) -> Self {
        self.fetch_progress = fetch;
        self.remap_progress = remap;
        self
    }

    /// Path of the normalized mapping table.
    pub fn mappings_path(&self) -> PathBuf {
        self.repo_dir.join(MAPPINGS_WORK_FILE)
    }
}

/// What a pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Bundle that was unpacked
    pub bundle: PathBuf,
    /// Bundle download, when the source was remote
    pub fetch: Option<FetchReport>,
    /// Extracted output groups
    pub extraction: Extraction,
    /// Mapping normalization
    pub normalize: NormalizeReport,
    /// Remapping of the primary binary
    pub remap: RemapReport,
    /// Auxiliary files copied out
    pub materialize: MaterializeReport,
}

/// Runs fetch, introspect, normalize, remap and materialize in order.
///
/// Any failure aborts the run and names the stage it happened in. Remapping
/// conflicts only abort when `ignore_conflicts` is off.
pub fn run_pipeline(config: &PipelineConfig, cancel: &CancelToken) -> Result<PipelineReport> {
    let options = &config.options;
    fs::create_dir_all(&config.repo_dir).map_err(|e| Error::CreateDir {
        path: config.repo_dir.clone(),
        source: e,
    })?;

    let mut fetcher = Fetcher::new(options.fetch.clone()).map_err(|e| e.in_stage(Stage::Fetch))?;
    if let Some(progress) = &config.fetch_progress {
        fetcher = fetcher.with_progress(Arc::clone(progress));
    }

    // Stage 1: fetch
    let (bundle_path, fetch) = match &config.source {
        BundleSource::Local(path) => (path.clone(), None),
        BundleSource::Remote(url) => {
            let target = config.repo_dir.join(config.source.file_name());
            let report = fetcher
                .fetch(url, &target, options.bundle_sha256.as_deref(), cancel)
                .map_err(|e| e.in_stage(Stage::Fetch))?;
            (target, Some(report))
        }
    };
    cancel.check()?;

    // Stage 2: introspect
    let extraction = JarBundle::open(&bundle_path, options.bundle.clone())
        .and_then(|bundle| Introspector::new(&fetcher, cancel).extract(&bundle, &config.repo_dir))
        .map_err(|e| e.in_stage(Stage::Introspect))?;
    let primary = extraction
        .groups
        .primary_artifact(&options.bundle.primary_group)
        .map_err(|e| e.in_stage(Stage::Introspect))?
        .path
        .clone();
    info!("Primary binary: {}", primary.display());
    // Checked here so a bundle without libraries fails before any output is written.
    extraction
        .groups
        .require_group(&options.bundle.auxiliary_group)
        .map_err(|e| e.in_stage(Stage::Materialize))?;
    cancel.check()?;

    // Stage 3a: normalize
    let mappings_path = config.mappings_path();
    let normalize =
        normalize_mappings(&primary, &mappings_path).map_err(|e| e.in_stage(Stage::Normalize))?;
    cancel.check()?;

    // Stage 3b: remap
    let remap = remap_primary(config, &primary, &mappings_path, cancel)
        .map_err(|e| e.in_stage(Stage::Remap))?;
    if !options.keep_work_files {
        discard(&mappings_path);
    }
    cancel.check()?;

    // Stage 4: materialize
    let materialize = materialize(
        &extraction.groups,
        &options.bundle.auxiliary_group,
        &config.libraries_dir,
    )
    .map_err(|e| e.in_stage(Stage::Materialize))?;

    Ok(PipelineReport {
        bundle: bundle_path,
        fetch,
        extraction,
        normalize,
        remap,
        materialize,
    })
}

fn remap_primary(
    config: &PipelineConfig,
    primary: &Path,
    mappings: &Path,
    cancel: &CancelToken,
) -> Result<RemapReport> {
    let options = &config.options;
    let index = load_index(mappings, &options.from_namespace, &options.to_namespace)?;
    let mut remapper = Remapper::new(&index, options.remap.clone());
    if let Some(progress) = &config.remap_progress {
        remapper = remapper.with_progress(Arc::clone(progress));
    }
    remapper.remap(primary, &config.output_jar, cancel)
}

/// Removes a working file, ignoring failures.
fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) => debug!("Could not remove {}: {}", path.display(), e),
    }
}
