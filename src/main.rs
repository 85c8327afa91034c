//! shellex - unpacks server bundler jars into a remapped, ready-to-run layout.
//!
//! Fetch a bundle, extract it, normalize its mappings and remap its server binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use shellex::bundle::{BundleCapabilities, BundleOptions, JarBundle, PatchLauncher};
use shellex::mapping::{load_index, normalize_mappings, INTERMEDIARY_NAMESPACE, NAMED_NAMESPACE};
use shellex::{
    run_pipeline, BundleSource, CancelToken, FetchOptions, Fetcher, NonClassCopyMode,
    PipelineConfig, PipelineOptions, ProgressFn, RemapOptions, RemapReport, Remapper,
};

/// Unpacks server bundler jars into a remapped, ready-to-run layout.
#[derive(Parser, Debug)]
#[command(name = "shellex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
    #[arg(short, long, default_value = "1", global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, extract, normalize, remap and materialize a bundle
    Run {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Repository, cache and working directory
        #[arg(long, env = "BUNDLER_REPO_DIR", default_value = "work")]
        repo_dir: PathBuf,

        /// Remapped server jar
        #[arg(short, long, default_value = "server.jar")]
        output: PathBuf,

        /// Directory receiving the libraries
        #[arg(short, long, default_value = "libraries")]
        libraries: PathBuf,

        /// Expected SHA-256 of a downloaded bundle
        #[arg(long)]
        sha256: Option<String>,

        /// Java executable used when the bundle has patches
        #[arg(long, env = "SHELLEX_JAVA", default_value = "java")]
        java: PathBuf,

        /// Highest class file major version the java executable runs
        #[arg(long, default_value_t = shellex::bundle::DEFAULT_MAX_CLASS_VERSION)]
        max_class_version: u16,

        /// Keep the normalized mapping table in the repo directory
        #[arg(long)]
        keep_work_files: bool,

        #[command(flatten)]
        remap: RemapArgs,
    },

    /// Download a file with optional hash verification
    Fetch {
        /// URL or local path
        source: String,

        /// Destination file
        output: PathBuf,

        /// Expected SHA-256
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Show what a bundle contains without extracting it
    Inspect {
        /// Bundler jar
        bundle: PathBuf,
    },

    /// Write the normalized mapping table of a server jar
    Normalize {
        /// Server jar embedding the mapping table
        primary: PathBuf,

        /// Normalized table
        #[arg(short, long, default_value = "mappings.tiny")]
        output: PathBuf,
    },

    /// Remap a jar with a Tiny mapping file
    Remap {
        /// Input jar
        input: PathBuf,

        /// Output jar
        output: PathBuf,

        /// Tiny v1 or v2 mapping file
        #[arg(short, long)]
        mappings: PathBuf,

        /// Source namespace
        #[arg(long, default_value = INTERMEDIARY_NAMESPACE)]
        from: String,

        /// Target namespace
        #[arg(long, default_value = NAMED_NAMESPACE)]
        to: String,

        #[command(flatten)]
        remap: RemapArgs,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct BundleArgs {
    /// Download the bundle from this URL
    #[arg(long)]
    jar_url: Option<String>,

    /// Use a bundle already on disk
    #[arg(long)]
    jar_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RemapArgs {
    /// Fail when the mappings or the output contain conflicts
    #[arg(long)]
    strict: bool,

    /// Number of parallel jobs (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Treatment of META-INF resources
    #[arg(long, value_enum, default_value_t = MetaInfMode::Fix)]
    meta_inf: MetaInfMode,

    /// Keep package-private access even when a rename splits a package
    #[arg(long)]
    no_access_fix: bool,

    /// Keep SourceFile attributes as they are
    #[arg(long)]
    keep_source_files: bool,

    /// Keep local variable names even when they are not valid identifiers
    #[arg(long)]
    keep_invalid_locals: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MetaInfMode {
    /// Copy everything unchanged
    Copy,
    /// Drop signatures and remap class names
    Fix,
    /// Leave META-INF out
    Skip,
}

impl RemapArgs {
    fn options(&self) -> RemapOptions {
        let mode = match self.meta_inf {
            MetaInfMode::Copy => NonClassCopyMode::Unchanged,
            MetaInfMode::Fix => NonClassCopyMode::FixMetaInf,
            MetaInfMode::Skip => NonClassCopyMode::SkipMetaInf,
        };
        RemapOptions::default()
            .with_ignore_conflicts(!self.strict)
            .with_threads(self.jobs)
            .with_non_class_copy_mode(mode)
            .with_fix_package_access(!self.no_access_fix)
            .with_rebuild_source_filenames(!self.keep_source_files)
            .with_rename_invalid_locals(!self.keep_invalid_locals)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    match cli.command {
        Commands::Run {
            bundle,
            repo_dir,
            output,
            libraries,
            sha256,
            java,
            max_class_version,
            keep_work_files,
            remap,
        } => {
            let source = match (bundle.jar_url, bundle.jar_file) {
                (Some(url), _) => BundleSource::Remote(url),
                (None, Some(path)) => BundleSource::Local(path),
                (None, None) => anyhow::bail!("either --jar-url or --jar-file is required"),
            };
            let bundle_options = BundleOptions {
                max_class_version,
                launcher: PatchLauncher::new(java),
                ..Default::default()
            };
            let mut options = PipelineOptions::default()
                .with_bundle(bundle_options)
                .with_remap(remap.options())
                .with_keep_work_files(keep_work_files);
            if let Some(sha256) = sha256 {
                options = options.with_bundle_sha256(sha256);
            }
            let config = PipelineConfig::new(source, repo_dir, output, libraries)
                .with_options(options);
            cmd_run(config, cli.verbosity)
        }
        Commands::Fetch {
            source,
            output,
            sha256,
        } => cmd_fetch(source, output, sha256, cli.verbosity),
        Commands::Inspect { bundle } => cmd_inspect(bundle),
        Commands::Normalize { primary, output } => cmd_normalize(primary, output),
        Commands::Remap {
            input,
            output,
            mappings,
            from,
            to,
            remap,
        } => cmd_remap(input, output, mappings, from, to, remap, cli.verbosity),
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Creates a progress bar, hidden when debug output would interleave with it.
fn progress_bar(template: &str, verbosity: u8) -> Result<ProgressBar> {
    let progress = if verbosity >= 3 {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    Ok(progress)
}

/// Adapts a progress bar to the library's progress callback.
fn progress_fn(progress: &ProgressBar) -> Arc<ProgressFn> {
    let progress = progress.clone();
    Arc::new(move |done: u64, total: Option<u64>| {
        if let Some(total) = total {
            progress.set_length(total);
        }
        progress.set_position(done);
    })
}

const BYTES_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const CLASSES_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} classes ({eta})";

fn cmd_run(config: PipelineConfig, verbosity: u8) -> Result<()> {
    let start = Instant::now();
    let download = progress_bar(BYTES_TEMPLATE, verbosity)?;
    let classes = progress_bar(CLASSES_TEMPLATE, verbosity)?;
    let config =
        config.with_progress(Some(progress_fn(&download)), Some(progress_fn(&classes)));

    let result = run_pipeline(&config, &CancelToken::new());
    download.finish_and_clear();
    classes.finish_and_clear();
    let report = result.with_context(|| {
        format!(
            "Failed to unpack {}",
            match &config.source {
                BundleSource::Remote(url) => url.clone(),
                BundleSource::Local(path) => path.display().to_string(),
            }
        )
    })?;

    println!("Bundle:     {}", report.bundle.display());
    println!("Patches:    {}", report.extraction.patch_count);
    if let Some(base) = &report.extraction.base_binary {
        println!("Base:       {}", base.display());
    }
    print_remap_report(&report.remap);
    println!(
        "Libraries:  {} in {} ({} updated)",
        report.materialize.total(),
        report.materialize.destination.display(),
        report.materialize.copied.len()
    );
    info!("Finished in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn cmd_fetch(
    source: String,
    output: PathBuf,
    sha256: Option<String>,
    verbosity: u8,
) -> Result<()> {
    let progress = progress_bar(BYTES_TEMPLATE, verbosity)?;
    let fetcher = Fetcher::new(FetchOptions::default())?.with_progress(progress_fn(&progress));

    let result = fetcher.fetch(&source, &output, sha256.as_deref(), &CancelToken::new());
    progress.finish_and_clear();
    let report = result.with_context(|| format!("Failed to fetch {}", source))?;

    if report.cached {
        println!("{} is already up to date", report.path.display());
    } else {
        println!("Fetched {} bytes into {}", report.bytes, report.path.display());
    }
    if let Some(sha256) = &report.sha256 {
        println!("SHA-256: {}", sha256);
    }
    Ok(())
}

fn cmd_inspect(path: PathBuf) -> Result<()> {
    let bundle = JarBundle::open(&path, BundleOptions::default())
        .with_context(|| format!("Failed to open bundle: {}", path.display()))?;

    println!("Bundle:       {}", path.display());
    println!(
        "Main class:   {}",
        bundle.main_class().unwrap_or("(none)")
    );
    if let Some(version) = bundle.entry_version() {
        println!("Class format: {}", version);
    }

    println!("Capabilities:");
    for capability in shellex::bundle::Capability::ALL {
        let present = bundle.capabilities().contains(capability.flag());
        println!("  {:<24} {}", capability.to_string(), if present { "yes" } else { "no" });
    }
    if let Some(missing) = bundle.capabilities().first_missing() {
        warn!("Bundle cannot be extracted: missing {}", missing);
        return Ok(());
    }

    let patches = bundle.find_patches()?;
    println!("Patches:      {}", patches.len());
    for patch in &patches {
        println!("  [{}] {} -> {}", patch.group, patch.original_path, patch.output_path);
    }

    match bundle.find_download_context()? {
        Some(context) => println!("Download:     {} ({})", context.url, context.file_name),
        None => println!("Download:     (none)"),
    }

    for (group, entries) in bundle.group_entries()? {
        println!("Group {} ({} files):", group, entries.len());
        for entry in entries {
            println!("  {:<40} {}", entry.id, entry.path);
        }
    }
    Ok(())
}

fn cmd_normalize(primary: PathBuf, output: PathBuf) -> Result<()> {
    let report = normalize_mappings(&primary, &output)
        .with_context(|| format!("Failed to normalize mappings of {}", primary.display()))?;

    println!("Wrote {} ({} bytes)", report.output.display(), report.size);
    for pair in &report.replaced {
        println!("  {} -> {}", pair.ambiguous, pair.canonical);
    }
    for pair in &report.missing {
        println!("  {} not found, left as is", pair.ambiguous);
    }
    Ok(())
}

fn cmd_remap(
    input: PathBuf,
    output: PathBuf,
    mappings: PathBuf,
    from: String,
    to: String,
    args: RemapArgs,
    verbosity: u8,
) -> Result<()> {
    let start = Instant::now();
    let index = load_index(&mappings, &from, &to)
        .with_context(|| format!("Failed to load mappings: {}", mappings.display()))?;

    let progress = progress_bar(CLASSES_TEMPLATE, verbosity)?;
    let remapper = Remapper::new(&index, args.options()).with_progress(progress_fn(&progress));
    let result = remapper.remap(&input, &output, &CancelToken::new());
    progress.finish_and_clear();
    let report = result.with_context(|| format!("Failed to remap {}", input.display()))?;

    print_remap_report(&report);
    info!(
        "Remapped {} in {:.2}s",
        input.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn print_remap_report(report: &RemapReport) {
    println!("Output:     {}", report.output.display());
    println!(
        "Classes:    {} ({} renamed, {} unmapped, {} copied unchanged)",
        report.classes, report.renamed, report.unresolved, report.copied_unchanged
    );
    println!(
        "Resources:  {} ({} left out)",
        report.resources, report.skipped_resources
    );
    if report.widened > 0 {
        println!("Widened:    {}", report.widened);
    }
    if !report.conflicts.is_empty() {
        println!("Conflicts:  {}", report.conflicts.len());
        for conflict in &report.conflicts {
            warn!("{}", conflict);
        }
    }
}
