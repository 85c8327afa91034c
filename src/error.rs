//! Error types for bundle extraction and remapping.
//!
//! Errors are grouped the way operators need to read them: configuration
//! problems caught before any I/O, transfer failures, format/version problems
//! with the bundle or its artifacts, and remapping conflicts. Every variant
//! maps onto an [`ErrorKind`] through [`Error::kind`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::bundle::Capability;

/// The main error type for extraction and remapping operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to memory map file '{path}': {source}")]
    MemoryMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error in '{path}': {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    // ==================== Configuration Errors ====================
    #[error("bundle '{bundle}' lists {patches} patch(es) but has no download context")]
    PatchesWithoutDownloadContext { bundle: PathBuf, patches: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ==================== Transfer Errors ====================
    #[error("request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{url}' answered with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid source url '{url}'")]
    InvalidUrl { url: String },

    #[error("hash mismatch for '{path}': expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to download base binary from '{url}': {source}")]
    BaseDownload {
        url: String,
        #[source]
        source: Box<Error>,
    },

    // ==================== Format / Version Errors ====================
    #[error("bundle '{bundle}' does not expose the {capability} capability")]
    MissingCapability {
        bundle: PathBuf,
        capability: Capability,
    },

    #[error(
        "bundle '{bundle}' needs class file version {found}, this tool runs at most {max_supported}"
    )]
    UnsupportedBundleVersion {
        bundle: PathBuf,
        found: u16,
        max_supported: u16,
    },

    #[error("bundle '{bundle}' cannot run on the configured runtime: {detail}")]
    IncompatibleRuntime { bundle: PathBuf, detail: String },

    #[error("malformed '{resource}' line {line} in bundle '{bundle}': {reason}")]
    InvalidListEntry {
        bundle: PathBuf,
        resource: String,
        line: usize,
        reason: String,
    },

    #[error("output group '{group}' not found")]
    GroupNotFound { group: String },

    #[error("output group '{group}' is empty")]
    EmptyGroup { group: String },

    #[error("output group '{group}' has more than one file named '{name}'")]
    DuplicateFileName { group: String, name: String },

    #[error("expected primary artifact not found: '{path}' has no '{resource}'")]
    PrimaryArtifactNotFound { path: PathBuf, resource: String },

    #[error("extraction produced no file at '{path}'")]
    MissingOutput { path: PathBuf },

    #[error("invalid mappings at line {line}: {reason}")]
    InvalidMappings { line: usize, reason: String },

    #[error("namespace '{namespace}' not declared by mappings (available: {available})")]
    UnknownNamespace {
        namespace: String,
        available: String,
    },

    #[error("invalid class file '{name}' at offset {offset:#x}: {reason}")]
    InvalidClassFile {
        name: String,
        offset: usize,
        reason: String,
    },

    #[error("constant pool of '{class}' overflowed while remapping")]
    ConstantPoolOverflow { class: String },

    // ==================== Patch Process Errors ====================
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bundle patch process exited with {status}: {stderr}")]
    PatchProcess { status: String, stderr: String },

    // ==================== Remapping Errors ====================
    #[error("remapping found {count} conflict(s) and conflicts are not ignored")]
    RemapConflicts { count: usize },

    #[error("'{path}' contains no class files to remap")]
    EmptyInput { path: PathBuf },

    // ==================== Pipeline Errors ====================
    #[error("operation cancelled")]
    Cancelled,

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

/// A specialized Result type for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an error, matching how callers react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invariant violations detectable before any I/O. Never retried.
    Configuration,
    /// Network or I/O failure while fetching. Retry belongs to the fetcher's caller.
    Transfer,
    /// Missing structure or unsupported version.
    Format,
    /// Remapping conflicts surfaced as a failure (strict mode only).
    Remap,
    /// Local filesystem failure.
    Io,
    /// The run was cancelled.
    Cancelled,
}

/// Pipeline stage, used to label aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Introspect,
    Normalize,
    Remap,
    Materialize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Introspect => "introspect",
            Stage::Normalize => "normalize",
            Stage::Remap => "remap",
            Stage::Materialize => "materialize",
        })
    }
}

impl Error {
    /// Returns the taxonomy bucket this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_)
            | Error::FileOpen { .. }
            | Error::MemoryMap { .. }
            | Error::FileWrite { .. }
            | Error::CreateDir { .. } => ErrorKind::Io,
            Error::PatchesWithoutDownloadContext { .. } | Error::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            Error::Http { .. }
            | Error::HttpStatus { .. }
            | Error::InvalidUrl { .. }
            | Error::HashMismatch { .. }
            | Error::BaseDownload { .. } => ErrorKind::Transfer,
            Error::RemapConflicts { .. } => ErrorKind::Remap,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Stage { source, .. } => source.kind(),
            _ => ErrorKind::Format,
        }
    }

    /// Returns the stage that failed, if the error was raised by the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns true if this error indicates a recoverable condition.
    ///
    /// Remapping conflicts are logged and skipped unless the caller asked
    /// for strict remapping.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::RemapConflicts { .. })
    }

    /// Creates a class file parse error.
    #[inline]
    pub fn class_file(name: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        Error::InvalidClassFile {
            name: name.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a mappings parse error.
    #[inline]
    pub fn mappings(line: usize, reason: impl Into<String>) -> Self {
        Error::InvalidMappings {
            line,
            reason: reason.into(),
        }
    }

    /// Wraps an error with the stage it occurred in.
    ///
    /// Cancellation is passed through untouched so callers can match on it.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Error::Cancelled | Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Wraps a zip error with the archive path.
    #[inline]
    pub fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Error::Zip {
            path: path.into(),
            source,
        }
    }
}
