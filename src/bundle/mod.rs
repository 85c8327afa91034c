//! Bundle introspection and extraction.
//!
//! A bundle is driven through the [`BundleCapabilities`] interface. The
//! [`JarBundle`] adapter implements it for bundler jars; the [`Introspector`]
//! validates the bundle and runs the extraction.

pub mod capability;
pub mod context;
pub mod introspect;
pub mod launcher;
pub mod structs;

pub use capability::{BundleCapabilities, Capabilities, Capability};
pub use context::{BundleOptions, JarBundle, DEFAULT_MAX_CLASS_VERSION};
pub use introspect::{Extraction, Introspector};
pub use launcher::PatchLauncher;
pub use structs::{
    Artifact, DownloadContext, FileEntry, OutputGroupSet, PatchRecord, AUXILIARY_GROUP,
    PRIMARY_GROUP,
};
