//! The narrow interface the introspector drives a bundle through.

use std::fmt;
use std::path::Path;

use bitflags::bitflags;

use super::structs::{DownloadContext, OutputGroupSet, PatchRecord};
use crate::error::Result;

/// A single operation a bundle must expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Loadable entry point
    EntryPoint,
    /// Enumerate patch records
    FindPatches,
    /// Locate the download descriptor
    FindDownloadContext,
    /// Extract files and apply patches
    ExtractAndApply,
}

impl Capability {
    /// Every capability, in probing order.
    pub const ALL: [Capability; 4] = [
        Capability::EntryPoint,
        Capability::FindPatches,
        Capability::FindDownloadContext,
        Capability::ExtractAndApply,
    ];

    /// The flag representing this capability.
    pub fn flag(self) -> Capabilities {
        match self {
            Capability::EntryPoint => Capabilities::ENTRY_POINT,
            Capability::FindPatches => Capabilities::FIND_PATCHES,
            Capability::FindDownloadContext => Capabilities::FIND_DOWNLOAD_CONTEXT,
            Capability::ExtractAndApply => Capabilities::EXTRACT_AND_APPLY,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::EntryPoint => "entry point",
            Capability::FindPatches => "find-patches",
            Capability::FindDownloadContext => "find-download-context",
            Capability::ExtractAndApply => "extract-and-apply",
        })
    }
}

bitflags! {
    /// Set of capabilities a bundle was found to expose.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const ENTRY_POINT = 1 << 0;
        const FIND_PATCHES = 1 << 1;
        const FIND_DOWNLOAD_CONTEXT = 1 << 2;
        const EXTRACT_AND_APPLY = 1 << 3;
    }
}

impl Capabilities {
    /// Returns the first capability in probing order that is absent.
    pub fn first_missing(self) -> Option<Capability> {
        Capability::ALL
            .into_iter()
            .find(|c| !self.contains(c.flag()))
    }
}

/// Operations the introspector needs from a bundle.
///
/// Implementations isolate everything that depends on the bundle's internal
/// layout. Lookup failures surface as [`crate::Error::MissingCapability`].
pub trait BundleCapabilities {
    /// Identity used in error messages.
    fn identity(&self) -> &Path;

    /// Capabilities found when the bundle was loaded.
    fn capabilities(&self) -> Capabilities;

    /// Enumerates the patch records in application order.
    fn find_patches(&self) -> Result<Vec<PatchRecord>>;

    /// Returns the base binary descriptor, if the bundle has one.
    fn find_download_context(&self) -> Result<Option<DownloadContext>>;

    /// Extracts the bundle into `repo`, applying `patches` onto `base`.
    ///
    /// `base` must already sit at `<repo>/cache/<file name>`. Patched bundles
    /// are applied by the bundle's own launcher, which finds the base binary
    /// there by itself, so implementations may only use `base` for logging.
    fn extract_and_apply(
        &self,
        base: Option<&Path>,
        patches: &[PatchRecord],
        repo: &Path,
    ) -> Result<OutputGroupSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_missing() {
        assert_eq!(Capabilities::all().first_missing(), None);
        let partial = Capabilities::ENTRY_POINT | Capabilities::FIND_PATCHES;
        assert_eq!(
            partial.first_missing(),
            Some(Capability::FindDownloadContext)
        );
        assert_eq!(
            Capability::ExtractAndApply.to_string(),
            "extract-and-apply"
        );
    }
}
