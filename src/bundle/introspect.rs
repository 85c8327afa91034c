//! Bundle introspection: drives a bundle through its capabilities.

use std::path::{Path, PathBuf};

use tracing::info;

use super::capability::BundleCapabilities;
use super::structs::OutputGroupSet;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;

/// Result of a successful introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Files produced, by group
    pub groups: OutputGroupSet,
    /// Number of patch records applied
    pub patch_count: usize,
    /// Base binary, when the bundle has a download descriptor
    pub base_binary: Option<PathBuf>,
}

/// Extracts bundles into a repository directory.
#[derive(Debug)]
pub struct Introspector<'a> {
    fetcher: &'a Fetcher,
    cancel: &'a CancelToken,
}

impl<'a> Introspector<'a> {
    /// Creates an introspector that downloads base binaries with `fetcher`.
    pub fn new(fetcher: &'a Fetcher, cancel: &'a CancelToken) -> Self {
        Self { fetcher, cancel }
    }

    /// Extracts `bundle` into `repo`.
    ///
    /// Every capability is checked and the patch/descriptor invariant is
    /// validated before anything is downloaded or written.
    pub fn extract<B: BundleCapabilities + ?Sized>(
        &self,
        bundle: &B,
        repo: &Path,
    ) -> Result<Extraction> {
        if let Some(capability) = bundle.capabilities().first_missing() {
            return Err(Error::MissingCapability {
                bundle: bundle.identity().to_path_buf(),
                capability,
            });
        }

        let patches = bundle.find_patches()?;
        let context = bundle.find_download_context()?;
        if !patches.is_empty() && context.is_none() {
            return Err(Error::PatchesWithoutDownloadContext {
                bundle: bundle.identity().to_path_buf(),
                patches: patches.len(),
            });
        }

        self.cancel.check()?;
        std::fs::create_dir_all(repo).map_err(|e| Error::CreateDir {
            path: repo.to_path_buf(),
            source: e,
        })?;

        let base_binary = match &context {
            Some(ctx) => {
                let target = ctx.output_file(repo);
                self.fetcher
                    .fetch(&ctx.url, &target, Some(&ctx.hash), self.cancel)
                    .map_err(|e| match e {
                        Error::Cancelled => Error::Cancelled,
                        other => Error::BaseDownload {
                            url: ctx.url.clone(),
                            source: Box::new(other),
                        },
                    })?;
                Some(target)
            }
            None => None,
        };

        self.cancel.check()?;
        let groups = bundle.extract_and_apply(base_binary.as_deref(), &patches, repo)?;
        info!(
            "Extracted {} group(s) from {} ({} patch(es))",
            groups.len(),
            bundle.identity().display(),
            patches.len()
        );

        Ok(Extraction {
            groups,
            patch_count: patches.len(),
            base_binary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::capability::{Capabilities, Capability};
    use crate::bundle::context::tests::bundle_jar;
    use crate::bundle::structs::{DownloadContext, PatchRecord, PRIMARY_GROUP};
    use crate::bundle::{BundleOptions, JarBundle};
    use crate::fetch::FetchOptions;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Records calls so tests can assert nothing ran.
    struct FakeBundle {
        capabilities: Capabilities,
        patches: Vec<PatchRecord>,
        context: Option<DownloadContext>,
        extracted: Cell<bool>,
    }

    impl BundleCapabilities for FakeBundle {
        fn identity(&self) -> &Path {
            Path::new("fake.jar")
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        fn find_patches(&self) -> Result<Vec<PatchRecord>> {
            Ok(self.patches.clone())
        }

        fn find_download_context(&self) -> Result<Option<DownloadContext>> {
            Ok(self.context.clone())
        }

        fn extract_and_apply(
            &self,
            _base: Option<&Path>,
            _patches: &[PatchRecord],
            _repo: &Path,
        ) -> Result<OutputGroupSet> {
            self.extracted.set(true);
            Ok(OutputGroupSet::new())
        }
    }

    fn patch() -> PatchRecord {
        PatchRecord {
            group: "versions".into(),
            original_hash: "a".into(),
            patch_hash: "b".into(),
            output_hash: "c".into(),
            original_path: "mojang.jar".into(),
            patch_path: "paper.patch".into(),
            output_path: "paper.jar".into(),
        }
    }

    #[test]
    fn test_patches_without_descriptor_fail_before_io() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let bundle = FakeBundle {
            capabilities: Capabilities::all(),
            patches: vec![patch()],
            context: None,
            extracted: Cell::new(false),
        };
        let fetcher = Fetcher::new(FetchOptions::default()).unwrap();
        let cancel = CancelToken::new();

        let err = Introspector::new(&fetcher, &cancel)
            .extract(&bundle, &repo)
            .unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(!bundle.extracted.get());
        assert!(!repo.exists());
    }

    #[test]
    fn test_missing_capability_is_fatal() {
        let dir = TempDir::new().unwrap();
        let bundle = FakeBundle {
            capabilities: Capabilities::all() - Capabilities::EXTRACT_AND_APPLY,
            patches: Vec::new(),
            context: None,
            extracted: Cell::new(false),
        };
        let fetcher = Fetcher::new(FetchOptions::default()).unwrap();
        let cancel = CancelToken::new();

        let err = Introspector::new(&fetcher, &cancel)
            .extract(&bundle, dir.path())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingCapability {
                capability: Capability::ExtractAndApply,
                ..
            }
        ));
        assert!(!bundle.extracted.get());
    }

    #[test]
    fn test_base_download_failure_is_wrapped() {
        let dir = TempDir::new().unwrap();
        let bundle = FakeBundle {
            capabilities: Capabilities::all(),
            patches: vec![patch()],
            context: Some(DownloadContext {
                hash: "00".into(),
                url: dir.path().join("missing.jar").display().to_string(),
                file_name: "mojang.jar".into(),
            }),
            extracted: Cell::new(false),
        };
        let fetcher = Fetcher::new(FetchOptions::default()).unwrap();
        let cancel = CancelToken::new();

        let err = Introspector::new(&fetcher, &cancel)
            .extract(&bundle, &dir.path().join("repo"))
            .unwrap_err();
        assert!(matches!(err, Error::BaseDownload { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Transfer);
        assert!(!bundle.extracted.get());
    }

    #[test]
    fn test_zero_patch_bundle_yields_primary_group() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.jar");
        std::fs::write(&path, bundle_jar(b"primary", &[("a.jar", b"a")], &[], 61)).unwrap();
        let bundle = JarBundle::open(&path, BundleOptions::default()).unwrap();
        let fetcher = Fetcher::new(FetchOptions::default()).unwrap();
        let cancel = CancelToken::new();

        let extraction = Introspector::new(&fetcher, &cancel)
            .extract(&bundle, &dir.path().join("repo"))
            .unwrap();

        assert_eq!(extraction.patch_count, 0);
        assert!(extraction.base_binary.is_none());
        assert!(!extraction.groups.group(PRIMARY_GROUP).unwrap().is_empty());
    }
}
