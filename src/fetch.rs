//! Remote fetcher.
//!
//! Resolves a source (an `http(s)://` URL, a `file://` URL or a plain local
//! path) into a local file. Bytes are streamed into a temporary file next to
//! the destination and only renamed into place once complete and verified,
//! so a failed or cancelled transfer never leaves a file behind.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::util::{file_matches_hash, parent_dir};

/// Size of each streamed chunk.
const CHUNK_SIZE: usize = 64 * 1024;

/// Progress callback: `(bytes so far, total if known)`.
pub type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Options for the fetcher.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Request timeout for HTTP transfers
    pub timeout: Duration,
    /// User agent sent with HTTP requests
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            user_agent: concat!("shellex/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchOptions {
    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Where a fetch reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Remote HTTP or HTTPS URL
    Http(String),
    /// Local file
    Local(PathBuf),
}

impl Source {
    /// Classifies a source string.
    pub fn parse(source: &str) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            Ok(Source::Http(source.to_string()))
        } else if let Some(path) = source.strip_prefix("file://") {
            Ok(Source::Local(PathBuf::from(path)))
        } else if source.contains("://") || source.is_empty() {
            Err(Error::InvalidUrl {
                url: source.to_string(),
            })
        } else {
            Ok(Source::Local(PathBuf::from(source)))
        }
    }
}

/// Result of a completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Final location of the file
    pub path: PathBuf,
    /// Number of bytes transferred (0 when served from cache)
    pub bytes: u64,
    /// SHA-256 of the file, when it was computed
    pub sha256: Option<String>,
    /// True when an existing file already matched the expected hash
    pub cached: bool,
}

/// Downloads sources into local files.
pub struct Fetcher {
    client: reqwest::blocking::Client,
    progress: Option<Arc<ProgressFn>>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Fetcher {
    /// Creates a fetcher.
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(|e| Error::Http {
                url: String::new(),
                source: e,
            })?;
        Ok(Self {
            client,
            progress: None,
        })
    }

    /// Installs a progress callback.
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Fetches `source` into `dest`.
    ///
    /// When `expected_sha256` is given and `dest` already has that hash the
    /// transfer is skipped; otherwise the received bytes must match it.
    pub fn fetch(
        &self,
        source: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<FetchReport> {
        cancel.check()?;

        if let Some(expected) = expected_sha256 {
            if file_matches_hash(dest, expected) {
                debug!(path = %dest.display(), "already present with expected hash");
                return Ok(FetchReport {
                    path: dest.to_path_buf(),
                    bytes: 0,
                    sha256: Some(expected.to_ascii_lowercase()),
                    cached: true,
                });
            }
        }

        let (reader, total): (Box<dyn Read>, Option<u64>) = match Source::parse(source)? {
            Source::Http(url) => {
                info!("Downloading {}", url);
                let response = self.client.get(&url).send().map_err(|e| Error::Http {
                    url: url.clone(),
                    source: e,
                })?;
                if !response.status().is_success() {
                    return Err(Error::HttpStatus {
                        url,
                        status: response.status().as_u16(),
                    });
                }
                let total = response.content_length();
                (Box::new(response), total)
            }
            Source::Local(path) => {
                info!("Copying {}", path.display());
                let file = File::open(&path).map_err(|e| Error::FileOpen {
                    path: path.clone(),
                    source: e,
                })?;
                let total = file.metadata().ok().map(|m| m.len());
                (Box::new(file), total)
            }
        };

        let (bytes, sha256) = self.stream_to(reader, total, dest, expected_sha256, cancel)?;
        info!("Fetched {} bytes into {}", bytes, dest.display());
        Ok(FetchReport {
            path: dest.to_path_buf(),
            bytes,
            sha256: Some(sha256),
            cached: false,
        })
    }

    /// Streams `reader` into a temporary file, verifies it and persists it at `dest`.
    fn stream_to(
        &self,
        mut reader: Box<dyn Read>,
        total: Option<u64>,
        dest: &Path,
        expected_sha256: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(u64, String)> {
        let dir = parent_dir(dest);
        std::fs::create_dir_all(dir).map_err(|e| Error::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let write_err = |e: std::io::Error| Error::FileWrite {
            path: dest.to_path_buf(),
            source: e,
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        loop {
            cancel.check()?;
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n]).map_err(write_err)?;
            written += n as u64;
            if let Some(progress) = &self.progress {
                progress(written, total);
            }
        }
        tmp.flush().map_err(write_err)?;

        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = expected_sha256 {
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::HashMismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tmp.persist(dest).map_err(|e| write_err(e.error))?;
        Ok((written, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::sha256_hex;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    fn fetcher() -> Fetcher {
        Fetcher::new(FetchOptions::default()).unwrap()
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            Source::parse("https://example.org/a.jar").unwrap(),
            Source::Http("https://example.org/a.jar".into())
        );
        assert_eq!(
            Source::parse("file:///tmp/a.jar").unwrap(),
            Source::Local("/tmp/a.jar".into())
        );
        assert_eq!(
            Source::parse("a.jar").unwrap(),
            Source::Local("a.jar".into())
        );
        assert!(matches!(
            Source::parse("ftp://example.org/a.jar"),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_fetch_local_file_with_progress() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        fs::write(&src, vec![7u8; 200_000]).unwrap();

        let seen = Arc::new(AtomicU64::new(0));
        let seen_cb = seen.clone();
        let fetcher = fetcher().with_progress(Arc::new(move |done, _| {
            seen_cb.store(done, Ordering::Relaxed);
        }));

        let dest = dir.path().join("out/dest.bin");
        let report = fetcher
            .fetch(src.to_str().unwrap(), &dest, None, &CancelToken::new())
            .unwrap();

        assert_eq!(report.bytes, 200_000);
        assert_eq!(seen.load(Ordering::Relaxed), 200_000);
        assert_eq!(fs::read(&dest).unwrap().len(), 200_000);
    }

    #[test]
    fn test_fetch_file_url_and_cache_hit() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        fs::write(&src, b"payload").unwrap();
        let hash = sha256_hex(b"payload");
        let dest = dir.path().join("dest.bin");
        let url = format!("file://{}", src.display());

        let first = fetcher()
            .fetch(&url, &dest, Some(&hash), &CancelToken::new())
            .unwrap();
        assert!(!first.cached);

        let second = fetcher()
            .fetch(&url, &dest, Some(&hash), &CancelToken::new())
            .unwrap();
        assert!(second.cached);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_hash_mismatch_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        fs::write(&src, b"payload").unwrap();
        let dest = dir.path().join("dest.bin");

        let err = fetcher()
            .fetch(
                src.to_str().unwrap(),
                &dest,
                Some(&sha256_hex(b"other")),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_cancelled_fetch_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        fs::write(&src, b"payload").unwrap();
        let dest = dir.path().join("dest.bin");

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = fetcher()
            .fetch(src.to_str().unwrap(), &dest, None, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(!dest.exists());
    }
}
