//! Output archive written to a temporary file next to its destination.
//!
//! The archive only appears at its final path when [`OutputSink::finish`]
//! succeeds. Dropping the sink on any other path deletes the temporary file.

use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::util::parent_dir;

/// A zip archive being assembled for `path`.
pub struct OutputSink {
    path: PathBuf,
    writer: ZipWriter<BufWriter<NamedTempFile>>,
    names: HashSet<String>,
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("path", &self.path)
            .field("entries", &self.names.len())
            .finish()
    }
}

impl OutputSink {
    /// Opens a sink for `path`, creating the parent directory if needed.
    pub fn create(path: &Path) -> Result<Self> {
        let dir = parent_dir(path);
        fs::create_dir_all(dir).map_err(|e| Error::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let temp = NamedTempFile::new_in(dir).map_err(|e| Error::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: ZipWriter::new(BufWriter::new(temp)),
            names: HashSet::new(),
        })
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Reserves an entry name. Returns false, with a warning, for duplicates.
    fn claim(&mut self, name: &str) -> bool {
        if !self.names.contains(name) {
            self.names.insert(name.to_string());
            return true;
        }
        warn!("Skipping duplicate entry {} in {}", name, self.path.display());
        false
    }

    /// Copies entry `index` of `archive` without recompressing it, keeping its timestamp.
    pub fn copy_raw<R: Read + Seek>(
        &mut self,
        archive: &mut ZipArchive<R>,
        source: &Path,
        index: usize,
    ) -> Result<bool> {
        let file = archive
            .by_index_raw(index)
            .map_err(|e| Error::zip(source, e))?;
        if !self.claim(file.name()) {
            return Ok(false);
        }
        self.writer
            .raw_copy_file(file)
            .map_err(|e| Error::zip(&self.path, e))?;
        Ok(true)
    }

    /// Writes a new entry with a fixed timestamp so output is reproducible.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<bool> {
        if !self.claim(name) {
            return Ok(false);
        }
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        self.writer
            .start_file(name, options)
            .map_err(|e| Error::zip(&self.path, e))?;
        self.writer.write_all(data).map_err(|e| Error::FileWrite {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(true)
    }

    /// Finalizes the archive and moves it to its destination, replacing any existing file.
    pub fn finish(self) -> Result<PathBuf> {
        let path = self.path;
        let write_err = |e: std::io::Error| Error::FileWrite {
            path: path.clone(),
            source: e,
        };

        let buffered = self.writer.finish().map_err(|e| Error::zip(&path, e))?;
        let temp = buffered.into_inner().map_err(|e| write_err(e.into_error()))?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&path).map_err(|e| write_err(e.error))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_finish_publishes_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/remapped.jar");

        let mut sink = OutputSink::create(&path).unwrap();
        assert!(sink.write("a.txt", b"hello").unwrap());
        assert!(!sink.write("a.txt", b"again").unwrap());
        assert!(!path.exists());
        assert_eq!(sink.finish().unwrap(), path);

        let data = fs::read(&path).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn test_drop_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("remapped.jar");
        fs::write(&path, b"previous").unwrap();

        let mut sink = OutputSink::create(&path).unwrap();
        sink.write("a.txt", b"hello").unwrap();
        drop(sink);

        assert_eq!(fs::read(&path).unwrap(), b"previous");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
