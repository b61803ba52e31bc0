//! Object storage for rollup output.
//!
//! Objects are addressed by bucket and a `/`-separated path and are always
//! replaced whole. The shipped store keeps each bucket in a directory under a
//! local root.

use crate::errors::ReportError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const DEFAULT_BUCKET: &str = "telemetry-public-analysis-2";
pub const DEFAULT_STORE_ROOT: &str = "blobs";

pub trait BlobStore {
    /// Store `bytes` at `bucket/path`, replacing any existing object.
    fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<(), ReportError>;

    fn get(&self, bucket: &str, path: &str) -> Result<Vec<u8>, ReportError>;
}

/// A [`BlobStore`] over the local filesystem: `root/bucket/path`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf, ReportError> {
        let relative = Path::new(bucket).join(path);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(storage_error(
                bucket,
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "object path must be relative"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<(), ReportError> {
        let target = self.object_path(bucket, path)?;
        let staging = target.with_extension("partial");

        let written = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::write(&staging, bytes))
            .and_then(|_| fs::rename(&staging, &target));
        written.map_err(|e| storage_error(bucket, path, e))?;

        debug!(bucket, path, bytes = bytes.len(), "stored object");
        Ok(())
    }

    fn get(&self, bucket: &str, path: &str) -> Result<Vec<u8>, ReportError> {
        let target = self.object_path(bucket, path)?;
        fs::read(&target).map_err(|e| storage_error(bucket, path, e))
    }
}

fn storage_error(bucket: &str, path: &str, source: io::Error) -> ReportError {
    ReportError::Storage {
        bucket: bucket.to_string(),
        path: path.to_string(),
        source,
    }
}

/// Gzip-compresses everything written to it and uploads the result on
/// [`finish`](CompressedWriter::finish).
///
/// Dropping the writer without finishing discards the buffered data, so a
/// failed rollup never leaves a truncated object behind.
pub struct CompressedWriter<'s> {
    store: &'s dyn BlobStore,
    bucket: String,
    path: String,
    encoder: GzEncoder<Vec<u8>>,
}

impl<'s> CompressedWriter<'s> {
    pub fn new(store: &'s dyn BlobStore, bucket: &str, path: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            path: path.to_string(),
            encoder: GzEncoder::new(Vec::new(), Compression::default()),
        }
    }

    pub fn finish(self) -> Result<(), ReportError> {
        let compressed = self
            .encoder
            .finish()
            .map_err(|e| storage_error(&self.bucket, &self.path, e))?;
        self.store.put(&self.bucket, &self.path, &compressed)
    }
}

impl Write for CompressedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Fetch a gzip object and decode it as UTF-8 text.
pub fn read_compressed(
    store: &dyn BlobStore,
    bucket: &str,
    path: &str,
) -> Result<String, ReportError> {
    let bytes = store.get(bucket, path)?;
    let mut text = String::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_string(&mut text)
        .map_err(|e| storage_error(bucket, path, e))?;
    Ok(text)
}
