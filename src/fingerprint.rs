//! Partial-content fingerprints.
//!
//! A fingerprint hashes a fixed-length window centered on the file's midpoint
//! instead of the whole file, so the cost stays constant no matter how large a
//! video gets. Camera files tend to share near-identical headers and trailers,
//! while the payload in the middle differs, so the window together with the file
//! size identifies content with high confidence. It is not exhaustive: two
//! distinct files can share a fingerprint, and nothing here falls back to a
//! full-byte comparison.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ring::digest::{Context, SHA256};
use serde::Serialize;
use thiserror::Error;

/// Default content window length (64 KiB).
pub const DEFAULT_WINDOW: u64 = 64 * 1024;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),
}

/// Content identity of a file on disk, minus its capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub content_hash: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct FingerprintEngine {
    window: u64,
}

impl Default for FingerprintEngine {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl FingerprintEngine {
    pub fn new(window: u64) -> Self {
        debug_assert!(window > 0, "fingerprint window must not be empty");
        Self { window }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Hash the content window of the file at `path`.
    ///
    /// A zero-byte file is valid input and hashes the empty window. A missing
    /// or unreadable file is an error.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        let unreadable = |source| FingerprintError::Unreadable {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(unreadable)?;
        let meta = file.metadata().map_err(unreadable)?;
        if !meta.is_file() {
            return Err(FingerprintError::NotAFile(path.to_path_buf()));
        }

        let file_size = meta.len();
        let (offset, len) = window_range(file_size, self.window);

        file.seek(SeekFrom::Start(offset)).map_err(unreadable)?;
        let mut buf = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut buf).map_err(unreadable)?;

        let mut ctx = Context::new(&SHA256);
        ctx.update(&buf);
        let content_hash = hex::encode(ctx.finish().as_ref());

        Ok(Fingerprint {
            content_hash,
            file_size,
        })
    }
}

/// Byte range `(offset, len)` of the window centered on the midpoint of a file
/// of `file_size` bytes. Files shorter than the window are hashed whole.
pub fn window_range(file_size: u64, window: u64) -> (u64, u64) {
    if file_size <= window {
        return (0, file_size);
    }
    let offset = file_size / 2 - window / 2;
    (offset, window)
}
