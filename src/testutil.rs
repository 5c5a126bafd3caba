//! Shared test helpers for catalog unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::metadata::{MediaMetadata, MetadataError, MetadataExtractor};
use crate::storage::{Catalog, CatalogOptions};

/// Extractor answering from a table keyed by file name. Unknown files have no
/// metadata.
#[derive(Debug, Default)]
pub struct FixedExtractor {
    by_name: HashMap<String, MediaMetadata>,
}

impl FixedExtractor {
    pub fn with(mut self, file_name: &str, metadata: MediaMetadata) -> Self {
        self.by_name.insert(file_name.to_string(), metadata);
        self
    }

    pub fn with_time(self, file_name: &str, time: &str) -> Self {
        self.with(
            file_name,
            MediaMetadata {
                capture_time: Some(parse_time(time)),
                ..Default::default()
            },
        )
    }
}

impl MetadataExtractor for FixedExtractor {
    fn extract(&self, path: &Path) -> Result<Option<MediaMetadata>, MetadataError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.by_name.get(&name).cloned())
    }
}

pub fn parse_time(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("bad test timestamp")
}

/// Write `data` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, data: &[u8]) -> PathBuf {
    let path = relative
        .split('/')
        .fold(root.to_path_buf(), |path, part| path.join(part));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create test directory");
    }
    std::fs::write(&path, data).expect("Failed to write test file");
    path
}

pub fn test_options(extractor: FixedExtractor) -> CatalogOptions {
    CatalogOptions::default().with_extractor(Arc::new(extractor))
}

/// Create a fresh catalog over `root` using `extractor`.
pub fn test_catalog(root: &Path, extractor: FixedExtractor) -> Catalog {
    Catalog::create(root, &test_options(extractor)).expect("Failed to create test catalog")
}
