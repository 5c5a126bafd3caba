//! Directory scan feeding a catalog.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::storage::{Catalog, DatabaseError, MediaType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Media files visited
    pub scanned: u64,
    pub added: u64,
    /// Content already cataloged
    pub skipped: u64,
    pub failed: u64,
}

/// Walk the catalog root and add every media file under it, then commit once.
///
/// Files are visited in file-name order so that a fresh build assigns ids
/// deterministically. Per-file failures are logged and counted; only a
/// failing commit aborts the build.
pub fn build(catalog: &mut Catalog) -> Result<ScanSummary, DatabaseError> {
    let mut summary = ScanSummary::default();
    let root = catalog.root().to_path_buf();
    let db_path = catalog.db_path().to_path_buf();

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Cannot read directory entry");
                summary.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path == db_path || MediaType::from_path(path).is_none() {
            continue;
        }

        summary.scanned += 1;
        match catalog.add(path) {
            Ok(Some(id)) => {
                debug!(id, path = %path.display(), "Added");
                summary.added += 1;
            }
            Ok(None) => summary.skipped += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot catalog file");
                summary.failed += 1;
            }
        }
    }

    catalog.commit()?;
    info!(
        scanned = summary.scanned,
        added = summary.added,
        skipped = summary.skipped,
        failed = summary.failed,
        "Build complete"
    );
    Ok(summary)
}

/// Catalog a single file and commit. Returns the new id, or `None` if its
/// content is already cataloged.
pub fn add_one(catalog: &mut Catalog, path: &Path) -> Result<Option<u64>, DatabaseError> {
    let added = catalog.add(path)?;
    catalog.commit()?;
    match added {
        Some(id) => info!(id, "+ {}", path.display()),
        None => info!("Already cataloged: {}", path.display()),
    }
    Ok(added)
}
