//! Catalog reconciliation: identity diff and one-directional merge.
//!
//! Records in different catalogs are the same content iff their identity
//! triple `(content_hash, file_size, capture_time)` matches exactly. Merge
//! copies source files missing from the destination into a date-based layout
//! and registers them in the destination catalog, committing once at the end.
//!
//! A crash between a copy and that final commit leaves a file on disk that
//! the destination catalog does not know about. The next merge finds it at
//! the computed path, sees that its fingerprint matches, and registers it
//! without copying again.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fingerprint::{Fingerprint, FingerprintError};
use crate::fsutil;
use crate::storage::{Catalog, DatabaseError, MediaRecord, Predicate};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("File {path} exists with different content, copy aborted")]
    DestinationConflict { path: PathBuf },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<io::Error> for SyncError {
    fn from(e: io::Error) -> Self {
        SyncError::Database(DatabaseError::Io(e))
    }
}

impl From<FingerprintError> for SyncError {
    fn from(e: FingerprintError) -> Self {
        SyncError::Database(DatabaseError::Fingerprint(e))
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Result of comparing one catalog's records against another catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionCounts {
    pub common: u64,
    pub exclusive: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    pub left: bool,
    pub right: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            left: true,
            right: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    /// Left records checked against the right catalog
    pub left: Option<DirectionCounts>,
    /// Right records checked against the left catalog
    pub right: Option<DirectionCounts>,
}

/// Classify every record of `from` as common with `against` or exclusive to
/// `from`. Exclusive records are logged with `marker`.
pub fn compare(
    from: &Catalog,
    against: &Catalog,
    marker: char,
) -> Result<DirectionCounts, DatabaseError> {
    let mut counts = DirectionCounts::default();
    let all = Predicate::all();

    for record in from.iter(&all) {
        let record = record?;
        if against.find_identity(&record.identity())?.is_some() {
            counts.common += 1;
        } else {
            info!(
                "{} {} {}",
                marker,
                from.abspath(&record.relative_path).display(),
                record.content_hash
            );
            counts.exclusive += 1;
        }
    }
    Ok(counts)
}

/// Compare two catalogs in the requested directions. Never mutates either.
pub fn diff(left: &Catalog, right: &Catalog, options: DiffOptions) -> Result<DiffReport, DatabaseError> {
    let report = DiffReport {
        left: options
            .left
            .then(|| compare(left, right, '-'))
            .transpose()?,
        right: options
            .right
            .then(|| compare(right, left, '+'))
            .transpose()?,
    };

    if let Some(counts) = report.left.or(report.right) {
        info!("Same files: {}", counts.common);
    }
    if let Some(counts) = report.left {
        info!("Only in {}: {}", left.root().display(), counts.exclusive);
    }
    if let Some(counts) = report.right {
        info!("Only in {}: {}", right.root().display(), counts.exclusive);
    }
    Ok(report)
}

// ============================================================================
// Merge
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// Source records visited
    pub scanned: u64,
    /// Already present in the destination
    pub common: u64,
    pub copied: u64,
    /// Found already in place and only registered
    pub registered: u64,
    pub conflicted: u64,
    pub failed: u64,
}

/// What merge does with one source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAction {
    Common,
    Copied { from: PathBuf, to: PathBuf },
    Registered { path: PathBuf },
}

/// Date-based location of `record` inside a destination tree:
/// `YYYY/YYYYMM/YYYYMMDD/<extension>/<filename>`.
pub fn destination_relpath(record: &MediaRecord, capture_time: NaiveDateTime) -> String {
    let mut parts = vec![
        capture_time.format("%Y").to_string(),
        capture_time.format("%Y%m").to_string(),
        capture_time.format("%Y%m%d").to_string(),
    ];
    if !record.extension.is_empty() {
        parts.push(record.extension.clone());
    }
    parts.push(record.filename.clone());
    parts.join("/")
}

/// Destination side of a merge run. Under dry-run, planned copies are
/// remembered so later items see the destination as a live run would.
struct Destination<'a> {
    catalog: &'a mut Catalog,
    dry_run: bool,
    planned: HashMap<PathBuf, Fingerprint>,
}

impl Destination<'_> {
    /// Fingerprint of whatever occupies `path`, if anything.
    fn occupant(&self, path: &Path) -> Result<Option<Fingerprint>, DatabaseError> {
        if let Some(planned) = self.planned.get(path) {
            return Ok(Some(planned.clone()));
        }
        if path.exists() {
            return Ok(Some(self.catalog.engine().fingerprint(path)?));
        }
        Ok(None)
    }

    fn merge_record(
        &mut self,
        source: &Catalog,
        record: &MediaRecord,
    ) -> Result<MergeAction, SyncError> {
        if self.catalog.find_identity(&record.identity())?.is_some() {
            return Ok(MergeAction::Common);
        }

        let src = source.abspath(&record.relative_path);
        let capture_time = match record.capture_time {
            Some(time) => time,
            None => fsutil::file_time(&src)?,
        };
        let relative_path = destination_relpath(record, capture_time);
        let dst = self.catalog.abspath(&relative_path);

        let mut target = record.clone();
        target.relative_path = relative_path;

        if let Some(found) = self.occupant(&dst)? {
            if found.content_hash != record.content_hash || found.file_size != record.file_size {
                return Err(SyncError::DestinationConflict { path: dst });
            }
            warn!("File {} exists, catalog will be updated", dst.display());
            self.register(&target, found)?;
            return Ok(MergeAction::Registered { path: dst });
        }

        let expected = Fingerprint {
            content_hash: record.content_hash.clone(),
            file_size: record.file_size,
        };
        if self.dry_run {
            self.register(&target, expected.clone())?;
            self.planned.insert(dst.clone(), expected);
        } else {
            // Refuse before touching the disk if the catalog would reject it
            self.catalog.check_insert(&target)?;
            if !src.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Source file {} is missing", src.display()),
                )
                .into());
            }
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            fsutil::copy_preserving_times(&src, &dst)?;
            let copied = self.catalog.engine().fingerprint(&dst)?;
            self.register(&target, copied)?;
        }
        info!("{} -> {}", src.display(), dst.display());
        Ok(MergeAction::Copied { from: src, to: dst })
    }

    /// Insert `target` with the fingerprint of the destination file.
    fn register(&mut self, target: &MediaRecord, fingerprint: Fingerprint) -> Result<(), DatabaseError> {
        let mut record = target.clone();
        record.id = 0;
        record.content_hash = fingerprint.content_hash;
        record.file_size = fingerprint.file_size;

        if self.dry_run {
            self.catalog.check_insert(&record)
        } else {
            self.catalog.insert(&record).map(|_| ())
        }
    }
}

/// Copy every source record missing from `dest` into the destination tree and
/// register it, then commit once. Under dry-run the same decisions are made
/// and counted but neither the filesystem nor the catalog is touched.
pub fn merge(
    source: &Catalog,
    dest: &mut Catalog,
    options: MergeOptions,
) -> Result<MergeSummary, SyncError> {
    let mut summary = MergeSummary::default();
    let mut destination = Destination {
        catalog: &mut *dest,
        dry_run: options.dry_run,
        planned: HashMap::new(),
    };

    let all = Predicate::all();
    for record in source.iter(&all) {
        let record = record?;
        summary.scanned += 1;

        match destination.merge_record(source, &record) {
            Ok(MergeAction::Common) => summary.common += 1,
            Ok(MergeAction::Copied { .. }) => summary.copied += 1,
            Ok(MergeAction::Registered { path }) => {
                debug!(path = %path.display(), "Registered existing file");
                summary.registered += 1;
            }
            Err(SyncError::DestinationConflict { path }) => {
                warn!("File {} exists, copy aborted", path.display());
                summary.conflicted += 1;
            }
            Err(SyncError::Database(e)) if e.is_conflict() => {
                warn!(relative_path = %record.relative_path, error = %e, "Merge conflict, skipped");
                summary.conflicted += 1;
            }
            Err(e) => {
                warn!(relative_path = %record.relative_path, error = %e, "Merge failed");
                summary.failed += 1;
            }
        }
    }

    if !options.dry_run {
        dest.commit()?;
    }

    info!("Same files: {}", summary.common);
    info!("Only in {}: {}", source.root().display(), summary.scanned - summary.common);
    info!(
        copied = summary.copied,
        registered = summary.registered,
        conflicted = summary.conflicted,
        failed = summary.failed,
        dry_run = options.dry_run,
        "Merge complete"
    );
    Ok(summary)
}
