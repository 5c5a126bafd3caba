//! Update operators applied to selected catalog records.
//!
//! Each operator recomputes a candidate value from the file on disk (or from
//! the caller), compares it with what is stored, and only writes an explicit
//! patch when something differs. Running an operator twice is a no-op the
//! second time.

use serde::Serialize;
use tracing::{info, warn};

use crate::fsutil;
use crate::metadata::GpsCoordinates;
use crate::storage::{Catalog, DatabaseError, MediaRecord, Predicate, RecordPatch};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOp {
    /// Recompute identity, location and metadata
    Reload,
    /// Recompute capture time and metadata only
    ReloadMetadata,
    /// Recompute content hash, file size and relative path only
    ReloadIdentity,
    /// Overwrite the three GPS fields
    SetGps(GpsCoordinates),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Stored values already match
    Unchanged,
    /// The record was (or, under dry-run, would be) rewritten
    Updated,
    /// The file behind the record is gone
    Stale,
    /// The new values collide with another record, which is carried here
    Conflict(Option<Box<MediaRecord>>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub found: u64,
    pub updated: u64,
    pub stale: u64,
    pub conflicted: u64,
    pub failed: u64,
}

/// What applying `op` to `record` would write, or `None` if nothing changes.
enum Change {
    Patch(RecordPatch),
    Replace(Box<MediaRecord>),
}

fn plan(catalog: &Catalog, op: UpdateOp, record: &MediaRecord) -> Result<Option<Change>, DatabaseError> {
    let path = catalog.abspath(&record.relative_path);

    match op {
        UpdateOp::Reload => {
            let candidate = catalog.describe(&path)?;
            let mut current = record.clone();
            current.id = 0;
            Ok((candidate != current).then(|| Change::Replace(Box::new(candidate))))
        }
        UpdateOp::ReloadMetadata => {
            let metadata = catalog.describe_metadata(&path)?;
            Ok((metadata != record.metadata())
                .then(|| Change::Patch(RecordPatch::metadata(&metadata))))
        }
        UpdateOp::ReloadIdentity => {
            let relative_path = catalog.relpath(&fsutil::normalize(&path)?)?;
            let fingerprint = catalog.engine().fingerprint(&path)?;
            let unchanged = relative_path == record.relative_path
                && fingerprint.file_size == record.file_size
                && fingerprint.content_hash == record.content_hash;
            Ok((!unchanged).then(|| {
                Change::Patch(RecordPatch::identity(
                    fingerprint.content_hash,
                    fingerprint.file_size,
                    relative_path,
                ))
            }))
        }
        UpdateOp::SetGps(gps) => {
            Ok((record.gps() != gps).then(|| Change::Patch(RecordPatch::gps(gps))))
        }
    }
}

/// Apply `op` to one record. Under `dry_run` the outcome is computed the same
/// way but nothing is written.
pub fn apply(
    catalog: &mut Catalog,
    op: UpdateOp,
    record: &MediaRecord,
    dry_run: bool,
) -> Result<UpdateOutcome, DatabaseError> {
    // SetGps never reads the file
    if !matches!(op, UpdateOp::SetGps(_)) && !catalog.abspath(&record.relative_path).is_file() {
        return Ok(UpdateOutcome::Stale);
    }

    let change = match plan(catalog, op, record)? {
        Some(change) => change,
        None => return Ok(UpdateOutcome::Unchanged),
    };

    info!(id = record.id, "Updating: {}", catalog.abspath(&record.relative_path).display());

    let result = match (&change, dry_run) {
        (Change::Patch(patch), true) => {
            let mut preview = record.clone();
            patch.apply_to(&mut preview);
            check_collisions(catalog, &preview)
        }
        (Change::Replace(candidate), true) => {
            let mut preview = (**candidate).clone();
            preview.id = record.id;
            check_collisions(catalog, &preview)
        }
        (Change::Patch(patch), false) => catalog.update(record.id, patch).map(|_| ()),
        (Change::Replace(candidate), false) => {
            catalog.update_full(record.id, candidate).map(|_| ())
        }
    };

    match result {
        Ok(()) => Ok(UpdateOutcome::Updated),
        Err(DatabaseError::DuplicateIdentity { existing_id, .. })
        | Err(DatabaseError::DuplicatePath { existing_id, .. }) => {
            let other = catalog.get_by_id(existing_id)?;
            Ok(UpdateOutcome::Conflict(other.map(Box::new)))
        }
        Err(e) => Err(e),
    }
}

/// The uniqueness checks `update` performs, without writing.
fn check_collisions(catalog: &Catalog, updated: &MediaRecord) -> Result<(), DatabaseError> {
    if let Some(existing_id) = catalog.id_for_hash(&updated.content_hash)? {
        if existing_id != updated.id {
            return Err(DatabaseError::DuplicateIdentity {
                content_hash: updated.content_hash.clone(),
                existing_id,
            });
        }
    }
    if let Some(existing_id) = catalog.id_for_path(&updated.relative_path)? {
        if existing_id != updated.id {
            return Err(DatabaseError::DuplicatePath {
                relative_path: updated.relative_path.clone(),
                existing_id,
            });
        }
    }
    Ok(())
}

/// Apply `op` to every record matching `predicate` and commit once at the end
/// of a live run. Per-record problems are logged and counted.
pub fn run(
    catalog: &mut Catalog,
    op: UpdateOp,
    predicate: &Predicate,
    dry_run: bool,
) -> Result<UpdateSummary, DatabaseError> {
    // Collect first; updates rewrite the records being iterated
    let records = catalog.iter(predicate).collect::<Result<Vec<_>, _>>()?;
    let mut summary = UpdateSummary::default();

    for record in &records {
        summary.found += 1;
        match apply(catalog, op, record, dry_run) {
            Ok(UpdateOutcome::Unchanged) => {}
            Ok(UpdateOutcome::Updated) => summary.updated += 1,
            Ok(UpdateOutcome::Stale) => {
                warn!(id = record.id, "Cannot find file {}", record.relative_path);
                summary.stale += 1;
            }
            Ok(UpdateOutcome::Conflict(other)) => {
                warn!(
                    id = record.id,
                    conflict_id = other.as_ref().map(|r| r.id),
                    conflict_path = other.as_ref().map(|r| r.relative_path.as_str()),
                    "Update conflicts with another record, skipped"
                );
                summary.conflicted += 1;
            }
            Err(e) => {
                warn!(id = record.id, error = %e, "Update failed");
                summary.failed += 1;
            }
        }
    }

    if !dry_run {
        catalog.commit()?;
    }

    info!(
        found = summary.found,
        updated = summary.updated,
        stale = summary.stale,
        conflicted = summary.conflicted,
        failed = summary.failed,
        dry_run,
        "Update complete"
    );
    Ok(summary)
}
