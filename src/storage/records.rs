use std::path::Path;

use redb::ReadableTable;
use tracing::{debug, warn};

use super::db::{Catalog, DatabaseError};
use super::models::{split_file_name, Identity, MediaRecord, RecordPatch};
use super::query::Predicate;
use super::tables::*;
use crate::fsutil;
use crate::metadata::MediaMetadata;

/// First stored record with id `>= start`.
fn first_from<T>(table: &T, start: u64) -> Result<Option<MediaRecord>, DatabaseError>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    match table.range(start..)?.next() {
        Some(entry) => {
            let (_, value) = entry?;
            Ok(Some(rmp_serde::from_slice(value.value())?))
        }
        None => Ok(None),
    }
}

fn index_get<T>(table: &T, key: &str) -> Result<Option<u64>, DatabaseError>
where
    T: ReadableTable<&'static str, u64>,
{
    Ok(table.get(key)?.map(|v| v.value()))
}

/// Lazy, insertion-ordered walk over the records matching a predicate.
///
/// Each step reads through the catalog's open session when there is one, so
/// uncommitted records are visited too.
pub struct Records<'a> {
    catalog: &'a Catalog,
    predicate: &'a Predicate,
    cursor: Cursor,
}

enum Cursor {
    /// Full scan resuming at this id
    Scan(u64),
    /// Predicate pins a single candidate
    Single(Option<u64>),
    Done,
}

impl Iterator for Records<'_> {
    type Item = Result<MediaRecord, DatabaseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.cursor {
                Cursor::Done => return None,
                Cursor::Single(None) => {
                    self.cursor = Cursor::Done;
                    return None;
                }
                Cursor::Single(Some(id)) => {
                    self.cursor = Cursor::Done;
                    match self.catalog.get_by_id(id) {
                        Ok(Some(record)) => record,
                        Ok(None) => return None,
                        Err(e) => return Some(Err(e)),
                    }
                }
                Cursor::Scan(start) => match self.catalog.record_from(start) {
                    Ok(Some(record)) => {
                        self.cursor = Cursor::Scan(record.id + 1);
                        record
                    }
                    Ok(None) => {
                        self.cursor = Cursor::Done;
                        return None;
                    }
                    Err(e) => {
                        self.cursor = Cursor::Done;
                        return Some(Err(e));
                    }
                },
            };

            if self.predicate.matches(&record) {
                return Some(Ok(record));
            }
        }
    }
}

impl Catalog {
    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a record by its id
    pub fn get_by_id(&self, id: u64) -> Result<Option<MediaRecord>, DatabaseError> {
        Ok(self.record_from(id)?.filter(|r| r.id == id))
    }

    fn record_from(&self, start: u64) -> Result<Option<MediaRecord>, DatabaseError> {
        match self.pending() {
            Some(txn) => first_from(&txn.open_table(RECORDS)?, start),
            None => first_from(&self.redb().begin_read()?.open_table(RECORDS)?, start),
        }
    }

    /// Id of the record holding `content_hash`
    pub fn id_for_hash(&self, content_hash: &str) -> Result<Option<u64>, DatabaseError> {
        match self.pending() {
            Some(txn) => index_get(&txn.open_table(CONTENT_HASHES)?, content_hash),
            None => index_get(
                &self.redb().begin_read()?.open_table(CONTENT_HASHES)?,
                content_hash,
            ),
        }
    }

    /// Id of the record stored at `relative_path`
    pub fn id_for_path(&self, relative_path: &str) -> Result<Option<u64>, DatabaseError> {
        match self.pending() {
            Some(txn) => index_get(&txn.open_table(RELATIVE_PATHS)?, relative_path),
            None => index_get(
                &self.redb().begin_read()?.open_table(RELATIVE_PATHS)?,
                relative_path,
            ),
        }
    }

    /// Records matching `predicate`, in insertion order. An empty predicate
    /// selects every record.
    pub fn iter<'a>(&'a self, predicate: &'a Predicate) -> Records<'a> {
        let cursor = if let Some(id) = predicate.pinned_id() {
            Cursor::Single(Some(id))
        } else if let Some(hash) = predicate.pinned_content_hash() {
            match self.id_for_hash(hash) {
                Ok(id) => Cursor::Single(id),
                Err(e) => {
                    warn!(error = %e, "Hash index lookup failed, falling back to a scan");
                    Cursor::Scan(0)
                }
            }
        } else {
            Cursor::Scan(0)
        };

        Records {
            catalog: self,
            predicate,
            cursor,
        }
    }

    /// The single record matching `predicate`. More than one match is an
    /// error rather than an arbitrary pick.
    pub fn get(&self, predicate: &Predicate) -> Result<Option<MediaRecord>, DatabaseError> {
        let mut matches = self.iter(predicate);
        let first = match matches.next() {
            Some(record) => record?,
            None => return Ok(None),
        };
        match matches.next() {
            Some(second) => Err(DatabaseError::AmbiguousQuery {
                first: first.id,
                second: second?.id,
            }),
            None => Ok(Some(first)),
        }
    }

    /// The record carrying exactly this identity triple.
    pub fn find_identity(&self, identity: &Identity) -> Result<Option<MediaRecord>, DatabaseError> {
        self.get(&Predicate::identity(identity))
    }

    // ========================================================================
    // Describing files on disk
    // ========================================================================

    /// Metadata for a file, or `None` when the extractor finds nothing or fails.
    pub fn read_metadata(&self, path: &Path) -> Option<MediaMetadata> {
        match self.extractor.extract(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Metadata extraction failed");
                None
            }
        }
    }

    /// Capture time and metadata for a file, falling back to its
    /// modification time when the metadata has no capture time.
    pub fn describe_metadata(&self, path: &Path) -> Result<MediaMetadata, DatabaseError> {
        let mut metadata = self.read_metadata(path).unwrap_or_default();
        if metadata.capture_time.is_none() {
            metadata.capture_time = Some(fsutil::file_time(path)?);
        }
        Ok(metadata)
    }

    /// Build an unsaved record for the file at `path`, which must lie under the
    /// catalog root.
    pub fn describe(&self, path: &Path) -> Result<MediaRecord, DatabaseError> {
        let abs_path = fsutil::normalize(path)?;
        let relative_path = self.relpath(&abs_path)?;
        let fingerprint = self.engine.fingerprint(&abs_path)?;
        let metadata = self.describe_metadata(&abs_path)?;

        let mut record = MediaRecord::new(
            fingerprint.content_hash,
            fingerprint.file_size,
            None,
            relative_path,
        );
        record.set_metadata(&metadata);
        Ok(record)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Catalog the file at `path`. Returns `None` when a record with the same
    /// content hash already exists, which keeps rescans idempotent.
    pub fn add(&mut self, path: &Path) -> Result<Option<u64>, DatabaseError> {
        let record = self.describe(path)?;
        match self.insert(&record) {
            Ok(id) => Ok(Some(id)),
            Err(DatabaseError::DuplicateIdentity {
                content_hash,
                existing_id,
            }) => {
                debug!(
                    path = %path.display(),
                    content_hash,
                    existing_id,
                    "Content already cataloged"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether `record` could be inserted without violating the content hash
    /// or relative path uniqueness. Does not touch the session.
    pub fn check_insert(&self, record: &MediaRecord) -> Result<(), DatabaseError> {
        if let Some(existing_id) = self.id_for_hash(&record.content_hash)? {
            return Err(DatabaseError::DuplicateIdentity {
                content_hash: record.content_hash.clone(),
                existing_id,
            });
        }
        if let Some(existing_id) = self.id_for_path(&record.relative_path)? {
            return Err(DatabaseError::DuplicatePath {
                relative_path: record.relative_path.clone(),
                existing_id,
            });
        }
        Ok(())
    }

    /// Store a new record and index it. The record's `id` is ignored and a
    /// fresh one is assigned and returned.
    pub fn insert(&mut self, record: &MediaRecord) -> Result<u64, DatabaseError> {
        debug_assert!(
            !record.content_hash.is_empty(),
            "content hash must not be empty"
        );
        self.check_insert(record)?;

        let id = self.next_id()?;
        let mut stored = record.clone();
        stored.id = id;

        let txn = self.session()?;
        {
            let mut table = txn.open_table(RECORDS)?;
            let data = rmp_serde::to_vec_named(&stored)?;
            table.insert(id, data.as_slice())?;

            let mut hashes = txn.open_table(CONTENT_HASHES)?;
            hashes.insert(stored.content_hash.as_str(), id)?;

            let mut paths = txn.open_table(RELATIVE_PATHS)?;
            paths.insert(stored.relative_path.as_str(), id)?;
        }
        Ok(id)
    }

    /// Apply a partial update. Returns `false` if the record does not exist.
    /// Fails with `DuplicateIdentity`/`DuplicatePath` if the patch would take
    /// another record's content hash or path; nothing is written then.
    pub fn update(&mut self, id: u64, patch: &RecordPatch) -> Result<bool, DatabaseError> {
        let existing = match self.get_by_id(id)? {
            Some(record) => record,
            None => return Ok(false),
        };
        let mut updated = existing.clone();
        patch.apply_to(&mut updated);
        self.replace(&existing, updated)?;
        Ok(true)
    }

    /// Replace every mutable field of record `id` with those of `record`.
    pub fn update_full(&mut self, id: u64, record: &MediaRecord) -> Result<bool, DatabaseError> {
        let existing = match self.get_by_id(id)? {
            Some(record) => record,
            None => return Ok(false),
        };
        let mut updated = record.clone();
        updated.id = id;
        let (filename, extension) = split_file_name(&updated.relative_path);
        updated.filename = filename;
        updated.extension = extension;
        self.replace(&existing, updated)?;
        Ok(true)
    }

    fn replace(&mut self, old: &MediaRecord, new: MediaRecord) -> Result<(), DatabaseError> {
        let id = old.id;
        let hash_changed = old.content_hash != new.content_hash;
        let path_changed = old.relative_path != new.relative_path;

        if hash_changed {
            if let Some(existing_id) = self.id_for_hash(&new.content_hash)? {
                if existing_id != id {
                    return Err(DatabaseError::DuplicateIdentity {
                        content_hash: new.content_hash,
                        existing_id,
                    });
                }
            }
        }
        if path_changed {
            if let Some(existing_id) = self.id_for_path(&new.relative_path)? {
                if existing_id != id {
                    return Err(DatabaseError::DuplicatePath {
                        relative_path: new.relative_path,
                        existing_id,
                    });
                }
            }
        }

        let txn = self.session()?;
        {
            if hash_changed {
                let mut hashes = txn.open_table(CONTENT_HASHES)?;
                hashes.remove(old.content_hash.as_str())?;
                hashes.insert(new.content_hash.as_str(), id)?;
            }
            if path_changed {
                let mut paths = txn.open_table(RELATIVE_PATHS)?;
                paths.remove(old.relative_path.as_str())?;
                paths.insert(new.relative_path.as_str(), id)?;
            }

            let serialized = rmp_serde::to_vec_named(&new)?;
            let mut table = txn.open_table(RECORDS)?;
            table.insert(id, serialized.as_slice())?;
        }
        Ok(())
    }
}
