use redb::{Database as RedbDatabase, ReadableTable, ReadableTableMetadata, WriteTransaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::models::MediaRecord;
use super::tables::*;
use crate::config::CatalogConfig;
use crate::fingerprint::{FingerprintEngine, FingerprintError};
use crate::fsutil;
use crate::metadata::{ExifExtractor, MetadataExtractor};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Catalog not found: {0}")]
    CatalogNotFound(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Path {path} is outside the catalog root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("Content hash {content_hash} already belongs to record {existing_id}")]
    DuplicateIdentity {
        content_hash: String,
        existing_id: u64,
    },
    #[error("Relative path {relative_path} already belongs to record {existing_id}")]
    DuplicatePath {
        relative_path: String,
        existing_id: u64,
    },
    #[error("Query is ambiguous: matched records {first} and {second}")]
    AmbiguousQuery { first: u64, second: u64 },
    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl DatabaseError {
    /// Per-record conflicts that a batch reports and skips.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateIdentity { .. } | DatabaseError::DuplicatePath { .. }
        )
    }
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

/// How a catalog is located on disk and how it reads files.
#[derive(Clone)]
pub struct CatalogOptions {
    pub file_name: String,
    /// Overrides `<root>/<file_name>` when set
    pub db_path: Option<PathBuf>,
    pub engine: FingerprintEngine,
    pub extractor: Arc<dyn MetadataExtractor>,
}

impl CatalogOptions {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            file_name: config.file_name.clone(),
            db_path: None,
            engine: FingerprintEngine::new(config.fingerprint_window),
            extractor: Arc::new(ExifExtractor),
        }
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(db_path.into());
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Where the catalog for `root` lives.
    pub fn catalog_path(&self, root: &Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| root.join(&self.file_name))
    }
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self::new(&CatalogConfig::default())
    }
}

impl std::fmt::Debug for CatalogOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogOptions")
            .field("file_name", &self.file_name)
            .field("db_path", &self.db_path)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// A media catalog rooted at one directory tree.
///
/// Mutations run inside a session: the first write opens a redb write
/// transaction that stays open, and visible to reads through this catalog,
/// until [`Catalog::commit`]. Dropping the catalog without committing discards
/// the session.
pub struct Catalog {
    session: Option<WriteTransaction>,
    db: RedbDatabase,
    root: PathBuf,
    db_path: PathBuf,
    pub(crate) engine: FingerprintEngine,
    pub(crate) extractor: Arc<dyn MetadataExtractor>,
}

impl Catalog {
    /// Open or create the catalog for `root`
    pub fn create<P: AsRef<Path>>(root: P, options: &CatalogOptions) -> Result<Self, DatabaseError> {
        let root = Self::resolve_root(root.as_ref())?;
        let db_path = options.catalog_path(&root);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = RedbDatabase::create(&db_path)?;
        Self::init(db, root, db_path, options)
    }

    /// Open the existing catalog for `root`
    pub fn open<P: AsRef<Path>>(root: P, options: &CatalogOptions) -> Result<Self, DatabaseError> {
        let root = Self::resolve_root(root.as_ref())?;
        let db_path = options.catalog_path(&root);
        if !db_path.is_file() {
            return Err(DatabaseError::CatalogNotFound(db_path));
        }
        let db = RedbDatabase::open(&db_path)?;
        Self::init(db, root, db_path, options)
    }

    fn resolve_root(root: &Path) -> Result<PathBuf, DatabaseError> {
        if !root.is_dir() {
            return Err(DatabaseError::NotADirectory(root.to_path_buf()));
        }
        Ok(fsutil::normalize(root)?)
    }

    fn init(
        db: RedbDatabase,
        root: PathBuf,
        db_path: PathBuf,
        options: &CatalogOptions,
    ) -> Result<Self, DatabaseError> {
        // Initialize catalog tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RECORDS)?;
            let _ = write_txn.open_table(CONTENT_HASHES)?;
            let _ = write_txn.open_table(RELATIVE_PATHS)?;
            let _ = write_txn.open_table(CATALOG_META)?;
        }
        write_txn.commit()?;

        Ok(Self {
            session: None,
            db,
            root,
            db_path,
            engine: options.engine,
            extractor: Arc::clone(&options.extractor),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn engine(&self) -> &FingerprintEngine {
        &self.engine
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// The open write transaction, starting one if needed.
    pub(crate) fn session(&mut self) -> Result<&WriteTransaction, DatabaseError> {
        let txn = match self.session.take() {
            Some(txn) => txn,
            None => self.db.begin_write()?,
        };
        Ok(self.session.insert(txn))
    }

    pub(crate) fn pending(&self) -> Option<&WriteTransaction> {
        self.session.as_ref()
    }

    pub(crate) fn redb(&self) -> &RedbDatabase {
        &self.db
    }

    /// Whether mutations are waiting for [`Catalog::commit`].
    pub fn has_pending_changes(&self) -> bool {
        self.session.is_some()
    }

    /// Make every mutation of the current session durable.
    pub fn commit(&mut self) -> Result<(), DatabaseError> {
        if let Some(txn) = self.session.take() {
            txn.commit()?;
        }
        Ok(())
    }

    /// Allocate the next record id inside the session.
    pub(crate) fn next_id(&mut self) -> Result<u64, DatabaseError> {
        let txn = self.session()?;
        let mut meta = txn.open_table(CATALOG_META)?;
        let id = meta.get(NEXT_ID_KEY)?.map(|v| v.value()).unwrap_or(1);
        meta.insert(NEXT_ID_KEY, id + 1)?;
        Ok(id)
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Path of `abs_path` relative to the catalog root, `/`-separated.
    pub fn relpath(&self, abs_path: &Path) -> Result<String, DatabaseError> {
        let rel = abs_path
            .strip_prefix(&self.root)
            .map_err(|_| DatabaseError::OutsideRoot {
                path: abs_path.to_path_buf(),
                root: self.root.clone(),
            })?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    /// Absolute location of a stored relative path under the current root.
    pub fn abspath(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Number of stored records, including uncommitted ones.
    pub fn len(&self) -> Result<u64, DatabaseError> {
        match self.pending() {
            Some(txn) => Ok(txn.open_table(RECORDS)?.len()?),
            None => Ok(self.db.begin_read()?.open_table(RECORDS)?.len()?),
        }
    }

    pub fn is_empty(&self) -> Result<bool, DatabaseError> {
        Ok(self.len()? == 0)
    }

    /// Every stored record in insertion order (for export and tests).
    pub fn all_records(&self) -> Result<Vec<MediaRecord>, DatabaseError> {
        self.iter(&super::Predicate::all()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_existing_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::open(dir.path(), &CatalogOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DatabaseError::CatalogNotFound(_)));
    }

    #[test]
    fn test_create_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::create(dir.path().join("missing"), &CatalogOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DatabaseError::NotADirectory(_)));
    }

    #[test]
    fn test_create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let options = CatalogOptions::default();
        {
            let catalog = Catalog::create(dir.path(), &options).unwrap();
            assert!(catalog.db_path().ends_with("media-catalog.redb"));
        }
        let catalog = Catalog::open(dir.path(), &options).unwrap();
        assert!(catalog.is_empty().unwrap());
    }

    #[test]
    fn test_relpath_and_abspath() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::create(dir.path(), &CatalogOptions::default()).unwrap();

        let abs = catalog.root().join("2020").join("a.jpg");
        assert_eq!(catalog.relpath(&abs).unwrap(), "2020/a.jpg");
        assert_eq!(catalog.abspath("2020/a.jpg"), abs);

        let outside = dir.path().parent().unwrap().join("elsewhere.jpg");
        assert!(matches!(
            catalog.relpath(&outside),
            Err(DatabaseError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn test_next_id_is_monotonic_within_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::create(dir.path(), &CatalogOptions::default()).unwrap();
        assert_eq!(catalog.next_id().unwrap(), 1);
        assert_eq!(catalog.next_id().unwrap(), 2);
        assert!(catalog.has_pending_changes());
        catalog.commit().unwrap();
        assert!(!catalog.has_pending_changes());
        assert_eq!(catalog.next_id().unwrap(), 3);
    }
}
