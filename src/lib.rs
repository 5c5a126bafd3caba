//! media-catalog - Content-addressed catalogs of photo and video trees
//!
//! This crate catalogs media files under a directory into a per-tree redb
//! store and reconciles two catalogs with:
//! - Partial-content fingerprints (a hashed window around each file's midpoint)
//! - Predicate queries and idempotent update operators over stored records
//! - Identity-based diff, and merge into a `YYYY/YYYYMM/YYYYMMDD/<ext>/` layout
//!   that recovers cleanly from interrupted runs

pub mod config;
pub mod fingerprint;
pub mod fsutil;
pub mod metadata;
pub mod scan;
pub mod storage;
pub mod sync;
pub mod update;
#[cfg(test)]
pub mod testutil;

pub use fingerprint::{Fingerprint, FingerprintEngine};
pub use storage::{Catalog, CatalogOptions};
