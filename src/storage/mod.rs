pub mod db;
pub mod models;
pub mod query;
mod records;
mod tables;

pub use db::{Catalog, CatalogOptions, DatabaseError};
pub use models::{Identity, MediaRecord, MediaType, Patch, RecordPatch};
pub use query::{Constraint, Field, FieldValue, Predicate};
pub use records::Records;
pub use tables::*;
