use redb::TableDefinition;

/// Media records: id -> MediaRecord (msgpack). Ids only grow, so key order is insertion order.
pub const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

/// Content hash index: content_hash -> id (unique)
pub const CONTENT_HASHES: TableDefinition<&str, u64> = TableDefinition::new("content_hashes");

/// Relative path index: relative_path -> id (unique)
pub const RELATIVE_PATHS: TableDefinition<&str, u64> = TableDefinition::new("relative_paths");

/// Catalog counters
pub const CATALOG_META: TableDefinition<&str, u64> = TableDefinition::new("catalog_meta");

pub const NEXT_ID_KEY: &str = "next_id";
