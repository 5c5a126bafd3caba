use thiserror::Error;

use crate::fingerprint::DEFAULT_WINDOW;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Catalog filename placed inside each catalog root
    pub file_name: String,
    /// Length in bytes of the content window hashed around a file's midpoint
    pub fingerprint_window: u64,
}

#[derive(Debug, Clone, Default)]
pub struct QueryConfig {
    /// When true, a query with no constraints selects every record instead of none.
    pub empty_matches_all: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            file_name: "media-catalog.redb".to_string(),
            fingerprint_window: DEFAULT_WINDOW,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = CatalogConfig::default();

        let file_name = std::env::var("CATALOG_FILE").unwrap_or(defaults.file_name);

        let fingerprint_window = match std::env::var("FINGERPRINT_WINDOW") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FINGERPRINT_WINDOW must be a byte count, got {raw:?}"
                ))
            })?,
            Err(_) => defaults.fingerprint_window,
        };

        let empty_matches_all = std::env::var("QUERY_EMPTY_MATCHES_ALL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Config {
            catalog: CatalogConfig {
                file_name,
                fingerprint_window,
            },
            query: QueryConfig { empty_matches_all },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.file_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "CATALOG_FILE cannot be empty".to_string(),
            ));
        }

        if self.catalog.file_name.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "CATALOG_FILE must be a bare file name, got {:?}",
                self.catalog.file_name
            )));
        }

        if self.catalog.fingerprint_window == 0 {
            return Err(ConfigError::ValidationError(
                "FINGERPRINT_WINDOW must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
