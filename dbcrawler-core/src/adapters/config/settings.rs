//! On-disk crawler settings.
//!
//! ```json
//! {
//!   "sources": [
//!     {"name": "crm", "engine": "mysql", "host": "db", "database": "crm",
//!      "credentials": {"username": "ro", "password": "..."},
//!      "extra_properties": {"useSSL": "true"}}
//!   ],
//!   "crawl": {"full_scan_threshold": 5000}
//! }
//! ```

use super::CrawlConfig;
use crate::error::CrawlerError;
use crate::models::DataSourceDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Sources to crawl plus the crawl configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlerSettings {
    #[serde(default)]
    pub sources: Vec<DataSourceDescriptor>,
    #[serde(default)]
    pub crawl: CrawlConfig,
}

impl CrawlerSettings {
    /// Reads and validates a settings document.
    ///
    /// # Errors
    /// Returns `Io`, `Serialization` or `Configuration` errors. The file
    /// contents are never included in the error.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| CrawlerError::Io {
            context: format!("reading settings file {}", path.display()),
            source,
        })?;
        let settings: Self = serde_json::from_str(&raw).map_err(|source| {
            CrawlerError::Serialization {
                context: format!("parsing settings file {}", path.display()),
                source,
            }
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the crawl config and every source, and checks that source
    /// names and ids are unique.
    ///
    /// # Errors
    /// Returns the first configuration error found
    pub fn validate(&self) -> crate::Result<()> {
        self.crawl.validate()?;

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for source in &self.sources {
            crate::validation::validate_descriptor(source)?;
            if !names.insert(source.name.as_str()) {
                return Err(CrawlerError::configuration(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            if !ids.insert(source.id) {
                return Err(CrawlerError::configuration(format!(
                    "duplicate source id {}",
                    source.id
                )));
            }
        }
        Ok(())
    }

    /// Finds a source by name.
    pub fn source(&self, name: &str) -> Option<&DataSourceDescriptor> {
        self.sources.iter().find(|s| s.name == name)
    }
}
