//! Crawl configuration.
//!
//! Controls the execution mode decider, source-level concurrency, row
//! streaming backpressure, per-step deadlines and which catalog objects are
//! walked.

use super::{ConnectionConfig, SamplingConfig};
use crate::models::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for crawling one or more sources.
///
/// # Example
/// ```rust
/// use dbcrawler_core::adapters::CrawlConfig;
/// use dbcrawler_core::models::ExecutionMode;
///
/// let config = CrawlConfig::new()
///     .with_threshold(50_000)
///     .with_table_override("public.events", ExecutionMode::ForceSample);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.override_for("public", "events"), ExecutionMode::ForceSample);
/// assert_eq!(config.override_for("public", "users"), ExecutionMode::Auto);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Tables with at most this many rows are fully scanned in `Auto` mode
    pub full_scan_threshold: u64,
    /// Maximum number of sources crawled at once (1-64)
    pub max_concurrent_sources: usize,
    /// Rows buffered between a stream producer and its consumer
    pub fetch_size: usize,
    /// Deadline for each row count or catalog estimate query
    pub count_timeout_ms: u64,
    /// Deadline for each row fetch while streaming
    pub fetch_timeout_ms: u64,
    /// Per-table execution overrides keyed by `schema.table`
    pub table_overrides: BTreeMap<String, ExecutionMode>,
    /// Only crawl these schemas when non-empty
    pub include_schemas: Vec<String>,
    /// Never crawl these schemas
    pub exclude_schemas: Vec<String>,
    /// Whether views are listed alongside tables
    pub include_views: bool,
    /// Connection session settings
    pub connection: ConnectionConfig,
    /// Sample and preview bounds
    pub sampling: SamplingConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            full_scan_threshold: 10_000,
            max_concurrent_sources: 4,
            fetch_size: 500,
            count_timeout_ms: 30_000,
            fetch_timeout_ms: 60_000,
            table_overrides: BTreeMap::new(),
            include_schemas: Vec::new(),
            exclude_schemas: Vec::new(),
            include_views: true,
            connection: ConnectionConfig::default(),
            sampling: SamplingConfig::default(),
        }
    }
}

impl CrawlConfig {
    /// Validates the crawl configuration.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_concurrent_sources == 0 {
            return Err(crate::error::CrawlerError::configuration(
                "max_concurrent_sources must be greater than 0",
            ));
        }

        if self.max_concurrent_sources > 64 {
            return Err(crate::error::CrawlerError::configuration(
                "max_concurrent_sources should not exceed 64 for safety",
            ));
        }

        if self.fetch_size == 0 || self.fetch_size > 100_000 {
            return Err(crate::error::CrawlerError::configuration(
                "fetch_size must be between 1 and 100000",
            ));
        }

        if self.count_timeout_ms == 0 || self.fetch_timeout_ms == 0 {
            return Err(crate::error::CrawlerError::configuration(
                "count_timeout_ms and fetch_timeout_ms must be greater than 0",
            ));
        }

        for key in self.table_overrides.keys() {
            if !crate::validation::is_qualified_table_key(key) {
                return Err(crate::error::CrawlerError::configuration(format!(
                    "table override key '{}' must have the form schema.table",
                    key
                )));
            }
        }

        if let Some(schema) = self
            .include_schemas
            .iter()
            .find(|s| self.exclude_schemas.contains(s))
        {
            return Err(crate::error::CrawlerError::configuration(format!(
                "schema '{}' is both included and excluded",
                schema
            )));
        }

        self.connection.validate()?;
        self.sampling.validate()?;

        Ok(())
    }

    /// Creates a new crawl config with safe defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_timeout(&self) -> Duration {
        Duration::from_millis(self.count_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Execution override for a table, `Auto` when none is configured.
    pub fn override_for(&self, schema: &str, table: &str) -> ExecutionMode {
        self.table_overrides
            .get(&format!("{}.{}", schema, table))
            .copied()
            .unwrap_or_default()
    }

    /// Whether a schema passes the include/exclude filters.
    pub fn schema_selected(&self, schema: &str) -> bool {
        if self.exclude_schemas.iter().any(|s| s == schema) {
            return false;
        }
        self.include_schemas.is_empty() || self.include_schemas.iter().any(|s| s == schema)
    }

    /// Builder method to set the full-scan threshold.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.full_scan_threshold = threshold;
        self
    }

    /// Builder method to set source concurrency with validation.
    ///
    /// # Errors
    /// Returns error if `max` is 0 or greater than 64
    pub fn with_max_concurrent_sources(mut self, max: usize) -> crate::Result<Self> {
        if max == 0 || max > 64 {
            return Err(crate::error::CrawlerError::configuration(
                "max_concurrent_sources must be between 1 and 64",
            ));
        }
        self.max_concurrent_sources = max;
        Ok(self)
    }

    /// Builder method to set the stream channel capacity.
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Builder method to set the count deadline.
    pub fn with_count_timeout(mut self, timeout: Duration) -> Self {
        self.count_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Builder method to set the fetch deadline.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Builder method to add a per-table override.
    pub fn with_table_override(mut self, key: impl Into<String>, mode: ExecutionMode) -> Self {
        self.table_overrides.insert(key.into(), mode);
        self
    }

    /// Builder method to include views.
    pub fn with_views(mut self, include: bool) -> Self {
        self.include_views = include;
        self
    }

    /// Builder method to restrict crawling to one schema.
    pub fn include_schema(mut self, schema: impl Into<String>) -> Self {
        self.include_schemas.push(schema.into());
        self
    }

    /// Builder method to skip a schema.
    pub fn exclude_schema(mut self, schema: impl Into<String>) -> Self {
        self.exclude_schemas.push(schema.into());
        self
    }

    /// Builder method to set sampling bounds.
    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Builder method to set connection settings.
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }
}
