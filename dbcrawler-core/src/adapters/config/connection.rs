//! Database connection configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session settings applied to every connection the crawler opens.
///
/// # Example
/// ```rust
/// use dbcrawler_core::adapters::ConnectionConfig;
///
/// let config = ConnectionConfig::new()
///     .with_connect_timeout_secs(5)
///     .with_query_timeout_secs(60);
///
/// assert!(config.validate().is_ok());
/// assert!(config.read_only);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Deadline for establishing a connection
    pub connect_timeout_secs: u64,
    /// Server-side statement timeout where the engine supports one
    pub query_timeout_secs: u64,
    /// Whether to put the session in read-only mode
    pub read_only: bool,
    /// Application name reported to the server where supported
    pub application_name: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            query_timeout_secs: 300,
            read_only: true,
            application_name: "dbcrawler".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(crate::error::CrawlerError::configuration(
                "connect_timeout_secs must be greater than 0",
            ));
        }

        if self.query_timeout_secs == 0 {
            return Err(crate::error::CrawlerError::configuration(
                "query_timeout_secs must be greater than 0",
            ));
        }

        if self.application_name.contains(['\'', ';', '\0']) {
            return Err(crate::error::CrawlerError::configuration(
                "application_name contains forbidden characters",
            ));
        }

        Ok(())
    }

    /// Creates a new connection config with safe defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Builder method to set the connect deadline.
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Builder method to set the statement timeout.
    pub fn with_query_timeout_secs(mut self, secs: u64) -> Self {
        self.query_timeout_secs = secs;
        self
    }

    /// Builder method to toggle read-only sessions.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}
