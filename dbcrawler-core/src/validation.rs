//! Validation of descriptors, property keys and configuration keys.
//!
//! Runs before any connection is attempted so malformed sources fail with a
//! configuration error instead of a driver error that might echo the target.
//!
//! # Example
//! ```rust
//! use dbcrawler_core::models::{DataSourceDescriptor, EngineFamily};
//! use dbcrawler_core::validation::validate_descriptor;
//!
//! let source = DataSourceDescriptor::new("crm", EngineFamily::MySql, "db.local", None, "crm")
//!     .with_property("useSSL", "true");
//! assert!(validate_descriptor(&source).is_ok());
//! ```

use crate::error::CrawlerError;
use crate::models::{DataSourceDescriptor, EngineFamily};
use regex::Regex;
use std::sync::OnceLock;

fn property_key_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*$").ok())
        .as_ref()
}

fn table_key_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[^.]+\.[^.]+$").ok())
        .as_ref()
}

/// Whether a connection property key is safe to splice into a target.
pub fn is_valid_property_key(key: &str) -> bool {
    property_key_pattern().is_some_and(|re| re.is_match(key))
}

/// Whether `key` has the `schema.table` form used by table overrides.
pub fn is_qualified_table_key(key: &str) -> bool {
    table_key_pattern().is_some_and(|re| re.is_match(key))
}

/// Validates a descriptor's shape. Performs no I/O.
///
/// # Errors
/// Returns a configuration error naming the offending field. Values are never
/// echoed, so a misplaced password cannot leak through the message.
pub fn validate_descriptor(descriptor: &DataSourceDescriptor) -> crate::Result<()> {
    if descriptor.name.trim().is_empty() {
        return Err(CrawlerError::configuration("source name cannot be empty"));
    }

    if descriptor.database.trim().is_empty() {
        return Err(CrawlerError::configuration(format!(
            "source '{}': database cannot be empty",
            descriptor.name
        )));
    }

    if descriptor.engine != EngineFamily::Sqlite && descriptor.host.trim().is_empty() {
        return Err(CrawlerError::configuration(format!(
            "source '{}': host cannot be empty",
            descriptor.name
        )));
    }

    if descriptor.port == Some(0) {
        return Err(CrawlerError::configuration(format!(
            "source '{}': port must be greater than 0",
            descriptor.name
        )));
    }

    for (key, _) in descriptor.extra_properties.iter() {
        if !is_valid_property_key(key) {
            return Err(CrawlerError::configuration(format!(
                "source '{}': invalid property key '{}'",
                descriptor.name, key
            )));
        }
    }

    Ok(())
}
