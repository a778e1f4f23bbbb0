//! Data sampling configuration.
//!
//! Bounds for SAMPLE-mode reads and for the optional per-table preview the
//! collector attaches to metadata trees.

use serde::{Deserialize, Serialize};

/// Configuration for data sampling.
///
/// Non-positive `preview_rows` / `max_value_length` mean "unlimited" when the
/// rows are trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Maximum rows a SAMPLE-mode stream delivers
    pub sample_size: u32,
    /// Whether the collector reads a bounded preview per table
    pub collect_preview: bool,
    /// Rows kept in each preview
    pub preview_rows: i64,
    /// Characters kept per value in previews and trimmed streams
    pub max_value_length: i64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            collect_preview: false,
            preview_rows: 10,
            max_value_length: 256,
        }
    }
}

impl SamplingConfig {
    /// Creates a new sampling config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates sampling bounds.
    ///
    /// # Errors
    /// Returns error if `sample_size` is zero
    pub fn validate(&self) -> crate::Result<()> {
        if self.sample_size == 0 {
            return Err(crate::error::CrawlerError::configuration(
                "sample_size must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Builder method to set sample size.
    pub fn with_sample_size(mut self, size: u32) -> Self {
        self.sample_size = size;
        self
    }

    /// Builder method to enable previews with the given bounds.
    pub fn with_preview(mut self, rows: i64, max_value_length: i64) -> Self {
        self.collect_preview = true;
        self.preview_rows = rows;
        self.max_value_length = max_value_length;
        self
    }
}
