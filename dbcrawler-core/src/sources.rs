//! Catalog of configured data sources.
//!
//! Descriptors are immutable once published. Updates replace the whole
//! `Arc`, so a crawl that captured the previous descriptor keeps using it
//! until it finishes.

use crate::error::CrawlerError;
use crate::models::{DataSourceDescriptor, SourceId};
use crate::validation::validate_descriptor;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Descriptor registry keyed by id, with unique names.
#[derive(Debug, Default)]
pub struct SourceCatalog {
    sources: RwLock<HashMap<SourceId, Arc<DataSourceDescriptor>>>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a list, rejecting duplicates.
    ///
    /// # Errors
    /// Returns the first validation or uniqueness error
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = DataSourceDescriptor>) -> Result<Self> {
        let catalog = Self::new();
        for descriptor in descriptors {
            catalog.add(descriptor)?;
        }
        Ok(catalog)
    }

    /// Adds a new source.
    ///
    /// # Errors
    /// Returns a `Configuration` error when the descriptor is invalid or its
    /// id or name is already taken
    pub fn add(&self, descriptor: DataSourceDescriptor) -> Result<Arc<DataSourceDescriptor>> {
        validate_descriptor(&descriptor)?;
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        if sources.contains_key(&descriptor.id) {
            return Err(CrawlerError::configuration(format!(
                "source id {} is already registered",
                descriptor.id
            )));
        }
        if sources.values().any(|s| s.name == descriptor.name) {
            return Err(CrawlerError::configuration(format!(
                "source name '{}' is already registered",
                descriptor.name
            )));
        }
        let descriptor = Arc::new(descriptor);
        sources.insert(descriptor.id, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Replaces an existing source wholesale, returning the previous version.
    ///
    /// # Errors
    /// Returns a `Configuration` error when the id is unknown, the descriptor
    /// is invalid, or the new name belongs to another source
    pub fn update(&self, descriptor: DataSourceDescriptor) -> Result<Arc<DataSourceDescriptor>> {
        validate_descriptor(&descriptor)?;
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        if sources
            .values()
            .any(|s| s.name == descriptor.name && s.id != descriptor.id)
        {
            return Err(CrawlerError::configuration(format!(
                "source name '{}' is already registered",
                descriptor.name
            )));
        }
        let id = descriptor.id;
        let Some(slot) = sources.get_mut(&id) else {
            return Err(CrawlerError::configuration(format!("unknown source id {}", id)));
        };
        Ok(std::mem::replace(slot, Arc::new(descriptor)))
    }

    pub fn remove(&self, id: SourceId) -> Option<Arc<DataSourceDescriptor>> {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<DataSourceDescriptor>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<DataSourceDescriptor>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|s| s.name == name)
            .cloned()
    }

    /// All sources ordered by name.
    pub fn list(&self) -> Vec<Arc<DataSourceDescriptor>> {
        let mut sources: Vec<_> = self
            .sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    pub fn len(&self) -> usize {
        self.sources.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
