//! Latest metadata tree per source.
//!
//! Each source has at most one live [`MetadataSnapshot`]. Replacement swaps a
//! single `Arc` under the write lock, so a reader holding the old snapshot
//! keeps a complete old tree and the next reader sees the complete new one.

use crate::models::{CrawlStatus, DatabaseMetadata, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// One finished crawl of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub source_id: SourceId,
    /// Identifies the crawl run that produced this snapshot
    pub run_id: Uuid,
    pub taken_at: chrono::DateTime<chrono::Utc>,
    pub status: CrawlStatus,
    pub metadata: DatabaseMetadata,
}

impl MetadataSnapshot {
    /// Wraps a finished tree, deriving FULL or PARTIAL from its error markers.
    pub fn new(run_id: Uuid, metadata: DatabaseMetadata) -> Self {
        Self {
            source_id: metadata.source_id,
            run_id,
            taken_at: chrono::Utc::now(),
            status: CrawlStatus::from_metadata(&metadata),
            metadata,
        }
    }
}

/// Concurrent map from source id to its latest snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<SourceId, Arc<MetadataSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a snapshot, returning the one it replaced.
    pub fn put(&self, snapshot: MetadataSnapshot) -> Option<Arc<MetadataSnapshot>> {
        let snapshot = Arc::new(snapshot);
        // Entries are replaced whole, so a poisoned map is still consistent.
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(snapshot.source_id, snapshot)
    }

    /// Latest snapshot for a source.
    pub fn get(&self, source_id: SourceId) -> Option<Arc<MetadataSnapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.get(&source_id).cloned()
    }

    /// Drops the snapshot of a removed source.
    pub fn remove(&self, source_id: SourceId) -> Option<Arc<MetadataSnapshot>> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.remove(&source_id)
    }

    /// Sources with a snapshot, sorted.
    pub fn source_ids(&self) -> Vec<SourceId> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = snapshots.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Every snapshot, ordered by source id.
    pub fn all(&self) -> Vec<Arc<MetadataSnapshot>> {
        self.source_ids()
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
