//! Multi-source crawl orchestration.
//!
//! Sources are crawled concurrently up to `max_concurrent_sources`. Crawls of
//! the same source are serialized by a per-source async mutex, so there is at
//! most one writer per snapshot. Successful crawls publish a new snapshot;
//! failed crawls leave the previous snapshot in place.

use crate::adapters::{AdapterRegistry, CrawlConfig, ResourceLedger};
use crate::collector::MetadataCollector;
use crate::models::{CrawlStatus, DataSourceDescriptor, SourceId};
use crate::reader::StreamReader;
use crate::snapshot::{MetadataSnapshot, SnapshotStore};
use crate::Result;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

/// Outcome of one source crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub source_id: SourceId,
    pub source_name: String,
    pub run_id: Uuid,
    pub status: CrawlStatus,
    pub table_count: usize,
    pub duration_ms: u64,
}

impl CrawlReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, CrawlStatus::Failed { .. })
    }
}

/// Crawls sources and publishes their snapshots.
#[derive(Debug)]
pub struct Crawler {
    adapters: Arc<AdapterRegistry>,
    collector: MetadataCollector,
    store: Arc<SnapshotStore>,
    ledger: Arc<ResourceLedger>,
    source_locks: std::sync::Mutex<HashMap<SourceId, Arc<Mutex<()>>>>,
}

impl Crawler {
    /// Creates a crawler with its own resource ledger.
    ///
    /// # Errors
    /// Returns a `Configuration` error when `config` is invalid
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        config: CrawlConfig,
        store: Arc<SnapshotStore>,
    ) -> Result<Self> {
        Self::with_ledger(adapters, config, store, ResourceLedger::new())
    }

    /// Creates a crawler that records connections in an existing ledger.
    ///
    /// # Errors
    /// Returns a `Configuration` error when `config` is invalid
    pub fn with_ledger(
        adapters: Arc<AdapterRegistry>,
        config: CrawlConfig,
        store: Arc<SnapshotStore>,
        ledger: Arc<ResourceLedger>,
    ) -> Result<Self> {
        config.validate()?;
        let collector = MetadataCollector::new(Arc::clone(&adapters), config, Arc::clone(&ledger));
        Ok(Self {
            adapters,
            collector,
            store,
            ledger,
            source_locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &CrawlConfig {
        self.collector.config()
    }

    /// Reader sharing this crawler's drivers, configuration and ledger.
    pub fn stream_reader(&self) -> StreamReader {
        StreamReader::new(
            Arc::clone(&self.adapters),
            self.collector.config().clone(),
            Arc::clone(&self.ledger),
        )
    }

    fn source_lock(&self, id: SourceId) -> Arc<Mutex<()>> {
        let mut locks = self.source_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    /// Crawls one source and publishes its snapshot on success.
    ///
    /// Waits for any crawl of the same source already in progress.
    pub async fn crawl_source(&self, descriptor: Arc<DataSourceDescriptor>) -> CrawlReport {
        let lock = self.source_lock(descriptor.id);
        let _writer = lock.lock().await;

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!("Crawl {} of '{}' started", run_id, descriptor.name);

        let (status, table_count) = match self.collector.collect(&descriptor).await {
            Ok(metadata) => {
                let snapshot = MetadataSnapshot::new(run_id, metadata);
                let status = snapshot.status.clone();
                let table_count = snapshot.metadata.table_count();
                self.store.put(snapshot);
                (status, table_count)
            }
            Err(failure) => {
                error!("Crawl of '{}' failed: {}", descriptor.name, failure);
                let status = CrawlStatus::Failed {
                    phase: failure.phase,
                    message: failure.error.to_string(),
                };
                (status, 0)
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Crawl {} of '{}' finished: {} ({} tables, {} ms)",
            run_id,
            descriptor.name,
            status.label(),
            table_count,
            duration_ms
        );

        CrawlReport {
            source_id: descriptor.id,
            source_name: descriptor.name.clone(),
            run_id,
            status,
            table_count,
            duration_ms,
        }
    }

    /// Crawls every source, at most `max_concurrent_sources` at a time.
    /// Reports are ordered by source name.
    pub async fn crawl_all(&self, sources: Vec<Arc<DataSourceDescriptor>>) -> Vec<CrawlReport> {
        let limit = self.collector.config().max_concurrent_sources.max(1);
        let mut reports: Vec<CrawlReport> = futures::stream::iter(sources)
            .map(|descriptor| self.crawl_source(descriptor))
            .buffer_unordered(limit)
            .collect()
            .await;
        reports.sort_by(|a, b| a.source_name.cmp(&b.source_name));
        reports
    }
}
