//! Counting fake driver shared by the integration tests.
//!
//! The fake speaks the PostgreSQL dialect and serves one schema (`public`)
//! whose tables, row counts and failure points are configured per test. It
//! counts every open, graceful close and drop so tests can check that each
//! connection ends exactly once.

#![allow(dead_code)]

use async_trait::async_trait;
use dbcrawler_core::adapters::{
    AdapterRegistry, ConnectionConfig, DatabaseAdapter, ReadPlan, RowSink, SchemaEntry, SinkStatus,
    SourceConnection, TableEntry, drive_stream,
};
use dbcrawler_core::dialect::{Dialect, PostgresDialect};
use dbcrawler_core::error::CrawlerError;
use dbcrawler_core::models::{ColumnMetadata, DataSourceDescriptor, EngineFamily, Row};
use dbcrawler_core::Result;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One table served by the fake.
#[derive(Debug, Clone)]
pub struct FakeTable {
    pub name: String,
    pub rows: u64,
    /// Catalog estimate; `None` forces the exact count path
    pub estimate: Option<u64>,
}

impl FakeTable {
    pub fn new(name: &str, rows: u64) -> Self {
        Self {
            name: name.to_string(),
            rows,
            estimate: None,
        }
    }

    pub fn with_estimate(mut self, estimate: u64) -> Self {
        self.estimate = Some(estimate);
        self
    }
}

/// Behaviour switches for the fake.
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    pub tables: Vec<FakeTable>,
    pub failing_counts: HashSet<String>,
    pub slow_counts: HashSet<String>,
    /// Stream fails after this many rows
    pub fail_stream_after: Option<u64>,
    /// First fetch never completes
    pub stall_stream: bool,
    /// Each row takes this long to arrive; streamed through `drive_stream`
    pub row_delay: Option<Duration>,
    pub refuse_connect: bool,
    pub fail_list_schemas: bool,
    /// Delay inside `list_schemas`, to widen overlap windows
    pub list_delay: Option<Duration>,
}

impl FakeBehavior {
    pub fn with_tables(tables: Vec<FakeTable>) -> Self {
        Self {
            tables,
            ..Self::default()
        }
    }

    pub fn failing_count(mut self, table: &str) -> Self {
        self.failing_counts.insert(table.to_string());
        self
    }

    pub fn slow_count(mut self, table: &str) -> Self {
        self.slow_counts.insert(table.to_string());
        self
    }
}

/// Counters shared between the adapter and every connection it opens.
#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicU64,
    pub closed: AtomicU64,
    pub dropped: AtomicU64,
    pub active: AtomicU64,
    pub max_active: AtomicU64,
}

impl Counters {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> u64 {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Fake adapter registered under the PostgreSQL engine family.
#[derive(Debug, Clone)]
pub struct FakeAdapter {
    behaviors: Arc<HashMap<String, FakeBehavior>>,
    pub counters: Arc<Counters>,
}

impl FakeAdapter {
    /// Every source gets the same behaviour.
    pub fn new(behavior: FakeBehavior) -> Self {
        let mut behaviors = HashMap::new();
        behaviors.insert(String::new(), behavior);
        Self::per_source(behaviors)
    }

    /// Behaviour keyed by descriptor name; the empty key is the fallback.
    pub fn per_source(behaviors: HashMap<String, FakeBehavior>) -> Self {
        Self {
            behaviors: Arc::new(behaviors),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn registry(&self) -> Arc<AdapterRegistry> {
        let mut registry = AdapterRegistry::empty();
        registry.register(Arc::new(self.clone()));
        Arc::new(registry)
    }

    fn behavior_for(&self, name: &str) -> FakeBehavior {
        self.behaviors
            .get(name)
            .or_else(|| self.behaviors.get(""))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseAdapter for FakeAdapter {
    fn engine(&self) -> EngineFamily {
        EngineFamily::PostgreSql
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(PostgresDialect)
    }

    async fn connect(
        &self,
        descriptor: &DataSourceDescriptor,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn SourceConnection>> {
        let behavior = self.behavior_for(&descriptor.name);
        if behavior.refuse_connect {
            return Err(CrawlerError::connection_failed(
                format!("connecting to fake source '{}'", descriptor.name),
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            ));
        }

        let counters = Arc::clone(&self.counters);
        counters.opened.fetch_add(1, Ordering::SeqCst);
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(FakeConnection {
            behavior,
            counters,
            mid_query: false,
        }))
    }
}

pub struct FakeConnection {
    behavior: FakeBehavior,
    counters: Arc<Counters>,
    /// Set while a slow query runs. Stays set when that query is abandoned,
    /// and every later call then fails like a desynchronised wire protocol.
    mid_query: bool,
}

impl FakeConnection {
    fn in_sync(&self) -> Result<()> {
        if self.mid_query {
            return Err(CrawlerError::introspection_failed(
                "reusing fake connection",
                std::io::Error::other("protocol out of sync after abandoned query"),
            ));
        }
        Ok(())
    }

    fn table(&self, schema: &str, table: &str) -> Result<&FakeTable> {
        self.behavior
            .tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| CrawlerError::table_read_msg(schema, table, "no such table"))
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn fake_row(n: u64) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), json!(n));
    row.insert("label".to_string(), json!(format!("row-{}", n)));
    row
}

#[async_trait]
impl SourceConnection for FakeConnection {
    async fn list_schemas(&mut self) -> Result<Vec<SchemaEntry>> {
        self.in_sync()?;
        if let Some(delay) = self.behavior.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail_list_schemas {
            return Err(CrawlerError::introspection_failed(
                "listing fake schemas",
                std::io::Error::other("permission denied"),
            ));
        }
        Ok(vec![SchemaEntry::new("public")])
    }

    async fn list_tables(&mut self, _schema: &str, _include_views: bool) -> Result<Vec<TableEntry>> {
        self.in_sync()?;
        Ok(self
            .behavior
            .tables
            .iter()
            .map(|t| TableEntry::table(t.name.clone()))
            .collect())
    }

    async fn list_columns(&mut self, _schema: &str, _table: &str) -> Result<Vec<ColumnMetadata>> {
        self.in_sync()?;
        Ok(vec![
            ColumnMetadata {
                name: "id".to_string(),
                data_type: "bigint".to_string(),
                is_nullable: false,
                is_primary_key: true,
                comment: None,
                ordinal_position: 1,
            },
            ColumnMetadata {
                name: "label".to_string(),
                data_type: "text".to_string(),
                is_nullable: true,
                is_primary_key: false,
                comment: None,
                ordinal_position: 2,
            },
        ])
    }

    async fn estimate_row_count(&mut self, schema: &str, table: &str) -> Result<Option<u64>> {
        self.in_sync()?;
        Ok(self.table(schema, table)?.estimate)
    }

    async fn count_rows(&mut self, schema: &str, table: &str) -> Result<u64> {
        self.in_sync()?;
        if self.behavior.slow_counts.contains(table) {
            self.mid_query = true;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            self.mid_query = false;
        }
        if self.behavior.failing_counts.contains(table) {
            return Err(CrawlerError::table_read_msg(schema, table, "COUNT(*) failed"));
        }
        Ok(self.table(schema, table)?.rows)
    }

    async fn stream_rows(
        &mut self,
        plan: &ReadPlan,
        sink: &mut dyn RowSink,
        fetch_timeout: Duration,
    ) -> Result<u64> {
        self.in_sync()?;
        if self.behavior.stall_stream {
            tokio::time::sleep(fetch_timeout.saturating_mul(2)).await;
            return Err(CrawlerError::timeout(
                format!("fetch from {}.{}", plan.schema, plan.table),
                fetch_timeout,
            ));
        }

        let total = self.table(&plan.schema, &plan.table)?.rows;
        if let Some(delay) = self.behavior.row_delay {
            let rows = Box::pin(futures::stream::unfold(0u64, move |n| async move {
                if n >= total {
                    return None;
                }
                tokio::time::sleep(delay).await;
                Some((Ok::<u64, std::io::Error>(n), n + 1))
            }));
            return drive_stream(rows, plan, sink, fetch_timeout, |n| Ok(fake_row(n))).await;
        }

        let limit = plan.max_rows.unwrap_or(u64::MAX);
        let mut delivered = 0;
        for n in 0..total {
            if delivered >= limit {
                break;
            }
            if self.behavior.fail_stream_after == Some(n) {
                return Err(CrawlerError::table_read_msg(
                    &plan.schema,
                    &plan.table,
                    "connection reset mid-stream",
                ));
            }
            tokio::task::yield_now().await;
            if sink.accept(fake_row(n)).await == SinkStatus::Closed {
                break;
            }
            delivered += 1;
        }
        Ok(delivered)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Descriptor routed to the fake adapter.
pub fn fake_source(name: &str) -> DataSourceDescriptor {
    DataSourceDescriptor::new(name, EngineFamily::PostgreSql, "fake.local", None, "app")
}

/// Waits until every connection opened through `ledger` has been released.
pub async fn wait_for_release(ledger: &dbcrawler_core::ResourceLedger) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while ledger.outstanding() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
