//! Database adapter traits and the driver registry.
//!
//! An engine family plugs in through two object-safe traits:
//! - [`DatabaseAdapter`]: stateless factory registered once per engine
//! - [`SourceConnection`]: one open, read-only connection to a source
//!
//! Catalog calls return plain data. Row reads push into a [`RowSink`], which
//! lets the same driver code feed a bounded channel (streaming) or a vector
//! (previews).
//!
//! # Module Structure
//! - `config`: Configuration types (`ConnectionConfig`, `SamplingConfig`, `CrawlConfig`)
//! - `guard`: Exactly-once connection release and open/close accounting
//! - `helpers`: Value extraction shared by the sqlx-based drivers
//! - Database-specific modules (postgres, mysql, sqlite, mssql), feature-gated

use crate::Result;
use crate::dialect::Dialect;
use crate::error::CrawlerError;
use crate::models::{ColumnMetadata, DataSourceDescriptor, EngineFamily, Row, TableKind};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod guard;

#[cfg(any(feature = "postgresql", feature = "mysql", feature = "sqlite"))]
pub(crate) mod helpers;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgresql")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{ConnectionConfig, CrawlConfig, CrawlerSettings, SamplingConfig};
pub use guard::{ConnectionGuard, ResourceLedger};

/// A schema as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub name: String,
    pub remarks: Option<String>,
}

impl SchemaEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remarks: None,
        }
    }
}

/// A table or view as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: String,
    pub kind: TableKind,
    pub comment: Option<String>,
}

impl TableEntry {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::Table,
            comment: None,
        }
    }

    pub fn view(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::View,
            comment: None,
        }
    }
}

/// A read query plus the table it reads, for error attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    pub schema: String,
    pub table: String,
    pub sql: String,
    /// Rows beyond this are never pushed to the sink
    pub max_rows: Option<u64>,
    /// Plain row-limit phrasing of a sample, for tables the sampling clause
    /// in `sql` cannot address. Drivers that can tell switch to it.
    pub fallback_sql: Option<String>,
}

/// Whether a sink wants more rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Continue,
    /// Consumer is gone; stop reading and release the connection
    Closed,
}

/// Destination for rows produced by [`SourceConnection::stream_rows`].
#[async_trait]
pub trait RowSink: Send {
    /// Accepts one row. May wait when the consumer is slower than the driver.
    async fn accept(&mut self, row: Row) -> SinkStatus;

    /// Resolves once the consumer is gone. Drivers race each fetch against
    /// this so an abandoned stream does not wait out a slow fetch. The default
    /// never resolves.
    async fn closed(&mut self) {
        futures::future::pending::<()>().await;
    }
}

/// Sink that keeps every row in memory. Only for bounded reads.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub rows: Vec<Row>,
}

#[async_trait]
impl RowSink for CollectingSink {
    async fn accept(&mut self, row: Row) -> SinkStatus {
        self.rows.push(row);
        SinkStatus::Continue
    }
}

/// One open connection to a source.
///
/// All operations are read-only. Implementations must not log the
/// connection target.
#[async_trait]
pub trait SourceConnection: Send {
    /// Lists user schemas, system schemas excluded.
    async fn list_schemas(&mut self) -> Result<Vec<SchemaEntry>>;

    /// Lists tables (and views when `include_views`) in one schema.
    async fn list_tables(&mut self, schema: &str, include_views: bool) -> Result<Vec<TableEntry>>;

    /// Lists columns of one table in catalog (ordinal) order.
    async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<ColumnMetadata>>;

    /// Catalog row estimate, `None` when the catalog has no statistic.
    async fn estimate_row_count(&mut self, schema: &str, table: &str) -> Result<Option<u64>>;

    /// Exact `COUNT(*)`.
    async fn count_rows(&mut self, schema: &str, table: &str) -> Result<u64>;

    /// Runs `plan` and pushes rows into `sink` until the result set ends,
    /// `plan.max_rows` is reached, or the sink closes. Each fetch is bounded by
    /// `fetch_timeout`. Returns the number of rows accepted by the sink.
    async fn stream_rows(
        &mut self,
        plan: &ReadPlan,
        sink: &mut dyn RowSink,
        fetch_timeout: Duration,
    ) -> Result<u64>;

    /// Closes the connection. Called exactly once, by the guard.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Factory for connections to one engine family.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Engine family served by this adapter.
    fn engine(&self) -> EngineFamily;

    /// SQL dialect used to phrase reads for this engine.
    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Opens one connection. The caller applies the connect deadline.
    ///
    /// # Errors
    /// Returns `Connection` errors; messages never contain the password
    async fn connect(
        &self,
        descriptor: &DataSourceDescriptor,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn SourceConnection>>;
}

/// Cargo feature that compiles in the driver for an engine, if any exists.
pub fn driver_feature(engine: EngineFamily) -> Option<&'static str> {
    match engine {
        EngineFamily::PostgreSql => Some("postgresql"),
        EngineFamily::MySql => Some("mysql"),
        EngineFamily::Sqlite => Some("sqlite"),
        EngineFamily::SqlServer => Some("mssql"),
        EngineFamily::Oracle => None,
    }
}

/// Closed table of drivers keyed by engine family.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<EngineFamily, Arc<dyn DatabaseAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("engines", &self.engines())
            .finish()
    }
}

impl AdapterRegistry {
    /// Empty registry; every resolve fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every driver compiled into this build.
    pub fn standard() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();
        #[cfg(feature = "postgresql")]
        registry.register(Arc::new(postgres::PostgresAdapter::new()));
        #[cfg(feature = "mysql")]
        registry.register(Arc::new(mysql::MySqlAdapter::new()));
        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(sqlite::SqliteAdapter::new()));
        #[cfg(feature = "mssql")]
        registry.register(Arc::new(mssql::SqlServerAdapter::new()));
        registry
    }

    /// Adds or replaces the adapter for its engine family.
    pub fn register(&mut self, adapter: Arc<dyn DatabaseAdapter>) {
        self.adapters.insert(adapter.engine(), adapter);
    }

    /// Looks up the adapter for an engine family. Performs no I/O.
    ///
    /// # Errors
    /// Returns `UnsupportedDialect` naming the missing feature, if any
    pub fn resolve(&self, engine: EngineFamily) -> Result<Arc<dyn DatabaseAdapter>> {
        if let Some(adapter) = self.adapters.get(&engine) {
            return Ok(Arc::clone(adapter));
        }
        let reason = match driver_feature(engine) {
            Some(feature) => format!(
                "driver not compiled in; rebuild with --features {}",
                feature
            ),
            None => "no driver available for this engine".to_string(),
        };
        Err(CrawlerError::unsupported_dialect(engine, reason))
    }

    /// Whether a driver is registered for the engine.
    pub fn supports(&self, engine: EngineFamily) -> bool {
        self.adapters.contains_key(&engine)
    }

    /// Engines with a registered driver, in stable order.
    pub fn engines(&self) -> Vec<EngineFamily> {
        let mut engines: Vec<_> = self.adapters.keys().copied().collect();
        engines.sort();
        engines
    }
}

/// Drives a driver row stream into a sink.
///
/// Applies `fetch_timeout` to every fetch and stops at `plan.max_rows`. Stops
/// early when the sink closes, including while a fetch is still in flight.
/// Dropping the driver stream on return abandons the rest of the result set.
///
/// # Errors
/// Returns `Timeout` when a fetch exceeds its deadline and `TableRead` when
/// the driver or `convert` fails
pub async fn drive_stream<S, R, E, F>(
    mut rows: S,
    plan: &ReadPlan,
    sink: &mut dyn RowSink,
    fetch_timeout: Duration,
    mut convert: F,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<R, E>> + Unpin + Send,
    R: Send,
    E: std::error::Error + Send + Sync + 'static,
    F: FnMut(R) -> Result<Row> + Send,
{
    let limit = plan.max_rows.unwrap_or(u64::MAX);
    let mut delivered = 0u64;

    while delivered < limit {
        let fetched = tokio::select! {
            fetched = tokio::time::timeout(fetch_timeout, rows.next()) => fetched,
            () = sink.closed() => {
                tracing::debug!(
                    "Consumer left {}.{} during a fetch after {} rows",
                    plan.schema,
                    plan.table,
                    delivered
                );
                break;
            }
        };
        let next = fetched.map_err(|_| {
            CrawlerError::timeout(
                format!("fetch from {}.{}", plan.schema, plan.table),
                fetch_timeout,
            )
        })?;

        let Some(item) = next else {
            break;
        };
        let raw = item.map_err(|e| {
            CrawlerError::table_read(&plan.schema, &plan.table, "row fetch failed", e)
        })?;
        let row = convert(raw)?;

        if sink.accept(row).await == SinkStatus::Closed {
            tracing::debug!(
                "Consumer closed stream for {}.{} after {} rows",
                plan.schema,
                plan.table,
                delivered
            );
            break;
        }
        delivered = delivered.saturating_add(1);
    }

    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn plan(max_rows: Option<u64>) -> ReadPlan {
        ReadPlan {
            schema: "main".to_string(),
            table: "t".to_string(),
            sql: "SELECT 1".to_string(),
            max_rows,
            fallback_sql: None,
        }
    }

    fn to_row(n: i64) -> Result<Row> {
        let mut row = Row::new();
        row.insert("n".to_string(), json!(n));
        Ok(row)
    }

    #[tokio::test]
    async fn test_drive_stream_respects_max_rows() {
        let rows = stream::iter((0..10).map(Ok::<i64, std::io::Error>));
        let mut sink = CollectingSink::default();
        let delivered = drive_stream(rows, &plan(Some(3)), &mut sink, Duration::from_secs(1), to_row)
            .await
            .unwrap();
        assert_eq!(delivered, 3);
        assert_eq!(sink.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_drive_stream_maps_driver_error() {
        let rows = stream::iter(vec![Ok(1), Err(std::io::Error::other("socket reset"))]);
        let mut sink = CollectingSink::default();
        let err = drive_stream(rows, &plan(None), &mut sink, Duration::from_secs(1), to_row)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::TableRead { .. }));
        assert_eq!(sink.rows.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_stream_fetch_deadline() {
        let rows = stream::pending::<std::result::Result<i64, std::io::Error>>();
        let mut sink = CollectingSink::default();
        let err = drive_stream(rows, &plan(None), &mut sink, Duration::from_millis(50), to_row)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::Timeout { .. }));
    }

    /// Sink whose consumer has already left.
    struct GoneSink;

    #[async_trait]
    impl RowSink for GoneSink {
        async fn accept(&mut self, _row: Row) -> SinkStatus {
            SinkStatus::Closed
        }

        async fn closed(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_stream_stops_when_sink_closes_mid_fetch() {
        let rows = stream::pending::<std::result::Result<i64, std::io::Error>>();
        let started = tokio::time::Instant::now();
        let delivered = drive_stream(rows, &plan(None), &mut GoneSink, Duration::from_secs(60), to_row)
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_registry_reports_missing_driver() {
        let err = AdapterRegistry::empty()
            .resolve(EngineFamily::MySql)
            .err()
            .expect("mysql driver is not registered");
        assert!(err.to_string().contains("--features mysql"));

        let err = AdapterRegistry::standard()
            .resolve(EngineFamily::Oracle)
            .err()
            .expect("oracle has no driver");
        assert!(matches!(err, CrawlerError::UnsupportedDialect { .. }));
    }
}
