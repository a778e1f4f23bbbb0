//! Metadata collection for one source.
//!
//! A crawl opens one connection and walks schema, table and column catalogs
//! sequentially on it. Failures before or during enumeration abort the source
//! with a [`SourceFailure`]; failures inside one table are recorded on that
//! table and the walk continues. A table deadline abandons a query mid-flight,
//! so the connection is retired and the walk resumes on a fresh one.

use crate::adapters::{
    AdapterRegistry, CollectingSink, ConnectionGuard, CrawlConfig, DatabaseAdapter, ResourceLedger,
    SchemaEntry, SourceConnection, TableEntry,
};
use crate::dialect::Dialect;
use crate::error::{CrawlerError, SourceFailure};
use crate::mode::decide;
use crate::models::{
    DataSourceDescriptor, DatabaseMetadata, Projection, ReadMode, RowCountSource, SchemaMetadata,
    TableError, TableErrorPhase, TableKind, TableMetadata, TableSample,
};
use crate::reader::{ReadRequest, build_read_plan};
use crate::trim::trim;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Builds [`DatabaseMetadata`] trees.
#[derive(Debug, Clone)]
pub struct MetadataCollector {
    adapters: Arc<AdapterRegistry>,
    config: CrawlConfig,
    ledger: Arc<ResourceLedger>,
}

impl MetadataCollector {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        config: CrawlConfig,
        ledger: Arc<ResourceLedger>,
    ) -> Self {
        Self {
            adapters,
            config,
            ledger,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Collects the full metadata tree of one source.
    ///
    /// # Errors
    /// Returns a [`SourceFailure`] in phase `Connect` when the dialect is
    /// unsupported or the connection cannot be opened, and in phase
    /// `Introspect` when schema or table enumeration fails
    pub async fn collect(
        &self,
        descriptor: &DataSourceDescriptor,
    ) -> Result<DatabaseMetadata, SourceFailure> {
        let started = Instant::now();
        info!(
            "Collecting metadata from '{}' ({})",
            descriptor.name, descriptor.engine
        );

        let adapter = self
            .adapters
            .resolve(descriptor.engine)
            .map_err(|e| SourceFailure::connect(descriptor.id, e))?;
        let dialect = adapter.dialect();

        let mut guard = self
            .open(adapter.as_ref(), descriptor)
            .await
            .map_err(|e| SourceFailure::connect(descriptor.id, e))?;

        let walked = self
            .walk(&mut guard, adapter.as_ref(), dialect.as_ref(), descriptor)
            .await;

        if let Err(e) = guard.release().await {
            warn!("Closing connection to '{}' failed: {}", descriptor.name, e);
        }

        let mut metadata = walked?;
        metadata.sort();
        metadata.collection_duration_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            "Collected {} tables from '{}' in {} ms ({} with errors)",
            metadata.table_count(),
            descriptor.name,
            metadata.collection_duration_ms,
            metadata.errored_tables().len()
        );
        Ok(metadata)
    }

    /// Opens one guarded connection within the connect deadline.
    async fn open(
        &self,
        adapter: &dyn DatabaseAdapter,
        descriptor: &DataSourceDescriptor,
    ) -> crate::Result<ConnectionGuard> {
        let connect_timeout = self.config.connection.connect_timeout();
        let connection = tokio::time::timeout(
            connect_timeout,
            adapter.connect(descriptor, &self.config.connection),
        )
        .await
        .map_err(|_| {
            CrawlerError::timeout(
                format!("connect to source '{}'", descriptor.name),
                connect_timeout,
            )
        })??;

        Ok(ConnectionGuard::new(
            connection,
            Arc::clone(&self.ledger),
            format!("crawl of '{}'", descriptor.name),
        ))
    }

    /// Swaps a connection that abandoned a query for a fresh one. The stale
    /// connection is closed first so the source never sees two at once.
    async fn reopen(
        &self,
        guard: &mut ConnectionGuard,
        adapter: &dyn DatabaseAdapter,
        descriptor: &DataSourceDescriptor,
    ) -> Result<(), SourceFailure> {
        warn!(
            "Reopening connection to '{}' after a table deadline",
            descriptor.name
        );
        if let Err(e) = guard.retire().await {
            debug!("Closing stale connection to '{}' failed: {}", descriptor.name, e);
        }
        *guard = self
            .open(adapter, descriptor)
            .await
            .map_err(|e| SourceFailure::introspect(descriptor.id, e))?;
        Ok(())
    }

    async fn walk(
        &self,
        guard: &mut ConnectionGuard,
        adapter: &dyn DatabaseAdapter,
        dialect: &dyn Dialect,
        descriptor: &DataSourceDescriptor,
    ) -> Result<DatabaseMetadata, SourceFailure> {
        let introspect = |e: CrawlerError| SourceFailure::introspect(descriptor.id, e);
        let mut metadata =
            DatabaseMetadata::new(descriptor.id, descriptor.engine, descriptor.database.clone());

        let schemas: Vec<SchemaEntry> = guard
            .connection()
            .map_err(introspect)?
            .list_schemas()
            .await
            .map_err(introspect)?
            .into_iter()
            .filter(|s| self.config.schema_selected(&s.name))
            .collect();

        if schemas.is_empty() {
            metadata.add_warning("No schemas selected for collection".to_string());
        }

        let mut stale = false;
        for schema in schemas {
            if std::mem::take(&mut stale) {
                self.reopen(guard, adapter, descriptor).await?;
            }
            let entries = guard
                .connection()
                .map_err(introspect)?
                .list_tables(&schema.name, self.config.include_views)
                .await
                .map_err(introspect)?;
            debug!("Schema '{}' has {} relations", schema.name, entries.len());

            let mut tables = Vec::with_capacity(entries.len());
            for entry in entries {
                if std::mem::take(&mut stale) {
                    self.reopen(guard, adapter, descriptor).await?;
                }
                let connection = guard.connection().map_err(introspect)?;
                let table = self.collect_table(connection, dialect, &schema.name, entry).await;
                stale = table.error.as_ref().is_some_and(|e| e.timed_out);
                tables.push(table);
            }

            metadata.schemas.push(SchemaMetadata {
                name: schema.name,
                remarks: schema.remarks,
                tables,
            });
        }

        Ok(metadata)
    }

    /// Collects one table. Never fails; problems land in `TableMetadata::error`.
    async fn collect_table(
        &self,
        connection: &mut dyn SourceConnection,
        dialect: &dyn Dialect,
        schema: &str,
        entry: TableEntry,
    ) -> TableMetadata {
        let mut table = TableMetadata::new(entry.name, entry.kind);
        table.comment = entry.comment;
        debug!("Collecting {}.{}", schema, table.name);

        match connection.list_columns(schema, &table.name).await {
            Ok(columns) => table.columns = columns,
            Err(e) => {
                record_error(&mut table, schema, TableErrorPhase::Columns, &e);
                return table;
            }
        }

        match self.row_count(connection, schema, &table).await {
            Ok((count, source)) => {
                table.row_count = count;
                table.row_count_source = source;
            }
            Err(e) => {
                record_error(&mut table, schema, TableErrorPhase::Count, &e);
                return table;
            }
        }

        let mode = decide(
            table.row_count,
            self.config.full_scan_threshold,
            self.config.override_for(schema, &table.name),
        );
        table.planned_mode = Some(mode);

        if self.config.sampling.collect_preview {
            match self.preview(connection, dialect, schema, &table, mode).await {
                Ok(sample) => table.sample = Some(sample),
                Err(e) => record_error(&mut table, schema, TableErrorPhase::Preview, &e),
            }
        }

        table
    }

    /// Catalog estimate first, exact count when the catalog has nothing.
    /// Views always take the exact path.
    async fn row_count(
        &self,
        connection: &mut dyn SourceConnection,
        schema: &str,
        table: &TableMetadata,
    ) -> crate::Result<(u64, RowCountSource)> {
        let deadline = self.config.count_timeout();

        if table.kind == TableKind::Table {
            let estimate =
                tokio::time::timeout(deadline, connection.estimate_row_count(schema, &table.name))
                    .await
                    .map_err(|_| {
                        CrawlerError::timeout(
                            format!("row estimate for {}.{}", schema, table.name),
                            deadline,
                        )
                    })?;
            match estimate {
                Ok(Some(count)) => return Ok((count, RowCountSource::Catalog)),
                Ok(None) => {}
                Err(e) => debug!(
                    "No catalog estimate for {}.{}, counting: {}",
                    schema, table.name, e
                ),
            }
        }

        let count = tokio::time::timeout(deadline, connection.count_rows(schema, &table.name))
            .await
            .map_err(|_| {
                CrawlerError::timeout(format!("row count for {}.{}", schema, table.name), deadline)
            })??;
        Ok((count, RowCountSource::Exact))
    }

    async fn preview(
        &self,
        connection: &mut dyn SourceConnection,
        dialect: &dyn Dialect,
        schema: &str,
        table: &TableMetadata,
        mode: ReadMode,
    ) -> crate::Result<TableSample> {
        let sampling = &self.config.sampling;
        let cap = u64::try_from(sampling.preview_rows)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or_else(|| u64::from(sampling.sample_size));

        let mut request = ReadRequest::new(
            schema,
            table.name.clone(),
            Projection::all(format!("{}.{}", schema, table.name)),
            mode,
        );
        if table.kind == TableKind::Table && table.row_count_source != RowCountSource::Unknown {
            request = request.with_row_hint(table.row_count);
        }

        let mut plan = build_read_plan(dialect, &request, cap)?;
        plan.max_rows = Some(plan.max_rows.map_or(cap, |n| n.min(cap)));

        let mut sink = CollectingSink::default();
        connection
            .stream_rows(&plan, &mut sink, self.config.fetch_timeout())
            .await?;

        Ok(TableSample {
            rows: trim(sink.rows, sampling.preview_rows, sampling.max_value_length),
            mode,
            max_rows: sampling.preview_rows,
            max_value_length: sampling.max_value_length,
            collected_at: chrono::Utc::now(),
        })
    }
}

fn record_error(table: &mut TableMetadata, schema: &str, phase: TableErrorPhase, error: &CrawlerError) {
    warn!(
        "Table {}.{} failed during {:?}: {}",
        schema, table.name, phase, error
    );
    table.error = Some(TableError {
        phase,
        message: error.to_string(),
        timed_out: matches!(error, CrawlerError::Timeout { .. }),
    });
}
