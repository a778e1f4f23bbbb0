//! SQLite driver.
//!
//! # Module Structure
//! - `connection`: File open options (read-only, busy timeout)
//! - `catalog`: Enumeration via `PRAGMA database_list`, `sqlite_master` and
//!   `pragma_table_info`
//!
//! Attached databases appear as schemas; `temp` is skipped.

mod catalog;
mod connection;

use super::{ConnectionConfig, DatabaseAdapter, ReadPlan, RowSink, SchemaEntry, SourceConnection, TableEntry};
use crate::dialect::{Dialect, SqliteDialect};
use crate::error::CrawlerError;
use crate::models::{ColumnMetadata, DataSourceDescriptor, EngineFamily};
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use std::time::Duration;

pub use connection::connect_options;

/// SQLite adapter. Stateless; every `connect` opens the file again.
#[derive(Debug, Clone, Default)]
pub struct SqliteAdapter;

impl SqliteAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn engine(&self) -> EngineFamily {
        EngineFamily::Sqlite
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(SqliteDialect)
    }

    async fn connect(
        &self,
        descriptor: &DataSourceDescriptor,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn SourceConnection>> {
        let conn = connection::open(descriptor, config).await?;
        Ok(Box::new(SqliteSourceConnection { conn }))
    }
}

/// One open SQLite database file.
pub struct SqliteSourceConnection {
    conn: SqliteConnection,
}

impl std::fmt::Debug for SqliteSourceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSourceConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceConnection for SqliteSourceConnection {
    async fn list_schemas(&mut self) -> Result<Vec<SchemaEntry>> {
        catalog::list_schemas(&mut self.conn).await
    }

    async fn list_tables(&mut self, schema: &str, include_views: bool) -> Result<Vec<TableEntry>> {
        catalog::list_tables(&mut self.conn, schema, include_views).await
    }

    async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<ColumnMetadata>> {
        catalog::list_columns(&mut self.conn, schema, table).await
    }

    async fn estimate_row_count(&mut self, schema: &str, table: &str) -> Result<Option<u64>> {
        catalog::estimate_row_count(&mut self.conn, schema, table).await
    }

    async fn count_rows(&mut self, schema: &str, table: &str) -> Result<u64> {
        let sql = SqliteDialect.count_sql(schema, table);
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| CrawlerError::table_read(schema, table, "COUNT(*) failed", e))?;
        Ok(super::helpers::count_to_u64(count))
    }

    async fn stream_rows(
        &mut self,
        plan: &ReadPlan,
        sink: &mut dyn RowSink,
        fetch_timeout: Duration,
    ) -> Result<u64> {
        let mut sql = plan.sql.as_str();
        if let Some(fallback) = &plan.fallback_sql {
            if !catalog::has_rowid(&mut self.conn, &plan.schema, &plan.table).await? {
                tracing::debug!(
                    "{}.{} has no rowid; sampling with a plain limit",
                    plan.schema,
                    plan.table
                );
                sql = fallback;
            }
        }
        let rows = sqlx::query(sql).fetch(&mut self.conn);
        super::drive_stream(rows, plan, sink, fetch_timeout, |row: SqliteRow| {
            Ok(super::helpers::row_to_map(&row))
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| CrawlerError::connection_failed("closing SQLite connection", e))
    }
}
