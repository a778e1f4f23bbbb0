//! MySQL / MariaDB driver.
//!
//! # Module Structure
//! - `connection`: Session setup (read-only transactions, execution time cap)
//! - `catalog`: Enumeration from `INFORMATION_SCHEMA`
//!
//! A MySQL "schema" is a database. The crawler walks only the database named
//! by the descriptor.

mod catalog;
mod connection;

use super::{ConnectionConfig, DatabaseAdapter, ReadPlan, RowSink, SchemaEntry, SourceConnection, TableEntry};
use crate::dialect::{Dialect, MySqlDialect};
use crate::error::CrawlerError;
use crate::models::{ColumnMetadata, DataSourceDescriptor, EngineFamily};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::types::BigDecimal;
use sqlx::{Connection, MySqlConnection, Row as _};
use std::sync::Arc;
use std::time::Duration;

/// MySQL adapter. Stateless; every `connect` opens a fresh connection.
#[derive(Debug, Clone, Default)]
pub struct MySqlAdapter;

impl MySqlAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    fn engine(&self) -> EngineFamily {
        EngineFamily::MySql
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(MySqlDialect)
    }

    async fn connect(
        &self,
        descriptor: &DataSourceDescriptor,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn SourceConnection>> {
        let conn = connection::open(descriptor, config).await?;
        Ok(Box::new(MySqlSourceConnection { conn }))
    }
}

/// Decodes the MySQL types the shared chain misses: unsigned integers and
/// `DECIMAL`.
fn mysql_value(row: &MySqlRow, index: usize) -> Option<JsonValue> {
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return Some(v.map_or(JsonValue::Null, JsonValue::from));
    }
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(index) {
        return Some(v.map_or(JsonValue::Null, |d| super::helpers::decimal_value(&d)));
    }
    None
}

/// One open MySQL session.
pub struct MySqlSourceConnection {
    conn: MySqlConnection,
}

impl std::fmt::Debug for MySqlSourceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSourceConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceConnection for MySqlSourceConnection {
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
        let sql = MySqlDialect.count_sql(schema, table);
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
        let rows = sqlx::query(&plan.sql).fetch(&mut self.conn);
        super::drive_stream(rows, plan, sink, fetch_timeout, |row: MySqlRow| {
            Ok(super::helpers::row_to_map_with(&row, mysql_value))
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| CrawlerError::connection_failed("closing MySQL connection", e))
    }
}
