//! PostgreSQL driver.
//!
//! # Module Structure
//! - `connection`: Session setup (statement timeout, read-only, application name)
//! - `catalog`: Schema, table and column enumeration from `pg_catalog`
//!
//! Rows are read through `row_to_json`, so every value keeps its native JSON
//! type and column order without per-type decoding on the client.

mod catalog;
mod connection;

use super::{ConnectionConfig, DatabaseAdapter, ReadPlan, RowSink, SchemaEntry, SourceConnection, TableEntry};
use crate::dialect::{Dialect, PostgresDialect};
use crate::error::CrawlerError;
use crate::models::{ColumnMetadata, DataSourceDescriptor, EngineFamily, Row};
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Connection, PgConnection, Row as _};
use std::sync::Arc;
use std::time::Duration;

/// PostgreSQL adapter. Stateless; every `connect` opens a fresh connection.
#[derive(Debug, Clone, Default)]
pub struct PostgresAdapter;

impl PostgresAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn engine(&self) -> EngineFamily {
        EngineFamily::PostgreSql
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(PostgresDialect)
    }

    async fn connect(
        &self,
        descriptor: &DataSourceDescriptor,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn SourceConnection>> {
        let conn = connection::open(descriptor, config).await?;
        Ok(Box::new(PostgresConnection { conn }))
    }
}

/// One open PostgreSQL session.
pub struct PostgresConnection {
    conn: PgConnection,
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection").finish_non_exhaustive()
    }
}

fn json_row(plan: &ReadPlan, row: &PgRow) -> Result<Row> {
    let value: serde_json::Value = row.try_get("row_data").map_err(|e| {
        CrawlerError::table_read(&plan.schema, &plan.table, "decoding row_to_json output", e)
    })?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(CrawlerError::table_read_msg(
            &plan.schema,
            &plan.table,
            "row_to_json returned a non-object value",
        )),
    }
}

#[async_trait]
impl SourceConnection for PostgresConnection {
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
        let sql = PostgresDialect.count_sql(schema, table);
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
        let sql = format!("SELECT row_to_json(q) AS row_data FROM ({}) q", plan.sql);
        let rows = sqlx::query(&sql).fetch(&mut self.conn);
        super::drive_stream(rows, plan, sink, fetch_timeout, |row: PgRow| {
            json_row(plan, &row)
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| CrawlerError::connection_failed("closing PostgreSQL connection", e))
    }
}
