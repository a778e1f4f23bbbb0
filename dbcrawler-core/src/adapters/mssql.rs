//! SQL Server driver built on tiberius.
//!
//! Connections are opened from the JDBC-style target produced by
//! [`SqlServerDialect`]. The catalog comes from the `sys` views; extended
//! property `MS_Description` supplies table and column comments.
//!
//! # Security Features
//! - Application intent is set to read-only when enabled
//! - `LOCK_TIMEOUT` caps lock waits at the query timeout
//! - Connection targets never appear in errors or logs

use super::{ConnectionConfig, DatabaseAdapter, ReadPlan, RowSink, SchemaEntry, SourceConnection, TableEntry};
use crate::dialect::{Dialect, SqlServerDialect};
use crate::error::CrawlerError;
use crate::models::{ColumnMetadata, DataSourceDescriptor, EngineFamily, Row, TableKind};
use crate::Result;
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tiberius::{Client, ColumnData, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server adapter. Stateless; every `connect` opens a fresh TDS session.
#[derive(Debug, Clone, Default)]
pub struct SqlServerAdapter;

impl SqlServerAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Builds a tiberius config from the descriptor and session settings.
fn client_config(descriptor: &DataSourceDescriptor, config: &ConnectionConfig) -> Result<Config> {
    let target = SqlServerDialect.build_target(descriptor)?;
    let mut tds = Config::from_jdbc_string(&target).map_err(|e| {
        CrawlerError::connection_failed(
            format!("invalid SQL Server target for source '{}'", descriptor.name),
            e,
        )
    })?;
    tds.application_name(&config.application_name);
    tds.readonly(config.read_only);
    Ok(tds)
}

#[async_trait]
impl DatabaseAdapter for SqlServerAdapter {
    fn engine(&self) -> EngineFamily {
        EngineFamily::SqlServer
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(SqlServerDialect)
    }

    async fn connect(
        &self,
        descriptor: &DataSourceDescriptor,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn SourceConnection>> {
        let tds = client_config(descriptor, config)?;
        tracing::debug!(
            "Connecting to SQL Server source '{}' at {}",
            descriptor.name,
            descriptor.host
        );

        let tcp = TcpStream::connect(tds.get_addr()).await.map_err(|e| {
            CrawlerError::connection_failed(
                format!("reaching SQL Server source '{}'", descriptor.name),
                e,
            )
        })?;
        tcp.set_nodelay(true).ok();

        let mut client = Client::connect(tds, tcp.compat_write()).await.map_err(|e| {
            CrawlerError::connection_failed(
                format!("connecting to SQL Server source '{}'", descriptor.name),
                e,
            )
        })?;

        let lock_timeout_ms = config.query_timeout_secs.saturating_mul(1000);
        if let Err(e) = client
            .simple_query(format!("SET LOCK_TIMEOUT {}", lock_timeout_ms))
            .await
        {
            tracing::debug!("LOCK_TIMEOUT not applied for '{}': {}", descriptor.name, e);
        }

        Ok(Box::new(SqlServerConnection { client }))
    }
}

/// One open SQL Server session.
pub struct SqlServerConnection {
    client: TdsClient,
}

impl std::fmt::Debug for SqlServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerConnection").finish_non_exhaustive()
    }
}

fn text(row: &tiberius::Row, column: &str) -> Option<String> {
    row.try_get::<&str, _>(column).ok().flatten().map(str::to_string)
}

/// Converts one cell. Temporal values go through tiberius' chrono decoding
/// and travel as ISO-8601 strings; binary values as `base64:` strings.
fn cell_to_json(row: &tiberius::Row, index: usize, data: &ColumnData<'static>) -> JsonValue {
    match data {
        ColumnData::U8(Some(n)) => JsonValue::from(*n),
        ColumnData::I16(Some(n)) => JsonValue::from(*n),
        ColumnData::I32(Some(n)) => JsonValue::from(*n),
        ColumnData::I64(Some(n)) => JsonValue::from(*n),
        ColumnData::F32(Some(f)) => float(f64::from(*f)),
        ColumnData::F64(Some(f)) => float(*f),
        ColumnData::Bit(Some(b)) => JsonValue::Bool(*b),
        ColumnData::String(Some(s)) => JsonValue::String(s.to_string()),
        ColumnData::Guid(Some(g)) => JsonValue::String(g.to_string()),
        ColumnData::Numeric(Some(n)) => JsonValue::String(n.to_string()),
        ColumnData::Xml(Some(x)) => JsonValue::String(x.clone().into_owned().into_string()),
        ColumnData::Binary(Some(bytes)) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            JsonValue::String(format!("base64:{}", encoded))
        }
        ColumnData::DateTime(Some(_))
        | ColumnData::SmallDateTime(Some(_))
        | ColumnData::DateTime2(Some(_)) => temporal::<chrono::NaiveDateTime>(row, index),
        ColumnData::Date(Some(_)) => temporal::<chrono::NaiveDate>(row, index),
        ColumnData::Time(Some(_)) => temporal::<chrono::NaiveTime>(row, index),
        ColumnData::DateTimeOffset(Some(_)) => row
            .try_get::<chrono::DateTime<chrono::FixedOffset>, _>(index)
            .ok()
            .flatten()
            .map_or(JsonValue::Null, |t| JsonValue::String(t.to_rfc3339())),
        _ => JsonValue::Null,
    }
}

fn float(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

fn temporal<'a, T>(row: &'a tiberius::Row, index: usize) -> JsonValue
where
    T: tiberius::FromSql<'a> + ToString,
{
    row.try_get::<T, _>(index)
        .ok()
        .flatten()
        .map_or(JsonValue::Null, |t| JsonValue::String(t.to_string()))
}

fn convert_row(row: tiberius::Row) -> Row {
    let mut map = Row::new();
    for (index, (column, data)) in row.cells().enumerate() {
        map.insert(column.name().to_string(), cell_to_json(&row, index, data));
    }
    map
}

#[async_trait]
impl SourceConnection for SqlServerConnection {
    async fn list_schemas(&mut self) -> Result<Vec<SchemaEntry>> {
        let rows = self
            .client
            .simple_query(
                r#"
                SELECT s.name AS schema_name
                FROM sys.schemas s
                WHERE s.name NOT IN ('sys', 'INFORMATION_SCHEMA', 'guest')
                  AND s.name NOT LIKE 'db[_]%'
                ORDER BY s.name
                "#,
            )
            .await
            .map_err(|e| CrawlerError::introspection_failed("listing SQL Server schemas", e))?
            .into_first_result()
            .await
            .map_err(|e| CrawlerError::introspection_failed("reading SQL Server schemas", e))?;

        Ok(rows
            .iter()
            .filter_map(|row| text(row, "schema_name"))
            .map(SchemaEntry::new)
            .collect())
    }

    async fn list_tables(&mut self, schema: &str, include_views: bool) -> Result<Vec<TableEntry>> {
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    o.name AS table_name,
                    o.type AS object_type,
                    CAST(ep.value AS NVARCHAR(4000)) AS table_comment
                FROM sys.objects o
                JOIN sys.schemas s ON s.schema_id = o.schema_id
                LEFT JOIN sys.extended_properties ep
                    ON ep.major_id = o.object_id
                   AND ep.minor_id = 0
                   AND ep.name = 'MS_Description'
                WHERE s.name = @P1
                  AND o.type IN ('U', 'V')
                  AND o.is_ms_shipped = 0
                ORDER BY o.name
                "#,
                &[&schema],
            )
            .await
            .map_err(|e| {
                CrawlerError::introspection_failed(format!("listing tables in schema '{}'", schema), e)
            })?
            .into_first_result()
            .await
            .map_err(|e| CrawlerError::introspection_failed("reading table list", e))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(name) = text(row, "table_name") else {
                continue;
            };
            let kind = match text(row, "object_type").as_deref().map(str::trim) {
                Some("V") => TableKind::View,
                _ => TableKind::Table,
            };
            if kind == TableKind::View && !include_views {
                continue;
            }
            tables.push(TableEntry {
                name,
                kind,
                comment: text(row, "table_comment"),
            });
        }
        Ok(tables)
    }

    async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<ColumnMetadata>> {
        let qualified = SqlServerDialect.qualified_name(schema, table);
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    c.name AS column_name,
                    TYPE_NAME(c.user_type_id) AS data_type,
                    c.is_nullable AS is_nullable,
                    CAST(CASE WHEN pk.column_id IS NULL THEN 0 ELSE 1 END AS BIT) AS is_primary_key,
                    CAST(ep.value AS NVARCHAR(4000)) AS column_comment,
                    c.column_id AS ordinal_position
                FROM sys.columns c
                LEFT JOIN (
                    SELECT ic.object_id, ic.column_id
                    FROM sys.index_columns ic
                    JOIN sys.indexes i
                        ON i.object_id = ic.object_id AND i.index_id = ic.index_id
                    WHERE i.is_primary_key = 1
                ) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id
                LEFT JOIN sys.extended_properties ep
                    ON ep.major_id = c.object_id
                   AND ep.minor_id = c.column_id
                   AND ep.name = 'MS_Description'
                WHERE c.object_id = OBJECT_ID(@P1)
                ORDER BY c.column_id
                "#,
                &[&qualified.as_str()],
            )
            .await
            .map_err(|e| CrawlerError::table_read(schema, table, "listing columns", e))?
            .into_first_result()
            .await
            .map_err(|e| CrawlerError::table_read(schema, table, "reading columns", e))?;

        if rows.is_empty() {
            return Err(CrawlerError::table_read_msg(schema, table, "table has no visible columns"));
        }

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "column_name")?;
                let ordinal = row.try_get::<i32, _>("ordinal_position").ok().flatten().unwrap_or(0);
                Some(ColumnMetadata {
                    name,
                    data_type: text(row, "data_type").unwrap_or_default(),
                    is_nullable: row.try_get::<bool, _>("is_nullable").ok().flatten().unwrap_or(true),
                    is_primary_key: row
                        .try_get::<bool, _>("is_primary_key")
                        .ok()
                        .flatten()
                        .unwrap_or(false),
                    comment: text(row, "column_comment"),
                    ordinal_position: u32::try_from(ordinal).unwrap_or(0),
                })
            })
            .collect())
    }

    /// Row count of the heap or clustered index from `sys.partitions`.
    async fn estimate_row_count(&mut self, schema: &str, table: &str) -> Result<Option<u64>> {
        let qualified = SqlServerDialect.qualified_name(schema, table);
        let row = self
            .client
            .query(
                r#"
                SELECT SUM(p.rows) AS row_estimate
                FROM sys.partitions p
                WHERE p.object_id = OBJECT_ID(@P1) AND p.index_id IN (0, 1)
                "#,
                &[&qualified.as_str()],
            )
            .await
            .map_err(|e| CrawlerError::table_read(schema, table, "reading sys.partitions", e))?
            .into_row()
            .await
            .map_err(|e| CrawlerError::table_read(schema, table, "reading sys.partitions", e))?;

        let estimate = row
            .and_then(|r| r.try_get::<i64, _>("row_estimate").ok().flatten())
            .and_then(|n| u64::try_from(n).ok())
            .filter(|n| *n > 0);
        Ok(estimate)
    }

    async fn count_rows(&mut self, schema: &str, table: &str) -> Result<u64> {
        let sql = SqlServerDialect.count_sql(schema, table);
        let row = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| CrawlerError::table_read(schema, table, "COUNT_BIG(*) failed", e))?
            .into_row()
            .await
            .map_err(|e| CrawlerError::table_read(schema, table, "COUNT_BIG(*) failed", e))?;

        let count = row
            .and_then(|r| r.try_get::<i64, _>(0).ok().flatten())
            .ok_or_else(|| CrawlerError::table_read_msg(schema, table, "COUNT_BIG(*) returned no row"))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn stream_rows(
        &mut self,
        plan: &ReadPlan,
        sink: &mut dyn RowSink,
        fetch_timeout: Duration,
    ) -> Result<u64> {
        let stream = self
            .client
            .simple_query(plan.sql.as_str())
            .await
            .map_err(|e| CrawlerError::table_read(&plan.schema, &plan.table, "query failed", e))?;
        let rows = stream.into_row_stream();
        super::drive_stream(rows, plan, sink, fetch_timeout, |row| Ok(convert_row(row))).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| CrawlerError::connection_failed("closing SQL Server connection", e))
    }
}
