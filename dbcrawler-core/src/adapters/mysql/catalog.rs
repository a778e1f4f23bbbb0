//! Catalog enumeration from `INFORMATION_SCHEMA`.
//!
//! Text columns are cast to CHAR because MySQL 8 reports several of them as
//! binary strings.

use crate::adapters::helpers::count_to_u64;
use crate::adapters::{SchemaEntry, TableEntry};
use crate::error::CrawlerError;
use crate::models::{ColumnMetadata, TableKind};
use crate::Result;
use sqlx::{MySqlConnection, Row};

pub(super) async fn list_schemas(conn: &mut MySqlConnection) -> Result<Vec<SchemaEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT CAST(SCHEMA_NAME AS CHAR) AS SCHEMA_NAME
        FROM INFORMATION_SCHEMA.SCHEMATA
        WHERE SCHEMA_NAME = DATABASE()
        ORDER BY SCHEMA_NAME
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| CrawlerError::introspection_failed("listing MySQL schemas", e))?;

    rows.iter()
        .map(|row| {
            row.try_get::<String, _>("SCHEMA_NAME")
                .map(SchemaEntry::new)
                .map_err(|e| CrawlerError::introspection_failed("reading schema name", e))
        })
        .collect()
}

pub(super) async fn list_tables(
    conn: &mut MySqlConnection,
    schema: &str,
    include_views: bool,
) -> Result<Vec<TableEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT
            CAST(TABLE_NAME AS CHAR) AS TABLE_NAME,
            CAST(TABLE_TYPE AS CHAR) AS TABLE_TYPE,
            CAST(TABLE_COMMENT AS CHAR) AS TABLE_COMMENT
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ?
        ORDER BY TABLE_NAME
        "#,
    )
    .bind(schema)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        CrawlerError::introspection_failed(format!("listing tables in schema '{}'", schema), e)
    })?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get("TABLE_NAME")
            .map_err(|e| CrawlerError::introspection_failed("reading table name", e))?;
        let table_type: String = row.try_get("TABLE_TYPE").unwrap_or_default();
        let kind = if table_type == "VIEW" {
            TableKind::View
        } else {
            TableKind::Table
        };
        if kind == TableKind::View && !include_views {
            continue;
        }
        let comment: Option<String> = row.try_get("TABLE_COMMENT").ok().flatten();
        tables.push(TableEntry {
            name,
            kind,
            comment: comment.filter(|c| !c.is_empty() && c != "VIEW"),
        });
    }
    Ok(tables)
}

pub(super) async fn list_columns(
    conn: &mut MySqlConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnMetadata>> {
    let rows = sqlx::query(
        r#"
        SELECT
            CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME,
            CAST(COLUMN_TYPE AS CHAR) AS COLUMN_TYPE,
            CAST(IS_NULLABLE AS CHAR) AS IS_NULLABLE,
            CAST(COLUMN_KEY AS CHAR) AS COLUMN_KEY,
            CAST(COLUMN_COMMENT AS CHAR) AS COLUMN_COMMENT,
            CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| CrawlerError::table_read(schema, table, "listing columns", e))?;

    rows.iter()
        .map(|row| {
            let name: String = row
                .try_get("COLUMN_NAME")
                .map_err(|e| CrawlerError::table_read(schema, table, "reading column", e))?;
            let nullable: String = row.try_get("IS_NULLABLE").unwrap_or_default();
            let key: String = row.try_get("COLUMN_KEY").unwrap_or_default();
            let comment: Option<String> = row.try_get("COLUMN_COMMENT").ok().flatten();
            let ordinal: i64 = row.try_get("ORDINAL_POSITION").unwrap_or(0);
            Ok(ColumnMetadata {
                name,
                data_type: row.try_get("COLUMN_TYPE").unwrap_or_default(),
                is_nullable: nullable == "YES",
                is_primary_key: key == "PRI",
                comment: comment.filter(|c| !c.is_empty()),
                ordinal_position: u32::try_from(ordinal).unwrap_or(0),
            })
        })
        .collect()
}

/// `INFORMATION_SCHEMA.TABLES.TABLE_ROWS`. Approximate for InnoDB, NULL for
/// views.
pub(super) async fn estimate_row_count(
    conn: &mut MySqlConnection,
    schema: &str,
    table: &str,
) -> Result<Option<u64>> {
    let rows: Option<Option<i64>> = sqlx::query_scalar(
        r#"
        SELECT CAST(TABLE_ROWS AS SIGNED)
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| CrawlerError::table_read(schema, table, "reading TABLE_ROWS", e))?;

    Ok(rows.flatten().map(count_to_u64))
}
