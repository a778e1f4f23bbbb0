//! SQLite catalog enumeration.

use crate::adapters::{SchemaEntry, TableEntry};
use crate::dialect::{Dialect, SqliteDialect};
use crate::error::CrawlerError;
use crate::models::ColumnMetadata;
use crate::Result;
use sqlx::{Row, SqliteConnection};

pub(super) async fn list_schemas(conn: &mut SqliteConnection) -> Result<Vec<SchemaEntry>> {
    let rows = sqlx::query("PRAGMA database_list")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| CrawlerError::introspection_failed("listing SQLite databases", e))?;

    let mut schemas = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get("name")
            .map_err(|e| CrawlerError::introspection_failed("reading database name", e))?;
        if name != "temp" {
            schemas.push(SchemaEntry::new(name));
        }
    }
    Ok(schemas)
}

pub(super) async fn list_tables(
    conn: &mut SqliteConnection,
    schema: &str,
    include_views: bool,
) -> Result<Vec<TableEntry>> {
    let sql = format!(
        "SELECT name, type FROM {}.sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY name",
        SqliteDialect.quote_ident(schema)
    );
    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            CrawlerError::introspection_failed(format!("listing tables in schema '{}'", schema), e)
        })?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get("name")
            .map_err(|e| CrawlerError::introspection_failed("reading table name", e))?;
        let kind: String = row.try_get("type").unwrap_or_default();
        match kind.as_str() {
            "view" if include_views => tables.push(TableEntry::view(name)),
            "view" => {}
            _ => tables.push(TableEntry::table(name)),
        }
    }
    Ok(tables)
}

pub(super) async fn list_columns(
    conn: &mut SqliteConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnMetadata>> {
    let rows = sqlx::query(
        r#"SELECT cid, name, type, "notnull", pk FROM pragma_table_info(?1, ?2) ORDER BY cid"#,
    )
    .bind(table)
    .bind(schema)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| CrawlerError::table_read(schema, table, "listing columns", e))?;

    if rows.is_empty() {
        return Err(CrawlerError::table_read_msg(schema, table, "table has no columns"));
    }

    rows.iter()
        .map(|row| {
            let name: String = row
                .try_get("name")
                .map_err(|e| CrawlerError::table_read(schema, table, "reading column", e))?;
            let cid: i64 = row.try_get("cid").unwrap_or(0);
            let not_null: i64 = row.try_get("notnull").unwrap_or(0);
            let pk: i64 = row.try_get("pk").unwrap_or(0);
            Ok(ColumnMetadata {
                name,
                data_type: row.try_get("type").unwrap_or_default(),
                is_nullable: not_null == 0,
                is_primary_key: pk > 0,
                comment: None,
                ordinal_position: u32::try_from(cid.saturating_add(1)).unwrap_or(0),
            })
        })
        .collect()
}

/// Row estimate from `sqlite_stat1`, present only after `ANALYZE`.
pub(super) async fn estimate_row_count(
    conn: &mut SqliteConnection,
    schema: &str,
    table: &str,
) -> Result<Option<u64>> {
    let quoted = SqliteDialect.quote_ident(schema);
    let stats_table = format!(
        "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = 'sqlite_stat1'",
        quoted
    );
    let has_stats: i64 = sqlx::query_scalar(&stats_table)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| CrawlerError::table_read(schema, table, "checking for sqlite_stat1", e))?;
    if has_stats == 0 {
        return Ok(None);
    }

    let sql = format!("SELECT stat FROM {}.sqlite_stat1 WHERE tbl = ?1 LIMIT 1", quoted);
    let stat: Option<String> = sqlx::query_scalar(&sql)
        .bind(table)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| CrawlerError::table_read(schema, table, "reading sqlite_stat1", e))?;

    Ok(stat.as_deref().and_then(parse_stat_rows).filter(|n| *n > 0))
}

/// Whether rows of `table` are addressable by `rowid`. False for views and
/// for tables declared `WITHOUT ROWID`.
pub(super) async fn has_rowid(conn: &mut SqliteConnection, schema: &str, table: &str) -> Result<bool> {
    let sql = format!(
        "SELECT sql FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
        SqliteDialect.quote_ident(schema)
    );
    let ddl: Option<Option<String>> = sqlx::query_scalar(&sql)
        .bind(table)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| CrawlerError::table_read(schema, table, "reading table definition", e))?;

    Ok(match ddl {
        Some(ddl) => !ddl.as_deref().is_some_and(declares_without_rowid),
        None => false,
    })
}

fn declares_without_rowid(ddl: &str) -> bool {
    let words: Vec<String> = ddl
        .split(|c: char| c.is_whitespace() || c == ')' || c == ',')
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_uppercase)
        .collect();
    words.windows(2).any(|pair| pair[0] == "WITHOUT" && pair[1] == "ROWID")
}

/// The first integer of a `sqlite_stat1.stat` value is the table row count.
fn parse_stat_rows(stat: &str) -> Option<u64> {
    stat.split_whitespace().next()?.parse().ok()
}
