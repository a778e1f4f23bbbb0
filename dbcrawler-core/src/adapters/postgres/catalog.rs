//! Catalog enumeration from `pg_catalog`.

use crate::adapters::helpers::count_to_u64;
use crate::adapters::{SchemaEntry, TableEntry};
use crate::error::CrawlerError;
use crate::models::{ColumnMetadata, TableKind};
use crate::Result;
use sqlx::{PgConnection, Row};

pub(super) async fn list_schemas(conn: &mut PgConnection) -> Result<Vec<SchemaEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT n.nspname AS name,
               obj_description(n.oid, 'pg_namespace') AS remarks
        FROM pg_catalog.pg_namespace n
        WHERE n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
          AND n.nspname NOT LIKE 'pg\_temp\_%'
          AND n.nspname NOT LIKE 'pg\_toast\_temp\_%'
          AND has_schema_privilege(n.oid, 'USAGE')
        ORDER BY n.nspname
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| CrawlerError::introspection_failed("listing PostgreSQL schemas", e))?;

    rows.iter()
        .map(|row| {
            Ok(SchemaEntry {
                name: row
                    .try_get("name")
                    .map_err(|e| CrawlerError::introspection_failed("reading schema name", e))?,
                remarks: row.try_get("remarks").ok().flatten(),
            })
        })
        .collect()
}

pub(super) async fn list_tables(
    conn: &mut PgConnection,
    schema: &str,
    include_views: bool,
) -> Result<Vec<TableEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT c.relname AS name,
               c.relkind::text AS kind,
               obj_description(c.oid, 'pg_class') AS comment
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relkind IN ('r', 'p', 'v', 'm')
        ORDER BY c.relname
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
            .try_get("name")
            .map_err(|e| CrawlerError::introspection_failed("reading table name", e))?;
        let relkind: String = row.try_get("kind").unwrap_or_default();
        let kind = match relkind.as_str() {
            "v" | "m" => TableKind::View,
            _ => TableKind::Table,
        };
        if kind == TableKind::View && !include_views {
            continue;
        }
        tables.push(TableEntry {
            name,
            kind,
            comment: row.try_get("comment").ok().flatten(),
        });
    }
    Ok(tables)
}

pub(super) async fn list_columns(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnMetadata>> {
    let rows = sqlx::query(
        r#"
        SELECT a.attname AS name,
               format_type(a.atttypid, a.atttypmod) AS data_type,
               NOT a.attnotnull AS is_nullable,
               col_description(a.attrelid, a.attnum) AS comment,
               a.attnum::int4 AS ordinal,
               EXISTS (
                   SELECT 1 FROM pg_catalog.pg_index i
                   WHERE i.indrelid = a.attrelid
                     AND i.indisprimary
                     AND a.attnum = ANY (i.indkey)
               ) AS is_primary_key
        FROM pg_catalog.pg_attribute a
        WHERE a.attrelid = format('%I.%I', $1::text, $2::text)::regclass
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attnum
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| CrawlerError::table_read(schema, table, "listing columns", e))?;

    rows.iter()
        .map(|row| {
            let ordinal: i32 = row
                .try_get("ordinal")
                .map_err(|e| CrawlerError::table_read(schema, table, "reading column", e))?;
            Ok(ColumnMetadata {
                name: row
                    .try_get("name")
                    .map_err(|e| CrawlerError::table_read(schema, table, "reading column", e))?,
                data_type: row.try_get("data_type").unwrap_or_default(),
                is_nullable: row.try_get("is_nullable").unwrap_or(true),
                is_primary_key: row.try_get("is_primary_key").unwrap_or(false),
                comment: row.try_get("comment").ok().flatten(),
                ordinal_position: u32::try_from(ordinal).unwrap_or(0),
            })
        })
        .collect()
}

/// `pg_class.reltuples`, which is -1 (or 0 on old servers) before the first
/// ANALYZE. Both read as "no statistic".
pub(super) async fn estimate_row_count(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Option<u64>> {
    let reltuples: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT c.reltuples::float8
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relname = $2
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| CrawlerError::table_read(schema, table, "reading pg_class.reltuples", e))?;

    Ok(reltuples.filter(|r| *r > 0.0).map(|r| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let estimate = r.round() as i64;
        count_to_u64(estimate)
    }))
}
