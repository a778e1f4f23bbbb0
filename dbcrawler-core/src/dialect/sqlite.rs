//! SQLite dialect.
//!
//! The "database" of a SQLite descriptor is a file path; the schema is
//! usually `main`.

use super::{
    DatabasePlacement, Dialect, OVERSAMPLE_FACTOR, SamplePlan, SampleStrategy, TargetSyntax,
    append_properties, encode_query_value,
};
use crate::models::{DataSourceDescriptor, EngineFamily, Projection};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn engine(&self) -> EngineFamily {
        EngineFamily::Sqlite
    }

    fn syntax(&self) -> TargetSyntax {
        TargetSyntax {
            scheme: "sqlite",
            default_port: None,
            placement: DatabasePlacement::FilePath,
            open: '?',
            separator: '&',
        }
    }

    fn build_target(&self, descriptor: &DataSourceDescriptor) -> crate::Result<String> {
        let syntax = self.syntax();
        let base = format!("{}:{}", syntax.scheme, descriptor.database);
        Ok(append_properties(
            base,
            &descriptor.extra_properties,
            syntax.open,
            syntax.separator,
            encode_query_value,
        ))
    }

    /// Samples every k-th rowid where `k = hint / (n * 2)`, so roughly twice
    /// the requested rows qualify before the limit applies.
    fn sample_plan(
        &self,
        schema: &str,
        table: &str,
        projection: &Projection,
        max_rows: u64,
        row_hint: Option<u64>,
    ) -> SamplePlan {
        let base = self.full_scan_sql(schema, table, projection);
        let wanted = max_rows.saturating_mul(OVERSAMPLE_FACTOR).max(1);
        let stride = row_hint.map_or(1, |hint| hint / wanted);
        if stride > 1 {
            SamplePlan {
                sql: format!("{} WHERE rowid % {} = 0 LIMIT {}", base, stride, max_rows),
                strategy: SampleStrategy::RowStride { stride },
                max_rows,
            }
        } else {
            SamplePlan {
                sql: format!("{} LIMIT {}", base, max_rows),
                strategy: SampleStrategy::RowLimit,
                max_rows,
            }
        }
    }
}
