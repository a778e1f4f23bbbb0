//! PostgreSQL dialect.

use super::{
    DatabasePlacement, Dialect, SAMPLE_SEED, SamplePlan, SampleStrategy, TargetSyntax,
    format_percent, sample_percent,
};
use crate::models::{EngineFamily, Projection};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn engine(&self) -> EngineFamily {
        EngineFamily::PostgreSql
    }

    fn syntax(&self) -> TargetSyntax {
        TargetSyntax {
            scheme: "postgres",
            default_port: Some(5432),
            placement: DatabasePlacement::PathSegment,
            open: '?',
            separator: '&',
        }
    }

    fn sample_plan(
        &self,
        schema: &str,
        table: &str,
        projection: &Projection,
        max_rows: u64,
        row_hint: Option<u64>,
    ) -> SamplePlan {
        let base = self.full_scan_sql(schema, table, projection);
        match sample_percent(max_rows, row_hint) {
            Some(percent) => SamplePlan {
                sql: format!(
                    "{} TABLESAMPLE SYSTEM ({}) REPEATABLE ({}) LIMIT {}",
                    base,
                    format_percent(percent),
                    SAMPLE_SEED,
                    max_rows
                ),
                strategy: SampleStrategy::NativeBlock {
                    percent,
                    seed: SAMPLE_SEED,
                },
                max_rows,
            },
            None => SamplePlan {
                sql: format!("{} LIMIT {}", base, max_rows),
                strategy: SampleStrategy::RowLimit,
                max_rows,
            },
        }
    }
}
