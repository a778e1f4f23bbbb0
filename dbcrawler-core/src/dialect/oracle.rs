//! Oracle dialect.
//!
//! Registered for target building and SQL generation. No Oracle driver is
//! compiled into this crate, so connecting fails with `UnsupportedDialect`.

use super::{
    DatabasePlacement, Dialect, SAMPLE_SEED, SamplePlan, SampleStrategy, TargetSyntax,
    format_percent, sample_percent,
};
use crate::models::{EngineFamily, Projection};

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn engine(&self) -> EngineFamily {
        EngineFamily::Oracle
    }

    fn syntax(&self) -> TargetSyntax {
        TargetSyntax {
            scheme: "oracle",
            default_port: Some(1521),
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
        let select_list = self.select_list(projection);
        let qualified = self.qualified_name(schema, table);
        match sample_percent(max_rows, row_hint) {
            Some(percent) => SamplePlan {
                sql: format!(
                    "SELECT {} FROM {} SAMPLE BLOCK ({}) SEED ({}) FETCH FIRST {} ROWS ONLY",
                    select_list,
                    qualified,
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
                sql: format!(
                    "SELECT {} FROM {} FETCH FIRST {} ROWS ONLY",
                    select_list, qualified, max_rows
                ),
                strategy: SampleStrategy::RowLimit,
                max_rows,
            },
        }
    }
}
