//! MySQL / MariaDB dialect.

use super::{DatabasePlacement, Dialect, SamplePlan, SampleStrategy, TargetSyntax};
use crate::models::{EngineFamily, Projection};

/// MySQL has no repeatable native sampling, so samples are a capped row limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn engine(&self) -> EngineFamily {
        EngineFamily::MySql
    }

    fn syntax(&self) -> TargetSyntax {
        TargetSyntax {
            scheme: "mysql",
            default_port: Some(3306),
            placement: DatabasePlacement::PathSegment,
            open: '?',
            separator: '&',
        }
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn sample_plan(
        &self,
        schema: &str,
        table: &str,
        projection: &Projection,
        max_rows: u64,
        _row_hint: Option<u64>,
    ) -> SamplePlan {
        SamplePlan {
            sql: format!(
                "{} LIMIT {}",
                self.full_scan_sql(schema, table, projection),
                max_rows
            ),
            strategy: SampleStrategy::RowLimit,
            max_rows,
        }
    }
}
