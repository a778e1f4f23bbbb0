//! SQL Server dialect.
//!
//! Targets use the JDBC property-list form, which `tiberius` parses via
//! `Config::from_jdbc_string`.

use super::{
    DatabasePlacement, Dialect, SAMPLE_SEED, SamplePlan, SampleStrategy, TargetSyntax,
    append_properties, format_percent, sample_percent,
};
use crate::error::CrawlerError;
use crate::models::{DataSourceDescriptor, EngineFamily, Projection};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

/// Brace-quotes values that would otherwise break the property list.
fn quote_property_value(value: &str) -> String {
    if value.contains(';') || value.starts_with('{') || value.contains('=') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

impl Dialect for SqlServerDialect {
    fn engine(&self) -> EngineFamily {
        EngineFamily::SqlServer
    }

    fn syntax(&self) -> TargetSyntax {
        TargetSyntax {
            scheme: "jdbc:sqlserver",
            default_port: Some(1433),
            placement: DatabasePlacement::NamedParameter("databaseName"),
            open: ';',
            separator: ';',
        }
    }

    fn build_target(&self, descriptor: &DataSourceDescriptor) -> crate::Result<String> {
        let syntax = self.syntax();
        if descriptor.host.contains([';', '/']) {
            return Err(CrawlerError::configuration(format!(
                "source '{}': invalid host for SQL Server target",
                descriptor.name
            )));
        }
        let port = descriptor.port.or(syntax.default_port).unwrap_or(1433);
        let mut target = format!("{}://{}:{}", syntax.scheme, descriptor.host, port);

        if let DatabasePlacement::NamedParameter(name) = syntax.placement {
            target.push_str(&format!(
                ";{}={}",
                name,
                quote_property_value(&descriptor.database)
            ));
        }
        if let Some(credentials) = &descriptor.credentials {
            target.push_str(&format!(
                ";user={}",
                quote_property_value(credentials.username())
            ));
            if let Some(password) = credentials.password() {
                target.push_str(&format!(";password={}", quote_property_value(password)));
            }
        }

        Ok(append_properties(
            target,
            &descriptor.extra_properties,
            syntax.open,
            syntax.separator,
            quote_property_value,
        ))
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn count_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT COUNT_BIG(*) FROM {}",
            self.qualified_name(schema, table)
        )
    }

    fn sample_plan(
        &self,
        schema: &str,
        table: &str,
        projection: &Projection,
        max_rows: u64,
        row_hint: Option<u64>,
    ) -> SamplePlan {
        let base = format!(
            "SELECT TOP ({}) {} FROM {}",
            max_rows,
            self.select_list(projection),
            self.qualified_name(schema, table)
        );
        match sample_percent(max_rows, row_hint) {
            Some(percent) => SamplePlan {
                sql: format!(
                    "{} TABLESAMPLE SYSTEM ({} PERCENT) REPEATABLE ({})",
                    base,
                    format_percent(percent),
                    SAMPLE_SEED
                ),
                strategy: SampleStrategy::NativeBlock {
                    percent,
                    seed: SAMPLE_SEED,
                },
                max_rows,
            },
            None => SamplePlan {
                sql: base,
                strategy: SampleStrategy::RowLimit,
                max_rows,
            },
        }
    }
}
