//! Output formatting and file writing for crawl results.

use anyhow::Context;
use dbcrawler_core::{CrawlReport, CrawlStatus, MetadataSnapshot, SnapshotStore, TaggedRow};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::collect::EngineSupport;

/// Document written by `crawl --output`.
#[derive(Debug, Serialize)]
pub struct CrawlDocument<'a> {
    pub reports: &'a [CrawlReport],
    /// Snapshots in report order; failed sources without an earlier snapshot
    /// have none
    pub snapshots: Vec<&'a MetadataSnapshot>,
}

/// One human-readable line per crawl report.
pub fn status_line(report: &CrawlReport) -> String {
    match &report.status {
        CrawlStatus::Full => format!(
            "{:<20} FULL     {} tables in {} ms",
            report.source_name, report.table_count, report.duration_ms
        ),
        CrawlStatus::Partial { errored_tables } => {
            let names: Vec<String> = errored_tables.iter().map(ToString::to_string).collect();
            format!(
                "{:<20} PARTIAL  {} tables in {} ms, errors in {}",
                report.source_name,
                report.table_count,
                report.duration_ms,
                names.join(", ")
            )
        }
        CrawlStatus::Failed { phase, message } => format!(
            "{:<20} FAILED   during {}: {}",
            report.source_name, phase, message
        ),
    }
}

/// Writes the reports and every snapshot they refer to as pretty JSON.
///
/// # Errors
/// Returns an error when serialization or the file write fails
pub async fn save_snapshots(
    reports: &[CrawlReport],
    store: &SnapshotStore,
    output_path: &Path,
) -> anyhow::Result<()> {
    let held: Vec<Arc<MetadataSnapshot>> = reports
        .iter()
        .filter_map(|report| store.get(report.source_id))
        .collect();
    let document = CrawlDocument {
        reports,
        snapshots: held.iter().map(AsRef::as_ref).collect(),
    };

    let json_data =
        serde_json::to_string_pretty(&document).context("Failed to serialize snapshots")?;
    tokio::fs::write(output_path, json_data)
        .await
        .with_context(|| format!("Failed to write to {}", output_path.display()))?;
    Ok(())
}

/// Writes one row as a single JSON line.
///
/// # Errors
/// Returns an error when serialization or the write fails
pub fn write_row<W: Write>(writer: &mut W, row: &TaggedRow) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *writer, row).context("Failed to serialize row")?;
    writer.write_all(b"\n").context("Failed to write row")?;
    Ok(())
}

/// Table of engine support for the `dialects` command.
pub fn dialect_lines(support: &[EngineSupport]) -> Vec<String> {
    support
        .iter()
        .map(|s| {
            let driver = match (s.driver, s.feature) {
                (true, _) => "driver compiled in".to_string(),
                (false, Some(feature)) => format!("no driver (enable feature '{}')", feature),
                (false, None) => "no driver available".to_string(),
            };
            let dialect = if s.dialect { "dialect" } else { "no dialect" };
            format!("{:<12} {:<10} {}", s.engine.to_string(), dialect, driver)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcrawler_core::{CrawlPhase, EngineFamily, SourceId, models::TableRef};

    fn report(status: CrawlStatus) -> CrawlReport {
        CrawlReport {
            source_id: SourceId::nil(),
            source_name: "crm".to_string(),
            run_id: SourceId::nil().0,
            status,
            table_count: 3,
            duration_ms: 42,
        }
    }

    #[test]
    fn test_status_lines() {
        assert!(status_line(&report(CrawlStatus::Full)).contains("FULL"));

        let partial = status_line(&report(CrawlStatus::Partial {
            errored_tables: vec![TableRef {
                schema: "public".to_string(),
                table: "t2".to_string(),
            }],
        }));
        assert!(partial.contains("PARTIAL"));
        assert!(partial.contains("public.t2"));

        let failed = status_line(&report(CrawlStatus::Failed {
            phase: CrawlPhase::Connect,
            message: "refused".to_string(),
        }));
        assert!(failed.contains("FAILED"));
        assert!(failed.contains("during connect: refused"));
    }

    #[test]
    fn test_write_row_is_one_line() {
        let mut values = serde_json::Map::new();
        values.insert("id".to_string(), serde_json::json!(1));
        values.insert("note".to_string(), serde_json::json!("a\nb"));
        let row = TaggedRow {
            schema: "main".to_string(),
            table: "items".to_string(),
            projection_id: "cli".to_string(),
            values,
        };

        let mut buffer = Vec::new();
        write_row(&mut buffer, &row).unwrap();
        write_row(&mut buffer, &row).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: TaggedRow = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, row);
    }

    #[test]
    fn test_dialect_lines_name_missing_features() {
        let lines = dialect_lines(&[
            EngineSupport {
                engine: EngineFamily::MySql,
                dialect: true,
                driver: false,
                feature: Some("mysql"),
            },
            EngineSupport {
                engine: EngineFamily::Oracle,
                dialect: true,
                driver: false,
                feature: None,
            },
        ]);
        assert!(lines[0].contains("enable feature 'mysql'"));
        assert!(lines[1].contains("no driver available"));
    }
}
