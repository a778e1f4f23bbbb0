//! Command implementations.
//!
//! Every command reads the settings file, applies command line overrides and
//! drives the core crawler. Output formatting lives in [`crate::output`].

use anyhow::{Context, bail};
use dbcrawler_core::{
    AdapterRegistry, CrawlReport, Crawler, CrawlerSettings, DataSourceDescriptor,
    DialectRegistry, EngineFamily, Projection, ReadMode, ReadRequest, SnapshotStore,
    SourceCatalog, StreamSummary, adapters::driver_feature, models::RowCountSource,
    models::TableKind, redacted_target, trim::trim_row,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::output;
use crate::{CrawlArgs, StreamArgs};

/// Loads and validates the settings file.
///
/// # Errors
/// Returns an error when the file is missing, malformed or invalid
pub fn load_settings(path: &Path) -> anyhow::Result<CrawlerSettings> {
    CrawlerSettings::load(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn select_sources(
    settings: &CrawlerSettings,
    names: &[String],
) -> anyhow::Result<Vec<DataSourceDescriptor>> {
    if names.is_empty() {
        return Ok(settings.sources.clone());
    }
    names
        .iter()
        .map(|name| {
            settings
                .source(name)
                .cloned()
                .with_context(|| format!("Unknown source '{}'", name))
        })
        .collect()
}

/// Crawls the selected sources and optionally writes their snapshots.
///
/// Returns one report per source, ordered by source name.
///
/// # Errors
/// Returns an error for invalid configuration, an unknown source name or a
/// failed snapshot write. Failed crawls are reported, not returned as errors.
pub async fn crawl(
    settings: &CrawlerSettings,
    args: &CrawlArgs,
    adapters: Arc<AdapterRegistry>,
) -> anyhow::Result<Vec<CrawlReport>> {
    let config = args.overrides.apply(settings.crawl.clone())?;
    let catalog = SourceCatalog::from_descriptors(select_sources(settings, &args.sources)?)?;
    if catalog.is_empty() {
        warn!("No sources configured; nothing to crawl");
    }

    let store = Arc::new(SnapshotStore::new());
    let crawler = Crawler::new(adapters, config, Arc::clone(&store))?;

    info!("Crawling {} source(s)", catalog.len());
    let reports = crawler.crawl_all(catalog.list()).await;

    if let Some(path) = &args.output {
        output::save_snapshots(&reports, &store, path).await?;
        info!("Snapshots written to {}", path.display());
    }

    Ok(reports)
}

/// Streams one table as JSON lines into `writer`.
///
/// # Errors
/// Returns an error when the source or table cannot be resolved, the stream
/// cannot be opened, a row fails mid-stream or the writer fails
pub async fn stream<W: Write>(
    settings: &CrawlerSettings,
    args: &StreamArgs,
    adapters: Arc<AdapterRegistry>,
    writer: &mut W,
) -> anyhow::Result<StreamSummary> {
    let config = args.overrides.apply(settings.crawl.clone())?;
    let descriptor = Arc::new(
        settings
            .source(&args.source)
            .cloned()
            .with_context(|| format!("Unknown source '{}'", args.source))?,
    );

    let projection = if args.columns.is_empty() {
        Projection::all(args.projection_id.clone())
    } else {
        Projection::columns(args.projection_id.clone(), args.columns.iter().cloned())
    };

    let mut crawl_config = config.clone();
    crawl_config.sampling.collect_preview = false;
    let crawler = Crawler::new(adapters, crawl_config, Arc::new(SnapshotStore::new()))?;

    let request = match args.mode.read_mode() {
        Some(mode) => ReadRequest::new(&args.schema, &args.table, projection, mode),
        None => plan_automatic(&crawler, &descriptor, args, projection).await?,
    };

    let mut session = crawler
        .stream_reader()
        .open_stream(&descriptor, &request)
        .await
        .with_context(|| {
            format!(
                "Failed to open stream on {}.{} of '{}'",
                args.schema, args.table, descriptor.name
            )
        })?;

    let value_limit = usize::try_from(args.max_value_length)
        .ok()
        .filter(|n| *n > 0);

    while let Some(item) = session.next_row().await {
        let mut row = match item {
            Ok(row) => row,
            Err(e) => {
                let delivered = session.rows_delivered();
                session.finish().await?;
                return Err(e).with_context(|| {
                    format!(
                        "Stream of {}.{} failed after {} rows",
                        args.schema, args.table, delivered
                    )
                });
            }
        };
        if let Some(limit) = value_limit {
            row.values = trim_row(row.values, limit);
        }
        output::write_row(writer, &row)?;

        if args.limit.is_some_and(|limit| session.rows_delivered() >= limit) {
            break;
        }
    }
    writer.flush().context("Failed to flush row output")?;

    let summary = session.finish().await?;
    info!(
        "Streamed {} rows from {}.{} in {} mode{}",
        summary.rows_delivered,
        args.schema,
        args.table,
        request.mode,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(summary)
}

/// Crawls the source once and reads the table in its planned mode.
async fn plan_automatic(
    crawler: &Crawler,
    descriptor: &Arc<DataSourceDescriptor>,
    args: &StreamArgs,
    projection: Projection,
) -> anyhow::Result<ReadRequest> {
    let report = crawler.crawl_source(Arc::clone(descriptor)).await;
    if report.is_failed() {
        bail!(
            "Crawl of '{}' failed: {}",
            descriptor.name,
            output::status_line(&report)
        );
    }

    let snapshot = crawler
        .store()
        .get(descriptor.id)
        .with_context(|| format!("No snapshot published for '{}'", descriptor.name))?;
    let table = snapshot
        .metadata
        .table(&args.schema, &args.table)
        .with_context(|| {
            format!(
                "Table {}.{} not found in '{}'",
                args.schema, args.table, descriptor.name
            )
        })?;

    // An unknown count gives no basis for a full scan
    let mode = table.planned_mode.unwrap_or(ReadMode::Sample);
    let request = ReadRequest::new(&args.schema, &args.table, projection, mode);
    let hinted = table.kind == TableKind::Table && table.row_count_source != RowCountSource::Unknown;
    Ok(if hinted {
        request.with_row_hint(table.row_count)
    } else {
        request
    })
}

/// Redacted connection target per configured source, ordered by name.
///
/// # Errors
/// Returns an error when a source cannot form a target
pub fn targets(settings: &CrawlerSettings) -> anyhow::Result<Vec<(String, String)>> {
    let catalog = SourceCatalog::from_descriptors(settings.sources.clone())?;
    catalog
        .list()
        .iter()
        .map(|descriptor| -> anyhow::Result<(String, String)> {
            let target = redacted_target(descriptor)
                .with_context(|| format!("Invalid source '{}'", descriptor.name))?;
            Ok((descriptor.name.clone(), target))
        })
        .collect()
}

/// Support status of one engine family in this build.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EngineSupport {
    pub engine: EngineFamily,
    pub dialect: bool,
    pub driver: bool,
    pub feature: Option<&'static str>,
}

/// Lists every engine family with its dialect and driver availability.
pub fn dialects(adapters: &AdapterRegistry) -> Vec<EngineSupport> {
    let registry = DialectRegistry::standard();
    EngineFamily::ALL
        .iter()
        .map(|&engine| EngineSupport {
            engine,
            dialect: registry.resolve(engine).is_ok(),
            driver: adapters.supports(engine),
            feature: driver_feature(engine),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialects_cover_every_engine() {
        let support = dialects(&AdapterRegistry::empty());
        assert_eq!(support.len(), 5);
        assert!(support.iter().all(|s| s.dialect && !s.driver));

        let oracle = support
            .iter()
            .find(|s| s.engine == EngineFamily::Oracle)
            .unwrap();
        assert_eq!(oracle.feature, None);
    }

    #[test]
    fn test_select_unknown_source_fails() {
        let settings = CrawlerSettings::default();
        let err = select_sources(&settings, &["missing".to_string()]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
