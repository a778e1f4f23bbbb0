//! Command line front end for the dbcrawler metadata crawler.
//!
//! The binary entry point lives in `main.rs`. Argument definitions and the
//! command implementations are exposed here so they can be tested without
//! spawning a process.

pub mod collect;
pub mod output;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbcrawler_core::{CrawlConfig, ExecutionMode, ReadMode};
use std::path::PathBuf;
use std::time::Duration;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "dbcrawler-collect")]
#[command(about = "Database metadata crawler")]
#[command(version)]
#[command(long_about = "
dbcrawler - read-only metadata crawler for relational databases

Walks schema, table and column catalogs of every configured source, decides
per table whether to scan fully or sample, and streams rows under bounded
memory and time budgets.

SECURITY:
- Sessions are opened read-only where the engine supports it
- Passwords are never printed; targets are redacted in every log line

SUPPORTED ENGINES:
- PostgreSQL, SQLite (default build)
- MySQL, SQL Server (with --features mysql / mssql)
- Oracle (dialect only, no driver)

EXAMPLES:
  dbcrawler-collect --config sources.json crawl --output snapshots.json
  dbcrawler-collect stream crm --schema public --table orders --mode sample
  dbcrawler-collect targets
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all log output except errors")]
    pub quiet: bool,

    /// Emit logs as JSON objects
    #[arg(long, global = true, env = "DBCRAWLER_LOG_JSON")]
    pub log_json: bool,

    /// Settings file with sources and crawl configuration
    #[arg(
        short,
        long,
        global = true,
        env = "DBCRAWLER_CONFIG",
        default_value = "dbcrawler.json",
        value_name = "FILE"
    )]
    pub config: PathBuf,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl configured sources and report a status per source
    Crawl(CrawlArgs),
    /// Stream one table's rows as JSON lines
    Stream(StreamArgs),
    /// Print each source's connection target with credentials redacted
    Targets,
    /// List engine families and whether their driver is compiled in
    Dialects,
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Only crawl the named sources (repeatable)
    #[arg(long = "source", value_name = "NAME")]
    pub sources: Vec<String>,

    /// Write every published snapshot to this JSON file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit with an error when any source is PARTIAL, not only FAILED
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Source name from the settings file
    #[arg(value_name = "SOURCE")]
    pub source: String,

    #[arg(long)]
    pub schema: String,

    #[arg(long)]
    pub table: String,

    /// How rows are selected. `auto` crawls the source first and uses the
    /// planned mode of the table.
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    pub mode: ModeArg,

    /// Comma-separated column list; all columns when omitted
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Identifier attached to every emitted row
    #[arg(long, default_value = "cli")]
    pub projection_id: String,

    /// Stop after this many rows and cancel the stream
    #[arg(long)]
    pub limit: Option<u64>,

    /// Truncate every value to this many characters; 0 keeps values whole
    #[arg(long, default_value_t = 0)]
    pub max_value_length: i64,

    /// Write rows here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// Read mode requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Auto,
    Full,
    Sample,
}

impl ModeArg {
    /// The explicit read mode, `None` for `auto`.
    pub fn read_mode(self) -> Option<ReadMode> {
        match self {
            ModeArg::Auto => None,
            ModeArg::Full => Some(ReadMode::FullScan),
            ModeArg::Sample => Some(ReadMode::Sample),
        }
    }
}

/// Command line and environment overrides applied on top of the settings
/// file's `crawl` section.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Tables with at most this many rows are fully scanned
    #[arg(long, env = "DBCRAWLER_FULL_SCAN_THRESHOLD")]
    pub threshold: Option<u64>,

    /// Maximum number of sources crawled at once (1-64)
    #[arg(long, env = "DBCRAWLER_MAX_CONCURRENT_SOURCES")]
    pub concurrency: Option<usize>,

    /// Rows buffered between producer and consumer
    #[arg(long, env = "DBCRAWLER_FETCH_SIZE")]
    pub fetch_size: Option<usize>,

    /// Maximum rows a sample delivers
    #[arg(long)]
    pub sample_size: Option<u32>,

    /// Deadline for each row count, in milliseconds
    #[arg(long)]
    pub count_timeout_ms: Option<u64>,

    /// Deadline for each row fetch, in milliseconds
    #[arg(long)]
    pub fetch_timeout_ms: Option<u64>,

    /// Per-table mode, e.g. `public.events=sample` (repeatable)
    #[arg(long = "override", value_name = "SCHEMA.TABLE=MODE", value_parser = parse_table_override)]
    pub table_overrides: Vec<(String, ExecutionMode)>,

    /// Only crawl these schemas
    #[arg(long = "include-schema", value_delimiter = ',')]
    pub include_schemas: Vec<String>,

    /// Never crawl these schemas
    #[arg(long = "exclude-schema", value_delimiter = ',')]
    pub exclude_schemas: Vec<String>,

    /// Skip views
    #[arg(long)]
    pub no_views: bool,

    /// Attach a preview of this many rows to every table
    #[arg(long, value_name = "ROWS")]
    pub preview: Option<i64>,
}

impl ConfigOverrides {
    /// Applies the overrides and validates the result.
    ///
    /// # Errors
    /// Returns an error when an override or the resulting config is invalid
    pub fn apply(&self, mut config: CrawlConfig) -> anyhow::Result<CrawlConfig> {
        if let Some(threshold) = self.threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_max_concurrent_sources(concurrency)?;
        }
        if let Some(fetch_size) = self.fetch_size {
            config = config.with_fetch_size(fetch_size);
        }
        if let Some(sample_size) = self.sample_size {
            config.sampling = config.sampling.with_sample_size(sample_size);
        }
        if let Some(ms) = self.count_timeout_ms {
            config = config.with_count_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.fetch_timeout_ms {
            config = config.with_fetch_timeout(Duration::from_millis(ms));
        }
        for (key, mode) in &self.table_overrides {
            config = config.with_table_override(key.clone(), *mode);
        }
        for schema in &self.include_schemas {
            config = config.include_schema(schema.clone());
        }
        for schema in &self.exclude_schemas {
            config = config.exclude_schema(schema.clone());
        }
        if self.no_views {
            config = config.with_views(false);
        }
        if let Some(rows) = self.preview {
            let max_value_length = config.sampling.max_value_length;
            config.sampling = config.sampling.with_preview(rows, max_value_length);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parses `schema.table=mode` where mode is `auto`, `full` or `sample`.
///
/// # Errors
/// Returns a message naming the malformed part
pub fn parse_table_override(raw: &str) -> Result<(String, ExecutionMode), String> {
    let (key, mode) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SCHEMA.TABLE=MODE, got '{}'", raw))?;

    let key = key.trim();
    match key.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {}
        _ => return Err(format!("table '{}' must be qualified as SCHEMA.TABLE", key)),
    }

    let mode = match mode.trim().to_ascii_lowercase().as_str() {
        "auto" => ExecutionMode::Auto,
        "full" | "full_scan" | "force_full_scan" => ExecutionMode::ForceFullScan,
        "sample" | "force_sample" => ExecutionMode::ForceSample,
        other => return Err(format!("unknown mode '{}' (auto, full, sample)", other)),
    };

    Ok((key.to_string(), mode))
}
