//! Database metadata crawler.
//!
//! Crawls configured relational sources, publishes one metadata snapshot per
//! source and streams table rows as JSON lines.
//!
//! # Security Guarantees
//! - Read-only sessions wherever the engine supports them
//! - No credentials printed or logged
//! - Connection targets are always shown redacted

use anyhow::Context;
use clap::Parser;
use dbcrawler_collect::{Cli, Command, collect, output};
use dbcrawler_core::{AdapterRegistry, CrawlStatus, logging::init_logging};
use std::io::Write;
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_json)
        .context("Failed to initialize logging")?;

    let adapters = Arc::new(AdapterRegistry::standard());

    match &cli.command {
        Command::Crawl(args) => {
            let settings = collect::load_settings(&cli.global.config)?;
            let reports = collect::crawl(&settings, args, adapters).await?;
            for report in &reports {
                println!("{}", output::status_line(report));
            }

            let failed = reports.iter().filter(|r| r.is_failed()).count();
            let partial = reports
                .iter()
                .filter(|r| matches!(r.status, CrawlStatus::Partial { .. }))
                .count();
            if failed > 0 || (args.strict && partial > 0) {
                error!(
                    "{} of {} sources failed, {} partial",
                    failed,
                    reports.len(),
                    partial
                );
                std::process::exit(2);
            }
            Ok(())
        }
        Command::Stream(args) => {
            let settings = collect::load_settings(&cli.global.config)?;
            match &args.output {
                Some(path) => {
                    let file = std::fs::File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let mut writer = std::io::BufWriter::new(file);
                    collect::stream(&settings, args, adapters, &mut writer).await?;
                }
                None => {
                    let mut writer = std::io::BufWriter::new(std::io::stdout());
                    collect::stream(&settings, args, adapters, &mut writer).await?;
                }
            }
            Ok(())
        }
        Command::Targets => {
            let settings = collect::load_settings(&cli.global.config)?;
            let mut stdout = std::io::stdout().lock();
            for (name, target) in collect::targets(&settings)? {
                writeln!(stdout, "{:<20} {}", name, target)?;
            }
            Ok(())
        }
        Command::Dialects => {
            for line in output::dialect_lines(&collect::dialects(&adapters)) {
                println!("{}", line);
            }
            Ok(())
        }
    }
}
