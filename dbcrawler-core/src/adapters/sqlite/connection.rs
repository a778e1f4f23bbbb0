//! SQLite open options.

use super::ConnectionConfig;
use crate::dialect::{Dialect, SqliteDialect};
use crate::error::CrawlerError;
use crate::models::DataSourceDescriptor;
use crate::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::str::FromStr;

/// Builds open options for the descriptor's file. Never creates the file.
///
/// # Errors
/// Returns a `Connection` error when the target does not parse
pub fn connect_options(
    descriptor: &DataSourceDescriptor,
    config: &ConnectionConfig,
) -> Result<SqliteConnectOptions> {
    let target = SqliteDialect.build_target(descriptor)?;
    let options = SqliteConnectOptions::from_str(&target).map_err(|e| {
        CrawlerError::connection_failed(
            format!("invalid SQLite target for source '{}'", descriptor.name),
            e,
        )
    })?;
    Ok(options
        .create_if_missing(false)
        .read_only(config.read_only)
        .busy_timeout(config.connect_timeout()))
}

pub(super) async fn open(
    descriptor: &DataSourceDescriptor,
    config: &ConnectionConfig,
) -> Result<SqliteConnection> {
    let options = connect_options(descriptor, config)?;
    tracing::debug!("Opening SQLite source '{}'", descriptor.name);
    SqliteConnection::connect_with(&options).await.map_err(|e| {
        CrawlerError::connection_failed(format!("opening SQLite source '{}'", descriptor.name), e)
    })
}
