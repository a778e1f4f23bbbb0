//! PostgreSQL session setup.
//!
//! # Security Features
//! - Sets `statement_timeout` for query safety
//! - Sets `default_transaction_read_only` when read-only mode is enabled
//! - Sanitizes the connection target in all error messages

use super::ConnectionConfig;
use crate::dialect::{Dialect, PostgresDialect};
use crate::error::{CrawlerError, redact_database_url};
use crate::models::DataSourceDescriptor;
use crate::Result;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::str::FromStr;

/// Builds connect options: target from the descriptor, session settings
/// from the config.
pub(super) fn connect_options(
    descriptor: &DataSourceDescriptor,
    config: &ConnectionConfig,
) -> Result<PgConnectOptions> {
    let target = PostgresDialect.build_target(descriptor)?;
    let options = PgConnectOptions::from_str(&target).map_err(|e| {
        CrawlerError::connection_failed(
            format!("invalid PostgreSQL target {}", redact_database_url(&target)),
            e,
        )
    })?;

    let mut session = vec![(
        "statement_timeout",
        format!("{}s", config.query_timeout_secs),
    )];
    if config.read_only {
        session.push(("default_transaction_read_only", "on".to_string()));
    }

    Ok(options
        .application_name(&config.application_name)
        .options(session))
}

/// Opens one connection with session settings applied.
pub(super) async fn open(
    descriptor: &DataSourceDescriptor,
    config: &ConnectionConfig,
) -> Result<PgConnection> {
    let options = connect_options(descriptor, config)?;
    tracing::debug!(
        "Connecting to PostgreSQL source '{}' at {}:{}",
        descriptor.name,
        descriptor.host,
        options.get_port()
    );
    PgConnection::connect_with(&options).await.map_err(|e| {
        CrawlerError::connection_failed(
            format!("connecting to PostgreSQL source '{}'", descriptor.name),
            e,
        )
    })
}
