//! MySQL session setup.
//!
//! # Security Features
//! - Sets the session to read-only transactions when enabled
//! - Caps `max_execution_time` for SELECT statements
//! - Sanitizes the connection target in all error messages

use super::ConnectionConfig;
use crate::dialect::{Dialect, MySqlDialect};
use crate::error::{CrawlerError, redact_database_url};
use crate::models::DataSourceDescriptor;
use crate::Result;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::{Connection, Executor, MySqlConnection};
use std::str::FromStr;

pub(super) fn connect_options(descriptor: &DataSourceDescriptor) -> Result<MySqlConnectOptions> {
    let target = MySqlDialect.build_target(descriptor)?;
    MySqlConnectOptions::from_str(&target).map_err(|e| {
        CrawlerError::connection_failed(
            format!("invalid MySQL target {}", redact_database_url(&target)),
            e,
        )
    })
}

/// Opens one connection with session settings applied.
pub(super) async fn open(
    descriptor: &DataSourceDescriptor,
    config: &ConnectionConfig,
) -> Result<MySqlConnection> {
    let options = connect_options(descriptor)?;
    tracing::debug!(
        "Connecting to MySQL source '{}' at {}",
        descriptor.name,
        descriptor.host
    );
    let mut conn = MySqlConnection::connect_with(&options).await.map_err(|e| {
        CrawlerError::connection_failed(
            format!("connecting to MySQL source '{}'", descriptor.name),
            e,
        )
    })?;

    let timeout_ms = config.query_timeout_secs.saturating_mul(1000);
    let mut statements = vec![format!("SET SESSION max_execution_time = {}", timeout_ms)];
    if config.read_only {
        statements.push("SET SESSION TRANSACTION READ ONLY".to_string());
    }
    for statement in statements {
        // MariaDB has no max_execution_time; a failed setting is not fatal
        if let Err(e) = conn.execute(statement.as_str()).await {
            tracing::debug!("Session setting skipped for '{}': {}", descriptor.name, e);
        }
    }

    Ok(conn)
}
