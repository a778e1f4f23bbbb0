//! SQL dialects and connection target resolution.
//!
//! A [`Dialect`] knows how one engine family spells a connection target, how
//! it quotes identifiers, and how it phrases full scans, counts and samples.
//! Dialects are pure: nothing here performs I/O. The registry is a closed
//! table keyed by [`EngineFamily`]; an engine without an entry is rejected
//! with [`CrawlerError::UnsupportedDialect`] before any connection attempt.
//!
//! # Example
//! ```rust
//! use dbcrawler_core::dialect::build_connection_target;
//! use dbcrawler_core::models::{DataSourceDescriptor, EngineFamily};
//!
//! let source = DataSourceDescriptor::new("crm", EngineFamily::MySql, "db", None, "crm")
//!     .with_property("a", "1")
//!     .with_property("b", "2");
//! let target = build_connection_target(&source).unwrap();
//! assert_eq!(target, "mysql://db:3306/crm?a=1&b=2");
//! ```

mod mysql;
mod oracle;
mod postgres;
mod sqlite;
mod sqlserver;

pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::error::CrawlerError;
use crate::models::{DataSourceDescriptor, EngineFamily, ExtraProperties, Projection};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Seed used for every repeatable native sample.
pub const SAMPLE_SEED: u32 = 7;

/// Oversampling factor applied when converting a row budget to a percentage.
pub const OVERSAMPLE_FACTOR: u64 = 2;

/// Where the database name goes in a connection target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DatabasePlacement {
    /// `scheme://host:port/<database>`
    PathSegment,
    /// `...;<name>=<database>`
    NamedParameter(&'static str),
    /// `scheme:<database>` where the database is a file path
    FilePath,
}

/// How an engine family spells its connection target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetSyntax {
    pub scheme: &'static str,
    pub default_port: Option<u16>,
    pub placement: DatabasePlacement,
    /// Delimiter before the first property
    pub open: char,
    /// Delimiter between subsequent properties
    pub separator: char,
}

/// How a sample plan selects rows, and what bias that implies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleStrategy {
    /// Engine-native block sampling with a fixed seed. Repeatable while the
    /// table is unchanged; whole pages are kept or skipped, so rows that are
    /// physically clustered tend to appear together.
    NativeBlock { percent: f64, seed: u32 },
    /// Every `stride`-th rowid. Repeatable; biased toward the rowid
    /// allocation pattern and skewed by deletes.
    RowStride { stride: u64 },
    /// First `n` rows in cursor order. Repeatable in practice but heavily
    /// biased toward whatever the engine returns first.
    RowLimit,
}

/// A dialect-specific sampling query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplePlan {
    pub sql: String,
    pub strategy: SampleStrategy,
    /// Hard cap the producer applies on top of the SQL
    pub max_rows: u64,
}

/// SQL phrasing and target syntax for one engine family.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Engine family this dialect speaks for.
    fn engine(&self) -> EngineFamily;

    /// Connection target syntax.
    fn syntax(&self) -> TargetSyntax;

    /// Builds the connection target for a descriptor.
    ///
    /// # Errors
    /// Returns a configuration error when the host cannot form a valid target
    fn build_target(&self, descriptor: &DataSourceDescriptor) -> crate::Result<String> {
        let syntax = self.syntax();
        let base = url_base(&syntax, descriptor)?;
        Ok(append_properties(
            base,
            &descriptor.extra_properties,
            syntax.open,
            syntax.separator,
            encode_query_value,
        ))
    }

    /// Quotes one identifier.
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Schema-qualified, quoted table name.
    fn qualified_name(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    /// Select list for a projection, `*` when no columns are given.
    fn select_list(&self, projection: &Projection) -> String {
        match &projection.columns {
            Some(columns) if !columns.is_empty() => columns
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "*".to_string(),
        }
    }

    /// Forward-only full scan in cursor order.
    fn full_scan_sql(&self, schema: &str, table: &str, projection: &Projection) -> String {
        format!(
            "SELECT {} FROM {}",
            self.select_list(projection),
            self.qualified_name(schema, table)
        )
    }

    /// Exact row count.
    fn count_sql(&self, schema: &str, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.qualified_name(schema, table))
    }

    /// Deterministic sample of at most `max_rows` rows.
    ///
    /// `row_hint` should only be given for base tables; without it every
    /// dialect falls back to a plain row limit.
    fn sample_plan(
        &self,
        schema: &str,
        table: &str,
        projection: &Projection,
        max_rows: u64,
        row_hint: Option<u64>,
    ) -> SamplePlan;
}

/// Sampling percentage for a row budget: `n * 2 * 100 / hint` rounded up to
/// two decimals and clamped to `[0.01, 100]`. `None` when no sampling clause
/// is worthwhile (no hint, empty table, or the whole table would be read).
pub fn sample_percent(max_rows: u64, row_hint: Option<u64>) -> Option<f64> {
    let hint = row_hint.filter(|h| *h > 0)?;
    let wanted = u128::from(max_rows)
        .saturating_mul(u128::from(OVERSAMPLE_FACTOR))
        .saturating_mul(100 * 100);
    let hundredths = wanted.div_ceil(u128::from(hint)).clamp(1, 100 * 100);
    if hundredths >= 100 * 100 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let percent = hundredths as f64 / 100.0;
    Some(percent)
}

/// Renders a percentage the way every dialect prints it.
pub(crate) fn format_percent(percent: f64) -> String {
    format!("{:.2}", percent)
}

/// Builds `scheme://[user[:password]@]host:port/database` with userinfo and
/// path percent-encoded.
pub(crate) fn url_base(
    syntax: &TargetSyntax,
    descriptor: &DataSourceDescriptor,
) -> crate::Result<String> {
    let host = if descriptor.host.contains(':') && !descriptor.host.starts_with('[') {
        format!("[{}]", descriptor.host)
    } else {
        descriptor.host.clone()
    };
    let port = descriptor.port.or(syntax.default_port);
    let authority = match port {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    };

    let mut url = Url::parse(&format!("{}://{}/", syntax.scheme, authority)).map_err(|e| {
        CrawlerError::configuration(format!(
            "source '{}': invalid host for {} target: {}",
            descriptor.name, descriptor.engine, e
        ))
    })?;

    if let Some(credentials) = &descriptor.credentials {
        url.set_username(credentials.username()).map_err(|()| {
            CrawlerError::configuration(format!(
                "source '{}': target cannot carry credentials",
                descriptor.name
            ))
        })?;
        url.set_password(credentials.password()).map_err(|()| {
            CrawlerError::configuration(format!(
                "source '{}': target cannot carry credentials",
                descriptor.name
            ))
        })?;
    }

    if syntax.placement == DatabasePlacement::PathSegment {
        url.path_segments_mut()
            .map_err(|()| {
                CrawlerError::configuration(format!(
                    "source '{}': target has no path",
                    descriptor.name
                ))
            })?
            .clear()
            .push(&descriptor.database);
    }

    Ok(url.to_string())
}

/// Appends properties in insertion order. The first one uses `open` unless
/// the base already contains it.
pub(crate) fn append_properties(
    mut target: String,
    properties: &ExtraProperties,
    open: char,
    separator: char,
    encode: fn(&str) -> String,
) -> String {
    for (key, value) in properties.iter() {
        target.push(if target.contains(open) { separator } else { open });
        target.push_str(key);
        target.push('=');
        target.push_str(&encode(value));
    }
    target
}

pub(crate) fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Closed table of dialects keyed by engine family.
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    dialects: HashMap<EngineFamily, Arc<dyn Dialect>>,
}

impl DialectRegistry {
    /// Empty registry; every lookup fails.
    pub fn empty() -> Self {
        Self {
            dialects: HashMap::new(),
        }
    }

    /// Registry with every built-in dialect.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(MySqlDialect));
        registry.register(Arc::new(PostgresDialect));
        registry.register(Arc::new(OracleDialect));
        registry.register(Arc::new(SqlServerDialect));
        registry.register(Arc::new(SqliteDialect));
        registry
    }

    /// Adds or replaces the dialect for its engine family.
    pub fn register(&mut self, dialect: Arc<dyn Dialect>) {
        self.dialects.insert(dialect.engine(), dialect);
    }

    /// Looks up the dialect for an engine family.
    ///
    /// # Errors
    /// Returns `UnsupportedDialect` when no dialect is registered
    pub fn resolve(&self, engine: EngineFamily) -> crate::Result<Arc<dyn Dialect>> {
        self.dialects.get(&engine).cloned().ok_or_else(|| {
            CrawlerError::unsupported_dialect(engine, "no dialect registered for engine")
        })
    }

    /// Registered engine families in stable order.
    pub fn engines(&self) -> Vec<EngineFamily> {
        let mut engines: Vec<_> = self.dialects.keys().copied().collect();
        engines.sort();
        engines
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Builds the connection target for a descriptor using the standard dialects.
///
/// The result contains the password when one is set. Log it only through
/// [`redact_database_url`](crate::error::redact_database_url).
///
/// # Errors
/// Returns `UnsupportedDialect` or a configuration error; never performs I/O
pub fn build_connection_target(descriptor: &DataSourceDescriptor) -> crate::Result<String> {
    crate::validation::validate_descriptor(descriptor)?;
    DialectRegistry::standard()
        .resolve(descriptor.engine)?
        .build_target(descriptor)
}

/// Connection target with credentials masked, safe for logs and output.
///
/// # Errors
/// Same as [`build_connection_target`]
pub fn redacted_target(descriptor: &DataSourceDescriptor) -> crate::Result<String> {
    build_connection_target(descriptor).map(|t| crate::error::redact_database_url(&t))
}
