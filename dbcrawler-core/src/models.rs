//! Core data models for source descriptors and crawled metadata trees.
//!
//! All models are serializable. Descriptors never serialize or print their
//! password; metadata trees never contain credentials at all.

use crate::security::Credentials;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Supported relational engine families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineFamily {
    #[serde(alias = "postgres")]
    PostgreSql,
    MySql,
    Oracle,
    #[serde(alias = "mssql")]
    SqlServer,
    Sqlite,
}

impl EngineFamily {
    /// All engine families in a stable order.
    pub const ALL: [EngineFamily; 5] = [
        EngineFamily::PostgreSql,
        EngineFamily::MySql,
        EngineFamily::Oracle,
        EngineFamily::SqlServer,
        EngineFamily::Sqlite,
    ];
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineFamily::PostgreSql => write!(f, "PostgreSQL"),
            EngineFamily::MySql => write!(f, "MySQL"),
            EngineFamily::Oracle => write!(f, "Oracle"),
            EngineFamily::SqlServer => write!(f, "SQL Server"),
            EngineFamily::Sqlite => write!(f, "SQLite"),
        }
    }
}

impl std::str::FromStr for EngineFamily {
    type Err = crate::CrawlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(EngineFamily::PostgreSql),
            "mysql" | "mariadb" => Ok(EngineFamily::MySql),
            "oracle" => Ok(EngineFamily::Oracle),
            "sqlserver" | "mssql" => Ok(EngineFamily::SqlServer),
            "sqlite" => Ok(EngineFamily::Sqlite),
            other => Err(crate::CrawlerError::unsupported_dialect(
                other,
                "unknown engine family",
            )),
        }
    }
}

/// Stable identity of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub uuid::Uuid);

impl SourceId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// The all-zero id, used in tests and as a placeholder.
    pub fn nil() -> Self {
        Self(uuid::Uuid::nil())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Engine-specific connection properties in insertion order.
///
/// Serialized as a JSON object; the key order of the input document is kept,
/// which is what the dialect resolver appends to the connection target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraProperties(Vec<(String, String)>);

impl ExtraProperties {
    /// Creates an empty property list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property. Replacing an existing key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Looks up a property value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtraProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = ExtraProperties::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

impl Serialize for ExtraProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExtraProperties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ExtraProperties;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of string properties")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut props = ExtraProperties::new();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    props.insert(key, value);
                }
                Ok(props)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Connection parameters of one relational source.
///
/// Descriptors are shared as `Arc<DataSourceDescriptor>`; updating a source
/// replaces the `Arc`, so a crawl in flight keeps the descriptor it started
/// with.
#[derive(Clone, Serialize, Deserialize)]
pub struct DataSourceDescriptor {
    #[serde(default)]
    pub id: SourceId,
    pub name: String,
    pub engine: EngineFamily,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "ExtraProperties::is_empty")]
    pub extra_properties: ExtraProperties,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl DataSourceDescriptor {
    /// Creates a descriptor with a fresh id and no credentials.
    pub fn new(
        name: impl Into<String>,
        engine: EngineFamily,
        host: impl Into<String>,
        port: Option<u16>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            id: SourceId::new(),
            name: name.into(),
            engine,
            host: host.into(),
            port,
            database: database.into(),
            credentials: None,
            extra_properties: ExtraProperties::new(),
        }
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Builder method to append an extra property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_properties.insert(key, value);
        self
    }

    /// Builder method to pin the id.
    pub fn with_id(mut self, id: SourceId) -> Self {
        self.id = id;
        self
    }
}

// Credentials are intentionally omitted
impl fmt::Debug for DataSourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("extra_properties", &self.extra_properties.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DataSourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}{}/{})",
            self.name,
            self.engine,
            self.host,
            self.port.map_or_else(String::new, |p| format!(":{}", p)),
            self.database
        )
    }
}

/// Explicit per-table execution override. `Auto` defers to the decider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Auto,
    ForceFullScan,
    ForceSample,
}

/// Resolved read mode. This, never `Auto`, is what reaches the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    FullScan,
    Sample,
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMode::FullScan => write!(f, "FULL_SCAN"),
            ReadMode::Sample => write!(f, "SAMPLE"),
        }
    }
}

/// One materialized row: column name to value, in projection order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Column selection for a read plus the identifier downstream document
/// assembly uses to attribute content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub id: String,
    /// `None` selects every column in catalog order
    pub columns: Option<Vec<String>>,
}

impl Projection {
    /// Selects all columns.
    pub fn all(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            columns: None,
        }
    }

    /// Selects the given columns in the given order.
    pub fn columns<I, S>(id: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            columns: Some(columns.into_iter().map(Into::into).collect()),
        }
    }
}

/// A streamed row tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedRow {
    pub schema: String,
    pub table: String,
    pub projection_id: String,
    pub values: Row,
}

/// Kind of catalog relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

/// How a table's row count was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowCountSource {
    /// Catalog statistic, possibly stale
    Catalog,
    /// `COUNT(*)`
    Exact,
    /// Both paths failed; the count is reported as 0
    Unknown,
}

/// Step of per-table collection that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableErrorPhase {
    Columns,
    Count,
    Preview,
}

/// Error marker attached to a table whose introspection partially failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableError {
    pub phase: TableErrorPhase,
    pub message: String,
    pub timed_out: bool,
}

/// Database column information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub comment: Option<String>,
    pub ordinal_position: u32,
}

/// Bounded preview of a table's rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSample {
    pub rows: Vec<Row>,
    pub mode: ReadMode,
    pub max_rows: i64,
    pub max_value_length: i64,
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

/// Database table or view information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub kind: TableKind,
    pub comment: Option<String>,
    pub row_count: u64,
    pub row_count_source: RowCountSource,
    pub columns: Vec<ColumnMetadata>,
    pub planned_mode: Option<ReadMode>,
    pub sample: Option<TableSample>,
    pub error: Option<TableError>,
}

impl TableMetadata {
    /// Creates an entry with no columns and an unknown row count.
    pub fn new(name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            comment: None,
            row_count: 0,
            row_count_source: RowCountSource::Unknown,
            columns: Vec::new(),
            planned_mode: None,
            sample: None,
            error: None,
        }
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }
}

/// Schema (namespace) information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub name: String,
    pub remarks: Option<String>,
    pub tables: Vec<TableMetadata>,
}

/// Fully qualified reference to a table that failed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Complete metadata tree for one source at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub source_id: SourceId,
    pub engine: EngineFamily,
    pub database: String,
    pub schemas: Vec<SchemaMetadata>,
    pub collected_at: chrono::DateTime<chrono::Utc>,
    pub collection_duration_ms: u64,
    pub collector_version: String,
    pub warnings: Vec<String>,
}

impl DatabaseMetadata {
    /// Creates an empty tree stamped with the current time.
    pub fn new(source_id: SourceId, engine: EngineFamily, database: impl Into<String>) -> Self {
        Self {
            source_id,
            engine,
            database: database.into(),
            schemas: Vec::new(),
            collected_at: chrono::Utc::now(),
            collection_duration_ms: 0,
            collector_version: env!("CARGO_PKG_VERSION").to_string(),
            warnings: Vec::new(),
        }
    }

    /// Adds a warning to the collection metadata
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Total number of tables and views across all schemas
    pub fn table_count(&self) -> usize {
        self.schemas.iter().map(|s| s.tables.len()).sum()
    }

    /// Tables carrying an error marker, in tree order
    pub fn errored_tables(&self) -> Vec<TableRef> {
        self.schemas
            .iter()
            .flat_map(|schema| {
                schema
                    .tables
                    .iter()
                    .filter(|t| t.is_errored())
                    .map(|t| TableRef {
                        schema: schema.name.clone(),
                        table: t.name.clone(),
                    })
            })
            .collect()
    }

    /// Finds a table by schema and name
    pub fn table(&self, schema: &str, table: &str) -> Option<&TableMetadata> {
        self.schemas
            .iter()
            .find(|s| s.name == schema)
            .and_then(|s| s.tables.iter().find(|t| t.name == table))
    }

    /// Sorts schemas and their tables by name. Stable, so repeated runs over an
    /// unchanged source produce identical ordering.
    pub fn sort(&mut self) {
        self.schemas.sort_by(|a, b| a.name.cmp(&b.name));
        for schema in &mut self.schemas {
            schema.tables.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }
}

/// Outcome of a crawl for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum CrawlStatus {
    /// Every table collected cleanly
    Full,
    /// Tree produced but some tables carry error markers
    Partial { errored_tables: Vec<TableRef> },
    /// Collection could not start or enumeration failed
    Failed {
        phase: crate::error::CrawlPhase,
        message: String,
    },
}

impl CrawlStatus {
    /// Derives FULL or PARTIAL from a finished tree.
    pub fn from_metadata(metadata: &DatabaseMetadata) -> Self {
        let errored_tables = metadata.errored_tables();
        if errored_tables.is_empty() {
            CrawlStatus::Full
        } else {
            CrawlStatus::Partial { errored_tables }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CrawlStatus::Full => "FULL",
            CrawlStatus::Partial { .. } => "PARTIAL",
            CrawlStatus::Failed { .. } => "FAILED",
        }
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
