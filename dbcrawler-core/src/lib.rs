//! Database metadata crawler.
//!
//! Connects to relational sources, walks schema -> table -> column catalogs,
//! decides per table whether to scan fully or sample, and streams rows under
//! bounded memory and time budgets.
//!
//! # Security Guarantees
//! - Credentials are zeroized on drop and never printed or logged
//! - All sessions are opened read-only where the engine supports it
//! - Connection targets are redacted in every error and log line
//!
//! # Architecture
//! - [`dialect`]: connection targets and SQL phrasing per engine family
//! - [`adapters`]: feature-gated drivers behind object-safe traits
//! - [`collector`]: one-connection metadata walk with per-table error capture
//! - [`mode`] and [`trim`]: pure read-mode and value-trimming rules
//! - [`reader`]: backpressured row streaming with exactly-once release
//! - [`crawler`] and [`snapshot`]: concurrent crawls and atomic publication

pub mod adapters;
pub mod collector;
pub mod crawler;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod mode;
pub mod models;
pub mod reader;
pub mod security;
pub mod snapshot;
pub mod sources;
pub mod trim;
pub mod validation;

// Re-export commonly used types
pub use adapters::{
    AdapterRegistry, ConnectionConfig, CrawlConfig, CrawlerSettings, DatabaseAdapter,
    ResourceLedger, SamplingConfig, SourceConnection,
};
pub use collector::MetadataCollector;
pub use crawler::{CrawlReport, Crawler};
pub use dialect::{DialectRegistry, build_connection_target, redacted_target};
pub use error::{CrawlPhase, CrawlerError, Result, SourceFailure};
pub use models::{
    CrawlStatus, DataSourceDescriptor, DatabaseMetadata, EngineFamily, ExecutionMode, Projection,
    ReadMode, Row, SourceId, TableMetadata, TaggedRow,
};
pub use reader::{ReadRequest, StreamReader, StreamSummary, StreamingSession};
pub use snapshot::{MetadataSnapshot, SnapshotStore};
pub use sources::SourceCatalog;
