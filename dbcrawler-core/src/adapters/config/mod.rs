//! Configuration types for the crawler and its adapters.
//!
//! - `ConnectionConfig`: per-connection timeouts and session settings
//! - `SamplingConfig`: sample size and preview bounds
//! - `CrawlConfig`: decider threshold, concurrency, streaming and filters
//! - `CrawlerSettings`: the on-disk settings document (sources + crawl)
//!
//! # Security
//! None of these structs store passwords. Credentials live on the
//! [`DataSourceDescriptor`](crate::models::DataSourceDescriptor) and are never
//! serialized back out.

mod connection;
mod crawl;
mod sampling;
mod settings;

pub use connection::ConnectionConfig;
pub use crawl::CrawlConfig;
pub use sampling::SamplingConfig;
pub use settings::CrawlerSettings;
