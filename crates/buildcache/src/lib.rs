//! # Buildcache Engine
//!
//! A client for remote build caches served over plain HTTP and fronted
//! by a CDN. Entries are addressed by opaque keys and moved with a single
//! `GET` or `PUT` each.
//!
//! ## Features
//!
//! - Streaming uploads and downloads with byte counting
//! - Basic or bearer authentication
//! - CDN hit/miss classification from a configurable response header
//! - Size ceiling for stored entries
//! - Per-session load/store metrics with a pluggable reporter

pub mod builder;
pub mod bytes_stream;
pub mod cdn;
pub mod config;
pub mod counting;
pub mod entry;
pub mod error;
pub mod key;
pub mod metrics;
pub mod report;
pub mod service;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use builder::CacheServiceConfigBuilder;
pub use cdn::CdnCacheStatus;
pub use config::{CacheServiceConfig, Credentials};
pub use counting::CountingReader;
pub use entry::{
    ArtifactReader, ArtifactWriter, BytesArtifact, FileArtifactReader, FileArtifactWriter,
};
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use metrics::{
    CacheAction, CacheHitMetrics, CacheLoadMetrics, CacheMetrics, CacheStoreMetrics, LoadOutcome,
    MetricsTracker, StoreOutcome,
};
pub use report::{MetricsReporter, TracingReporter};
pub use service::{BUILD_CACHE_CONTENT_TYPE, CdnCacheService};
pub use transport::{CacheRequest, CacheResponse, CacheTransport, HttpTransport, create_client};
