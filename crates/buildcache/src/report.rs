//! # Metrics Reporting
//!
//! Turns a session summary into log output. The service hands the
//! summary to a [`MetricsReporter`]; the default one writes through `tracing`.

use tracing::{Level, info, trace};

use crate::metrics::{CacheAction, CacheLoadMetrics, CacheMetrics, CacheStoreMetrics};

/// Receives the session summary when the cache service closes
pub trait MetricsReporter: Send + Sync {
    fn report(&self, actions: &[CacheAction], metrics: &CacheMetrics);
}

/// Reports through `tracing`: actions at TRACE, summary lines at INFO
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl MetricsReporter for TracingReporter {
    fn report(&self, actions: &[CacheAction], metrics: &CacheMetrics) {
        if tracing::enabled!(Level::TRACE) {
            for action in actions {
                trace!("{action}");
            }
        }

        info!("{}", load_summary_line(&metrics.load));
        info!("{}", store_summary_line(&metrics.store));
    }
}

pub fn load_summary_line(load: &CacheLoadMetrics) -> String {
    let hits = &load.hit_metrics;
    format!(
        "CDN build cache load metrics: {:.1}% {} misses, {} hits ({}, {}s; CDN: {:.1}% {} hits, {} misses, {} unknown)",
        load.hit_percentage(),
        load.cache_misses,
        load.cache_hits(),
        format_byte_count(hits.bytes),
        hits.duration.as_secs(),
        load.cdn_hit_percentage(),
        hits.cdn_hits,
        hits.cdn_misses,
        hits.cdn_unknown,
    )
}

pub fn store_summary_line(store: &CacheStoreMetrics) -> String {
    format!(
        "CDN build cache store metrics: {} requests, {}, {}s; skipped too large: {} ({} bytes)",
        store.store_requests,
        format_byte_count(store.stored_bytes),
        store.store_duration.as_secs(),
        store.skipped_too_large,
        store.skipped_too_large_bytes,
    )
}

/// Format a byte count with SI units, e.g. `1.5 MB`
pub fn format_byte_count(bytes: u64) -> String {
    const UNIT: f64 = 1000.0;
    const PREFIXES: [&str; 6] = ["k", "M", "G", "T", "P", "E"];

    if bytes < 1000 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut exp = 0;
    while value >= UNIT && exp < PREFIXES.len() {
        value /= UNIT;
        exp += 1;
    }

    let mut formatted = format!("{value:.2}");
    while formatted.ends_with('0') {
        formatted.pop();
    }
    if formatted.ends_with('.') {
        formatted.pop();
    }

    format!("{formatted} {}B", PREFIXES[exp - 1])
}
