//! # Cache Metrics
//!
//! Every load and store produces exactly one [`CacheAction`], appended to the
//! [`MetricsTracker`] log. Summaries are a pure fold over a snapshot of that
//! log, so concurrent callers never update shared counters directly.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use url::Url;

use crate::cdn::CdnCacheStatus;

/// Outcome of a single load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Entry found and delivered to the consumer
    Hit {
        bytes: u64,
        duration: Duration,
        cdn_status: CdnCacheStatus,
    },
    /// Entry not present remotely
    Miss { message: String },
    /// The exchange failed
    Failure { root_cause: String },
}

/// Outcome of a single store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Entry uploaded
    Success { bytes: u64, duration: Duration },
    /// Entry exceeded the configured ceiling and was skipped
    TooLarge { declared_size: u64 },
    /// The exchange failed
    Failure { root_cause: String },
}

/// A recorded load or store against one locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheAction {
    Load { url: Url, outcome: LoadOutcome },
    Store { url: Url, outcome: StoreOutcome },
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheAction::Load { url, outcome } => match outcome {
                LoadOutcome::Hit {
                    bytes,
                    duration,
                    cdn_status,
                } => write!(
                    f,
                    "load {url}: hit, {bytes} bytes in {duration:?} (CDN: {cdn_status})"
                ),
                LoadOutcome::Miss { message } => write!(f, "load {url}: miss ({message})"),
                LoadOutcome::Failure { root_cause } => {
                    write!(f, "load {url}: failed ({root_cause})")
                }
            },
            CacheAction::Store { url, outcome } => match outcome {
                StoreOutcome::Success { bytes, duration } => {
                    write!(f, "store {url}: stored {bytes} bytes in {duration:?}")
                }
                StoreOutcome::TooLarge { declared_size } => {
                    write!(f, "store {url}: skipped, too large ({declared_size} bytes)")
                }
                StoreOutcome::Failure { root_cause } => {
                    write!(f, "store {url}: failed ({root_cause})")
                }
            },
        }
    }
}

/// Append-only log of cache actions
#[derive(Debug, Default)]
pub struct MetricsTracker {
    actions: Mutex<Vec<CacheAction>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, action: CacheAction) {
        self.actions.lock().push(action);
    }

    /// Snapshot of all actions recorded so far, in recording order
    pub fn actions(&self) -> Vec<CacheAction> {
        self.actions.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summarize a consistent snapshot of the log
    pub fn summarize(&self) -> CacheMetrics {
        CacheMetrics::from_actions(&self.actions())
    }
}

/// Aggregated session metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub load: CacheLoadMetrics,
    pub store: CacheStoreMetrics,
}

/// Aggregated load metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheLoadMetrics {
    pub cache_misses: u64,
    /// Failed loads; not part of `load_requests`
    pub failures: u64,
    pub hit_metrics: CacheHitMetrics,
}

/// Aggregated metrics over load hits
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheHitMetrics {
    pub bytes: u64,
    pub duration: Duration,
    pub cdn_hits: u64,
    pub cdn_misses: u64,
    pub cdn_unknown: u64,
}

/// Aggregated store metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStoreMetrics {
    pub store_requests: u64,
    pub stored_bytes: u64,
    pub store_duration: Duration,
    pub skipped_too_large: u64,
    pub skipped_too_large_bytes: u64,
    /// Failed stores; not part of `store_requests`
    pub failures: u64,
}

impl CacheHitMetrics {
    pub fn hits(&self) -> u64 {
        self.cdn_hits + self.cdn_misses + self.cdn_unknown
    }
}

impl CacheLoadMetrics {
    pub fn cache_hits(&self) -> u64 {
        self.hit_metrics.hits()
    }

    pub fn load_requests(&self) -> u64 {
        self.cache_hits() + self.cache_misses
    }

    /// Percentage of load requests that were hits; 0.0 without requests
    pub fn hit_percentage(&self) -> f64 {
        percentage(self.cache_hits(), self.load_requests())
    }

    /// Percentage of hits served by the CDN; 0.0 without hits
    pub fn cdn_hit_percentage(&self) -> f64 {
        percentage(self.hit_metrics.cdn_hits, self.cache_hits())
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl CacheMetrics {
    /// Fold a sequence of actions into a summary
    pub fn from_actions<'a>(actions: impl IntoIterator<Item = &'a CacheAction>) -> Self {
        actions
            .into_iter()
            .fold(CacheMetrics::default(), |mut acc, action| {
                match action {
                    CacheAction::Load { outcome, .. } => match outcome {
                        LoadOutcome::Hit {
                            bytes,
                            duration,
                            cdn_status,
                        } => {
                            let hits = &mut acc.load.hit_metrics;
                            hits.bytes += bytes;
                            hits.duration += *duration;
                            match cdn_status {
                                CdnCacheStatus::Hit => hits.cdn_hits += 1,
                                CdnCacheStatus::Miss => hits.cdn_misses += 1,
                                CdnCacheStatus::Unknown => hits.cdn_unknown += 1,
                            }
                        }
                        LoadOutcome::Miss { .. } => acc.load.cache_misses += 1,
                        LoadOutcome::Failure { .. } => acc.load.failures += 1,
                    },
                    CacheAction::Store { outcome, .. } => match outcome {
                        StoreOutcome::Success { bytes, duration } => {
                            acc.store.store_requests += 1;
                            acc.store.stored_bytes += bytes;
                            acc.store.store_duration += *duration;
                        }
                        StoreOutcome::TooLarge { declared_size } => {
                            acc.store.skipped_too_large += 1;
                            acc.store.skipped_too_large_bytes += declared_size;
                        }
                        StoreOutcome::Failure { .. } => acc.store.failures += 1,
                    },
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn url(key: &str) -> Url {
        Url::parse(&format!("https://cache.example.com/{key}")).unwrap()
    }

    fn hit(bytes: u64, millis: u64, cdn_status: CdnCacheStatus) -> CacheAction {
        CacheAction::Load {
            url: url("hit"),
            outcome: LoadOutcome::Hit {
                bytes,
                duration: Duration::from_millis(millis),
                cdn_status,
            },
        }
    }

    fn miss() -> CacheAction {
        CacheAction::Load {
            url: url("miss"),
            outcome: LoadOutcome::Miss {
                message: "404 Not Found".to_string(),
            },
        }
    }

    fn stored(bytes: u64) -> CacheAction {
        CacheAction::Store {
            url: url("store"),
            outcome: StoreOutcome::Success {
                bytes,
                duration: Duration::from_millis(10),
            },
        }
    }

    #[test]
    fn test_empty_summary() {
        let metrics = MetricsTracker::new().summarize();
        assert_eq!(metrics, CacheMetrics::default());
        assert_eq!(metrics.load.load_requests(), 0);
        assert_eq!(metrics.load.hit_percentage(), 0.0);
        assert_eq!(metrics.load.cdn_hit_percentage(), 0.0);
    }

    #[test]
    fn test_summary_counts() {
        let tracker = MetricsTracker::new();
        tracker.record(hit(100, 1000, CdnCacheStatus::Hit));
        tracker.record(hit(50, 500, CdnCacheStatus::Miss));
        tracker.record(hit(25, 250, CdnCacheStatus::Unknown));
        tracker.record(hit(25, 250, CdnCacheStatus::Hit));
        tracker.record(miss());
        tracker.record(CacheAction::Load {
            url: url("failed"),
            outcome: LoadOutcome::Failure {
                root_cause: "connection reset".to_string(),
            },
        });
        tracker.record(stored(40));
        tracker.record(stored(60));
        tracker.record(CacheAction::Store {
            url: url("big"),
            outcome: StoreOutcome::TooLarge { declared_size: 500 },
        });
        tracker.record(CacheAction::Store {
            url: url("broken"),
            outcome: StoreOutcome::Failure {
                root_cause: "503".to_string(),
            },
        });

        let metrics = tracker.summarize();
        let load = &metrics.load;
        assert_eq!(load.cache_hits(), 4);
        assert_eq!(load.cache_misses, 1);
        assert_eq!(load.failures, 1);
        assert_eq!(load.load_requests(), load.cache_hits() + load.cache_misses);
        assert_eq!(
            load.cache_hits(),
            load.hit_metrics.cdn_hits + load.hit_metrics.cdn_misses + load.hit_metrics.cdn_unknown
        );
        assert_eq!(load.hit_metrics.bytes, 200);
        assert_eq!(load.hit_metrics.duration, Duration::from_millis(2000));
        assert_eq!(load.hit_percentage(), 80.0);
        assert_eq!(load.cdn_hit_percentage(), 50.0);

        let store = &metrics.store;
        assert_eq!(store.store_requests, 2);
        assert_eq!(store.stored_bytes, 100);
        assert_eq!(store.store_duration, Duration::from_millis(20));
        assert_eq!(store.skipped_too_large, 1);
        assert_eq!(store.skipped_too_large_bytes, 500);
        assert_eq!(store.failures, 1);
    }

    #[test]
    fn test_hit_percentage_bounds() {
        let tracker = MetricsTracker::new();
        tracker.record(miss());
        let metrics = tracker.summarize();
        assert_eq!(metrics.load.hit_percentage(), 0.0);
        assert_eq!(metrics.load.cdn_hit_percentage(), 0.0);

        tracker.record(hit(1, 1, CdnCacheStatus::Hit));
        let pct = tracker.summarize().load.hit_percentage();
        assert!((0.0..=100.0).contains(&pct));
        assert_eq!(pct, 50.0);
    }

    #[test]
    fn test_actions_snapshot_preserves_order() {
        let tracker = MetricsTracker::new();
        tracker.record(miss());
        tracker.record(stored(1));
        let actions = tracker.actions();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], CacheAction::Load { .. }));
        assert!(matches!(actions[1], CacheAction::Store { .. }));

        // A later append does not change an earlier snapshot
        tracker.record(stored(2));
        assert_eq!(actions.len(), 2);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_concurrent_records() {
        for n in [1usize, 10, 100] {
            let tracker = Arc::new(MetricsTracker::new());
            let handles = (0..n)
                .map(|i| {
                    let tracker = Arc::clone(&tracker);
                    std::thread::spawn(move || {
                        tracker.record(stored(i as u64));
                        // Summaries may run while others append
                        tracker.summarize();
                    })
                })
                .collect::<Vec<_>>();
            for handle in handles {
                handle.join().unwrap();
            }

            let metrics = tracker.summarize();
            assert_eq!(metrics.store.store_requests, n as u64);
            assert_eq!(
                metrics.store.stored_bytes,
                (0..n as u64).sum::<u64>(),
                "n = {n}"
            );
        }
    }

    #[test]
    fn test_action_display() {
        let line = hit(10, 1500, CdnCacheStatus::Hit).to_string();
        assert_eq!(
            line,
            "load https://cache.example.com/hit: hit, 10 bytes in 1.5s (CDN: Hit)"
        );
        let line = CacheAction::Store {
            url: url("big"),
            outcome: StoreOutcome::TooLarge { declared_size: 7 },
        }
        .to_string();
        assert_eq!(
            line,
            "store https://cache.example.com/big: skipped, too large (7 bytes)"
        );
    }

    #[test]
    fn test_metrics_serialize() {
        let tracker = MetricsTracker::new();
        tracker.record(stored(5));
        let json = serde_json::to_value(tracker.summarize()).unwrap();
        assert_eq!(json["store"]["store_requests"], 1);
        assert_eq!(json["store"]["stored_bytes"], 5);
    }
}
