use std::fmt;

use reqwest::header::HeaderMap;
use serde::Serialize;

/// Cache status reported by the CDN in front of the cache server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CdnCacheStatus {
    /// Served from the CDN's cache
    Hit,
    /// Forwarded by the CDN to the origin
    Miss,
    /// Header absent or not recognised
    Unknown,
}

impl CdnCacheStatus {
    /// Classify a CDN cache status header value.
    ///
    /// Case-insensitive substring match; "hit" is checked before "miss".
    pub fn from_header_value(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return CdnCacheStatus::Unknown;
        };

        let value = value.to_ascii_lowercase();
        if value.contains("hit") {
            CdnCacheStatus::Hit
        } else if value.contains("miss") {
            CdnCacheStatus::Miss
        } else {
            CdnCacheStatus::Unknown
        }
    }

    /// Classify the value of `header_name` in `headers`
    pub fn from_headers(headers: &HeaderMap, header_name: &str) -> Self {
        let value = headers.get(header_name).and_then(|v| v.to_str().ok());
        Self::from_header_value(value)
    }
}

impl fmt::Display for CdnCacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdnCacheStatus::Hit => f.write_str("Hit"),
            CdnCacheStatus::Miss => f.write_str("Miss"),
            CdnCacheStatus::Unknown => f.write_str("Unknown"),
        }
    }
}
