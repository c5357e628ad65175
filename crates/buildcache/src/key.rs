//! # Cache Keys
//!
//! Keys are opaque, content-derived identifiers. The only thing the
//! engine does with a key is turn it into a locator under the base URL.

use std::fmt;
use std::io;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

use crate::error::{CacheError, CacheResult};

/// Cache key identifying a build artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a new cache key
    pub fn new(key: impl Into<String>) -> CacheResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(CacheError::InvalidKey("key must not be empty".to_string()));
        }
        if is_dot_segment(&key) {
            return Err(CacheError::InvalidKey(format!(
                "'{key}' does not address an entry"
            )));
        }
        Ok(Self(key))
    }

    /// Derive a key from artifact content (hex SHA-256)
    pub fn from_content(content: &[u8]) -> Self {
        let hash = Sha256::digest(content);
        Self(format!("{hash:x}"))
    }

    /// Derive a key from content read to the end of `reader`, without buffering it whole
    pub async fn from_reader<R: AsyncRead + Unpin>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the locator for this key under `base`.
    ///
    /// The key becomes a single percent-encoded path segment. An empty
    /// trailing segment (base ending in `/`) is replaced rather than kept.
    pub fn locator(&self, base: &Url) -> CacheResult<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::InvalidUrl(format!("{base}: cannot carry path segments")))?
            .pop_if_empty()
            .push(&self.0);
        Ok(url)
    }
}

/// Segments the URL path parser resolves away instead of appending
fn is_dot_segment(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "." | ".." | "%2e" | ".%2e" | "%2e." | "%2e%2e"
    )
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
