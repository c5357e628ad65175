use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::error::{CacheError, CacheResult};

const DEFAULT_USER_AGENT: &str = concat!("buildcache/", env!("CARGO_PKG_VERSION"));

/// Default name of the response header carrying the CDN cache status
pub const DEFAULT_CDN_CACHE_HEADER: &str = "X-Cache";

/// Default limit on the wait between reads from the cache server
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling for a single cache entry, in bytes
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 20_000_000;

/// Credentials attached to every outgoing request
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    None,
    /// HTTP basic authentication
    Basic { username: String, password: String },
    /// Bearer token authentication
    Bearer(String),
}

impl Credentials {
    /// Build the `Authorization` header value for these credentials.
    ///
    /// The returned value is marked sensitive so it is redacted from debug output.
    pub fn authorization_header(&self) -> CacheResult<Option<HeaderValue>> {
        let raw = match self {
            Credentials::None => return Ok(None),
            Credentials::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
            Credentials::Bearer(token) => format!("Bearer {token}"),
        };

        let mut value = HeaderValue::from_str(&raw)
            .map_err(|_| CacheError::Config("credentials contain invalid characters".to_string()))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Fully resolved configuration for a cache service instance
#[derive(Debug, Clone)]
pub struct CacheServiceConfig {
    /// Base address of the cache; keys are appended as a path segment
    pub base_url: Url,

    /// Credentials attached to every request
    pub credentials: Credentials,

    /// Response header inspected for the CDN cache status
    pub cdn_cache_header: String,

    /// Artifacts larger than this are not stored
    pub max_entry_size: u64,

    /// Extra headers sent verbatim with store requests
    pub store_headers: HeaderMap,

    /// Overall timeout for a single HTTP exchange (zero disables it)
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Longest wait for the next read on a connection (zero disables it)
    pub read_timeout: Duration,

    /// How long idle pooled connections are kept
    pub pool_idle_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// Whether to honour proxy settings from the environment
    pub use_system_proxy: bool,
}

impl CacheServiceConfig {
    pub fn builder(base_url: impl AsRef<str>) -> crate::builder::CacheServiceConfigBuilder {
        crate::builder::CacheServiceConfigBuilder::new(base_url)
    }

    /// Create a configuration with defaults for everything but the base address
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            credentials: Credentials::None,
            cdn_cache_header: DEFAULT_CDN_CACHE_HEADER.to_owned(),
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            store_headers: HeaderMap::new(),
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            read_timeout: DEFAULT_READ_TIMEOUT,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            follow_redirects: true,
            use_system_proxy: true,
        }
    }

    /// Describe this configuration for the host, leaving credentials out
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let store_headers = self
            .store_headers
            .keys()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        vec![
            ("type", "Content Delivery Network (CDN)".to_string()),
            ("url", self.base_url.to_string()),
            ("cdnCacheHeader", self.cdn_cache_header.clone()),
            ("maxCacheEntrySize", self.max_entry_size.to_string()),
            ("storeHeaders", format!("[{store_headers}]")),
        ]
    }
}
