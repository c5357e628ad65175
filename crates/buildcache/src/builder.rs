//! # Builder for CacheServiceConfig
//!
//! Fluent construction and validation of a resolved cache configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use buildcache_engine::CacheServiceConfig;
//!
//! let config = CacheServiceConfig::builder("https://cache.example.com/gradle/")
//!     .with_bearer_token("my-token")
//!     .with_max_entry_size(50_000_000)
//!     .with_store_header("x-amz-storage-class", "STANDARD_IA")
//!     .with_timeout(Duration::from_secs(60))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.cdn_cache_header, "X-Cache");
//! ```

use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

use crate::config::{CacheServiceConfig, Credentials};
use crate::error::{CacheError, CacheResult};

/// Builder for creating CacheServiceConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct CacheServiceConfigBuilder {
    base_url: String,
    basic: Option<(String, String)>,
    bearer_token: Option<String>,
    cdn_cache_header: Option<String>,
    max_entry_size: Option<u64>,
    store_headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
    user_agent: Option<String>,
    follow_redirects: Option<bool>,
    use_system_proxy: Option<bool>,
}

impl CacheServiceConfigBuilder {
    /// Create a new builder for the given cache base address
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().to_owned(),
            basic: None,
            bearer_token: None,
            cdn_cache_header: None,
            max_entry_size: None,
            store_headers: Vec::new(),
            timeout: None,
            connect_timeout: None,
            read_timeout: None,
            pool_idle_timeout: None,
            user_agent: None,
            follow_redirects: None,
            use_system_proxy: None,
        }
    }

    /// Use HTTP basic authentication
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.basic = Some((username.into(), password.into()));
        self
    }

    /// Use a bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the response header inspected for the CDN cache status
    pub fn with_cdn_cache_header(mut self, header: impl Into<String>) -> Self {
        self.cdn_cache_header = Some(header.into());
        self
    }

    /// Set the maximum size of a stored entry, in bytes
    pub fn with_max_entry_size(mut self, bytes: u64) -> Self {
        self.max_entry_size = Some(bytes);
        self
    }

    /// Add a header sent with every store request
    pub fn with_store_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.store_headers.push((name.into(), value.into()));
        self
    }

    /// Add several store headers
    pub fn with_store_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.store_headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the overall timeout for a single HTTP exchange
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the longest wait for the next read on a connection
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set how long idle pooled connections are kept
    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    /// Set whether to use proxy settings from the environment
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        self.use_system_proxy = Some(use_system_proxy);
        self
    }

    /// Validate and build the CacheServiceConfig instance
    pub fn build(self) -> CacheResult<CacheServiceConfig> {
        let base_url = parse_base_url(&self.base_url)?;
        let mut config = CacheServiceConfig::new(base_url);

        config.credentials = match (self.basic, self.bearer_token) {
            (Some(_), Some(_)) => {
                return Err(CacheError::Config(
                    "basic credentials and a bearer token are mutually exclusive".to_string(),
                ));
            }
            (Some((username, password)), None) => Credentials::Basic { username, password },
            (None, Some(token)) => Credentials::Bearer(token),
            (None, None) => Credentials::None,
        };
        // Fail early rather than on the first request
        config.credentials.authorization_header()?;

        if let Some(header) = self.cdn_cache_header {
            HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
                CacheError::Config(format!("invalid CDN cache header name: '{header}'"))
            })?;
            config.cdn_cache_header = header;
        }

        if let Some(max_entry_size) = self.max_entry_size {
            config.max_entry_size = max_entry_size;
        }

        for (name, value) in self.store_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CacheError::Config(format!("invalid store header name: '{name}'")))?;
            let header_value = HeaderValue::from_str(&value).map_err(|_| {
                CacheError::Config(format!("invalid value for store header '{name}'"))
            })?;
            config.store_headers.append(header_name, header_value);
        }

        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(timeout) = self.read_timeout {
            config.read_timeout = timeout;
        }
        if let Some(timeout) = self.pool_idle_timeout {
            config.pool_idle_timeout = timeout;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(follow) = self.follow_redirects {
            config.follow_redirects = follow;
        }
        if let Some(use_system_proxy) = self.use_system_proxy {
            config.use_system_proxy = use_system_proxy;
        }

        Ok(config)
    }
}

fn parse_base_url(raw: &str) -> CacheResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| CacheError::InvalidUrl(format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CacheError::InvalidUrl(format!(
            "{raw}: unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() {
        return Err(CacheError::InvalidUrl(format!(
            "{raw}: cannot carry path segments"
        )));
    }

    Ok(url)
}
