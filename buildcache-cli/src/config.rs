use std::time::Duration;

use buildcache_engine::CacheServiceConfig;

use crate::cli::CliArgs;
use crate::error::AppError;
use crate::utils::{parse_headers, parse_size};

/// Resolve the cache service configuration from command-line arguments
pub fn service_config(args: &CliArgs) -> Result<CacheServiceConfig, AppError> {
    let mut builder = CacheServiceConfig::builder(&args.url)
        .with_cdn_cache_header(&args.cdn_header)
        .with_max_entry_size(parse_size(&args.max_entry_size)?)
        .with_store_headers(parse_headers(&args.headers)?)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_read_timeout(Duration::from_secs(args.read_timeout))
        .with_system_proxy(!args.no_proxy);

    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        builder = builder.with_basic_auth(username, password);
    }
    if let Some(token) = &args.token {
        builder = builder.with_bearer_token(token);
    }

    Ok(builder.build()?)
}
