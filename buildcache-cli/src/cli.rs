use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Debug, Parser)]
#[command(
    version,
    about = "Remote build cache client",
    long_about = "Loads and stores build cache entries on an HTTP build cache fronted by a CDN.\n\
                  \n\
                  Each invocation performs one load or store, then prints the session's\n\
                  cache metrics. Entries above the maximum entry size are skipped."
)]
pub struct CliArgs {
    /// Base URL of the remote cache
    #[arg(
        long,
        env = "BUILDCACHE_URL",
        help = "Base URL of the remote cache, e.g. https://cache.example.com/cache/"
    )]
    pub url: String,

    /// Username for basic authentication
    #[arg(long, env = "BUILDCACHE_USERNAME", requires = "password")]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(
        long,
        env = "BUILDCACHE_PASSWORD",
        requires = "username",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Bearer token
    #[arg(
        long,
        env = "BUILDCACHE_TOKEN",
        hide_env_values = true,
        help = "Bearer token (cannot be combined with --username/--password)"
    )]
    pub token: Option<String>,

    /// Response header carrying the CDN cache status
    #[arg(long, default_value = "X-Cache")]
    pub cdn_header: String,

    /// Maximum entry size with optional unit (B, KB, MB, GB, TB)
    #[arg(
        long,
        default_value = "20000000",
        help = "Largest entry that will be stored, with optional unit (B, KB, MB, GB, TB). Examples: \"20MB\", \"500KB\""
    )]
    pub max_entry_size: String,

    /// Extra headers sent with every store request
    #[arg(
        short = 'H',
        long = "header",
        help = "Header sent with store requests in format 'Name: Value'. Can be specified multiple times."
    )]
    pub headers: Vec<String>,

    /// Overall request timeout in seconds
    #[arg(long, default_value = "0", help = "Overall request timeout in seconds (0 = no timeout)")]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,

    /// Read timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Longest wait for data from the cache server in seconds (0 = no timeout)"
    )]
    pub read_timeout: u64,

    /// Ignore proxy settings from the environment
    #[arg(long)]
    pub no_proxy: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Log every recorded cache action
    #[arg(long, help = "Log every load and store recorded during the session")]
    pub trace: bool,

    /// Print metrics as JSON on close
    #[arg(long, help = "Print the session metrics as JSON to stdout")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load an entry into a file. Exits with code 2 on a cache miss.
    Get {
        /// Cache key
        key: String,

        /// Destination file
        output: PathBuf,
    },

    /// Store a file as a cache entry and print its key
    Put {
        /// File to store
        input: PathBuf,

        /// Cache key; defaults to the SHA-256 of the file contents
        #[arg(short, long)]
        key: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get() {
        let args = CliArgs::try_parse_from([
            "buildcache",
            "--url",
            "https://cache.example.com/",
            "-H",
            "x-a: 1",
            "-H",
            "x-b: 2",
            "get",
            "abc",
            "out.bin",
        ])
        .unwrap();
        assert_eq!(args.url, "https://cache.example.com/");
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.cdn_header, "X-Cache");
        match args.command {
            Command::Get { key, output } => {
                assert_eq!(key, "abc");
                assert_eq!(output, PathBuf::from("out.bin"));
            }
            other => panic!("expected get, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_put_with_key() {
        let args = CliArgs::try_parse_from([
            "buildcache",
            "--url",
            "https://cache.example.com/",
            "--json",
            "put",
            "artifact.bin",
            "--key",
            "k1",
        ])
        .unwrap();
        assert!(args.json);
        match args.command {
            Command::Put { input, key } => {
                assert_eq!(input, PathBuf::from("artifact.bin"));
                assert_eq!(key.as_deref(), Some("k1"));
            }
            other => panic!("expected put, got {other:?}"),
        }
    }

    #[test]
    fn test_username_requires_password() {
        let result = CliArgs::try_parse_from([
            "buildcache",
            "--url",
            "https://cache.example.com/",
            "--username",
            "user",
            "get",
            "abc",
            "out.bin",
        ]);
        assert!(result.is_err());
    }
}
