use buildcache_engine::{
    ArtifactWriter, CacheKey, CdnCacheService, FileArtifactReader, FileArtifactWriter,
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod error;
mod utils;

use cli::{CliArgs, Command};
use error::AppError;

/// Exit code for a load that found no entry
const EXIT_CACHE_MISS: i32 = 2;

fn main() {
    match bootstrap() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            // Log the full error for debugging
            error!(error = ?e, "Application failed");
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &CliArgs) -> Result<(), AppError> {
    let filter = if args.trace {
        EnvFilter::new("info,buildcache=debug,buildcache_engine=trace")
    } else if args.verbose {
        EnvFilter::new("info,buildcache=debug,buildcache_engine=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so stdout only carries keys and JSON metrics
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(args.verbose || args.trace)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))
}

#[tokio::main]
async fn bootstrap() -> Result<i32, AppError> {
    let args = CliArgs::parse();
    init_logging(&args)?;

    let service = CdnCacheService::new(config::service_config(&args)?)?;

    let result = run(&service, &args.command).await;

    // Close before surfacing any error so the session summary is always reported
    let metrics = service.close();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }

    result
}

async fn run(service: &CdnCacheService, command: &Command) -> Result<i32, AppError> {
    match command {
        Command::Get { key, output } => {
            let key = CacheKey::new(key.as_str())?;
            let mut reader = FileArtifactReader::new(output);

            if service.load(&key, &mut reader).await? {
                info!("Loaded {key} into {}", reader.path().display());
                Ok(0)
            } else {
                info!("No cache entry for {key}");
                Ok(EXIT_CACHE_MISS)
            }
        }
        Command::Put { input, key } => {
            let writer = FileArtifactWriter::open(input).await?;
            let key = match key {
                Some(key) => CacheKey::new(key.as_str())?,
                None => {
                    let file = tokio::fs::File::open(writer.path()).await?;
                    CacheKey::from_reader(tokio::io::BufReader::new(file)).await?
                }
            };

            service.store(&key, &writer).await?;
            if writer.size() > service.config().max_entry_size {
                warn!(
                    "{} is {} bytes, above the maximum entry size of {} bytes; not stored",
                    writer.path().display(),
                    writer.size(),
                    service.config().max_entry_size
                );
            } else {
                info!("Stored {} as {key}", writer.path().display());
            }

            println!("{key}");
            Ok(0)
        }
    }
}
