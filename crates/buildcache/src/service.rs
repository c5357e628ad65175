//! # CDN Cache Service
//!
//! Maps key-addressed load/store calls onto single HTTP exchanges and
//! records one [`CacheAction`] per call.
//!
//! - `load`: `GET {base}/{key}`. 2xx is a hit, 404 a miss, anything else
//!   a protocol error.
//! - `store`: `PUT {base}/{key}` with a streamed body, unless the artifact
//!   exceeds the configured maximum entry size (silently skipped).
//! - `close`: hands the session summary to the reporter.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use url::Url;

use crate::cdn::CdnCacheStatus;
use crate::config::CacheServiceConfig;
use crate::counting::CountingReader;
use crate::entry::{ArtifactReader, ArtifactWriter};
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use crate::metrics::{CacheAction, CacheMetrics, LoadOutcome, MetricsTracker, StoreOutcome};
use crate::report::{MetricsReporter, TracingReporter};
use crate::transport::{CacheRequest, CacheResponse, CacheTransport, HttpTransport, RequestBody};

/// Content type of cache artifacts, sent on store and advertised on load
pub const BUILD_CACHE_CONTENT_TYPE: &str = "application/vnd.gradle.build-cache-artifact.v2";

const ACCEPT_HEADER_VALUE: &str = "application/vnd.gradle.build-cache-artifact.v2,*/*";

/// Buffer between the artifact writer and the outgoing request body
const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// Remote build cache client fronted by a CDN
pub struct CdnCacheService<T = HttpTransport> {
    transport: T,
    config: CacheServiceConfig,
    authorization: Option<HeaderValue>,
    tracker: MetricsTracker,
    reporter: Box<dyn MetricsReporter>,
    closed: AtomicBool,
}

impl CdnCacheService<HttpTransport> {
    /// Create a service talking HTTP through a pooled reqwest client
    pub fn new(config: CacheServiceConfig) -> CacheResult<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, transport)
    }
}

impl<T: CacheTransport> CdnCacheService<T> {
    /// Create a service over an arbitrary transport
    pub fn with_transport(config: CacheServiceConfig, transport: T) -> CacheResult<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(CacheError::InvalidUrl(format!(
                "{}: cannot carry path segments",
                config.base_url
            )));
        }
        let authorization = config.credentials.authorization_header()?;

        let description = config
            .describe()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        info!("Using remote build cache: {description}");

        Ok(Self {
            transport,
            config,
            authorization,
            tracker: MetricsTracker::new(),
            reporter: Box::new(TracingReporter),
            closed: AtomicBool::new(false),
        })
    }

    /// Replace the reporter that receives the summary on close
    pub fn with_reporter(mut self, reporter: impl MetricsReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn config(&self) -> &CacheServiceConfig {
        &self.config
    }

    pub fn tracker(&self) -> &MetricsTracker {
        &self.tracker
    }

    /// Summary of the session so far
    pub fn metrics(&self) -> CacheMetrics {
        self.tracker.summarize()
    }

    /// Load the entry for `key` into `reader`.
    ///
    /// Returns `Ok(false)` when the entry does not exist remotely. Any other
    /// failure is recorded and returned.
    pub async fn load(&self, key: &CacheKey, reader: &mut dyn ArtifactReader) -> CacheResult<bool> {
        let url = key.locator(&self.config.base_url)?;

        match self.try_load(&url, reader).await {
            Ok(outcome) => {
                let found = matches!(outcome, LoadOutcome::Hit { .. });
                self.tracker.record(CacheAction::Load { url, outcome });
                Ok(found)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Cache load failed");
                self.tracker.record(CacheAction::Load {
                    url,
                    outcome: LoadOutcome::Failure {
                        root_cause: e.root_cause(),
                    },
                });
                Err(e)
            }
        }
    }

    async fn try_load(&self, url: &Url, reader: &mut dyn ArtifactReader) -> CacheResult<LoadOutcome> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER_VALUE));
        self.add_credentials(&mut headers);

        let started = Instant::now();
        let response = self
            .transport
            .execute(CacheRequest::get(url.clone(), headers))
            .await?;

        if response.status.is_success() {
            let cdn_status =
                CdnCacheStatus::from_headers(&response.headers, &self.config.cdn_cache_header);
            let CacheResponse { body, .. } = response;

            let mut body = CountingReader::new(body);
            reader.read_from(&mut body).await?;
            let duration = started.elapsed();

            debug!(url = %url, bytes = body.count(), ?duration, %cdn_status, "Cache hit");
            Ok(LoadOutcome::Hit {
                bytes: body.count(),
                duration,
                cdn_status,
            })
        } else if response.status == StatusCode::NOT_FOUND {
            let message = response.into_message().await;
            debug!(url = %url, "Cache miss");
            Ok(LoadOutcome::Miss { message })
        } else {
            let status = response.status;
            Err(CacheError::UnexpectedStatus {
                status,
                message: response.into_text().await,
            })
        }
    }

    /// Store the artifact produced by `writer` under `key`.
    ///
    /// Artifacts larger than the configured maximum entry size are skipped
    /// without any network call.
    pub async fn store(&self, key: &CacheKey, writer: &dyn ArtifactWriter) -> CacheResult<()> {
        let url = key.locator(&self.config.base_url)?;
        let size = writer.size();

        if size > self.config.max_entry_size {
            debug!(
                url = %url,
                size,
                max_size = self.config.max_entry_size,
                "Entry too large for remote cache, skipping"
            );
            self.tracker.record(CacheAction::Store {
                url,
                outcome: StoreOutcome::TooLarge {
                    declared_size: size,
                },
            });
            return Ok(());
        }

        match self.try_store(&url, writer, size).await {
            Ok(duration) => {
                debug!(url = %url, bytes = size, ?duration, "Stored cache entry");
                self.tracker.record(CacheAction::Store {
                    url,
                    outcome: StoreOutcome::Success {
                        bytes: size,
                        duration,
                    },
                });
                Ok(())
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Cache store failed");
                self.tracker.record(CacheAction::Store {
                    url,
                    outcome: StoreOutcome::Failure {
                        root_cause: e.root_cause(),
                    },
                });
                Err(e)
            }
        }
    }

    async fn try_store(
        &self,
        url: &Url,
        writer: &dyn ArtifactWriter,
        size: u64,
    ) -> CacheResult<Duration> {
        let mut headers = self.config.store_headers.clone();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(BUILD_CACHE_CONTENT_TYPE),
        );
        self.add_credentials(&mut headers);

        let (mut pipe_writer, pipe_reader) = tokio::io::duplex(PIPE_BUFFER_SIZE);
        let body = RequestBody {
            content_length: size,
            stream: Box::pin(ReaderStream::new(pipe_reader)),
        };
        let request = CacheRequest::put(url.clone(), headers, body);

        let produce = async move {
            writer.write_to(&mut pipe_writer).await?;
            pipe_writer.shutdown().await
        };

        let started = Instant::now();
        let (response, produced) = tokio::join!(self.transport.execute(request), produce);
        let duration = started.elapsed();

        match (response, produced) {
            // A broken pipe only means the transport stopped reading the body
            (_, Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => Err(CacheError::Io(e)),
            (Err(e), _) => Err(e),
            (Ok(response), _) if response.status.is_success() => Ok(duration),
            (Ok(response), _) => {
                let status = response.status;
                Err(CacheError::UnexpectedStatus {
                    status,
                    message: response.into_text().await,
                })
            }
        }
    }

    /// Close the session and report its metrics.
    ///
    /// The summary is reported on the first call only; every call returns it.
    pub fn close(&self) -> CacheMetrics {
        let actions = self.tracker.actions();
        let metrics = CacheMetrics::from_actions(&actions);

        if !self.closed.swap(true, Ordering::AcqRel) {
            self.reporter.report(&actions, &metrics);
        }

        metrics
    }

    fn add_credentials(&self, headers: &mut HeaderMap) {
        if let Some(authorization) = &self.authorization {
            headers.insert(AUTHORIZATION, authorization.clone());
        }
    }
}
