//! # HTTP Transport
//!
//! The seam between the cache service and the network. A transport performs
//! exactly one HTTP exchange per request; it does not retry and adds no
//! timeouts beyond those configured on the underlying client.

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{Client, Method, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};
use url::Url;

use crate::bytes_stream::BytesStreamReader;
use crate::config::CacheServiceConfig;
use crate::error::{CacheError, CacheResult, status_line};

/// A boxed response body
pub type BoxBodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// A boxed request body stream
pub type BoxByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Streaming request body with a length declared up front
pub struct RequestBody {
    pub content_length: u64,
    pub stream: BoxByteStream,
}

/// A single request against the cache server
pub struct CacheRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl CacheRequest {
    pub fn get(url: Url, headers: HeaderMap) -> Self {
        Self {
            method: Method::GET,
            url,
            headers,
            body: None,
        }
    }

    pub fn put(url: Url, headers: HeaderMap, body: RequestBody) -> Self {
        Self {
            method: Method::PUT,
            url,
            headers,
            body: Some(body),
        }
    }
}

/// Response head plus a streaming body
pub struct CacheResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxBodyReader,
}

impl CacheResponse {
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: impl AsyncRead + Send + 'static,
    ) -> Self {
        Self {
            status,
            headers,
            body: Box::pin(body),
        }
    }

    /// Status code and reason phrase, e.g. `404 Not Found`
    pub fn status_line(&self) -> String {
        status_line(&self.status)
    }

    /// Drain the body as lossy UTF-8 text.
    ///
    /// Never fails: a body read error is rendered into the returned text.
    pub async fn into_text(mut self) -> String {
        let mut raw = Vec::new();
        let read_result = self.body.read_to_end(&mut raw).await;
        let mut text = String::from_utf8_lossy(&raw).into_owned();
        if let Err(e) = read_result {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&format!("<failed to read response body: {e}>"));
        }
        text
    }

    /// Status line followed by the body text, as carried in miss and error messages
    pub async fn into_message(self) -> String {
        let status_line = self.status_line();
        let text = self.into_text().await;
        format!("{status_line} {text}")
    }
}

/// A transport capable of executing cache requests
#[async_trait]
pub trait CacheTransport: Send + Sync {
    /// Perform a single HTTP exchange
    async fn execute(&self, request: CacheRequest) -> CacheResult<CacheResponse>;
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &CacheServiceConfig) -> CacheResult<Client> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(config.pool_idle_timeout)
        .user_agent(&config.user_agent)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    if config.use_system_proxy {
        info!("Using system proxy settings for cache requests");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for cache requests");
    }

    client_builder.build().map_err(CacheError::from)
}

/// Transport backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &CacheServiceConfig) -> CacheResult<Self> {
        Ok(Self {
            client: create_client(config)?,
        })
    }
}

#[async_trait]
impl CacheTransport for HttpTransport {
    async fn execute(&self, request: CacheRequest) -> CacheResult<CacheResponse> {
        let CacheRequest {
            method,
            url,
            headers,
            body,
        } = request;

        // Sensitive header values (credentials) render as "Sensitive" here
        debug!(method = %method, url = %url, headers = ?headers, "--> cache request");

        let mut builder = self.client.request(method.clone(), url.clone()).headers(headers);
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_LENGTH, body.content_length)
                .body(reqwest::Body::wrap_stream(body.stream));
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        debug!(method = %method, url = %url, status = %status, headers = ?headers, "<-- cache response");

        Ok(CacheResponse::new(
            status,
            headers,
            BytesStreamReader::new(response.bytes_stream()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_tracing;
    use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
    use std::net::SocketAddr;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, capture the raw request and reply with `response`
    async fn serve_once(response: &'static [u8]) -> (SocketAddr, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            let head_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before request head");
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = find(&request, b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);

            while request.len() < head_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before request body");
                request.extend_from_slice(&buf[..n]);
            }

            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        (addr, handle)
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    fn transport() -> HttpTransport {
        let config = CacheServiceConfig::builder("http://127.0.0.1/")
            .with_system_proxy(false)
            .build()
            .unwrap();
        HttpTransport::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_exchange() {
        init_test_tracing!();
        let (addr, server) = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Cache: Hit from cloudfront\r\nConnection: close\r\n\r\nhello",
        )
        .await;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/test"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        let url = Url::parse(&format!("http://{addr}/cache/abc")).unwrap();

        let response = transport()
            .execute(CacheRequest::get(url, headers))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.status_line(), "200 OK");
        assert_eq!(
            response.headers.get("x-cache").unwrap(),
            "Hit from cloudfront"
        );
        assert_eq!(response.into_text().await, "hello");

        let request = String::from_utf8(server.await.unwrap()).unwrap();
        let request = request.to_ascii_lowercase();
        assert!(request.starts_with("get /cache/abc http/1.1\r\n"));
        assert!(request.contains("accept: application/test\r\n"));
        assert!(request.contains("authorization: bearer abc\r\n"));
    }

    #[tokio::test]
    async fn test_put_streams_body_with_declared_length() {
        init_test_tracing!();
        let (addr, server) =
            serve_once(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;

        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"first-")),
            Ok(Bytes::from_static(b"second-")),
            Ok(Bytes::from_static(b"third")),
        ];
        let body = RequestBody {
            content_length: 18,
            stream: Box::pin(futures::stream::iter(chunks)),
        };
        let url = Url::parse(&format!("http://{addr}/abc")).unwrap();

        let response = transport()
            .execute(CacheRequest::put(url, HeaderMap::new(), body))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CREATED);

        let request = server.await.unwrap();
        let head_end = find(&request, b"\r\n\r\n").unwrap() + 4;
        let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
        assert!(head.starts_with("put /abc http/1.1\r\n"));
        assert!(head.contains("content-length: 18\r\n"));
        assert!(!head.contains("transfer-encoding"));
        assert_eq!(&request[head_end..], b"first-second-third");
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/abc")).unwrap();
        let result = transport()
            .execute(CacheRequest::get(url, HeaderMap::new()))
            .await;

        let Err(err) = result else {
            panic!("expected connection failure");
        };
        assert!(matches!(err, CacheError::Http(_)));
        assert!(!err.root_cause().is_empty());
    }

    #[tokio::test]
    async fn test_into_message() {
        let response = CacheResponse::new(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            &b"no such key"[..],
        );
        assert_eq!(response.into_message().await, "404 Not Found no such key");
    }
}
