//! Upstream fetcher.
//!
//! An [`Upstream`] owns the connection of one successful attempt. Every
//! method that touches the body takes `self`, so the connection is released
//! exactly once: when the buffered read finishes, when the error snippet
//! has been read, or when the [`UpstreamStream`] it was turned into is
//! dropped by the downstream consumer.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use {
    bytes::Bytes,
    futures::{Stream, StreamExt, stream::BoxStream},
    reqwest::header::{
        ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderValue,
    },
    switchback_config::ProxyConfig,
    tracing::debug,
    url::Url,
};

use crate::error::FetchError;

/// Build the client used for every upstream request.
///
/// `Accept-Encoding: identity` keeps upstream bodies uncompressed so
/// content-length and playlist bytes stay exact.
pub fn build_client(config: &ProxyConfig) -> reqwest::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.read_timeout())
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
}

/// Issues upstream GETs and separates success from HTTP errors.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    snippet_limit: usize,
}

impl Fetcher {
    pub fn new(config: &ProxyConfig) -> reqwest::Result<Self> {
        Ok(Self::with_client(
            build_client(config)?,
            config.error_snippet_bytes,
        ))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, snippet_limit: usize) -> Self {
        Self {
            client,
            snippet_limit,
        }
    }

    /// One GET attempt. Statuses in `200..400` succeed; anything else
    /// becomes [`FetchError::HttpStatus`] carrying the start of the error body.
    pub async fn fetch(&self, target: &Url) -> Result<Upstream, FetchError> {
        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(FetchError::transport)?;

        let status = response.status().as_u16();
        debug!(status, url = %target, "proxy response");

        if (200..400).contains(&status) {
            return Ok(Upstream {
                response,
                url: target.clone(),
            });
        }

        let snippet = read_snippet(response, self.snippet_limit).await;
        Err(FetchError::HttpStatus { status, snippet })
    }
}

/// Read at most `limit` bytes of an error body, then drop the response.
async fn read_snippet(mut response: reqwest::Response, limit: usize) -> String {
    let mut buf = Vec::with_capacity(limit.min(8192));
    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "error body read failed");
                break;
            },
        }
    }
    buf.truncate(limit);
    String::from_utf8_lossy(&buf).into_owned()
}

/// A successful upstream response whose body has not been read yet.
pub struct Upstream {
    response: reqwest::Response,
    url: Url,
}

impl Upstream {
    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// `None` when the upstream did not announce a length (chunked, live).
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Read the whole body. Failures mid-body are transport errors.
    pub async fn bytes(self) -> Result<Bytes, FetchError> {
        self.response.bytes().await.map_err(FetchError::transport)
    }

    /// Hand the connection to a streaming consumer.
    #[must_use]
    pub fn into_stream(self) -> UpstreamStream {
        UpstreamStream {
            inner: self.response.bytes_stream().boxed(),
            url: self.url,
            forwarded: 0,
            started: Instant::now(),
        }
    }
}

impl fmt::Debug for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upstream")
            .field("url", &self.url.as_str())
            .field("status", &self.status())
            .field("content_type", &self.content_type())
            .field("content_length", &self.content_length())
            .finish()
    }
}

/// Upstream body forwarded chunk by chunk. Holds the upstream connection;
/// dropping it (consumer finished or disconnected) releases the connection.
pub struct UpstreamStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    url: Url,
    forwarded: u64,
    started: Instant,
}

impl UpstreamStream {
    /// Bytes handed to the consumer so far.
    #[must_use]
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}

impl Stream for UpstreamStream {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            this.forwarded += chunk.len() as u64;
        }
        polled
    }
}

impl Drop for UpstreamStream {
    fn drop(&mut self) {
        debug!(
            url = %self.url,
            bytes = self.forwarded,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "upstream stream released"
        );
        #[cfg(feature = "metrics")]
        metrics::counter!("proxy_stream_bytes_total").increment(self.forwarded);
    }
}

impl fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("url", &self.url.as_str())
            .field("forwarded", &self.forwarded)
            .finish_non_exhaustive()
    }
}
