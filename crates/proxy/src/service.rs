//! The proxy pipeline: retry loop around the fetcher, mode selection, and
//! playlist rewriting.

use {
    bytes::Bytes,
    switchback_config::ProxyConfig,
    tracing::{error, info, warn},
    url::Url,
};

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::{
    error::{FetchError, ProxyError},
    fetch::{Fetcher, Upstream, UpstreamStream},
    mode::{DEFAULT_CONTENT_TYPE, ResponseMode},
    playlist::{PLAYLIST_CONTENT_TYPE, PlaylistRewriter},
    retry::RetryPolicy,
};

/// A successful proxy outcome, one variant per [`ResponseMode`].
#[derive(Debug)]
pub enum ProxyResponse {
    /// Rewritten playlist, served as `application/vnd.apple.mpegurl`.
    Playlist { body: Bytes },
    /// Live or media body forwarded as it arrives.
    Stream {
        content_type: String,
        body: UpstreamStream,
    },
    /// Whole upstream body with its original content type.
    Buffered { content_type: String, body: Bytes },
}

impl ProxyResponse {
    #[must_use]
    pub fn mode(&self) -> ResponseMode {
        match self {
            Self::Playlist { .. } => ResponseMode::Playlist,
            Self::Stream { .. } => ResponseMode::Stream,
            Self::Buffered { .. } => ResponseMode::Buffer,
        }
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        match self {
            Self::Playlist { .. } => PLAYLIST_CONTENT_TYPE,
            Self::Stream { content_type, .. } | Self::Buffered { content_type, .. } => content_type,
        }
    }

    /// Fixed body length, `None` for streams.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::Playlist { body } | Self::Buffered { body, .. } => Some(body.len() as u64),
            Self::Stream { .. } => None,
        }
    }
}

/// Fetches proxy targets that already passed the egress filter.
#[derive(Debug, Clone)]
pub struct ProxyService {
    fetcher: Fetcher,
    policy: RetryPolicy,
    rewriter: PlaylistRewriter,
}

impl ProxyService {
    /// `link_port` is the gateway port written into rewritten playlists.
    pub fn new(config: &ProxyConfig, link_port: u16) -> reqwest::Result<Self> {
        Ok(Self::with_parts(
            Fetcher::new(config)?,
            RetryPolicy::from_config(config),
            PlaylistRewriter::new(link_port),
        ))
    }

    #[must_use]
    pub fn with_parts(fetcher: Fetcher, policy: RetryPolicy, rewriter: PlaylistRewriter) -> Self {
        Self {
            fetcher,
            policy,
            rewriter,
        }
    }

    /// Fetch `target`, retrying transport errors and 5xx with linear
    /// backoff, and shape the result into one of the three response modes.
    pub async fn handle(&self, target: &Url) -> Result<ProxyResponse, ProxyError> {
        for attempt in 0..self.policy.max_attempts() {
            info!(attempt = attempt + 1, url = %target, "proxy fetch");
            match self.attempt(target).await {
                Ok(response) => {
                    info!(
                        url = %target,
                        mode = %response.mode(),
                        content_type = response.content_type(),
                        bytes = response.content_length(),
                        "proxy ok"
                    );
                    #[cfg(feature = "metrics")]
                    counter!("proxy_requests_total", "mode" => response.mode().as_str())
                        .increment(1);
                    return Ok(response);
                },
                Err(err) if self.policy.should_retry(&err, attempt) => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying upstream fetch"
                    );
                    #[cfg(feature = "metrics")]
                    counter!("proxy_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                },
                Err(err) => {
                    error!(url = %target, error = %err, "proxy fetch failed");
                    #[cfg(feature = "metrics")]
                    counter!("proxy_upstream_errors_total", "kind" => err.kind_label())
                        .increment(1);
                    return Err(err.into());
                },
            }
        }
        Err(ProxyError::RetriesExhausted)
    }

    /// One attempt. Body reads for buffered modes happen here so a failure
    /// mid-body is retried like a failed connect.
    async fn attempt(&self, target: &Url) -> Result<ProxyResponse, FetchError> {
        let upstream = self.fetcher.fetch(target).await?;
        let mode = ResponseMode::classify(
            upstream.content_type(),
            upstream.content_length(),
            target,
        );
        match mode {
            ResponseMode::Playlist => {
                let raw = upstream.bytes().await?;
                let text = String::from_utf8_lossy(&raw);
                let rewritten = self.rewriter.rewrite(&text, target.as_str());
                Ok(ProxyResponse::Playlist {
                    body: Bytes::from(rewritten),
                })
            },
            ResponseMode::Stream => {
                let content_type = content_type_of(&upstream);
                Ok(ProxyResponse::Stream {
                    content_type,
                    body: upstream.into_stream(),
                })
            },
            ResponseMode::Buffer => {
                let content_type = content_type_of(&upstream);
                Ok(ProxyResponse::Buffered {
                    content_type,
                    body: upstream.bytes().await?,
                })
            },
        }
    }
}

fn content_type_of(upstream: &Upstream) -> String {
    upstream
        .content_type()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}
