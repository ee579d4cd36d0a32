use std::fmt;

use {http::StatusCode, thiserror::Error};

/// Coarse class of a transport failure, reported to the caller in place of
/// an exception type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    Connect,
    Redirect,
    Body,
    Decode,
    Request,
}

impl TransportKind {
    #[must_use]
    pub fn of(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect
        } else if err.is_redirect() {
            Self::Redirect
        } else if err.is_body() {
            Self::Body
        } else if err.is_decode() {
            Self::Decode
        } else {
            Self::Request
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "TimeoutError",
            Self::Connect => "ConnectError",
            Self::Redirect => "RedirectError",
            Self::Body => "BodyError",
            Self::Decode => "DecodeError",
            Self::Request => "RequestError",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single upstream attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{kind}: {source}")]
    Transport {
        kind: TransportKind,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered outside `200..400`. `snippet` holds at most the
    /// configured number of bytes of the error body.
    #[error("Remote server returned HTTP {status}: {snippet}")]
    HttpStatus { status: u16, snippet: String },
}

impl FetchError {
    #[must_use]
    pub fn transport(source: reqwest::Error) -> Self {
        Self::Transport {
            kind: TransportKind::of(&source),
            source,
        }
    }

    /// Transport failures and any 5xx (including nonstandard codes) are
    /// worth another attempt; 4xx are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
        }
    }

    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Transport { kind, .. } => kind.as_str(),
            Self::HttpStatus { status, .. } if *status >= 500 => "http_5xx",
            Self::HttpStatus { .. } => "http_4xx",
        }
    }
}

/// Terminal outcome of a proxy request that produced no upstream response.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Remote server returned HTTP {status}: {snippet}")]
    UpstreamStatus { status: u16, snippet: String },

    #[error("Proxy error: {kind}: {message}")]
    Transport {
        kind: TransportKind,
        message: String,
    },

    #[error("Proxy: max retries exceeded")]
    RetriesExhausted,
}

impl ProxyError {
    /// Status returned to the local caller.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UpstreamStatus { .. } => StatusCode::BAD_REQUEST,
            Self::Transport { .. } | Self::RetriesExhausted => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FetchError> for ProxyError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::HttpStatus { status, snippet } => Self::UpstreamStatus { status, snippet },
            FetchError::Transport { kind, source } => Self::Transport {
                kind,
                message: source.to_string(),
            },
        }
    }
}
