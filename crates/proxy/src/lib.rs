//! HLS proxy engine.
//!
//! - `fetch`: upstream client, HTTP status handling, streaming bodies
//! - `mode`: playlist / stream / buffer selection
//! - `playlist`: URL resolution and playlist rewriting
//! - `retry`: linear-backoff retry policy
//! - `service`: the retry loop tying the pieces together

pub mod error;
pub mod fetch;
pub mod mode;
pub mod playlist;
pub mod retry;
pub mod service;

pub use {
    error::{FetchError, ProxyError, TransportKind},
    fetch::{Fetcher, Upstream, UpstreamStream, build_client},
    mode::{DEFAULT_CONTENT_TYPE, ResponseMode},
    playlist::{
        PLAYLIST_CONTENT_TYPE, PlaylistLine, PlaylistRewriter, playlist_base, resolve_url,
        uri_attributes,
    },
    retry::RetryPolicy,
    service::{ProxyResponse, ProxyService},
};
