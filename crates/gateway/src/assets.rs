//! Static asset serving.
//!
//! Assets come from an [`AssetStore`]; the gateway only decides which path
//! to ask for and how to label the bytes.

use std::{
    borrow::Cow,
    collections::HashMap,
    io,
    path::PathBuf,
};

use {
    async_trait::async_trait,
    axum::{
        body::Body,
        http::{StatusCode, header},
        response::{IntoResponse, Response},
    },
    bytes::Bytes,
    tokio_util::io::ReaderStream,
};

/// Served for `GET /`.
pub const INDEX_ASSET: &str = "index.html";

/// An opened asset, ready to be written to the client.
#[derive(Debug)]
pub struct Asset {
    pub content_type: &'static str,
    pub body: Body,
}

impl IntoResponse for Asset {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

/// Source of bundled static files.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Open `path` (relative, already sanitized). Any error is reported to
    /// the client as not found.
    async fn open(&self, path: &str) -> io::Result<Asset>;
}

/// Assets read from a directory on disk and streamed in chunks.
#[derive(Debug, Clone)]
pub struct DirAssetStore {
    root: PathBuf,
}

impl DirAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetStore for DirAssetStore {
    async fn open(&self, path: &str) -> io::Result<Asset> {
        let file = tokio::fs::File::open(self.root.join(path)).await?;
        if !file.metadata().await?.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a file"));
        }
        Ok(Asset {
            content_type: mime_for(path),
            body: Body::from_stream(ReaderStream::new(file)),
        })
    }
}

/// Assets held in memory, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetStore {
    files: HashMap<String, Bytes>,
}

impl MemoryAssetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, path: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn open(&self, path: &str) -> io::Result<Asset> {
        let contents = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        Ok(Asset {
            content_type: mime_for(path),
            body: Body::from(contents),
        })
    }
}

/// Content type by file extension.
#[must_use]
pub fn mime_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" => "text/html",
        "js" => "application/javascript",
        "css" => "text/css",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "woff" | "woff2" => "font/woff2",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Why a request path cannot be mapped to an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalRejected;

/// Map a request path (no query) to a relative asset path. The path is
/// percent-decoded first, so an encoded `..` is caught too.
pub fn asset_path(request_path: &str) -> Result<String, TraversalRejected> {
    let decoded = urlencoding::decode(request_path).unwrap_or(Cow::Borrowed(request_path));
    let relative = decoded.strip_prefix('/').unwrap_or(&decoded);
    if relative.contains("..") || relative.starts_with('/') {
        return Err(TraversalRejected);
    }
    Ok(relative.to_string())
}

/// Resolve and serve one asset request.
pub async fn serve_asset(store: &dyn AssetStore, request_path: &str) -> Response {
    let Ok(path) = asset_path(request_path) else {
        tracing::warn!(path = request_path, "asset path traversal refused");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    };
    let path = if path.is_empty() {
        INDEX_ASSET.to_string()
    } else {
        path
    };

    match store.open(&path).await {
        Ok(asset) => asset.into_response(),
        Err(e) => {
            if e.kind() == io::ErrorKind::NotFound {
                tracing::debug!(path, "asset not found");
            } else {
                tracing::warn!(path, error = %e, "asset open failed");
            }
            (StatusCode::NOT_FOUND, format!("Not found: {path}")).into_response()
        },
    }
}
