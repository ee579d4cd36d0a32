//! Response-mode selection.

use std::fmt;

use url::Url;

/// Content type assumed when the upstream sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// How a successful upstream response is relayed. Decided exactly once per
/// request, before any body byte is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Buffer, rewrite as an HLS playlist, respond with a fixed length.
    Playlist,
    /// Forward bytes as they arrive; used for live and media payloads.
    Stream,
    /// Buffer the whole body and respond with a fixed length.
    Buffer,
}

impl ResponseMode {
    /// Pick the mode from the upstream content type and length and the
    /// target URL. A missing content type counts as
    /// [`DEFAULT_CONTENT_TYPE`], which streams.
    #[must_use]
    pub fn classify(content_type: Option<&str>, content_length: Option<u64>, target: &Url) -> Self {
        let content_type = content_type
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_ascii_lowercase();
        let path = target.path().to_ascii_lowercase();

        if content_type.contains("mpegurl")
            || content_type.contains("m3u")
            || path.ends_with(".m3u8")
            || path.ends_with(".m3u")
        {
            return Self::Playlist;
        }

        if content_length.is_none()
            || content_type.starts_with("video/")
            || content_type.starts_with("audio/")
            || ["mpegts", "octet-stream", "mp2t"]
                .iter()
                .any(|needle| content_type.contains(needle))
        {
            return Self::Stream;
        }

        Self::Buffer
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playlist => "playlist",
            Self::Stream => "stream",
            Self::Buffer => "buffer",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[rstest]
    #[case(Some("application/vnd.apple.mpegurl"), Some(300), "http://a.example/x")]
    #[case(Some("application/x-mpegURL"), None, "http://a.example/x")]
    #[case(Some("audio/x-mpegurl"), Some(10), "http://a.example/x")]
    #[case(Some("audio/m3u"), Some(10), "http://a.example/x")]
    #[case(Some("text/plain"), Some(10), "http://a.example/live/index.m3u8")]
    #[case(Some("application/octet-stream"), None, "http://a.example/list.M3U")]
    #[case(None, None, "http://a.example/chan.m3u8?token=abc")]
    fn playlists(
        #[case] content_type: Option<&str>,
        #[case] length: Option<u64>,
        #[case] target: &str,
    ) {
        assert_eq!(
            ResponseMode::classify(content_type, length, &url(target)),
            ResponseMode::Playlist
        );
    }

    #[rstest]
    #[case(Some("video/mp2t"), Some(1_000_000))]
    #[case(Some("video/mp4"), Some(10))]
    #[case(Some("audio/aac"), Some(10))]
    #[case(Some("application/octet-stream"), Some(10))]
    #[case(Some("application/x-mpegts"), Some(10))]
    #[case(Some("application/json"), None)]
    #[case(None, Some(10))]
    fn streams(#[case] content_type: Option<&str>, #[case] length: Option<u64>) {
        assert_eq!(
            ResponseMode::classify(content_type, length, &url("http://a.example/seg.ts")),
            ResponseMode::Stream
        );
    }

    #[rstest]
    #[case(Some("application/json"), Some(42))]
    #[case(Some("text/xml; charset=utf-8"), Some(0))]
    #[case(Some("image/png"), Some(2048))]
    fn buffers(#[case] content_type: Option<&str>, #[case] length: Option<u64>) {
        assert_eq!(
            ResponseMode::classify(content_type, length, &url("http://a.example/epg.xml")),
            ResponseMode::Buffer
        );
    }

    #[test]
    fn m3u8_in_query_only_is_not_a_playlist() {
        assert_eq!(
            ResponseMode::classify(
                Some("application/json"),
                Some(5),
                &url("http://a.example/api?next=index.m3u8")
            ),
            ResponseMode::Buffer
        );
    }

    #[test]
    fn display_names() {
        assert_eq!(ResponseMode::Playlist.to_string(), "playlist");
        assert_eq!(ResponseMode::Stream.to_string(), "stream");
        assert_eq!(ResponseMode::Buffer.to_string(), "buffer");
    }
}
