//! HLS playlist rewriting.
//!
//! Every URI in a playlist (segment and sub-playlist lines, plus `URI="..."`
//! attributes on tags like `EXT-X-KEY` and `EXT-X-MAP`) is resolved to an
//! absolute URL and wrapped as a call back into the local `/proxy`
//! endpoint, so the player fetches everything through the gateway.

use std::{borrow::Cow, ops::Range};

use url::Url;

/// Content type of every rewritten playlist.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

const URI_ATTRIBUTE: &str = "URI=\"";

/// One trimmed playlist line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistLine<'a> {
    Blank,
    /// `#`-prefixed tag or comment; may carry `URI="..."` attributes.
    Comment(&'a str),
    /// Segment or sub-playlist reference.
    Uri(&'a str),
}

impl<'a> PlaylistLine<'a> {
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            Self::Blank
        } else if trimmed.starts_with('#') {
            Self::Comment(trimmed)
        } else {
            Self::Uri(trimmed)
        }
    }
}

/// A quoted `URI="..."` value inside a tag line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriAttribute<'a> {
    /// Byte range of the value, excluding the quotes.
    pub span: Range<usize>,
    pub value: &'a str,
}

/// Lazy scan over the `URI="..."` attributes of one line. Stops at the
/// first unterminated quote; the caller copies the remainder untouched.
#[derive(Debug, Clone)]
pub struct UriAttributes<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Iterator for UriAttributes<'a> {
    type Item = UriAttribute<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.line.get(self.pos..)?;
        let start = self.pos + rest.find(URI_ATTRIBUTE)? + URI_ATTRIBUTE.len();
        let Some(len) = self.line[start..].find('"') else {
            self.pos = self.line.len();
            return None;
        };
        let end = start + len;
        self.pos = end + 1;
        Some(UriAttribute {
            span: start..end,
            value: &self.line[start..end],
        })
    }
}

#[must_use]
pub fn uri_attributes(line: &str) -> UriAttributes<'_> {
    UriAttributes { line, pos: 0 }
}

/// Directory part of `url` used to resolve relative references: everything
/// up to and including the last `/`, provided that slash lies past the
/// scheme separator.
#[must_use]
pub fn playlist_base(url: &str) -> &str {
    match url.rfind('/') {
        Some(idx) if idx > 8 => &url[..=idx],
        _ => url,
    }
}

/// Resolve a playlist reference against `base` (as returned by
/// [`playlist_base`]).
///
/// Protocol-relative references always get `http:`. Returns `None` only
/// when an absolute-path reference meets a base that does not parse.
#[must_use]
pub fn resolve_url(reference: &str, base: &str) -> Option<String> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Some(reference.to_string());
    }
    if reference.starts_with("//") {
        return Some(format!("http:{reference}"));
    }
    if reference.starts_with('/') {
        let base = Url::parse(base).ok()?;
        let host = base.host_str()?;
        let origin = match base.port() {
            Some(port) => format!("{}://{host}:{port}", base.scheme()),
            None => format!("{}://{host}", base.scheme()),
        };
        return Some(format!("{origin}{reference}"));
    }
    Some(format!("{base}{reference}"))
}

/// Rewrites playlists so their URIs point at `http://localhost:<port>/proxy`.
#[derive(Debug, Clone)]
pub struct PlaylistRewriter {
    link_prefix: String,
}

impl PlaylistRewriter {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            link_prefix: format!("http://localhost:{port}/proxy?url="),
        }
    }

    /// Wrap an absolute URL as a proxy link. Everything outside the RFC 3986
    /// unreserved set is percent-encoded, space included (`%20`, never `+`).
    #[must_use]
    pub fn link(&self, absolute: &str) -> String {
        format!("{}{}", self.link_prefix, urlencoding::encode(absolute))
    }

    /// Proxy link for `reference`, or the reference itself when it cannot
    /// be resolved.
    fn proxied<'a>(&self, reference: &'a str, base: &str) -> Cow<'a, str> {
        match resolve_url(reference, base) {
            Some(absolute) => Cow::Owned(self.link(&absolute)),
            None => {
                tracing::debug!(reference, "unresolvable playlist reference left as-is");
                Cow::Borrowed(reference)
            },
        }
    }

    /// Rewrite `playlist`, fetched from `base_url`.
    ///
    /// Lines are split on `\n` and trimmed; each output line ends with `\n`.
    /// Tag lines without a `URI="..."` attribute pass through unchanged.
    #[must_use]
    pub fn rewrite(&self, playlist: &str, base_url: &str) -> String {
        let base = playlist_base(base_url);

        let mut lines: Vec<&str> = playlist.split('\n').collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }

        let mut out = String::with_capacity(playlist.len() * 2);
        for line in lines {
            match PlaylistLine::parse(line) {
                PlaylistLine::Blank => {},
                PlaylistLine::Comment(tag) => self.rewrite_tag(tag, base, &mut out),
                PlaylistLine::Uri(reference) => out.push_str(&self.proxied(reference, base)),
            }
            out.push('\n');
        }
        out
    }

    fn rewrite_tag(&self, tag: &str, base: &str, out: &mut String) {
        let mut cursor = 0;
        for attribute in uri_attributes(tag) {
            out.push_str(&tag[cursor..attribute.span.start]);
            out.push_str(&self.proxied(attribute.value, base));
            cursor = attribute.span.end;
        }
        out.push_str(&tag[cursor..]);
    }
}
