//! Egress filter for proxied requests.
//!
//! Decisions are purely lexical: the host string is compared against
//! loopback names and private-range prefixes without any DNS lookup, so a
//! public hostname that resolves to a private address is not caught here.

use std::fmt;

use url::Url;

/// Why a target URL was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The target does not start with `http://` or `https://`.
    UnsupportedScheme,
    /// The target could not be parsed as a URL.
    InvalidUrl,
    /// The host is loopback, unspecified, or a literal private-range address.
    PrivateHost(String),
}

impl RejectReason {
    /// `true` for policy refusals (403) as opposed to malformed input (400).
    #[must_use]
    pub fn is_policy(&self) -> bool {
        matches!(self, Self::PrivateHost(_))
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedScheme => f.write_str("Only http/https URLs allowed"),
            Self::InvalidUrl => f.write_str("Invalid URL"),
            Self::PrivateHost(_) => f.write_str("Proxy to private addresses not allowed"),
        }
    }
}

/// Outcome of [`decide`]. An allowed decision carries the parsed target so
/// callers never parse it a second time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EgressDecision {
    Allowed(Url),
    Rejected(RejectReason),
}

impl EgressDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Classify a proxy target before any network call is made.
#[must_use]
pub fn decide(target: &str) -> EgressDecision {
    if !(target.starts_with("http://") || target.starts_with("https://")) {
        return EgressDecision::Rejected(RejectReason::UnsupportedScheme);
    }

    let url = match Url::parse(target) {
        Ok(url) => url,
        // `http://` with no authority has an empty host, which is private.
        Err(url::ParseError::EmptyHost) => {
            return EgressDecision::Rejected(RejectReason::PrivateHost(String::new()));
        },
        Err(_) => return EgressDecision::Rejected(RejectReason::InvalidUrl),
    };

    let host = url.host_str().map(normalize_host).unwrap_or_default();
    if is_private_host(&host) {
        return EgressDecision::Rejected(RejectReason::PrivateHost(host));
    }

    EgressDecision::Allowed(url)
}

/// Case-fold the host and drop the brackets around IPv6 literals.
fn normalize_host(host: &str) -> String {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase()
}

/// Returns `true` if `host` names loopback, the unspecified address, or a
/// literal RFC 1918 / link-local IPv4 address.
///
/// For `172.x` hosts the second segment must parse as an integer in
/// `16..=31`; anything that fails to parse is treated as a hostname and
/// allowed through.
#[must_use]
pub fn is_private_host(host: &str) -> bool {
    if host.is_empty() {
        return true;
    }

    if matches!(host, "localhost" | "127.0.0.1" | "::1" | "0.0.0.0") {
        return true;
    }

    if ["10.", "192.168.", "169.254."]
        .iter()
        .any(|prefix| host.starts_with(prefix))
    {
        return true;
    }

    if let Some(rest) = host.strip_prefix("172.") {
        return rest
            .split('.')
            .next()
            .and_then(|segment| segment.parse::<i32>().ok())
            .is_some_and(|second| (16..=31).contains(&second));
    }

    false
}
