//! `GET /proxy?url=<target>`.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use {
    axum::{
        body::Body,
        extract::{ConnectInfo, RawQuery, State},
        http::{HeaderValue, StatusCode, header},
        response::{IntoResponse, Response},
    },
    switchback_network_filter::{
        AuditAction, EgressDecision, NetworkAuditEntry, RejectReason, decide, emit_audit,
    },
    switchback_proxy::{DEFAULT_CONTENT_TYPE, PLAYLIST_CONTENT_TYPE, ProxyError, ProxyResponse},
    time::OffsetDateTime,
    tracing::{debug, warn},
    url::Url,
};

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::state::GatewayState;

/// Extract the proxy target from the raw query string.
///
/// A query that starts with `url=` is taken whole, so an unencoded target
/// keeps its own `&`-separated parameters. Otherwise the `url` parameter is
/// looked up normally. Empty values count as missing.
#[must_use]
pub fn target_param(raw_query: Option<&str>) -> Option<String> {
    let query = raw_query?;
    if let Some(rest) = query.strip_prefix("url=") {
        let plus_decoded = rest.replace('+', " ");
        let target = match urlencoding::decode(&plus_decoded) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => rest.to_string(),
        };
        if !target.is_empty() {
            return Some(target);
        }
    }
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub async fn proxy_handler(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    RawQuery(query): RawQuery,
) -> Response {
    let Some(target) = target_param(query.as_deref()) else {
        return text(StatusCode::BAD_REQUEST, "Missing url parameter");
    };
    let audit = PendingAudit::start(peer, &target);

    let url = match decide(&target) {
        EgressDecision::Allowed(url) => url,
        EgressDecision::Rejected(reason) => {
            let status = rejection_status(&reason);
            if let RejectReason::PrivateHost(host) = &reason {
                warn!(%peer, host, "blocked proxy to private host");
                #[cfg(feature = "metrics")]
                counter!("proxy_egress_denied_total").increment(1);
            } else {
                debug!(%peer, url = %target, reason = %reason, "proxy target refused");
            }
            let mut entry = audit.finish(AuditAction::Denied, status);
            if let RejectReason::PrivateHost(host) = &reason {
                entry.host = Some(host.clone());
            }
            entry.error = Some(reason.to_string());
            emit_audit(state.audit.as_ref(), entry);
            return text(status, reason.to_string());
        },
    };

    relay(&state, audit, &url).await
}

/// Fetch an allowed target, record the outcome, and shape the response.
async fn relay(state: &GatewayState, audit: PendingAudit, url: &Url) -> Response {
    match state.proxy.handle(url).await {
        Ok(response) => {
            let mut entry = audit.finish(AuditAction::Allowed, StatusCode::OK);
            entry.host = url.host_str().map(str::to_string);
            entry.mode = Some(response.mode().to_string());
            entry.bytes = response.content_length();
            emit_audit(state.audit.as_ref(), entry);
            proxy_response(response)
        },
        Err(err) => {
            let status = err.status_code();
            let mut entry = audit.finish(AuditAction::Failed, status);
            entry.host = url.host_str().map(str::to_string);
            entry.error = Some(err.to_string());
            emit_audit(state.audit.as_ref(), entry);
            error_response(&err)
        },
    }
}

fn rejection_status(reason: &RejectReason) -> StatusCode {
    if reason.is_policy() {
        StatusCode::FORBIDDEN
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// Turn a successful proxy outcome into the downstream response.
pub fn proxy_response(response: ProxyResponse) -> Response {
    let allow_any = (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    match response {
        ProxyResponse::Playlist { body } => (
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(PLAYLIST_CONTENT_TYPE),
                ),
                allow_any,
                (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            ],
            body,
        )
            .into_response(),
        ProxyResponse::Stream { content_type, body } => (
            [(header::CONTENT_TYPE, header_value(&content_type)), allow_any],
            Body::from_stream(body),
        )
            .into_response(),
        ProxyResponse::Buffered { content_type, body } => (
            [(header::CONTENT_TYPE, header_value(&content_type)), allow_any],
            body,
        )
            .into_response(),
    }
}

pub fn error_response(err: &ProxyError) -> Response {
    text(err.status_code(), err.to_string())
}

fn header_value(content_type: &str) -> HeaderValue {
    HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body.into()).into_response()
}

/// Audit fields known when the request arrives.
struct PendingAudit {
    timestamp: OffsetDateTime,
    started: Instant,
    peer: SocketAddr,
    url: String,
}

impl PendingAudit {
    fn start(peer: SocketAddr, url: &str) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            started: Instant::now(),
            peer,
            url: url.to_string(),
        }
    }

    fn finish(self, action: AuditAction, status: StatusCode) -> NetworkAuditEntry {
        NetworkAuditEntry {
            timestamp: self.timestamp,
            peer: self.peer.to_string(),
            url: self.url,
            host: None,
            action,
            mode: None,
            status: Some(status.as_u16()),
            bytes: None,
            duration_ms: self.started.elapsed().as_millis() as u64,
            error: None,
        }
    }
}
