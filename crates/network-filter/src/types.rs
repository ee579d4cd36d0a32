//! Audit types for proxied requests.
//!
//! The gateway emits one entry per `/proxy` call; the binary drains them
//! into structured log events.

use {
    serde::{Deserialize, Serialize},
    time::OffsetDateTime,
};

/// The default port of the loopback asset/proxy listener.
pub const DEFAULT_GATEWAY_PORT: u16 = 8123;

// ── Audit entry ─────────────────────────────────────────────────────────────

/// A single audited proxy request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAuditEntry {
    /// When the request started.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Caller socket address.
    pub peer: String,
    /// Target URL as requested by the caller.
    pub url: String,
    /// Target host, when the URL parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// What happened to the request.
    pub action: AuditAction,
    /// Response mode chosen for successful requests (`playlist`, `stream`, `buffer`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// HTTP status returned to the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Body size for buffered responses; `None` for streams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Wall-clock time until the response head was ready, in milliseconds.
    pub duration_ms: u64,
    /// Error message if the request was refused or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome recorded in a [`NetworkAuditEntry`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Passed the egress filter and produced a response.
    Allowed,
    /// Refused by the egress filter.
    Denied,
    /// Passed the filter but the upstream fetch failed.
    Failed,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::Denied => write!(f, "denied"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Sender half of the audit channel. The binary creates the channel and
/// hands this to the gateway state.
pub type AuditSender = tokio::sync::mpsc::Sender<NetworkAuditEntry>;

/// Send an audit entry on a best-effort basis (non-blocking, drop if channel full).
pub fn emit_audit(tx: Option<&AuditSender>, entry: NetworkAuditEntry) {
    if let Some(sender) = tx
        && sender.try_send(entry).is_err()
    {
        tracing::debug!("audit channel full or closed, entry dropped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(action: AuditAction) -> NetworkAuditEntry {
        NetworkAuditEntry {
            timestamp: OffsetDateTime::UNIX_EPOCH,
            peer: "127.0.0.1:50000".into(),
            url: "http://10.0.0.1/".into(),
            host: Some("10.0.0.1".into()),
            action,
            mode: None,
            status: Some(403),
            bytes: None,
            duration_ms: 0,
            error: Some("Proxy to private addresses not allowed".into()),
        }
    }

    #[test]
    fn serializes_snake_case_and_skips_empty_fields() {
        let json = serde_json::to_value(entry(AuditAction::Denied)).unwrap();
        assert_eq!(json["action"], "denied");
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
        assert!(json.get("mode").is_none());
        assert!(json.get("bytes").is_none());
    }

    #[tokio::test]
    async fn emit_audit_delivers_and_tolerates_full_channel() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        emit_audit(Some(&tx), entry(AuditAction::Allowed));
        // Channel is full now; the second entry is dropped without blocking.
        emit_audit(Some(&tx), entry(AuditAction::Failed));
        emit_audit(None, entry(AuditAction::Denied));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.action, AuditAction::Allowed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn action_display() {
        assert_eq!(AuditAction::Allowed.to_string(), "allowed");
        assert_eq!(AuditAction::Denied.to_string(), "denied");
        assert_eq!(AuditAction::Failed.to_string(), "failed");
    }
}
