use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::{ConnectInfo, Request, State},
        http::{StatusCode, Uri},
        middleware::{self, Next},
        response::{IntoResponse, Json, Response},
        routing::get,
    },
    switchback_config::{GatewayConfig, ServerConfig},
    switchback_network_filter::{AuditSender, is_loopback_peer},
    switchback_proxy::ProxyService,
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use crate::{
    assets::{DirAssetStore, serve_asset},
    proxy_routes::proxy_handler,
    state::GatewayState,
};

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
///
/// Must be served with `into_make_service_with_connect_info::<SocketAddr>()`:
/// requests without a peer address are refused.
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/proxy", get(proxy_handler))
        .fallback(asset_handler)
        .layer(middleware::from_fn(loopback_only))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Server startup ──────────────────────────────────────────────────────────

/// Bind the loopback listener and serve until the process exits.
pub async fn start_gateway(config: &GatewayConfig, audit: Option<AuditSender>) -> anyhow::Result<()> {
    let server = &config.server;
    let proxy = ProxyService::new(&config.proxy, server.port)
        .context("failed to build upstream HTTP client")?;

    if !server.assets_dir.is_dir() {
        warn!(dir = %server.assets_dir.display(), "assets directory not found, every asset will 404");
    }
    let assets = Arc::new(DirAssetStore::new(&server.assets_dir));
    let state = GatewayState::with_audit(proxy, assets, audit);

    let addr = listen_addr(server)?;
    if !addr.ip().is_loopback() {
        warn!(%addr, "gateway bound to a non-loopback address; non-local callers are still refused");
    }
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Startup banner.
    let lines = [
        format!("switchback gateway v{}", state.version),
        format!("listening on http://{addr}"),
        format!("assets: {}", server.assets_dir.display()),
        format!(
            "proxy: {} retries, {}ms backoff unit",
            config.proxy.max_retries, config.proxy.retry_backoff_ms
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    let app = build_gateway_app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Socket address for `server.bind`, which may be an IPv4 or IPv6 literal
/// (IPv6 optionally in brackets).
fn listen_addr(server: &ServerConfig) -> anyhow::Result<SocketAddr> {
    let host = server
        .bind
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(&server.bind);
    let ip: IpAddr = host.parse().context("invalid bind address")?;
    Ok(SocketAddr::new(ip, server.port))
}

// ── Middleware ──────────────────────────────────────────────────────────────

/// Refuse every caller that is not on the loopback interface.
async fn loopback_only(request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    match peer {
        Some(addr) if is_loopback_peer(&addr.ip()) => next.run(request).await,
        _ => {
            warn!(peer = ?peer, path = %request.uri().path(), "blocked non-local request");
            (StatusCode::FORBIDDEN, "Forbidden").into_response()
        },
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
    }))
}

async fn asset_handler(State(state): State<Arc<GatewayState>>, uri: Uri) -> Response {
    serve_asset(state.assets.as_ref(), uri.path()).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        crate::assets::MemoryAssetStore,
        axum::body::Body,
        rstest::rstest,
        switchback_config::ProxyConfig,
        tower::ServiceExt,
    };

    fn app() -> Router {
        let assets = Arc::new(MemoryAssetStore::new().with("index.html", "<p>home</p>"));
        let proxy = ProxyService::new(&ProxyConfig::default(), 8123).unwrap();
        build_gateway_app(GatewayState::new(proxy, assets))
    }

    fn request_from(peer: SocketAddr, path: &str) -> Request {
        let mut request = Request::builder().uri(path).body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[tokio::test]
    async fn lan_callers_are_forbidden_before_routing() {
        let peer: SocketAddr = "192.168.1.20:51000".parse().unwrap();
        for path in ["/", "/health", "/proxy?url=http%3A%2F%2Fexample.com%2F"] {
            let response = app().oneshot(request_from(peer, path)).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
            let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
            assert_eq!(body, "Forbidden");
        }
    }

    #[tokio::test]
    async fn missing_peer_address_is_forbidden() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn loopback_callers_pass() {
        for peer in ["127.0.0.1:40000", "[::1]:40000", "[::ffff:127.0.0.1]:40000"] {
            let peer: SocketAddr = peer.parse().unwrap();
            let response = app().oneshot(request_from(peer, "/")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{peer}");
        }
    }

    fn server_config(bind: &str, port: u16) -> ServerConfig {
        ServerConfig {
            bind: bind.into(),
            port,
            ..ServerConfig::default()
        }
    }

    #[rstest]
    #[case("127.0.0.1", "127.0.0.1:8123")]
    #[case("::1", "[::1]:8123")]
    #[case("[::1]", "[::1]:8123")]
    #[case("0.0.0.0", "0.0.0.0:8123")]
    fn listen_addr_accepts_ip_literals(#[case] bind: &str, #[case] expected: &str) {
        let addr = listen_addr(&server_config(bind, 8123)).unwrap();
        assert_eq!(addr, expected.parse::<SocketAddr>().unwrap());
    }

    #[rstest]
    #[case("localhost")]
    #[case("127.0.0.1:8123")]
    #[case("")]
    fn listen_addr_rejects_non_literals(#[case] bind: &str) {
        let err = listen_addr(&server_config(bind, 8123)).unwrap_err();
        assert_eq!(err.to_string(), "invalid bind address");
    }

    #[tokio::test]
    async fn ipv6_loopback_bind_listens() {
        let addr = listen_addr(&server_config("::1", 0)).unwrap();
        // Hosts without IPv6 cannot bind `::1` at all.
        let Ok(listener) = tokio::net::TcpListener::bind(addr).await else {
            return;
        };
        let local = listener.local_addr().unwrap();
        assert!(local.is_ipv6());
        assert!(local.ip().is_loopback());
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn health_reports_version() {
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let response = app().oneshot(request_from(peer, "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
