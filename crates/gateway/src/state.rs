use std::sync::Arc;

use {switchback_network_filter::AuditSender, switchback_proxy::ProxyService};

use crate::assets::AssetStore;

/// Shared, immutable state behind every route.
pub struct GatewayState {
    pub version: String,
    pub proxy: ProxyService,
    pub assets: Arc<dyn AssetStore>,
    /// Optional audit channel; entries are dropped when it is full.
    pub audit: Option<AuditSender>,
}

impl GatewayState {
    pub fn new(proxy: ProxyService, assets: Arc<dyn AssetStore>) -> Arc<Self> {
        Self::with_audit(proxy, assets, None)
    }

    pub fn with_audit(
        proxy: ProxyService,
        assets: Arc<dyn AssetStore>,
        audit: Option<AuditSender>,
    ) -> Arc<Self> {
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            proxy,
            assets,
            audit,
        })
    }
}
