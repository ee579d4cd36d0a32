//! Loopback HTTP gateway: static assets plus the `/proxy` endpoint.
//!
//! - `assets`: asset store seam, MIME table, traversal guard
//! - `proxy_routes`: `/proxy` handler and response shaping
//! - `server`: router, loopback guard, startup
//! - `state`: shared state handed to every route

pub mod assets;
pub mod proxy_routes;
pub mod server;
pub mod state;

pub use {
    assets::{Asset, AssetStore, DirAssetStore, MemoryAssetStore},
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};
