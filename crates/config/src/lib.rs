//! Gateway configuration: schema, discovery, and loading.
//!
//! Precedence, lowest to highest: built-in defaults, `switchback.toml`,
//! `SWITCHBACK_*` environment variables, CLI flags (applied by the binary).

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{CONFIG_FILE_NAME, apply_env_overrides, discover_and_load, load},
    schema::{GatewayConfig, ProxyConfig, ServerConfig},
};
