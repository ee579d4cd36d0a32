use std::path::PathBuf;

use {
    anyhow::{Context, Result},
    clap::Parser,
    switchback_config::GatewayConfig,
    switchback_network_filter::NetworkAuditEntry,
    tokio::sync::mpsc,
    tracing_subscriber::EnvFilter,
};

/// Capacity of the audit channel between request handlers and the log drain.
const AUDIT_CHANNEL_CAPACITY: usize = 1024;

/// Local asset server and HLS proxy for the Switchback player.
///
/// Serves the bundled web assets and relays media requests through
/// `/proxy?url=...` on a loopback-only listener.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Config file. Without it, `./switchback.toml` and the platform config
    /// directory are searched.
    #[arg(long, env = "SWITCHBACK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the listener to.
    #[arg(long, env = "SWITCHBACK_BIND")]
    bind: Option<String>,

    /// Port to listen on; also written into rewritten playlist links.
    #[arg(long, env = "SWITCHBACK_PORT")]
    port: Option<u16>,

    /// Directory holding `index.html` and the other static assets.
    #[arg(long, env = "SWITCHBACK_ASSETS")]
    assets: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = resolve_config(&args)?;

    let (audit_tx, audit_rx) = mpsc::channel(AUDIT_CHANNEL_CAPACITY);
    tokio::spawn(drain_audit(audit_rx));

    switchback_gateway::start_gateway(&config, Some(audit_tx)).await
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// File (explicit or discovered), then environment, then flags.
fn resolve_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = switchback_config::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            switchback_config::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        },
        None => switchback_config::discover_and_load(),
    };
    apply_args(&mut config, args);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn apply_args(config: &mut GatewayConfig, args: &Args) {
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(assets) = &args.assets {
        config.server.assets_dir = assets.clone();
    }
}

/// Forward audit entries to the log under a dedicated target so they can be
/// filtered with `RUST_LOG=switchback::audit=info`.
async fn drain_audit(mut rx: mpsc::Receiver<NetworkAuditEntry>) {
    while let Some(entry) = rx.recv().await {
        tracing::info!(
            target: "switchback::audit",
            peer = %entry.peer,
            action = %entry.action,
            url = %entry.url,
            host = entry.host.as_deref(),
            mode = entry.mode.as_deref(),
            status = entry.status,
            bytes = entry.bytes,
            duration_ms = entry.duration_ms,
            error = entry.error.as_deref(),
            "proxy request"
        );
    }
}
