//! Config file discovery and loading.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, GatewayConfig, Result};

pub const CONFIG_FILE_NAME: &str = "switchback.toml";

/// Load a config file. Missing files are an error here; use
/// [`discover_and_load`] for best-effort startup loading.
pub fn load(path: &Path) -> Result<GatewayConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: GatewayConfig = toml::from_str(&raw).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Candidate locations, in priority order: working directory, then the
/// platform config directory.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "switchback") {
        paths.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    paths
}

/// Load the first config file found, falling back to defaults. A broken
/// file is logged and ignored so the gateway still starts.
pub fn discover_and_load() -> GatewayConfig {
    let mut config = discover_in(&candidate_paths());
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

fn discover_in(paths: &[PathBuf]) -> GatewayConfig {
    for path in paths {
        if !path.is_file() {
            continue;
        }
        match load(path) {
            Ok(config) => return config,
            Err(e) => {
                warn!("ignoring config file: {e}");
                return GatewayConfig::default();
            },
        }
    }
    debug!("no config file found, using defaults");
    GatewayConfig::default()
}

/// Apply `SWITCHBACK_BIND`, `SWITCHBACK_PORT` and `SWITCHBACK_ASSETS`.
///
/// `lookup` abstracts the environment so tests don't mutate process state.
pub fn apply_env_overrides(config: &mut GatewayConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("SWITCHBACK_BIND").filter(|v| !v.is_empty()) {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("SWITCHBACK_PORT") {
        match port.parse::<u16>() {
            Ok(port) if port != 0 => config.server.port = port,
            _ => warn!(value = %port, "ignoring invalid SWITCHBACK_PORT"),
        }
    }
    if let Some(assets) = lookup("SWITCHBACK_ASSETS").filter(|v| !v.is_empty()) {
        config.server.assets_dir = PathBuf::from(assets);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, std::collections::HashMap};

    #[test]
    fn load_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[server]\nport = 9123\n").unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.server.port, 9123);
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(load(&missing), Err(Error::Read { .. })));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[server\nport = ").unwrap();
        assert!(matches!(load(&broken), Err(Error::Parse { .. })));

        let invalid = dir.path().join("invalid.toml");
        std::fs::write(&invalid, "[server]\nport = 0\n").unwrap();
        assert!(matches!(load(&invalid), Err(Error::Invalid { .. })));
    }

    #[test]
    fn discover_uses_first_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        std::fs::write(&second, "[server]\nport = 9001\n").unwrap();

        let config = discover_in(&[first.clone(), second.clone()]);
        assert_eq!(config.server.port, 9001);

        std::fs::write(&first, "[server]\nport = 9000\n").unwrap();
        let config = discover_in(&[first, second]);
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn discover_falls_back_to_defaults_on_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "not = [valid").unwrap();

        assert_eq!(discover_in(&[path]), GatewayConfig::default());
        assert_eq!(discover_in(&[]), GatewayConfig::default());
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SWITCHBACK_BIND", "::1"),
            ("SWITCHBACK_PORT", "9555"),
            ("SWITCHBACK_ASSETS", "/srv/web"),
        ]);
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.server.bind, "::1");
        assert_eq!(config.server.port, 9555);
        assert_eq!(config.server.assets_dir, PathBuf::from("/srv/web"));

        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |k| {
            (k == "SWITCHBACK_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.server.port, 8123);
    }
}
