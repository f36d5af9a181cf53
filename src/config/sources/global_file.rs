//! Global config file source: $XDG_CONFIG_HOME/trest/config.toml or ~/.config/trest/config.toml

use std::path::PathBuf;
use tracing::debug;

/// Path to global config file.
pub fn global_config_path() -> Option<PathBuf> {
    let config_home = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config"))
        })?;
    Some(config_home.join("trest").join("config.toml"))
}

/// Global config file, if present on disk.
pub fn existing_config_file() -> Option<PathBuf> {
    let global_path = global_config_path()?;
    if !global_path.exists() {
        debug!(
            config_path = %global_path.display(),
            "No global configuration file"
        );
        return None;
    }
    Some(
        global_path
            .canonicalize()
            .unwrap_or_else(|_| global_path.clone()),
    )
}
