//! Workspace config file source: config/config.toml and config/{env}.toml

use std::path::{Path, PathBuf};

/// Environment selecting the env-specific workspace file
pub const ENV_NAME_VAR: &str = "TREST_ENV";

/// Workspace config files present on disk, lowest precedence first:
/// config/config.toml (base) then config/{TREST_ENV}.toml (env-specific).
pub fn existing_config_files(workspace_root: &Path) -> Vec<PathBuf> {
    let config_dir = workspace_root.join("config");
    let env_name = std::env::var(ENV_NAME_VAR).unwrap_or_else(|_| "development".to_string());

    [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", env_name)),
    ]
    .into_iter()
    .filter(|path| path.exists())
    .collect()
}
