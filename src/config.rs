//! Configuration System
//!
//! Layered configuration: built-in defaults, the global user file, workspace
//! files, then `TREST__SECTION__KEY` environment variables. Validation collects
//! every problem before reporting. Tests included.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::types::Variables;
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod variables;
    pub mod workspace_file;
}

pub use sources::global_file::global_config_path;

/// Prefix of environment overrides, e.g. `TREST__HTTP__REQUEST_TIMEOUT_SECS`
pub const ENV_PREFIX: &str = "TREST";
const ENV_SEPARATOR: &str = "__";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrestConfig {
    /// External variables resolved by `EXT` expressions
    #[serde(default)]
    pub variables: Variables,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Replaces the contract's declared servers when non-empty
    #[serde(default)]
    pub servers: Vec<String>,
}

pub(crate) fn default_connect_timeout_secs() -> u64 {
    10
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            servers: Vec::new(),
        }
    }
}

impl HttpConfig {
    fn validate(&self, errors: &mut Vec<String>) {
        if self.connect_timeout_secs == 0 {
            errors.push("http.connect_timeout_secs must be greater than zero".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("http.request_timeout_secs must be greater than zero".to_string());
        }
        for server in &self.servers {
            if server.trim().is_empty() {
                errors.push("http.servers entries cannot be empty".to_string());
            } else if !(server.starts_with("http://") || server.starts_with("https://")) {
                errors.push(format!(
                    "http.servers entry '{}' must start with http:// or https://",
                    server
                ));
            }
        }
    }

    /// Configured servers without trailing slashes
    pub fn server_overrides(&self) -> Vec<String> {
        self.servers
            .iter()
            .map(|server| server.trim_end_matches('/').to_string())
            .collect()
    }
}

impl TrestConfig {
    /// Validate the entire configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        self.http.validate(&mut errors);
        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }
        for name in self.variables.keys() {
            if name.trim().is_empty() {
                errors.push("variables cannot have an empty name".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
}

/// Builds a [`TrestConfig`] from its layered sources.
///
/// `variables` keep the key case written in the files; environment overrides
/// match them ignoring case.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, global file, workspace files and environment overrides
    pub fn load(workspace_root: &Path) -> Result<TrestConfig, ConfigError> {
        let mut files: Vec<PathBuf> = sources::global_file::existing_config_file()
            .into_iter()
            .collect();
        files.extend(sources::workspace_file::existing_config_files(workspace_root));

        let builder = files.iter().fold(
            merge::merge_policy::builder_with_defaults()?,
            |builder, path| builder.add_source(File::from(path.as_path()).required(false)),
        );
        let builder = builder.add_source(environment());

        let mut config: TrestConfig = builder.build()?.try_deserialize()?;
        config.variables = sources::variables::apply_overrides(
            sources::variables::read_layered(&files)?,
            sources::variables::from_environment(environment())?,
        );
        debug!(
            workspace_root = %workspace_root.display(),
            files = files.len(),
            variables = config.variables.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load a single explicit file on top of the defaults
    pub fn load_from_file(path: &Path) -> Result<TrestConfig, ConfigError> {
        let mut config: TrestConfig = merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        config.variables = sources::variables::read_file(path)?;
        Ok(config)
    }

    /// Global config path, if a home directory is known
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_config_path()
    }
}
