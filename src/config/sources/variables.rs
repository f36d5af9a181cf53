//! `[variables]` tables read with their key case intact.
//!
//! The `config` crate folds every key to lowercase, so `EXT` names such as
//! `cassandraContactPoint` are read straight from the files instead.

use crate::error::ConfigError;
use crate::types::Variables;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const SECTION: &str = "variables";

#[derive(Debug, Default, Deserialize)]
struct VariablesOnly {
    #[serde(default)]
    variables: Variables,
}

/// Variables declared in one file; TOML unless the extension says JSON or YAML
pub fn read_file(path: &Path) -> Result<Variables, ConfigError> {
    let load_error = |message: String| {
        ConfigError::Load(format!(
            "Failed to read variables from {}: {}",
            path.display(),
            message
        ))
    };

    let content = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let document: Value = match extension.as_deref() {
        Some("json") => serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| load_error(e.to_string()))?
        }
        _ => {
            let table: toml::Value =
                toml::from_str(&content).map_err(|e| load_error(e.to_string()))?;
            serde_json::to_value(table).map_err(|e| load_error(e.to_string()))?
        }
    };

    match document.get(SECTION) {
        None | Some(Value::Null) => Ok(Variables::new()),
        Some(section) => serde_json::from_value(section.clone())
            .map_err(|e| load_error(format!("[{}] must be a table: {}", SECTION, e))),
    }
}

/// Variables of every file, later files overriding earlier ones
pub fn read_layered(paths: &[PathBuf]) -> Result<Variables, ConfigError> {
    let mut layered = Variables::new();
    for path in paths {
        layered.extend(read_file(path)?);
    }
    Ok(layered)
}

/// Variables set through `TREST__VARIABLES__*`, with folded names
pub fn from_environment(environment: config::Environment) -> Result<Variables, ConfigError> {
    let only: VariablesOnly = config::Config::builder()
        .add_source(environment)
        .build()?
        .try_deserialize()?;
    Ok(only.variables)
}

/// Apply overrides whose names lost their case; an override replaces the
/// file variable of the same name ignoring case and keeps the file's spelling.
pub fn apply_overrides(mut variables: Variables, overrides: Variables) -> Variables {
    for (name, value) in overrides {
        let key = variables
            .keys()
            .find(|existing| existing.eq_ignore_ascii_case(&name))
            .cloned()
            .unwrap_or(name);
        variables.insert(key, value);
    }
    variables
}
