//! Contract document access
//!
//! The contract arrives already dereferenced and validated; this module only
//! offers typed views over the parts the pipeline reads.

use crate::error::ContractError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// HTTP methods that may appear under a path item
pub const METHOD_NAMES: [&str; 8] = [
    "delete", "get", "head", "options", "patch", "post", "put", "trace",
];

/// Reserved response extension holding the scenario list
pub const SCENARIOS_EXTENSION: &str = "x-trest-scenarios";

/// Parameter location (`in`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Header,
    Path,
    Query,
    Cookie,
    /// Any location request synthesis does not read, e.g. Swagger 2 `body`
    #[serde(other)]
    Other,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Header => "header",
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Cookie => "cookie",
            ParameterLocation::Other => "other",
        }
    }
}

/// Operation parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub schema: Option<Value>,
}

impl Parameter {
    /// Declared schema type, if any
    pub fn schema_type(&self) -> Option<&str> {
        self.schema
            .as_ref()
            .and_then(|schema| schema.get("type"))
            .and_then(Value::as_str)
    }
}

/// View over one operation of the contract
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub path: String,
    pub method: String,
    pub parameters: Vec<Parameter>,
}

impl Operation {
    /// Parameters declared at the given location, in declaration order
    pub fn parameters_in(&self, location: ParameterLocation) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(move |parameter| parameter.location == location)
    }
}

/// Dereferenced contract document
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    document: Value,
}

impl Contract {
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn into_document(self) -> Value {
        self.document
    }

    /// Raw operation object at `paths.{path}.{method}`
    pub fn operation_value(&self, path: &str, method: &str) -> Option<&Value> {
        self.document
            .get("paths")
            .and_then(|paths| paths.get(path))
            .and_then(|path_item| path_item.get(method))
            .filter(|operation| !operation.is_null())
    }

    /// Typed view of an operation; fails when the operation is absent
    pub fn operation(&self, path: &str, method: &str) -> Result<Operation, ContractError> {
        let operation =
            self.operation_value(path, method)
                .ok_or_else(|| ContractError::MissingOperation {
                    method: method.to_string(),
                    path: path.to_string(),
                })?;

        let parameters = match operation.get("parameters") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    serde_json::from_value::<Parameter>(item.clone()).map_err(|e| {
                        ContractError::Malformed {
                            location: format!("{} {} parameters", method, path),
                            message: e.to_string(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok(Operation {
            path: path.to_string(),
            method: method.to_string(),
            parameters,
        })
    }

    /// Server URLs with server-variable defaults substituted
    pub fn servers(&self) -> Vec<String> {
        let Some(Value::Array(servers)) = self.document.get("servers") else {
            return Vec::new();
        };

        servers
            .iter()
            .filter_map(|server| {
                let mut url = server.get("url")?.as_str()?.to_string();
                if let Some(Value::Object(variables)) = server.get("variables") {
                    for (name, variable) in variables {
                        if let Some(default) = variable.get("default").and_then(Value::as_str) {
                            url = url.replace(&format!("{{{}}}", name), default);
                        }
                    }
                }
                Some(url.trim_end_matches('/').to_string())
            })
            .collect()
    }
}

/// Load a dereferenced contract document from a JSON or YAML file
pub fn load_document(path: &Path) -> Result<Value, ContractError> {
    let load_error = |message: String| ContractError::Load {
        path: path.display().to_string(),
        message,
    };

    let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&text).map_err(|e| load_error(e.to_string()))
    } else {
        serde_yaml::from_str(&text).map_err(|e| load_error(e.to_string()))
    }
}
