//! Deterministic request synthesis
//!
//! Every header and path parameter value is a SHA-512 digest of
//! `scenarioId|location|index`, where `index` counts parameters within their
//! own location. The same scenario therefore always regenerates the same
//! request, with no state kept between calls.

use crate::contract::{Contract, Operation, ParameterLocation};
use crate::error::ContractError;
use crate::identity::sha512_hex;
use crate::types::{ScenarioCoordinates, ScenarioId, Variables};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};

/// Placeholder produced for `number`/`integer` parameter schemas
pub const NUMERIC_PLACEHOLDER: i64 = 0;

/// Synthetic request values for one scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedRequest {
    pub headers: IndexMap<String, Value>,
    pub path: IndexMap<String, Value>,
}

impl GeneratedRequest {
    /// Request tree addressed by `REQ` expressions
    pub fn to_value(&self) -> Value {
        json!({
            "headers": self.headers,
            "path": self.path,
        })
    }
}

/// Request with its path template filled in, ready to send
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRequest {
    pub headers: IndexMap<String, String>,
    pub path: String,
}

/// Generated request plus the external variables it is evaluated with
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContext<'a> {
    pub request: GeneratedRequest,
    pub variables: &'a Variables,
}

/// Resolve the scenario's operation and synthesize its request
pub fn generate_context<'a>(
    contract: &Contract,
    coordinates: &ScenarioCoordinates,
    scenario_id: ScenarioId,
    variables: &'a Variables,
) -> Result<GeneratedContext<'a>, ContractError> {
    let operation = contract.operation(&coordinates.path, &coordinates.method)?;
    Ok(GeneratedContext {
        request: generate_request(&operation, scenario_id)?,
        variables,
    })
}

/// Synthesize header and path parameter values for an operation
pub fn generate_request(
    operation: &Operation,
    scenario_id: ScenarioId,
) -> Result<GeneratedRequest, ContractError> {
    Ok(GeneratedRequest {
        headers: generate_parameters(operation, scenario_id, ParameterLocation::Header)?,
        path: generate_parameters(operation, scenario_id, ParameterLocation::Path)?,
    })
}

fn generate_parameters(
    operation: &Operation,
    scenario_id: ScenarioId,
    location: ParameterLocation,
) -> Result<IndexMap<String, Value>, ContractError> {
    operation
        .parameters_in(location)
        .enumerate()
        .map(|(index, parameter)| {
            let value = match parameter.schema_type() {
                Some("string") => Value::String(sha512_hex(&format!(
                    "{}|{}|{}",
                    scenario_id,
                    location.as_str(),
                    index
                ))),
                Some("number") | Some("integer") => Value::from(NUMERIC_PLACEHOLDER),
                other => {
                    return Err(ContractError::UnsupportedSchemaType(
                        other.unwrap_or("<none>").to_string(),
                    ))
                }
            };
            Ok((parameter.name.clone(), value))
        })
        .collect()
}

/// Fill `{name}` placeholders of a path template and stringify headers
pub fn render_request(path_template: &str, request: &GeneratedRequest) -> RenderedRequest {
    let path = request
        .path
        .iter()
        .fold(path_template.to_string(), |path, (name, value)| {
            path.replace(&format!("{{{}}}", name), &value_text(value))
        });

    RenderedRequest {
        headers: request
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value_text(value)))
            .collect(),
        path,
    }
}

/// Raw text of strings, JSON text of everything else
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
