//! Scenario extraction
//!
//! Walks `paths → pathItem → method → responses → responseCode`, pulls the
//! scenario list out of each response's reserved extension, and assigns every
//! scenario its content-addressed identity. The returned contract has the
//! extension stripped and path-level parameters merged into each method.

use crate::contract::{Contract, METHOD_NAMES, SCENARIOS_EXTENSION};
use crate::error::ContractError;
use crate::identity::compute_scenario_id;
use crate::types::{CoordinateIndex, ScenarioBody, ScenarioCoordinates, ScenarioMap};
use serde_json::{Map, Value};
use tracing::debug;

/// Output of [`extract_scenarios`]
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Contract with scenario extensions removed
    pub contract: Contract,
    pub coordinates: CoordinateIndex,
    pub scenarios: ScenarioMap,
}

/// Extract scenarios from a dereferenced contract document
pub fn extract_scenarios(document: Value) -> Result<Extraction, ContractError> {
    let mut document = document;
    let mut coordinates = CoordinateIndex::new();
    let mut scenarios = ScenarioMap::new();

    if let Some(Value::Object(paths)) = document.get_mut("paths") {
        for (path, path_item) in paths.iter_mut() {
            let Value::Object(path_item) = path_item else {
                continue;
            };
            reduce_path_item(path, path_item, &mut coordinates, &mut scenarios)?;
        }
    }

    debug!(scenario_count = scenarios.len(), "Scenarios extracted");

    Ok(Extraction {
        contract: Contract::new(document),
        coordinates,
        scenarios,
    })
}

fn reduce_path_item(
    path: &str,
    path_item: &mut Map<String, Value>,
    coordinates: &mut CoordinateIndex,
    scenarios: &mut ScenarioMap,
) -> Result<(), ContractError> {
    let shared_parameters = match path_item.get("parameters") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    for method in METHOD_NAMES {
        let Some(Value::Object(operation)) = path_item.get_mut(method) else {
            continue;
        };

        let own_parameters = match operation.get("parameters") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        let merged = merge_parameters(&shared_parameters, &own_parameters);
        if !merged.is_empty() {
            operation.insert("parameters".to_string(), Value::Array(merged));
        }

        let Some(Value::Object(responses)) = operation.get_mut("responses") else {
            continue;
        };
        for (response_code, response) in responses.iter_mut() {
            let Value::Object(response) = response else {
                continue;
            };
            let Some(declared) = response.shift_remove(SCENARIOS_EXTENSION) else {
                continue;
            };
            reduce_scenarios(path, method, response_code, declared, coordinates, scenarios)?;
        }
    }

    Ok(())
}

fn reduce_scenarios(
    path: &str,
    method: &str,
    response_code: &str,
    declared: Value,
    coordinates: &mut CoordinateIndex,
    scenarios: &mut ScenarioMap,
) -> Result<(), ContractError> {
    let items = match declared {
        Value::Array(items) => items,
        Value::Null => return Ok(()),
        other => {
            return Err(ContractError::Malformed {
                location: format!("{} {} {}", method, path, response_code),
                message: format!("{} must be a list, got {}", SCENARIOS_EXTENSION, other),
            })
        }
    };

    for (scenario_index, item) in items.into_iter().enumerate() {
        let scenario_coordinates = ScenarioCoordinates {
            path: path.to_string(),
            method: method.to_string(),
            response_code: response_code.to_string(),
            scenario_index,
        };
        let body: ScenarioBody =
            serde_json::from_value(item).map_err(|e| ContractError::Malformed {
                location: format!("{} {} {} #{}", method, path, response_code, scenario_index),
                message: e.to_string(),
            })?;
        let scenario_id = compute_scenario_id(&scenario_coordinates);
        coordinates.insert(scenario_id, scenario_coordinates);
        scenarios.insert(scenario_id, body);
    }

    Ok(())
}

/// Path-level parameters followed by method-level ones; on a name collision
/// the method-level declaration wins and the shared one is dropped.
fn merge_parameters(shared: &[Value], own: &[Value]) -> Vec<Value> {
    let own_names: Vec<&str> = own.iter().filter_map(parameter_name).collect();

    let mut merged: Vec<Value> = Vec::with_capacity(shared.len() + own.len());
    for parameter in shared {
        let overridden = parameter_name(parameter)
            .map(|name| own_names.contains(&name))
            .unwrap_or(false);
        let duplicate = merged.iter().any(|existing| existing == parameter);
        if !overridden && !duplicate {
            merged.push(parameter.clone());
        }
    }
    for parameter in own {
        if !merged.iter().any(|existing| existing == parameter) {
            merged.push(parameter.clone());
        }
    }
    merged
}

fn parameter_name(parameter: &Value) -> Option<&str> {
    parameter.get("name").and_then(Value::as_str)
}
