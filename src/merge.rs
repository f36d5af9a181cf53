//! Scenario merging
//!
//! Regroups the flat scenario map into per-module batches. Each batch is
//! rebuilt from scratch on every call; every operation a module declares is
//! present, possibly empty.

use crate::backend::ModuleRegistry;
use crate::types::{Phase, ScenarioBody, ScenarioId, ScenarioMap};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// One scenario's fragment for one module operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub scenario_id: ScenarioId,
    pub fragment: Value,
}

/// Entries of one module in one phase, grouped by operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ModuleBatch {
    operations: IndexMap<String, Vec<BatchEntry>>,
}

impl ModuleBatch {
    fn with_operations(operations: &[&'static str]) -> Self {
        Self {
            operations: operations
                .iter()
                .map(|operation| (operation.to_string(), Vec::new()))
                .collect(),
        }
    }

    /// Entries of an operation; empty when the operation is unknown
    pub fn entries(&self, operation: &str) -> &[BatchEntry] {
        self.operations
            .get(operation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All entries paired with their operation, in operation then batch order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BatchEntry)> {
        self.operations.iter().flat_map(|(operation, entries)| {
            entries.iter().map(move |entry| (operation.as_str(), entry))
        })
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batches for every registered module, per phase
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedScenarios {
    pub given: IndexMap<String, ModuleBatch>,
    pub then: IndexMap<String, ModuleBatch>,
}

impl MergedScenarios {
    pub fn batch(&self, phase: Phase, module: &str) -> Option<&ModuleBatch> {
        match phase {
            Phase::Given => self.given.get(module),
            Phase::Then => self.then.get(module),
        }
    }
}

/// Merge scenarios into batches for every module in the registry
pub fn merge_scenarios(scenarios: &ScenarioMap, registry: &ModuleRegistry) -> MergedScenarios {
    let given = registry
        .given()
        .map(|(name, module)| {
            let batch = merge_module(scenarios, Phase::Given, name, module.given_operations(), |_| {
                None
            });
            (name.to_string(), batch)
        })
        .collect();

    let then = registry
        .then()
        .map(|(name, module)| {
            let batch = merge_module(scenarios, Phase::Then, name, module.then_operations(), |op| {
                module.default_then_fragment(op)
            });
            (name.to_string(), batch)
        })
        .collect();

    MergedScenarios { given, then }
}

fn merge_module<D>(
    scenarios: &ScenarioMap,
    phase: Phase,
    module: &str,
    operations: &[&'static str],
    default_fragment: D,
) -> ModuleBatch
where
    D: Fn(&str) -> Option<Value>,
{
    let mut batch = ModuleBatch::with_operations(operations);

    for (scenario_id, scenario) in scenarios {
        for operation in operations {
            let fragments = match declared_fragment(scenario, phase, module, operation) {
                Some(declared) => fan_out(declared),
                None => default_fragment(operation).into_iter().collect(),
            };
            if let Some(entries) = batch.operations.get_mut(*operation) {
                entries.extend(fragments.into_iter().map(|fragment| BatchEntry {
                    scenario_id: *scenario_id,
                    fragment,
                }));
            }
        }
    }

    batch
}

fn declared_fragment<'s>(
    scenario: &'s ScenarioBody,
    phase: Phase,
    module: &str,
    operation: &str,
) -> Option<&'s Value> {
    scenario
        .section(phase)
        .get(module)
        .and_then(|fragment| fragment.get(operation))
        .filter(|declared| !declared.is_null())
}

/// A declared list contributes one entry per element, anything else one entry
pub(crate) fn fan_out(declared: &Value) -> Vec<Value> {
    match declared {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}
