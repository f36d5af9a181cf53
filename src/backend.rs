//! Backend modules
//!
//! A module is a named integration offering given-side setup, then-side
//! assertions, or both. The orchestrator only ever sees the traits below;
//! new backends are added by registering another implementation.

use crate::contract::Contract;
use crate::error::{ContractError, ModuleError};
use crate::evaluate::EvaluationContext;
use crate::generate::generate_context;
use crate::invoke::ResponseIndex;
use crate::merge::ModuleBatch;
use crate::types::{CoordinateIndex, ScenarioId, ScenarioMap, Variables};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

pub mod cassandra;
pub mod pool;
pub mod response;

pub use cassandra::{CassandraEndpoint, CassandraModule, CqlConnector, CqlSession, Row};
pub use pool::ConnectionPool;
pub use response::ResponseModule;

/// Per-scenario actual-vs-expected comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub detail: Value,
}

impl Verdict {
    pub fn new(passed: bool, detail: Value) -> Self {
        Self { passed, detail }
    }
}

/// Verdicts of one then-module, grouped by scenario
pub type ModuleVerdicts = IndexMap<ScenarioId, Vec<Verdict>>;

/// Read-only inputs shared by every module executor of a run
#[derive(Debug, Clone, Copy)]
pub struct ModuleContext<'a> {
    pub contract: &'a Contract,
    pub coordinates: &'a CoordinateIndex,
    pub scenarios: &'a ScenarioMap,
    pub variables: &'a Variables,
}

impl<'a> ModuleContext<'a> {
    /// Fresh evaluation context for one scenario
    pub fn evaluation_context(
        &self,
        scenario_id: ScenarioId,
    ) -> Result<EvaluationContext<'a>, ModuleError> {
        let coordinates = self
            .coordinates
            .get(&scenario_id)
            .ok_or(ContractError::UnknownScenario(scenario_id))?;
        let generated = generate_context(self.contract, coordinates, scenario_id, self.variables)?;
        Ok(EvaluationContext::new(
            generated.variables,
            generated.request.to_value(),
            scenario_id,
        ))
    }

    /// Evaluation context carrying the responses captured for the scenario
    pub fn evaluation_context_with_responses(
        &self,
        scenario_id: ScenarioId,
        responses: &ResponseIndex,
    ) -> Result<EvaluationContext<'a>, ModuleError> {
        let captured = responses
            .get(&scenario_id)
            .map(|captured| serde_json::to_value(captured).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        Ok(self.evaluation_context(scenario_id)?.with_response(captured))
    }
}

/// Lifecycle shared by all modules
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// Release stateful connections opened during a run
    async fn release(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Given-phase side effects
#[async_trait]
pub trait GivenModule: Module {
    /// Operations this module reads from a scenario's `given.<name>` fragment
    fn given_operations(&self) -> &[&'static str];

    async fn execute_given(
        &self,
        batch: &ModuleBatch,
        context: ModuleContext<'_>,
    ) -> Result<(), ModuleError>;
}

/// Then-phase assertions
#[async_trait]
pub trait ThenModule: Module {
    /// Operations this module reads from a scenario's `then.<name>` fragment
    fn then_operations(&self) -> &[&'static str];

    /// Fragment assumed when a scenario omits the operation entirely
    fn default_then_fragment(&self, _operation: &str) -> Option<Value> {
        None
    }

    async fn execute_then(
        &self,
        batch: &ModuleBatch,
        context: ModuleContext<'_>,
        responses: &ResponseIndex,
    ) -> Result<ModuleVerdicts, ModuleError>;
}

/// Named module implementations, registered at startup.
///
/// Owned by exactly one orchestrator, which runs one scenario set at a time.
#[derive(Default)]
pub struct ModuleRegistry {
    given: IndexMap<String, Arc<dyn GivenModule>>,
    then: IndexMap<String, Arc<dyn ThenModule>>,
    lifecycle: IndexMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module for the given phase
    pub fn register_given<M: GivenModule + 'static>(&mut self, module: Arc<M>) {
        let name = module.name().to_string();
        let lifecycle: Arc<dyn Module> = module.clone();
        self.lifecycle.entry(name.clone()).or_insert(lifecycle);
        self.given.insert(name, module);
    }

    /// Register a module for the then phase
    pub fn register_then<M: ThenModule + 'static>(&mut self, module: Arc<M>) {
        let name = module.name().to_string();
        let lifecycle: Arc<dyn Module> = module.clone();
        self.lifecycle.entry(name.clone()).or_insert(lifecycle);
        self.then.insert(name, module);
    }

    pub fn given(&self) -> impl Iterator<Item = (&str, &Arc<dyn GivenModule>)> {
        self.given.iter().map(|(name, module)| (name.as_str(), module))
    }

    pub fn then(&self) -> impl Iterator<Item = (&str, &Arc<dyn ThenModule>)> {
        self.then.iter().map(|(name, module)| (name.as_str(), module))
    }

    /// Every distinct registered module, for teardown
    pub fn modules(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.lifecycle.values()
    }

    /// Registry with the built-in cassandra and response modules
    pub fn with_builtin<C: CqlConnector + 'static>(connector: C) -> Self {
        let mut registry = Self::new();
        let cassandra = Arc::new(CassandraModule::new(connector));
        registry.register_given(cassandra.clone());
        registry.register_then(cassandra);
        registry.register_then(Arc::new(ResponseModule::new()));
        registry
    }
}

/// Run every item concurrently on the current task and collect every outcome.
///
/// Items are dispatched in order but may complete in any order; outcomes are
/// returned in dispatch order.
pub async fn settle_all<I, T, E, F, Fut>(items: Vec<I>, run: F) -> Vec<Result<T, E>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut pending: FuturesUnordered<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let fut = run(item);
            async move { (index, fut.await) }
        })
        .collect();

    let mut settled = Vec::new();
    while let Some(outcome) = pending.next().await {
        settled.push(outcome);
    }
    settled.sort_by_key(|(index, _)| *index);
    settled.into_iter().map(|(_, outcome)| outcome).collect()
}

/// [`settle_all`] for one module's batch.
///
/// When any item fails, the failures of the whole batch are reported together
/// as one [`ModuleError::Aggregated`].
pub async fn settle<I, T, F, Fut>(module: &str, items: Vec<I>, run: F) -> Result<Vec<T>, ModuleError>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, ModuleError>>,
{
    let settled = settle_all(items, run).await;

    let mut outputs = Vec::with_capacity(settled.len());
    let mut failures = Vec::new();
    for (index, outcome) in settled.into_iter().enumerate() {
        match outcome {
            Ok(output) => outputs.push(output),
            Err(err) => {
                warn!(module, entry = index, error = %err, "Module entry failed");
                failures.push(err.to_string());
            }
        }
    }

    if failures.is_empty() {
        Ok(outputs)
    } else {
        Err(ModuleError::Aggregated {
            module: module.to_string(),
            failures,
        })
    }
}
