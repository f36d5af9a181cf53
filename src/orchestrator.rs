//! Run orchestration
//!
//! A run moves through `Idle → GivenRunning → Invoking → ThenRunning → Done`,
//! or to `Failed` from any running state. Phases are strictly sequential;
//! work inside a phase is in flight concurrently on the calling task. Every
//! registered module is released before the run returns, whatever happened.

use crate::backend::{settle_all, ModuleContext, ModuleRegistry, ModuleVerdicts};
use crate::config::TrestConfig;
use crate::error::{ContractError, RunError, RunPhase, TransportError};
use crate::extract::Extraction;
use crate::generate::{generate_request, render_request};
use crate::invoke::{HttpInvoker, OutboundRequest, RequestInvoker, ResponseIndex};
use crate::merge::{merge_scenarios, MergedScenarios, ModuleBatch};
use crate::types::{CoordinateIndex, Phase, ScenarioId, Variables};
use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    GivenRunning,
    Invoking,
    ThenRunning,
    Done,
    Failed,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub passed: Vec<ScenarioId>,
    pub failed: Vec<ScenarioId>,
    /// Verdicts per then-module, per scenario
    pub verdicts: IndexMap<String, ModuleVerdicts>,
}

impl RunReport {
    /// Split scenarios into passed and failed, in extraction order.
    ///
    /// A scenario fails when any then-module verdict for it failed.
    pub fn from_verdicts(
        coordinates: &CoordinateIndex,
        verdicts: IndexMap<String, ModuleVerdicts>,
    ) -> Self {
        let (failed, passed): (Vec<ScenarioId>, Vec<ScenarioId>) =
            coordinates.keys().copied().partition(|scenario_id| {
                verdicts.values().any(|module| {
                    module
                        .get(scenario_id)
                        .map(|list| list.iter().any(|verdict| !verdict.passed))
                        .unwrap_or(false)
                })
            });

        Self {
            passed,
            failed,
            verdicts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Orchestrator<I: RequestInvoker> {
    registry: ModuleRegistry,
    invoker: I,
    servers: Vec<String>,
    history: Mutex<Vec<RunState>>,
}

impl Orchestrator<HttpInvoker> {
    /// HTTP-backed orchestrator using the configured timeouts and servers
    pub fn from_config(registry: ModuleRegistry, config: &TrestConfig) -> Result<Self, TransportError> {
        let invoker = HttpInvoker::new(&config.http)?;
        Ok(Self::new(registry, invoker).with_servers(config.http.server_overrides()))
    }
}

impl<I: RequestInvoker> Orchestrator<I> {
    pub fn new(registry: ModuleRegistry, invoker: I) -> Self {
        Self {
            registry,
            invoker,
            servers: Vec::new(),
            history: Mutex::new(vec![RunState::Idle]),
        }
    }

    /// Invoke these servers instead of the ones the contract declares
    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// States visited by the most recent run
    pub fn history(&self) -> Vec<RunState> {
        self.history.lock().clone()
    }

    pub fn state(&self) -> RunState {
        self.history.lock().last().copied().unwrap_or(RunState::Idle)
    }

    fn transition(&self, state: RunState) {
        let mut history = self.history.lock();
        let from = history.last().copied().unwrap_or(RunState::Idle);
        history.push(state);
        info!(from = ?from, to = ?state, "Run state changed");
    }

    /// Execute every extracted scenario and report the outcome.
    ///
    /// Runs are exclusive: modules own their connection pools, and teardown
    /// at the end of one run releases every pooled connection.
    pub async fn run(
        &mut self,
        extraction: &Extraction,
        variables: &Variables,
    ) -> Result<RunReport, RunError> {
        *self.history.get_mut() = vec![RunState::Idle];
        info!(scenarios = extraction.scenarios.len(), "Starting test run");

        let merged = merge_scenarios(&extraction.scenarios, &self.registry);
        let context = ModuleContext {
            contract: &extraction.contract,
            coordinates: &extraction.coordinates,
            scenarios: &extraction.scenarios,
            variables,
        };

        let outcome = self.execute_phases(&merged, context).await;
        let teardown = self.release_modules().await;

        match (outcome, teardown) {
            (Ok(report), Ok(())) => {
                self.transition(RunState::Done);
                info!(
                    passed = report.passed.len(),
                    failed = report.failed.len(),
                    "Test run finished"
                );
                Ok(report)
            }
            (Ok(_), Err(failures)) => {
                self.transition(RunState::Failed);
                let err = RunError::Teardown { failures };
                error!(error = %err, "Test run failed");
                Err(err)
            }
            (Err(err), teardown) => {
                if let Err(failures) = teardown {
                    warn!(?failures, "Backend teardown failed after aborted run");
                }
                self.transition(RunState::Failed);
                error!(error = %err, "Test execution failed");
                Err(err)
            }
        }
    }

    async fn execute_phases(
        &self,
        merged: &MergedScenarios,
        context: ModuleContext<'_>,
    ) -> Result<RunReport, RunError> {
        self.transition(RunState::GivenRunning);
        self.run_given(merged, context).await?;

        self.transition(RunState::Invoking);
        let responses = self.invoke_all(context).await?;

        self.transition(RunState::ThenRunning);
        let verdicts = self.run_then(merged, context, &responses).await?;

        Ok(RunReport::from_verdicts(context.coordinates, verdicts))
    }

    async fn run_given(
        &self,
        merged: &MergedScenarios,
        context: ModuleContext<'_>,
    ) -> Result<(), RunError> {
        let empty = ModuleBatch::default();
        let outcomes = join_all(self.registry.given().map(|(name, module)| {
            let batch = merged.batch(Phase::Given, name).unwrap_or(&empty);
            module.execute_given(batch, context)
        }))
        .await;

        let failures: Vec<String> = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.err().map(|e| e.to_string()))
            .collect();
        phase_result(RunPhase::Given, failures)
    }

    /// One request per scenario per server
    async fn invoke_all(&self, context: ModuleContext<'_>) -> Result<ResponseIndex, RunError> {
        let servers = if self.servers.is_empty() {
            context.contract.servers()
        } else {
            self.servers.clone()
        };
        if servers.is_empty() {
            return Err(RunError::PhaseFailed {
                phase: RunPhase::Invoking,
                failures: vec![ContractError::NoServers.to_string()],
            });
        }

        let mut failures = Vec::new();
        let mut requests = Vec::new();
        for (scenario_id, coordinates) in context.coordinates {
            let generated = context
                .contract
                .operation(&coordinates.path, &coordinates.method)
                .and_then(|operation| generate_request(&operation, *scenario_id));
            match generated {
                Ok(generated) => {
                    let rendered = render_request(&coordinates.path, &generated);
                    requests.extend(servers.iter().map(|server| {
                        (*scenario_id, OutboundRequest::new(server, coordinates, &rendered))
                    }));
                }
                Err(e) => failures.push(e.to_string()),
            }
        }
        phase_result(RunPhase::Invoking, failures)?;

        let outcomes = settle_all(requests, |(scenario_id, request)| async move {
            self.invoker
                .invoke(&request)
                .await
                .map(|response| (scenario_id, response))
        })
        .await;

        let mut responses = ResponseIndex::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((scenario_id, response)) => {
                    responses.entry(scenario_id).or_default().push(response)
                }
                Err(e) => {
                    warn!(error = %e, "Invocation failed");
                    failures.push(e.to_string());
                }
            }
        }
        phase_result(RunPhase::Invoking, failures)?;
        Ok(responses)
    }

    async fn run_then(
        &self,
        merged: &MergedScenarios,
        context: ModuleContext<'_>,
        responses: &ResponseIndex,
    ) -> Result<IndexMap<String, ModuleVerdicts>, RunError> {
        let empty = ModuleBatch::default();
        let outcomes = join_all(self.registry.then().map(|(name, module)| {
            let batch = merged.batch(Phase::Then, name).unwrap_or(&empty);
            async move { (name, module.execute_then(batch, context, responses).await) }
        }))
        .await;

        let mut verdicts = IndexMap::new();
        let mut failures = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(module_verdicts) => {
                    verdicts.insert(name.to_string(), module_verdicts);
                }
                Err(e) => failures.push(e.to_string()),
            }
        }
        phase_result(RunPhase::Then, failures)?;
        Ok(verdicts)
    }

    async fn release_modules(&self) -> Result<(), Vec<String>> {
        let outcomes = join_all(self.registry.modules().map(|module| async move {
            module
                .release()
                .await
                .map_err(|e| format!("{}: {}", module.name(), e))
        }))
        .await;

        let failures: Vec<String> = outcomes.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}

fn phase_result(phase: RunPhase, failures: Vec<String>) -> Result<(), RunError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(RunError::PhaseFailed { phase, failures })
    }
}
