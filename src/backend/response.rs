//! HTTP response module
//!
//! Compares the status of every captured response against the scenario's
//! `statusCode` expectation. A mismatch is a failed verdict, never an error.

use super::{settle, Module, ModuleContext, ModuleVerdicts, ThenModule, Verdict};
use crate::error::ModuleError;
use crate::evaluate::evaluate_value;
use crate::invoke::ResponseIndex;
use crate::merge::{BatchEntry, ModuleBatch};
use crate::types::ScenarioId;
use async_trait::async_trait;
use serde_json::{json, Value};

const MODULE_NAME: &str = "response";
const STATUS_CODE: &str = "statusCode";

/// Expectation assumed when a scenario declares no `statusCode`
pub const DEFAULT_STATUS_EXPECTATION: &str = "2XX";

/// Expected status: one exact code or a whole class such as `2XX`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusExpectation {
    Exact(u16),
    Class(u16),
}

impl StatusExpectation {
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()).map(Self::Exact),
            Value::String(s) => Self::parse_str(s.trim()),
            _ => None,
        }
    }

    fn parse_str(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() == 3 && bytes[1..].eq_ignore_ascii_case(b"xx") {
            let class = (bytes[0] as char).to_digit(10)?;
            return (1..=5).contains(&class).then_some(Self::Class(class as u16));
        }
        s.parse().ok().map(Self::Exact)
    }

    pub fn matches(&self, status: u16) -> bool {
        match self {
            Self::Exact(code) => *code == status,
            Self::Class(class) => status / 100 == *class,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseModule;

impl ResponseModule {
    pub fn new() -> Self {
        Self
    }

    fn check(
        entry: &BatchEntry,
        context: ModuleContext<'_>,
        responses: &ResponseIndex,
    ) -> Result<(ScenarioId, Vec<Verdict>), ModuleError> {
        let evaluation = context.evaluation_context_with_responses(entry.scenario_id, responses)?;
        let expected = evaluate_value(&entry.fragment, &evaluation)?;
        let expectation =
            StatusExpectation::parse(&expected).ok_or_else(|| ModuleError::InvalidFragment {
                module: MODULE_NAME.to_string(),
                scenario: entry.scenario_id,
                message: format!("unrecognised status code expectation {}", expected),
            })?;

        let captured = responses
            .get(&entry.scenario_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let verdicts = if captured.is_empty() {
            vec![Verdict::new(
                false,
                json!({
                    "expectedStatusCode": expected,
                    "actualStatusCode": null,
                    "server": null,
                }),
            )]
        } else {
            captured
                .iter()
                .map(|response| {
                    Verdict::new(
                        expectation.matches(response.status),
                        json!({
                            "expectedStatusCode": expected,
                            "actualStatusCode": response.status,
                            "server": response.server,
                        }),
                    )
                })
                .collect()
        };

        Ok((entry.scenario_id, verdicts))
    }
}

#[async_trait]
impl Module for ResponseModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }
}

#[async_trait]
impl ThenModule for ResponseModule {
    fn then_operations(&self) -> &[&'static str] {
        &[STATUS_CODE]
    }

    fn default_then_fragment(&self, operation: &str) -> Option<Value> {
        (operation == STATUS_CODE).then(|| Value::String(DEFAULT_STATUS_EXPECTATION.to_string()))
    }

    async fn execute_then(
        &self,
        batch: &ModuleBatch,
        context: ModuleContext<'_>,
        responses: &ResponseIndex,
    ) -> Result<ModuleVerdicts, ModuleError> {
        let entries: Vec<&BatchEntry> = batch.entries(STATUS_CODE).iter().collect();
        let checked = settle(MODULE_NAME, entries, |entry| async move {
            Self::check(entry, context, responses)
        })
        .await?;

        let mut verdicts = ModuleVerdicts::new();
        for (scenario_id, scenario_verdicts) in checked {
            verdicts
                .entry(scenario_id)
                .or_default()
                .extend(scenario_verdicts);
        }
        Ok(verdicts)
    }
}
