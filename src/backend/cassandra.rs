//! Cassandra module
//!
//! Given `present` seeds one row per entry; then `present`/`absent` checks
//! whether matching rows exist. The CQL wire protocol lives behind
//! [`CqlConnector`]; this module only builds statements, pools sessions, and
//! compares rows.

use super::{settle, GivenModule, Module, ModuleContext, ModuleVerdicts, ThenModule, Verdict};
use crate::backend::pool::ConnectionPool;
use crate::error::ModuleError;
use crate::evaluate::{evaluate_value, EvaluationContext};
use crate::generate::value_text;
use crate::identity::md5_hex;
use crate::invoke::ResponseIndex;
use crate::merge::{fan_out, BatchEntry, ModuleBatch};
use crate::types::ScenarioId;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

const MODULE_NAME: &str = "cassandra";
const PRESENT: &str = "present";
const ABSENT: &str = "absent";

/// Statement used to verify a freshly opened session
pub const PROBE_STATEMENT: &str = "SELECT now() FROM system.local";

/// One result row, column name to value
pub type Row = IndexMap<String, Value>;

/// Connection parameters of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CassandraEndpoint {
    pub contact_point: String,
    pub local_data_center: String,
}

impl CassandraEndpoint {
    /// Pool key: md5 of `contactPoint|localDataCenter`
    pub fn connection_key(&self) -> String {
        md5_hex(&format!("{}|{}", self.contact_point, self.local_data_center))
    }
}

impl fmt::Display for CassandraEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.contact_point, self.local_data_center)
    }
}

/// An open CQL session
#[async_trait]
pub trait CqlSession: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<Vec<Row>, ModuleError>;

    async fn shutdown(&self) -> Result<(), ModuleError>;
}

/// Opens CQL sessions
#[async_trait]
pub trait CqlConnector: Send + Sync {
    type Session: CqlSession + 'static;

    async fn connect(&self, endpoint: &CassandraEndpoint) -> Result<Self::Session, ModuleError>;
}

/// `INSERT INTO keyspace.table (c1,c2) VALUES ('v1','v2')`
pub fn insert_statement(keyspace: &str, table: &str, data: &Row) -> String {
    let columns: Vec<&str> = data.keys().map(String::as_str).collect();
    let values: Vec<String> = data
        .values()
        .map(|value| format!("'{}'", value_text(value).replace('\'', "''")))
        .collect();
    format!(
        "INSERT INTO {}.{} ({}) VALUES ({})",
        keyspace,
        table,
        columns.join(","),
        values.join(",")
    )
}

pub fn select_all_statement(keyspace: &str, table: &str) -> String {
    format!("SELECT * FROM {}.{}", keyspace, table)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedFragment {
    #[serde(flatten)]
    endpoint: CassandraEndpoint,
    keyspace: String,
    table: String,
    data: Row,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Expectation {
    Columns(Vec<String>),
    Values(Row),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssertFragment {
    #[serde(flatten)]
    endpoint: CassandraEndpoint,
    keyspace: String,
    table: String,
    data: Expectation,
}

pub struct CassandraModule<C: CqlConnector> {
    connector: C,
    pool: ConnectionPool<C::Session>,
}

impl<C: CqlConnector> CassandraModule<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            pool: ConnectionPool::new(),
        }
    }

    /// Sessions currently held by the pool
    pub fn open_sessions(&self) -> usize {
        self.pool.len()
    }

    async fn session(&self, endpoint: &CassandraEndpoint) -> Result<Arc<C::Session>, ModuleError> {
        self.pool
            .get_or_connect(&endpoint.connection_key(), || async {
                let session = self.connector.connect(endpoint).await?;
                session.execute(PROBE_STATEMENT).await?;
                info!(endpoint = %endpoint, "Cassandra session created");
                Ok::<_, ModuleError>(session)
            })
            .await
    }

    async fn seed(&self, entry: &BatchEntry, context: ModuleContext<'_>) -> Result<(), ModuleError> {
        let evaluation = context.evaluation_context(entry.scenario_id)?;
        let fragment: SeedFragment = parse_fragment(entry.scenario_id, &entry.fragment, &evaluation)?;

        let session = self.session(&fragment.endpoint).await?;
        let statement = insert_statement(&fragment.keyspace, &fragment.table, &fragment.data);
        debug!(scenario = %entry.scenario_id, statement = %statement, "Seeding row");
        session.execute(&statement).await?;
        Ok(())
    }

    async fn check(
        &self,
        operation: &str,
        entry: &BatchEntry,
        context: ModuleContext<'_>,
        responses: &ResponseIndex,
    ) -> Result<(ScenarioId, Verdict), ModuleError> {
        let evaluation = context.evaluation_context_with_responses(entry.scenario_id, responses)?;
        let fragment: AssertFragment =
            parse_fragment(entry.scenario_id, &entry.fragment, &evaluation)?;

        let expected = match &fragment.data {
            Expectation::Values(values) => vec![values.clone()],
            Expectation::Columns(columns) => seeded_rows(entry.scenario_id, &fragment, columns, context)?,
        };

        let session = self.session(&fragment.endpoint).await?;
        let rows = session
            .execute(&select_all_statement(&fragment.keyspace, &fragment.table))
            .await?;

        let found: Vec<bool> = expected
            .iter()
            .map(|wanted| rows.iter().any(|row| row_matches(row, wanted)))
            .collect();
        let passed = if operation == PRESENT {
            found.iter().all(|hit| *hit)
        } else {
            !found.iter().any(|hit| *hit)
        };

        Ok((
            entry.scenario_id,
            Verdict::new(
                passed,
                json!({
                    "operation": operation,
                    "keyspace": fragment.keyspace,
                    "table": fragment.table,
                    "expected": expected,
                    "found": found,
                }),
            ),
        ))
    }
}

#[async_trait]
impl<C: CqlConnector> Module for CassandraModule<C> {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    async fn release(&self) -> Result<(), ModuleError> {
        let sessions = self.pool.drain();
        if sessions.is_empty() {
            return Ok(());
        }
        let count = sessions.len();
        settle(MODULE_NAME, sessions, |session| async move { session.shutdown().await }).await?;
        info!(sessions = count, "Cassandra sessions shut down");
        Ok(())
    }
}

#[async_trait]
impl<C: CqlConnector> GivenModule for CassandraModule<C> {
    fn given_operations(&self) -> &[&'static str] {
        &[PRESENT]
    }

    async fn execute_given(
        &self,
        batch: &ModuleBatch,
        context: ModuleContext<'_>,
    ) -> Result<(), ModuleError> {
        let entries: Vec<&BatchEntry> = batch.entries(PRESENT).iter().collect();
        settle(MODULE_NAME, entries, |entry| self.seed(entry, context)).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: CqlConnector> ThenModule for CassandraModule<C> {
    fn then_operations(&self) -> &[&'static str] {
        &[PRESENT, ABSENT]
    }

    async fn execute_then(
        &self,
        batch: &ModuleBatch,
        context: ModuleContext<'_>,
        responses: &ResponseIndex,
    ) -> Result<ModuleVerdicts, ModuleError> {
        let entries: Vec<(&str, &BatchEntry)> = batch.iter().collect();
        let checked = settle(MODULE_NAME, entries, |(operation, entry)| {
            self.check(operation, entry, context, responses)
        })
        .await?;

        let mut verdicts = ModuleVerdicts::new();
        for (scenario_id, verdict) in checked {
            verdicts.entry(scenario_id).or_default().push(verdict);
        }
        Ok(verdicts)
    }
}

fn parse_fragment<T: DeserializeOwned>(
    scenario: ScenarioId,
    fragment: &Value,
    evaluation: &EvaluationContext<'_>,
) -> Result<T, ModuleError> {
    let concrete = evaluate_value(fragment, evaluation)?;
    serde_json::from_value(concrete).map_err(|e| ModuleError::InvalidFragment {
        module: MODULE_NAME.to_string(),
        scenario,
        message: e.to_string(),
    })
}

/// Rows seeded by the scenario's own given fragment for the same table,
/// projected onto `columns`
fn seeded_rows(
    scenario: ScenarioId,
    fragment: &AssertFragment,
    columns: &[String],
    context: ModuleContext<'_>,
) -> Result<Vec<Row>, ModuleError> {
    let invalid = |message: String| ModuleError::InvalidFragment {
        module: MODULE_NAME.to_string(),
        scenario,
        message,
    };

    let declared = context
        .scenarios
        .get(&scenario)
        .and_then(|body| body.given.get(MODULE_NAME))
        .and_then(|given| given.get(PRESENT))
        .map(fan_out)
        .unwrap_or_default();

    let evaluation = context.evaluation_context(scenario)?;
    let mut projected = Vec::new();
    for seed in &declared {
        let seed: SeedFragment = parse_fragment(scenario, seed, &evaluation)?;
        if seed.keyspace != fragment.keyspace || seed.table != fragment.table {
            continue;
        }
        let row = columns
            .iter()
            .map(|column| {
                seed.data
                    .get(column)
                    .map(|value| (column.clone(), value.clone()))
                    .ok_or_else(|| invalid(format!("column '{}' was never seeded", column)))
            })
            .collect::<Result<Row, _>>()?;
        projected.push(row);
    }

    if projected.is_empty() {
        return Err(invalid(format!(
            "no seeded {} row in {}.{} to take column values from",
            PRESENT, fragment.keyspace, fragment.table
        )));
    }
    Ok(projected)
}

/// Every expected column present with an equal value; column names ignore case
fn row_matches(row: &Row, expected: &Row) -> bool {
    expected.iter().all(|(column, wanted)| {
        row.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, actual)| actual == wanted || value_text(actual) == value_text(wanted))
            .unwrap_or(false)
    })
}
