//! Integration tests for run orchestration

use super::test_utils::*;
use serde_json::json;
use std::sync::Arc;
use trest::backend::{CassandraModule, ModuleRegistry, ResponseModule};
use trest::error::{RunError, RunPhase};
use trest::extract::extract_scenarios;
use trest::identity::sha512_hex;
use trest::orchestrator::{Orchestrator, RunState};

const RATINGS: &str = "parental_control.ratings";

fn country_code(hex: &str) -> String {
    sha512_hex(&format!("{}|path|0", hex))
}

/// Registry keeping a handle on the cassandra module
fn registry(cluster: &Arc<FakeCluster>) -> (ModuleRegistry, Arc<CassandraModule<FakeConnector>>) {
    let cassandra = Arc::new(CassandraModule::new(FakeConnector::new(cluster)));
    let mut registry = ModuleRegistry::new();
    registry.register_given(cassandra.clone());
    registry.register_then(cassandra.clone());
    registry.register_then(Arc::new(ResponseModule::new()));
    (registry, cassandra)
}

/// Invoker that behaves like the service: a DELETE removes the territory row
fn deleting_service(cluster: &Arc<FakeCluster>, status: u16) -> MockInvoker {
    let cluster = Arc::clone(cluster);
    MockInvoker::responding(status).with_hook(move |request| {
        if request.method == "DELETE" {
            if let Some(code) = request.url.rsplit('/').next() {
                cluster.delete_where(RATINGS, "countryCode", code);
            }
        }
    })
}

#[tokio::test]
async fn test_existing_territory_scenario_end_to_end() {
    let cluster = FakeCluster::new();
    let (registry, cassandra) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, deleting_service(&cluster, 204));
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let report = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap();

    let seeded = country_code(EXISTING_TERRITORY);
    let inserts = cluster.inserts();
    assert_eq!(inserts.len(), 1);
    assert_eq!(
        inserts[0],
        format!(
            "INSERT INTO {} (countryCode,values) VALUES ('{}','[\"A\",\"B\",\"C\"]')",
            RATINGS, seeded
        )
    );

    assert_eq!(
        report.passed,
        vec![scenario_id(MISSING_TERRITORY), scenario_id(EXISTING_TERRITORY)]
    );
    assert!(report.failed.is_empty());

    let status = &report.verdicts["response"][&scenario_id(EXISTING_TERRITORY)];
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].detail["expectedStatusCode"], json!("204"));
    assert_eq!(status[0].detail["actualStatusCode"], json!(204));
    assert_eq!(status[0].detail["server"], json!("http://localhost:8080"));

    assert!(cassandra.open_sessions() == 0);
    assert_eq!(cluster.connects(), 1);
    assert_eq!(cluster.shutdowns(), 1);
    assert_eq!(
        orchestrator.history(),
        vec![
            RunState::Idle,
            RunState::GivenRunning,
            RunState::Invoking,
            RunState::ThenRunning,
            RunState::Done
        ]
    );
}

#[tokio::test]
async fn test_status_mismatch_is_a_failed_verdict() {
    let cluster = FakeCluster::new();
    let (registry, _) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, deleting_service(&cluster, 500));
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let report = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap();

    assert!(report.passed.is_empty());
    assert_eq!(
        report.failed,
        vec![scenario_id(MISSING_TERRITORY), scenario_id(EXISTING_TERRITORY)]
    );
    let status = &report.verdicts["response"][&scenario_id(MISSING_TERRITORY)][0];
    assert!(!status.passed);
    assert_eq!(status.detail["actualStatusCode"], json!(500));
    assert_eq!(orchestrator.state(), RunState::Done);
}

#[tokio::test]
async fn test_row_left_behind_fails_absent_check() {
    let cluster = FakeCluster::new();
    let (registry, _) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, MockInvoker::responding(204));
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let report = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap();

    assert_eq!(report.passed, vec![scenario_id(MISSING_TERRITORY)]);
    assert_eq!(report.failed, vec![scenario_id(EXISTING_TERRITORY)]);
    let absent = &report.verdicts["cassandra"][&scenario_id(EXISTING_TERRITORY)][0];
    assert!(!absent.passed);
    assert_eq!(absent.detail["operation"], json!("absent"));
    assert_eq!(cluster.rows(RATINGS).len(), 1);
}

#[tokio::test]
async fn test_given_failures_are_aggregated_and_abort_the_run() {
    let mut document = parental_control_contract();
    document["paths"][DELETE_TERRITORY_PATH]["delete"]["responses"]["204"]["x-trest-scenarios"][1]
        ["given"]["cassandra"]["present"] = json!([
        seed_fragment("ratings"),
        seed_fragment("audit"),
        seed_fragment("history"),
    ]);

    let cluster = FakeCluster::new();
    cluster.fail_statements("parental_control.audit", "write timeout on audit");
    cluster.fail_statements("parental_control.history", "unavailable replicas for history");
    let (registry, cassandra) = registry(&cluster);
    let invoker = MockInvoker::responding(204);
    let mut orchestrator = Orchestrator::new(registry, invoker);
    let extraction = extract_scenarios(document).unwrap();

    let err = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap_err();

    match &err {
        RunError::PhaseFailed { phase, failures } => {
            assert_eq!(*phase, RunPhase::Given);
            assert_eq!(failures.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("write timeout on audit"), "{message}");
    assert!(message.contains("unavailable replicas for history"), "{message}");

    let history = orchestrator.history();
    assert_eq!(history.last(), Some(&RunState::Failed));
    assert!(!history.contains(&RunState::Invoking));
    assert!(!history.contains(&RunState::ThenRunning));
    assert!(cluster
        .statements()
        .iter()
        .all(|statement| !statement.starts_with("SELECT *")));

    assert_eq!(cassandra.open_sessions(), 0);
    assert_eq!(cluster.shutdowns(), 1);
}

#[tokio::test]
async fn test_missing_variable_fails_given_phase() {
    let cluster = FakeCluster::new();
    let (registry, _) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, MockInvoker::responding(204));
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let mut variables = cassandra_variables();
    variables.shift_remove("cassandraKeyspace");
    let err = orchestrator.run(&extraction, &variables).await.unwrap_err();

    assert!(err
        .to_string()
        .contains("Could not find external variable called cassandraKeyspace"));
    assert!(cluster.inserts().is_empty());
}

#[tokio::test]
async fn test_refused_connection_still_releases_modules() {
    let cluster = FakeCluster::new();
    cluster.refuse("localhost:9042");
    let (registry, cassandra) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, MockInvoker::responding(204));
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let err = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("connection refused"));
    assert_eq!(cassandra.open_sessions(), 0);
    assert_eq!(cluster.connects(), 0);
    assert_eq!(orchestrator.state(), RunState::Failed);
}

#[tokio::test]
async fn test_transport_failure_aborts_before_then() {
    let cluster = FakeCluster::new();
    let (registry, _) = registry(&cluster);
    let invoker = MockInvoker::unreachable("connection reset");
    let mut orchestrator = Orchestrator::new(registry, invoker);
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let err = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap_err();

    match err {
        RunError::PhaseFailed { phase, failures } => {
            assert_eq!(phase, RunPhase::Invoking);
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|f| f.contains("connection reset")));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!orchestrator.history().contains(&RunState::ThenRunning));
    assert_eq!(cluster.shutdowns(), 1);
}

#[tokio::test]
async fn test_contract_without_servers() {
    let mut document = parental_control_contract();
    document.as_object_mut().unwrap().remove("servers");
    let extraction = extract_scenarios(document).unwrap();

    let cluster = FakeCluster::new();
    let (registry, _) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, MockInvoker::responding(204));

    let err = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Contract declares no servers"));
}

#[tokio::test]
async fn test_every_server_is_invoked() {
    let cluster = FakeCluster::new();
    let (registry, _) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, deleting_service(&cluster, 204)).with_servers(
        vec![
            "http://blue.internal:8080".to_string(),
            "http://green.internal:8080".to_string(),
        ],
    );
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let report = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap();

    let verdicts = &report.verdicts["response"][&scenario_id(MISSING_TERRITORY)];
    let servers: Vec<_> = verdicts.iter().map(|v| v.detail["server"].clone()).collect();
    assert_eq!(
        servers,
        vec![json!("http://blue.internal:8080"), json!("http://green.internal:8080")]
    );
    assert!(report.is_success());
}

#[tokio::test]
async fn test_generated_request_reaches_invoker() {
    let cluster = FakeCluster::new();
    let (registry, _) = registry(&cluster);
    let invoker = MockInvoker::responding(204);
    let mut orchestrator = Orchestrator::new(registry, invoker);
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap();

    let requests = orchestrator.invoker().requests();
    assert_eq!(requests.len(), 2);
    let first = &requests[0];
    assert_eq!(first.method, "DELETE");
    assert_eq!(
        first.url,
        format!(
            "http://localhost:8080/private/admin/parentalControl/{}",
            country_code(MISSING_TERRITORY)
        )
    );
    assert_eq!(
        first.headers["X-SkyOTT-RequestId"],
        sha512_hex(&format!("{}|header|0", MISSING_TERRITORY))
    );
}

#[tokio::test]
async fn test_repeated_runs_start_fresh() {
    let cluster = FakeCluster::new();
    let (registry, _) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, deleting_service(&cluster, 204));
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let first = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap();
    let second = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(cluster.inserts().len(), 2);
    assert_eq!(cluster.connects(), 2);
    assert_eq!(orchestrator.history().len(), 5);
}

#[tokio::test]
async fn test_run_after_failed_run_opens_fresh_sessions() {
    let cluster = FakeCluster::new();
    cluster.fail_statements("INSERT INTO parental_control.ratings", "write timeout");
    let (registry, cassandra) = registry(&cluster);
    let mut orchestrator = Orchestrator::new(registry, deleting_service(&cluster, 204));
    let extraction = extract_scenarios(parental_control_contract()).unwrap();

    let err = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("write timeout"));
    assert_eq!(cassandra.open_sessions(), 0);
    assert_eq!(cluster.shutdowns(), 1);

    cluster.clear_failures();
    let report = orchestrator
        .run(&extraction, &cassandra_variables())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(cluster.connects(), 2);
    assert_eq!(cluster.shutdowns(), 2);
    assert_eq!(cassandra.open_sessions(), 0);
    assert_eq!(orchestrator.history().first(), Some(&RunState::Idle));
    assert_eq!(orchestrator.state(), RunState::Done);
}
