//! Integration tests for configuration loading

use serde_json::json;
use std::fs;
use tempfile::TempDir;
use trest::backend::ModuleRegistry;
use trest::config::ConfigLoader;
use trest::error::ConfigError;
use trest::evaluate::{evaluate_value, EvaluationContext};
use trest::orchestrator::Orchestrator;

#[test]
fn test_load_from_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trest.toml");
    fs::write(
        &path,
        r#"
[variables]
keyspace = "parental_control"
replicas = 3

[http]
request_timeout_secs = 5
servers = ["http://localhost:8080/"]

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.variables["keyspace"], "parental_control");
    assert_eq!(config.variables["replicas"], 3);
    assert_eq!(config.http.connect_timeout_secs, 10);
    assert_eq!(config.http.request_timeout_secs, 5);
    assert_eq!(config.http.server_overrides(), vec!["http://localhost:8080"]);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.logging.output, "stdout");

    let orchestrator = Orchestrator::from_config(ModuleRegistry::new(), &config).unwrap();
    assert_eq!(orchestrator.registry().modules().count(), 0);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)), "{err}");
}

#[test]
fn test_invalid_values_are_reported_together() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trest.toml");
    fs::write(
        &path,
        r#"
[http]
connect_timeout_secs = 0
servers = ["localhost:8080"]

[logging]
output = "syslog"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    match config.validate().unwrap_err() {
        ConfigError::Invalid(errors) => assert_eq!(errors.len(), 3, "{errors:?}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_camel_case_variables_resolve_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trest.toml");
    fs::write(
        &path,
        r#"
[variables]
cassandraContactPoint = "localhost:9042"
cassandraLocalDataCenter = "datacenter1"
cassandraKeyspace = "parental_control"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let scenario_id = "08fc22bf09203709115ae82002615b71".parse().unwrap();
    let context = EvaluationContext::new(&config.variables, json!({}), scenario_id);

    let endpoint = evaluate_value(
        &json!({
            "contactPoint": "{{ cassandraContactPoint | EXT }}",
            "localDataCenter": "{{ cassandraLocalDataCenter | EXT }}",
            "keyspace": "{{ cassandraKeyspace | EXT }}"
        }),
        &context,
    )
    .unwrap();
    assert_eq!(
        endpoint,
        json!({
            "contactPoint": "localhost:9042",
            "localDataCenter": "datacenter1",
            "keyspace": "parental_control"
        })
    );
}
