//! Error types for the Trest contract-test orchestration engine.

use crate::types::ScenarioId;
use thiserror::Error;

/// Structural problems with the contract or its scenario coordinates
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Missing operation specification '{method} {path}'")]
    MissingOperation { method: String, path: String },

    #[error("Unsupported schema type: '{0}'")]
    UnsupportedSchemaType(String),

    #[error("No coordinates recorded for scenario {0}")]
    UnknownScenario(ScenarioId),

    #[error("Malformed contract at {location}: {message}")]
    Malformed { location: String, message: String },

    #[error("Contract declares no servers to invoke")]
    NoServers,

    #[error("Failed to load contract document {path}: {message}")]
    Load { path: String, message: String },
}

/// Template expression resolution failures
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Could not find external variable called {0}")]
    VariableNotFound(String),

    #[error("JSON path '{0}' does not reference any request value")]
    UnresolvedRequestPath(String),

    #[error("Unsupported evaluator '{0}'")]
    UnsupportedEvaluator(String),
}

/// Errors raised by backend modules
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("Invalid {module} fragment for scenario {scenario}: {message}")]
    InvalidFragment {
        module: String,
        scenario: ScenarioId,
        message: String,
    },

    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Statement failed: {0}")]
    Statement(String),

    #[error("{module} errors: {}", format_failures(.failures))]
    Aggregated {
        module: String,
        failures: Vec<String>,
    },
}

/// HTTP transport failures; response statuses are never errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request to {url} timed out: {message}")]
    Timeout { url: String, message: String },

    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Request to {url} returned out-of-range status {status}")]
    InvalidStatus { url: String, status: u16 },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// Phase of a scenario run, used to label aggregated failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Given,
    Invoking,
    Then,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Given => write!(f, "given"),
            RunPhase::Invoking => write!(f, "invoking"),
            RunPhase::Then => write!(f, "then"),
        }
    }
}

/// Run-level errors: one aggregated message per failed phase
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Test execution failed in {phase} phase: {}", format_failures(.failures))]
    PhaseFailed {
        phase: RunPhase,
        failures: Vec<String>,
    },

    #[error("Backend teardown failed: {}", format_failures(.failures))]
    Teardown { failures: Vec<String> },
}

impl RunError {
    pub fn failures(&self) -> &[String] {
        match self {
            RunError::PhaseFailed { failures, .. } => failures,
            RunError::Teardown { failures } => failures,
        }
    }
}

/// Configuration and logging setup errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(String),

    #[error("Configuration validation failed:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Render failure messages as a JSON array so every message stays distinguishable.
fn format_failures(failures: &[String]) -> String {
    serde_json::to_string(failures).unwrap_or_else(|_| failures.join(" | "))
}
