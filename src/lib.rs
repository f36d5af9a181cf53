//! Trest: Contract-Test Orchestration
//!
//! Extracts test scenarios embedded in an API contract, gives each a
//! content-addressed identity, and runs them through pluggable backend modules:
//! given-phase seeding, one HTTP invocation per scenario and server, then-phase
//! assertions, and a pass/fail report.

pub mod backend;
pub mod config;
pub mod contract;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod generate;
pub mod identity;
pub mod invoke;
pub mod logging;
pub mod merge;
pub mod orchestrator;
pub mod types;

pub use backend::{
    CassandraModule, CqlConnector, CqlSession, GivenModule, Module, ModuleContext, ModuleRegistry,
    ResponseModule, ThenModule, Verdict,
};
pub use config::{ConfigLoader, HttpConfig, TrestConfig};
pub use contract::{load_document, Contract};
pub use error::{ConfigError, ContractError, EvaluationError, ModuleError, RunError, TransportError};
pub use extract::{extract_scenarios, Extraction};
pub use invoke::{HttpInvoker, RequestInvoker};
pub use merge::merge_scenarios;
pub use orchestrator::{Orchestrator, RunReport, RunState};
pub use types::{ScenarioId, Variables};
