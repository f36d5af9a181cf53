//! Content-addressed digests used across the pipeline
//!
//! Scenario identities, `UNIQ` values and connection keys are MD5 digests of
//! `|`-joined inputs; synthesized request values are SHA-512 digests. The exact
//! byte layout is fixed so identities stay reproducible across runs and
//! across implementations.

use crate::types::{ScenarioCoordinates, ScenarioId, SCENARIO_ID_LEN};
use md5::Md5;
use sha2::{Digest, Sha512};

/// Compute the identity of a scenario from its coordinates
///
/// ScenarioId = md5(path || "|" || method || "|" || responseCode || "|" || index)
pub fn compute_scenario_id(coordinates: &ScenarioCoordinates) -> ScenarioId {
    let input = format!(
        "{}|{}|{}|{}",
        coordinates.path, coordinates.method, coordinates.response_code, coordinates.scenario_index
    );
    let digest = Md5::digest(input.as_bytes());
    let mut bytes = [0u8; SCENARIO_ID_LEN];
    bytes.copy_from_slice(&digest);
    ScenarioId::from_bytes(bytes)
}

/// Lowercase hex MD5 digest of a string
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Lowercase hex SHA-512 digest of a string
pub fn sha512_hex(input: &str) -> String {
    hex::encode(Sha512::digest(input.as_bytes()))
}

/// Value bound to a `UNIQ` alias within a scenario
pub fn unique_value(scenario_id: &ScenarioId, alias: &str) -> String {
    md5_hex(&format!("{}|{}", scenario_id, alias))
}
