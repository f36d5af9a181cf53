//! Core data model shared across the scenario pipeline.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Length in bytes of a scenario identity (an MD5 digest)
pub const SCENARIO_ID_LEN: usize = 16;

/// Stable identity of a scenario, derived from its coordinates
///
/// Rendered as 32 lowercase hex characters; that rendering is also the input
/// to the `UNIQ` and request-synthesis digests.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScenarioId([u8; SCENARIO_ID_LEN]);

impl ScenarioId {
    pub fn from_bytes(bytes: [u8; SCENARIO_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SCENARIO_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScenarioId({})", self.to_hex())
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("Invalid scenario id '{}': {}", s, e))?;
        let bytes: [u8; SCENARIO_ID_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            format!(
                "Scenario id must be {} bytes, got {} bytes",
                SCENARIO_ID_LEN,
                b.len()
            )
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for ScenarioId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ScenarioId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Structural location a scenario was declared at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioCoordinates {
    pub path: String,
    pub method: String,
    pub response_code: String,
    pub scenario_index: usize,
}

/// Author-supplied scenario: optional setup and assertion fragments per module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub given: IndexMap<String, Value>,

    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub then: IndexMap<String, Value>,
}

/// `given:` with no value is an empty section
fn null_as_empty<'de, D>(deserializer: D) -> Result<IndexMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<IndexMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ScenarioBody {
    /// Fragment declared for a module in the given phase
    pub fn section(&self, phase: Phase) -> &IndexMap<String, Value> {
        match phase {
            Phase::Given => &self.given,
            Phase::Then => &self.then,
        }
    }
}

/// Scenario section a module participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Given,
    Then,
}

/// Identity → coordinates, in extraction order
pub type CoordinateIndex = IndexMap<ScenarioId, ScenarioCoordinates>;

/// Identity → raw scenario body, in extraction order
pub type ScenarioMap = IndexMap<ScenarioId, ScenarioBody>;

/// Operator-supplied external variables resolved by `EXT`
pub type Variables = IndexMap<String, Value>;
