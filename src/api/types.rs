use crate::results::GeneratedTestCase;
use serde::{Deserialize, Deserializer, Serialize};

/// Accept ids the backend sends either as strings or as numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

/// An endpoint exposed by a service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationRequest {
    pub service_id: String,
    pub endpoint_ids: Vec<String>,
    pub suite_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub suite_id: String,
    #[serde(default)]
    pub test_cases: Vec<GeneratedTestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRequest {
    pub chain_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunHandle {
    #[serde(deserialize_with = "string_or_number")]
    pub run_id: String,
}
