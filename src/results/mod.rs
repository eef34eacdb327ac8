pub mod aggregate;
pub mod present;

pub use aggregate::*;
pub use present::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Execution status of a chain run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Outcome of one request step within a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub sequence: u32,
    #[serde(default)]
    pub status_code: Option<u16>,
    pub passed: bool,
    /// Milliseconds
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    #[serde(default)]
    pub extracted_values: Option<BTreeMap<String, Value>>,
    /// Generated test case this step belongs to, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
}

impl StepResult {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            status_code: None,
            passed: false,
            response_time: None,
            error_message: None,
            response_body: None,
            extracted_values: None,
            case_id: None,
        }
    }

    /// Passed as reported, and consistent with having a status code and no error
    pub fn is_passed(&self) -> bool {
        self.passed && self.status_code.is_some() && self.error_message.is_none()
    }

    /// Force `passed` to false when there is no status code or there is an
    /// error message
    pub fn normalized(mut self) -> Self {
        self.passed = self.is_passed();
        self
    }
}

/// One execution of a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainRun {
    pub id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
}

impl ChainRun {
    pub fn started(id: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            status: RunStatus::Running,
            start_time,
            end_time: None,
            step_results: Vec::new(),
        }
    }

    /// Bring a record from the backend in line with the model's invariants:
    /// step results are normalized, and `end_time` is kept only for runs
    /// that are no longer running.
    pub fn normalized(mut self) -> Self {
        if self.status == RunStatus::Running && self.end_time.is_some() {
            log::warn!("run {} is running but has an end_time; ignoring it", self.id);
            self.end_time = None;
        }
        self.step_results = self
            .step_results
            .into_iter()
            .map(StepResult::normalized)
            .collect();
        self
    }

    pub fn finish(&mut self, status: RunStatus, end_time: DateTime<Utc>) {
        if status.is_terminal() {
            self.status = status;
            self.end_time = Some(end_time);
        }
    }
}

/// Rolled-up outcome of one test case
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaseOutcome {
    Passed,
    Failed,
    Skipped,
}

/// A generated test case as returned by the generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedTestCase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Chain that executes this case; defaults to the case id
    #[serde(default)]
    pub chain_id: Option<String>,
}

impl GeneratedTestCase {
    pub fn chain_id(&self) -> &str {
        self.chain_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCaseResult {
    pub case_id: String,
    pub name: String,
    pub outcome: CaseOutcome,
    pub step_count: usize,
}
