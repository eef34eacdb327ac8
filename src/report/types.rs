use crate::results::{case_results, ChainRun, GeneratedTestCase, RunView};
use serde::{Deserialize, Serialize};

/// A run as stored on disk, with the cases it exercised when known
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    #[serde(default)]
    pub suite_id: Option<String>,
    pub run: ChainRun,
    #[serde(default)]
    pub test_cases: Vec<GeneratedTestCase>,
}

/// Stored files are either a full record or a bare run from the backend
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Record(RunRecord),
    Run(ChainRun),
}

impl RunRecord {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        let record = match serde_json::from_str::<RecordFile>(content)? {
            RecordFile::Record(record) => record,
            RecordFile::Run(run) => RunRecord {
                suite_id: None,
                run,
                test_cases: Vec::new(),
            },
        };
        Ok(RunRecord {
            run: record.run.normalized(),
            ..record
        })
    }

    pub fn view(&self) -> RunView {
        RunView::build(&self.run, case_results(&self.test_cases, &self.run.step_results))
    }
}

/// Report payload for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub generated_at: String,
    #[serde(default)]
    pub suite_id: Option<String>,
    pub view: RunView,
}

impl RunReport {
    pub fn new(record: &RunRecord) -> Self {
        Self {
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            suite_id: record.suite_id.clone(),
            view: record.view(),
        }
    }
}
