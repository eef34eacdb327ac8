//! Reshapes result data for rendering collaborators. Output is plain data:
//! labels, values and a classification tag. Colours and layout are the
//! renderer's business.

use super::aggregate::{case_summary, RunSummary, StatusDistribution};
use super::{ChainRun, StepResult, TestCaseResult};
use serde::{Deserialize, Serialize};

/// How a chart point should be categorised by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Success,
    Warning,
    Failure,
    Neutral,
}

/// One (label, value, classification) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
    pub classification: Classification,
}

impl ChartPoint {
    fn new(label: impl Into<String>, value: f64, classification: Classification) -> Self {
        Self {
            label: label.into(),
            value,
            classification,
        }
    }
}

/// Copy of `results` ordered by sequence. The sort is stable, so results
/// sharing a sequence keep their arrival order.
pub fn sorted_step_results(results: &[StepResult]) -> Vec<StepResult> {
    let mut sorted = results.to_vec();
    sorted.sort_by_key(|r| r.sequence);
    sorted
}

fn step_classification(result: &StepResult) -> Classification {
    if result.is_passed() {
        Classification::Success
    } else if result.status_code.is_none() {
        Classification::Neutral
    } else {
        Classification::Failure
    }
}

/// One point per status class
pub fn status_code_chart(dist: &StatusDistribution) -> Vec<ChartPoint> {
    use super::aggregate::StatusClass;

    dist.iter()
        .map(|(class, count)| {
            let classification = match class {
                StatusClass::Success => Classification::Success,
                StatusClass::Redirect => Classification::Neutral,
                StatusClass::ClientError => Classification::Warning,
                StatusClass::ServerError => Classification::Failure,
                StatusClass::Other => Classification::Neutral,
            };
            ChartPoint::new(class.label(), count as f64, classification)
        })
        .collect()
}

/// Response time per step, in sequence order. Steps with no timing are
/// left out rather than plotted as zero.
pub fn response_time_chart(results: &[StepResult]) -> Vec<ChartPoint> {
    sorted_step_results(results)
        .iter()
        .filter_map(|r| {
            r.response_time.map(|ms| {
                ChartPoint::new(format!("#{}", r.sequence), ms, step_classification(r))
            })
        })
        .collect()
}

/// Passed / failed / skipped case counts
pub fn case_outcome_chart(cases: &[TestCaseResult]) -> Vec<ChartPoint> {
    let summary = case_summary(cases);
    vec![
        ChartPoint::new("passed", summary.passed as f64, Classification::Success),
        ChartPoint::new("failed", summary.failed as f64, Classification::Failure),
        ChartPoint::new("skipped", summary.skipped as f64, Classification::Neutral),
    ]
}

/// Everything a result screen renders for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub summary: RunSummary,
    pub steps: Vec<StepResult>,
    pub status_chart: Vec<ChartPoint>,
    pub response_time_chart: Vec<ChartPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<TestCaseResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub case_chart: Vec<ChartPoint>,
}

impl RunView {
    pub fn build(run: &ChainRun, cases: Vec<TestCaseResult>) -> Self {
        let summary = RunSummary::compute(run);
        let status_chart = status_code_chart(&summary.status_codes);
        let case_chart = if cases.is_empty() {
            Vec::new()
        } else {
            case_outcome_chart(&cases)
        };
        Self {
            steps: sorted_step_results(&run.step_results),
            response_time_chart: response_time_chart(&run.step_results),
            status_chart,
            summary,
            cases,
            case_chart,
        }
    }
}
