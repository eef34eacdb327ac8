//! Summary statistics over run results.
//!
//! Every function here is pure. Results keep streaming in while a run is
//! still `running`, so callers simply recompute from the latest snapshot.

use super::{CaseOutcome, ChainRun, GeneratedTestCase, StepResult, TestCaseResult};
use crate::management::{TestChain, TestStep};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Percentage of passed results, rounded to the nearest integer. 0 when empty.
pub fn success_rate(results: &[StepResult]) -> u8 {
    if results.is_empty() {
        return 0;
    }
    let passed = results.iter().filter(|r| r.is_passed()).count();
    (100.0 * passed as f64 / results.len() as f64).round() as u8
}

/// Mean response time in ms over the results that have one, rounded to two
/// decimals. Results without a response time do not count at all.
pub fn average_response_time(results: &[StepResult]) -> f64 {
    let (sum, count) = results
        .iter()
        .filter_map(|r| r.response_time)
        .fold((0.0, 0usize), |(sum, count), t| (sum + t, count + 1));

    if count == 0 {
        return 0.0;
    }
    round2(sum / count as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// HTTP status class bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusClass {
    #[serde(rename = "2xx")]
    Success,
    #[serde(rename = "3xx")]
    Redirect,
    #[serde(rename = "4xx")]
    ClientError,
    #[serde(rename = "5xx")]
    ServerError,
    #[serde(rename = "other")]
    Other,
}

impl StatusClass {
    pub const ALL: [StatusClass; 5] = [
        StatusClass::Success,
        StatusClass::Redirect,
        StatusClass::ClientError,
        StatusClass::ServerError,
        StatusClass::Other,
    ];

    pub fn of(code: u16) -> Self {
        match code {
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirect,
            400..=499 => StatusClass::ClientError,
            500.. => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusClass::Success => "2xx",
            StatusClass::Redirect => "3xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
            StatusClass::Other => "other",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Count of results per status class. Every class is present, possibly 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusDistribution {
    buckets: BTreeMap<StatusClass, usize>,
}

impl Default for StatusDistribution {
    fn default() -> Self {
        Self {
            buckets: StatusClass::ALL.iter().map(|c| (*c, 0)).collect(),
        }
    }
}

impl StatusDistribution {
    pub fn count(&self, class: StatusClass) -> usize {
        self.buckets.get(&class).copied().unwrap_or(0)
    }

    /// Buckets in 2xx, 3xx, 4xx, 5xx, other order
    pub fn iter(&self) -> impl Iterator<Item = (StatusClass, usize)> + '_ {
        self.buckets.iter().map(|(c, n)| (*c, *n))
    }

    /// Number of results that had a status code
    pub fn total(&self) -> usize {
        self.buckets.values().sum()
    }
}

/// Bucket results by status class. Results with no status code are left out.
pub fn status_code_distribution(results: &[StepResult]) -> StatusDistribution {
    let mut dist = StatusDistribution::default();
    for code in results.iter().filter_map(|r| r.status_code) {
        *dist.buckets.entry(StatusClass::of(code)).or_insert(0) += 1;
    }
    dist
}

/// Wall-clock duration of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunDuration {
    InProgress,
    Finished { millis: i64 },
}

impl fmt::Display for RunDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunDuration::InProgress => write!(f, "in progress"),
            RunDuration::Finished { millis } if *millis < 1000 => write!(f, "{}ms", millis),
            RunDuration::Finished { millis } => write!(f, "{:.2}s", *millis as f64 / 1000.0),
        }
    }
}

/// Duration from start to end, or `InProgress` while there is no end time
pub fn execution_duration(run: &ChainRun) -> RunDuration {
    match run.end_time {
        Some(end) => {
            let millis = (end - run.start_time).num_milliseconds();
            if millis < 0 {
                log::warn!("run {} ends before it starts", run.id);
            }
            RunDuration::Finished {
                millis: millis.max(0),
            }
        }
        None => RunDuration::InProgress,
    }
}

/// Roll a case's step results up into a single outcome
pub fn case_outcome(steps: &[&StepResult]) -> CaseOutcome {
    if steps.is_empty() {
        CaseOutcome::Skipped
    } else if steps.iter().any(|r| !r.is_passed()) {
        CaseOutcome::Failed
    } else {
        CaseOutcome::Passed
    }
}

/// Join step results to their test cases by `case_id`. Cases with no results
/// come out skipped; results naming an unknown case (or none) are dropped.
pub fn case_results(cases: &[GeneratedTestCase], results: &[StepResult]) -> Vec<TestCaseResult> {
    let mut by_case: HashMap<&str, Vec<&StepResult>> = cases
        .iter()
        .map(|c| (c.id.as_str(), Vec::new()))
        .collect();

    let mut orphans = 0usize;
    for result in results {
        match result
            .case_id
            .as_deref()
            .and_then(|id| by_case.get_mut(id))
        {
            Some(bucket) => bucket.push(result),
            None => orphans += 1,
        }
    }
    if orphans > 0 {
        log::debug!("{} step result(s) did not match a known test case", orphans);
    }

    cases
        .iter()
        .map(|case| {
            let steps = by_case.get(case.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            TestCaseResult {
                case_id: case.id.clone(),
                name: case.name.clone(),
                outcome: case_outcome(steps),
                step_count: steps.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CaseSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

pub fn case_summary(cases: &[TestCaseResult]) -> CaseSummary {
    cases
        .iter()
        .fold(CaseSummary::default(), |mut acc, c| {
            match c.outcome {
                CaseOutcome::Passed => acc.passed += 1,
                CaseOutcome::Failed => acc.failed += 1,
                CaseOutcome::Skipped => acc.skipped += 1,
            }
            acc
        })
}

/// Pair each step of a chain with its result (if any) by sequence number.
///
/// When the chain has an id, results tagged with a different `case_id`
/// belong to another chain of the same run and are skipped. Among the rest,
/// the first result for a sequence wins; later duplicates and results for
/// sequences the chain does not define are excluded.
pub fn join_chain<'a>(
    chain: &'a TestChain,
    results: &'a [StepResult],
) -> Vec<(&'a TestStep, Option<&'a StepResult>)> {
    let in_scope = |r: &StepResult| match (chain.id.as_deref(), r.case_id.as_deref()) {
        (Some(chain_id), Some(case_id)) => chain_id == case_id,
        _ => true,
    };

    let mut by_sequence: HashMap<u32, &StepResult> = HashMap::new();
    let mut excluded = 0usize;
    for result in results.iter().filter(|r| in_scope(*r)) {
        if chain.step(result.sequence).is_none() {
            excluded += 1;
            continue;
        }
        match by_sequence.entry(result.sequence) {
            Entry::Occupied(_) => excluded += 1,
            Entry::Vacant(slot) => {
                slot.insert(result);
            }
        }
    }
    if excluded > 0 {
        log::debug!(
            "{} result(s) excluded from chain '{}' (unknown or repeated sequence)",
            excluded,
            chain.name
        );
    }

    chain
        .steps()
        .iter()
        .map(|step| (step, by_sequence.get(&step.sequence).copied()))
        .collect()
}

/// Every statistic the result views need, computed from one run snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub total_steps: usize,
    pub passed_steps: usize,
    pub success_rate: u8,
    pub average_response_time: f64,
    pub status_codes: StatusDistribution,
    pub duration: RunDuration,
}

impl RunSummary {
    pub fn compute(run: &ChainRun) -> Self {
        let results = &run.step_results;
        Self {
            run_id: run.id.clone(),
            total_steps: results.len(),
            passed_steps: results.iter().filter(|r| r.is_passed()).count(),
            success_rate: success_rate(results),
            average_response_time: average_response_time(results),
            status_codes: status_code_distribution(results),
            duration: execution_duration(run),
        }
    }
}
