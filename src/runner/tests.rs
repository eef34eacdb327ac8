use super::*;
use crate::results::{CaseOutcome, RunDuration, RunStatus, StepResult};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Scripted backend: canned endpoints, optional one-shot generation failure,
/// and a queue of run snapshots (the last one repeats).
#[derive(Default)]
struct FakeApi {
    endpoints: Vec<Endpoint>,
    fail_generation_with: Mutex<Option<u16>>,
    snapshots: Mutex<VecDeque<ChainRun>>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestingApi for FakeApi {
    async fn list_endpoints(&self, service_id: &str) -> Result<Vec<Endpoint>> {
        self.record(format!("list {}", service_id));
        Ok(self.endpoints.clone())
    }

    async fn generate_tests(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        self.record(format!(
            "generate {} [{}]",
            request.suite_name,
            request.endpoint_ids.join(",")
        ));
        if let Some(status) = self.fail_generation_with.lock().unwrap().take() {
            return Err(WizardError::Backend {
                operation: "generate tests".into(),
                status,
                message: "model unavailable".into(),
            });
        }
        Ok(GenerationResponse {
            suite_id: "suite-1".into(),
            test_cases: vec![case("c1", "create order"), case("c2", "reject bad sku")],
        })
    }

    async fn trigger_run(&self, request: &RunRequest) -> Result<crate::api::RunHandle> {
        self.record(format!("run [{}]", request.chain_ids.join(",")));
        Ok(crate::api::RunHandle {
            run_id: "run-1".into(),
        })
    }

    async fn fetch_run(&self, run_id: &str) -> Result<ChainRun> {
        self.record(format!("fetch {}", run_id));
        let mut queue = self.snapshots.lock().unwrap();
        let snapshot = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        snapshot.ok_or_else(|| WizardError::Backend {
            operation: "fetch run".into(),
            status: 404,
            message: "no such run".into(),
        })
    }
}

fn case(id: &str, name: &str) -> GeneratedTestCase {
    GeneratedTestCase {
        id: id.into(),
        name: name.into(),
        description: None,
        chain_id: None,
    }
}

fn endpoint(id: &str, path: &str) -> Endpoint {
    Endpoint {
        id: id.into(),
        path: path.into(),
        method: "GET".into(),
        summary: None,
    }
}

fn step(sequence: u32, case_id: &str, status: u16, ms: f64) -> StepResult {
    StepResult {
        status_code: Some(status),
        passed: status < 400,
        response_time: Some(ms),
        case_id: Some(case_id.into()),
        ..StepResult::new(sequence)
    }
}

fn snapshots() -> VecDeque<ChainRun> {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let mut running = ChainRun::started("run-1", start);
    running.step_results = vec![step(1, "c1", 201, 40.0)];

    let mut created = step(1, "c1", 201, 40.0);
    created.extracted_values = Some(
        [("orderId".to_string(), serde_json::json!("o-77"))]
            .into_iter()
            .collect(),
    );

    let mut done = running.clone();
    done.step_results = vec![step(2, "c1", 200, 20.0), created, step(1, "c2", 422, 30.0)];
    done.finish(RunStatus::Completed, start + chrono::Duration::seconds(3));

    VecDeque::from(vec![running, done])
}

fn config(max_poll_attempts: u32) -> Config {
    Config {
        poll_interval_ms: 0,
        max_poll_attempts,
        ..Config::default()
    }
}

fn runner(api: FakeApi, max_poll_attempts: u32) -> WizardRunner<FakeApi> {
    WizardRunner::new(
        api,
        WizardDefinition::api_testing(),
        &config(max_poll_attempts),
    )
}

fn api() -> FakeApi {
    FakeApi {
        endpoints: vec![endpoint("e1", "/orders"), endpoint("e2", "/orders/{id}")],
        snapshots: Mutex::new(snapshots()),
        ..FakeApi::default()
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<WizardEvent>) -> Vec<WizardEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn inputs() -> WizardInputs {
    WizardInputs {
        service_id: "svc-9".into(),
        suite_name: "orders smoke".into(),
        ..WizardInputs::default()
    }
}

#[tokio::test]
async fn test_full_wizard_pass() {
    let mut runner = runner(api(), 5);
    let mut rx = runner.subscribe();

    let view = runner.run_to_completion(&inputs()).await.unwrap().unwrap();

    assert_eq!(runner.session().state().current_step(), 5);
    assert_eq!(
        runner.api.calls(),
        vec![
            "list svc-9",
            "generate orders smoke [e1,e2]",
            "run [c1,c2]",
            "fetch run-1",
            "fetch run-1",
        ]
    );

    let seqs: Vec<u32> = view.steps.iter().map(|s| s.sequence).collect();
    assert_eq!(seqs, vec![1, 1, 2]);
    assert_eq!(view.summary.success_rate, 67);
    assert_eq!(view.summary.average_response_time, 30.0);
    assert_eq!(view.summary.duration, RunDuration::Finished { millis: 3000 });
    assert_eq!(view.cases[0].outcome, CaseOutcome::Passed);
    assert_eq!(view.cases[1].outcome, CaseOutcome::Failed);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, WizardEvent::WizardFinished { total_steps: 5 })));
    let progress = events
        .iter()
        .filter(|e| matches!(e, WizardEvent::RunProgress { .. }))
        .count();
    assert_eq!(progress, 2);

    // Values captured during the run land in the shared context
    assert_eq!(runner.session().context.get_str("orderId"), Some("o-77"));

    let record = runner.run_record().unwrap();
    assert_eq!(record.suite_id.as_deref(), Some("suite-1"));
    assert_eq!(record.test_cases.len(), 2);
}

#[tokio::test]
async fn test_advance_blocked_without_service() {
    let mut runner = runner(api(), 5);
    let mut rx = runner.subscribe();

    let err = runner.handle(UserAction::Advance).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    assert_eq!(runner.session().state().current_step(), 1);
    assert!(runner.api.calls().is_empty());

    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [WizardEvent::Notice {
            level: NoticeLevel::Warning,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_generation_failure_keeps_progress() {
    let api = api();
    *api.fail_generation_with.lock().unwrap() = Some(503);
    let mut runner = runner(api, 5);

    let ctx = &mut runner.session_mut().context;
    ctx.set(keys::SERVICE_ID, "svc-9");
    runner.handle(UserAction::Advance).await.unwrap();
    runner
        .session_mut()
        .context
        .set(keys::SELECTED_ENDPOINTS, vec!["e1"]);
    runner.handle(UserAction::Advance).await.unwrap();
    runner.session_mut().context.set(keys::SUITE_NAME, "smoke");

    let err = runner.handle(UserAction::Advance).await.unwrap_err();
    assert!(matches!(err, WizardError::Backend { status: 503, .. }));
    assert_eq!(runner.session().state().current_step(), 3);
    assert!(runner.session().context.get(keys::TEST_SUITE_ID).is_none());
    assert!(!runner.session().is_pending(RequestKind::GenerateTests));

    // Retry goes through with nothing lost
    assert!(runner.handle(UserAction::Advance).await.unwrap());
    assert_eq!(runner.session().state().current_step(), 4);
    assert_eq!(
        runner.session().context.get_str(keys::TEST_SUITE_ID),
        Some("suite-1")
    );
    assert_eq!(
        runner.session().context.get_str(keys::SERVICE_ID),
        Some("svc-9")
    );
}

#[tokio::test]
async fn test_mode_switch_preserves_step() {
    let mut runner = runner(api(), 5);
    runner.session_mut().context.set(keys::SERVICE_ID, 12);
    runner.handle(UserAction::Advance).await.unwrap();
    assert_eq!(runner.api.calls(), vec!["list 12"]);

    assert!(runner.handle(UserAction::ToggleMode).await.unwrap());
    assert_eq!(runner.session().mode(), InteractionMode::Management);

    // The wizard is not driven while managing artifacts
    assert!(!runner.handle(UserAction::Retreat).await.unwrap());
    assert_eq!(runner.session().state().current_step(), 2);

    assert!(!runner
        .handle(UserAction::SetMode(InteractionMode::Management))
        .await
        .unwrap());
    assert!(runner
        .handle(UserAction::SetMode(InteractionMode::StepBased))
        .await
        .unwrap());
    assert_eq!(runner.session().navigation().current_step, 2);
    assert!(runner
        .session()
        .context
        .is_filled(keys::AVAILABLE_ENDPOINTS));

    assert!(runner.handle(UserAction::Retreat).await.unwrap());
    assert_eq!(runner.session().state().current_step(), 1);
}

#[tokio::test]
async fn test_poll_gives_up_on_endless_run() {
    let api = api();
    {
        let mut queue = api.snapshots.lock().unwrap();
        queue.pop_back();
    }
    let mut runner = runner(api, 3);

    let err = runner.run_to_completion(&inputs()).await.unwrap_err();
    assert!(matches!(err, WizardError::PollExhausted { attempts: 3, .. }));
    assert_eq!(runner.session().state().current_step(), 4);
    assert!(!runner.session().is_pending(RequestKind::PollRun));

    // The partial snapshot is still there to render
    let view = runner.run_view().unwrap();
    assert_eq!(view.summary.duration, RunDuration::InProgress);
    assert_eq!(view.cases[1].outcome, CaseOutcome::Skipped);
}

#[tokio::test]
async fn test_retry_after_poll_failure_resumes_same_run() {
    let api = api();
    let done = {
        let mut queue = api.snapshots.lock().unwrap();
        queue.pop_back().unwrap()
    };
    let mut runner = runner(api, 2);

    let err = runner.run_to_completion(&inputs()).await.unwrap_err();
    assert!(matches!(err, WizardError::PollExhausted { attempts: 2, .. }));
    assert_eq!(runner.session().context.get_str(keys::RUN_ID), Some("run-1"));

    // The backend catches up; the user retries the step
    runner.api.snapshots.lock().unwrap().push_back(done);
    assert!(runner.handle(UserAction::Advance).await.unwrap());
    assert_eq!(runner.session().state().current_step(), 5);

    let calls = runner.api.calls();
    let triggers = calls.iter().filter(|c| c.starts_with("run ")).count();
    assert_eq!(triggers, 1, "calls: {:?}", calls);
    assert_eq!(
        runner.run_view().unwrap().summary.duration,
        RunDuration::Finished { millis: 3000 }
    );
}

#[tokio::test]
async fn test_finished_run_is_triggered_afresh() {
    let mut runner = runner(api(), 5);
    runner.run_to_completion(&inputs()).await.unwrap();

    // Back on the run step with a terminal snapshot: advancing starts a new run
    assert!(runner.handle(UserAction::Retreat).await.unwrap());
    assert!(runner.handle(UserAction::Advance).await.unwrap());
    let triggers = runner
        .api
        .calls()
        .iter()
        .filter(|c| c.starts_with("run "))
        .count();
    assert_eq!(triggers, 2);
}

#[test]
fn test_store_reports_unserializable_value() {
    let mut ctx = crate::session::SharedContextStore::new();
    let mut bad = std::collections::HashMap::new();
    bad.insert((1u8, 2u8), "tuple keys are not JSON object keys");

    let err = store(&mut ctx, "broken", &bad).unwrap_err();
    assert_eq!(err.class(), ErrorClass::DataShape);
    assert!(ctx.get("broken").is_none());
}

#[tokio::test]
async fn test_complete_only_at_last_step() {
    let mut runner = runner(api(), 5);
    assert!(!runner.handle(UserAction::Complete).await.unwrap());
    assert!(runner.run_view().is_none());
}

#[tokio::test]
async fn test_restart_starts_clean() {
    let mut runner = runner(api(), 5);
    runner.session_mut().context.set(keys::SERVICE_ID, "svc-9");
    runner.handle(UserAction::Advance).await.unwrap();
    let old_id = runner.session().id();

    runner.restart();
    assert_ne!(runner.session().id(), old_id);
    assert_eq!(runner.session().state().current_step(), 1);
    assert!(runner.session().context.is_empty());
}
