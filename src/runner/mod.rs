pub mod events;

pub use events::*;

use crate::api::{Endpoint, GenerationRequest, GenerationResponse, RunRequest, TestingApi};
use crate::config::Config;
use crate::error::{ErrorClass, Result, WizardError};
use crate::report::RunRecord;
use crate::results::{sorted_step_results, ChainRun, GeneratedTestCase, RunSummary, RunView};
use crate::session::{
    keys, InteractionMode, RequestKind, RequestTicket, SharedContextStore, StepKind,
    WizardDefinition, WizardSession,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Something the user did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Advance,
    Retreat,
    ToggleMode,
    SetMode(InteractionMode),
    Complete,
}

/// What the user entered for a non-interactive pass through the wizard
#[derive(Debug, Clone, Default)]
pub struct WizardInputs {
    pub service_id: String,
    /// Empty means every endpoint the service exposes
    pub endpoint_ids: Vec<String>,
    pub suite_name: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
}

/// Drives one wizard session against a testing backend. Every action runs
/// to completion before the next one is accepted.
pub struct WizardRunner<A: TestingApi> {
    api: A,
    session: WizardSession,
    emitter: EventEmitter,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl<A: TestingApi> WizardRunner<A> {
    pub fn new(api: A, definition: WizardDefinition, config: &Config) -> Self {
        Self {
            api,
            session: WizardSession::new(definition, config.initial_mode),
            emitter: EventEmitter::default(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts.max(1),
        }
    }

    pub fn session(&self) -> &WizardSession {
        &self.session
    }

    /// Step handlers write their inputs through this
    pub fn session_mut(&mut self) -> &mut WizardSession {
        &mut self.session
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WizardEvent> {
        self.emitter.subscribe()
    }

    /// Announce the session to listeners
    pub fn start(&self) {
        self.emitter.emit(WizardEvent::SessionStarted {
            session_id: self.session.id().to_string(),
            total_steps: self.session.state().total_steps(),
        });
        let current = self.session.state().current_step();
        self.emit_step(current, current);
    }

    /// Throw the current session away and begin a new one in the same mode
    pub fn restart(&mut self) {
        self.session.restart();
        self.start();
    }

    /// Apply one user action. Returns whether anything changed.
    pub async fn handle(&mut self, action: UserAction) -> Result<bool> {
        match action {
            UserAction::ToggleMode => {
                let mode = self.session.mode_controller_mut().toggle_mode();
                self.emitter.emit(WizardEvent::ModeChanged { mode });
                Ok(true)
            }
            UserAction::SetMode(mode) => {
                let changed = self.session.mode_controller_mut().set_mode(mode);
                if changed {
                    self.emitter.emit(WizardEvent::ModeChanged { mode });
                }
                Ok(changed)
            }
            _ if self.session.mode() != InteractionMode::StepBased => {
                log::debug!("{:?} ignored in management mode", action);
                Ok(false)
            }
            UserAction::Advance => self.advance().await,
            UserAction::Retreat => Ok(self.retreat()),
            UserAction::Complete => Ok(self
                .session
                .sequencer()
                .complete(&mut self.emitter)),
        }
    }

    async fn advance(&mut self) -> Result<bool> {
        if self.session.state().is_last() {
            return Ok(false);
        }

        if let Err(err) = self.session.validate_current_step() {
            self.report(&err);
            return Err(err);
        }

        // Leaving a step may need the backend; a failure keeps the user here
        let exit = match self.session.current_step() {
            Some(StepKind::SelectService) => self.load_endpoints().await.map(|_| ()),
            Some(StepKind::GenerateTests) => self.generate_tests().await.map(|_| ()),
            Some(StepKind::ExecuteRun) => self.execute_run().await.map(|_| ()),
            _ => Ok(()),
        };
        exit?;

        let from = self.session.state().current_step();
        let moved = self.session.sequencer_mut().advance();
        if moved {
            self.emit_step(from, self.session.state().current_step());
        }
        Ok(moved)
    }

    fn retreat(&mut self) -> bool {
        let from = self.session.state().current_step();
        let moved = self.session.sequencer_mut().retreat();
        if moved {
            self.emit_step(from, self.session.state().current_step());
        }
        moved
    }

    fn emit_step(&self, from: usize, to: usize) {
        let state = self.session.state();
        let title = self
            .session
            .definition()
            .step(to)
            .map(|s| s.title().to_string())
            .unwrap_or_default();
        self.emitter.emit(WizardEvent::StepChanged {
            from,
            to,
            total: state.total_steps(),
            title,
        });
    }

    /// Surface an error as a notice matching its class
    fn report(&self, err: &WizardError) {
        let level = match err.class() {
            ErrorClass::Validation => NoticeLevel::Warning,
            ErrorClass::DataShape => NoticeLevel::Info,
            ErrorClass::Backend | ErrorClass::Config => NoticeLevel::Error,
        };
        self.emitter.notice(level, err.to_string());
    }

    fn checked<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    fn begin(&mut self, kind: RequestKind) -> Result<RequestTicket> {
        let started = self.session.begin_request(kind);
        let ticket = self.checked(started)?;
        self.emitter.emit(WizardEvent::RequestStarted { kind });
        Ok(ticket)
    }

    fn fail(&mut self, ticket: &RequestTicket, err: WizardError) -> WizardError {
        self.session.abandon_request(ticket);
        self.emitter.emit(WizardEvent::RequestFinished {
            kind: ticket.kind(),
            ok: false,
        });
        self.report(&err);
        err
    }

    fn succeed<T>(
        &mut self,
        ticket: &RequestTicket,
        apply: impl FnOnce(&mut WizardSession) -> T,
    ) -> Result<T> {
        let applied = self.session.finish_request(ticket, apply)?;
        self.emitter.emit(WizardEvent::RequestFinished {
            kind: ticket.kind(),
            ok: true,
        });
        Ok(applied)
    }

    /// Fetch the selected service's endpoints into `availableEndpoints`
    pub async fn load_endpoints(&mut self) -> Result<Vec<Endpoint>> {
        let service_id = self.checked(context_id(&self.session, keys::SERVICE_ID))?;
        let ticket = self.begin(RequestKind::ListEndpoints)?;

        match self.api.list_endpoints(&service_id).await {
            Ok(endpoints) => {
                let stored = self.succeed(&ticket, |s| -> Result<Vec<Endpoint>> {
                    store(&mut s.context, keys::AVAILABLE_ENDPOINTS, &endpoints)?;
                    Ok(endpoints)
                })?;
                self.checked(stored)
            }
            Err(err) => Err(self.fail(&ticket, err)),
        }
    }

    /// Ask the backend to generate a suite for the selected endpoints
    pub async fn generate_tests(&mut self) -> Result<GenerationResponse> {
        let service_id = self.checked(context_id(&self.session, keys::SERVICE_ID))?;
        let endpoint_ids = self.checked(context_ids(&self.session, keys::SELECTED_ENDPOINTS))?;
        let ctx = &self.session.context;
        let request = GenerationRequest {
            service_id,
            endpoint_ids,
            suite_name: ctx.get_str(keys::SUITE_NAME).unwrap_or_default().to_string(),
            description: ctx.get_str(keys::SUITE_DESCRIPTION).map(str::to_string),
            instructions: ctx
                .get_str(keys::GENERATION_INSTRUCTIONS)
                .map(str::to_string),
        };
        let ticket = self.begin(RequestKind::GenerateTests)?;

        match self.api.generate_tests(&request).await {
            Ok(response) => {
                let stored = self.succeed(&ticket, |s| -> Result<GenerationResponse> {
                    s.context.set(keys::TEST_SUITE_ID, response.suite_id.as_str());
                    store(&mut s.context, keys::GENERATED_TEST_CASES, &response.test_cases)?;
                    // A new suite makes any earlier run irrelevant
                    s.context.set(keys::RUN_ID, Value::Null);
                    Ok(response)
                })?;
                self.checked(stored)
            }
            Err(err) => Err(self.fail(&ticket, err)),
        }
    }

    /// Trigger a run of the generated chains and return its id
    pub async fn start_run(&mut self) -> Result<String> {
        let chain_ids: Vec<String> = self
            .checked(generated_cases(&self.session))?
            .iter()
            .map(|c| c.chain_id().to_string())
            .collect();
        let ticket = self.begin(RequestKind::TriggerRun)?;

        match self.api.trigger_run(&RunRequest { chain_ids }).await {
            Ok(handle) => self.succeed(&ticket, |s| {
                s.context.set(keys::RUN_ID, handle.run_id.as_str());
                handle.run_id
            }),
            Err(err) => Err(self.fail(&ticket, err)),
        }
    }

    /// Poll a run until it leaves `running`. Each snapshot replaces
    /// `runResult`, so listeners always see the latest recomputed view.
    pub async fn poll_run(&mut self, run_id: &str) -> Result<ChainRun> {
        let ticket = self.begin(RequestKind::PollRun)?;

        for attempt in 1..=self.max_poll_attempts {
            let run = match self.api.fetch_run(run_id).await {
                Ok(run) => run.normalized(),
                Err(err) => return Err(self.fail(&ticket, err)),
            };

            if !self.session.is_live(&ticket) {
                return Err(WizardError::StaleResult {
                    session_id: ticket.session_id().to_string(),
                });
            }
            if let Err(err) = store(&mut self.session.context, keys::RUN_RESULT, &run) {
                return Err(self.fail(&ticket, err));
            }
            self.emitter.emit(WizardEvent::RunProgress {
                run_id: run.id.clone(),
                status: run.status,
                summary: RunSummary::compute(&run),
            });

            if run.status.is_terminal() {
                return self.succeed(&ticket, |s| {
                    // Values captured by the run are available to later steps
                    for step in sorted_step_results(&run.step_results) {
                        if let Some(values) = &step.extracted_values {
                            s.context.merge(values);
                        }
                    }
                    run
                });
            }
            if attempt < self.max_poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        let err = WizardError::PollExhausted {
            run_id: run_id.to_string(),
            attempts: self.max_poll_attempts,
        };
        Err(self.fail(&ticket, err))
    }

    /// Trigger a run and follow it. A run left unfinished by an earlier
    /// attempt is polled again instead of being triggered twice.
    async fn execute_run(&mut self) -> Result<ChainRun> {
        let run_id = match self.unfinished_run_id() {
            Some(run_id) => {
                log::debug!("resuming run {}", run_id);
                run_id
            }
            None => self.start_run().await?,
        };
        self.poll_run(&run_id).await
    }

    /// Id of a triggered run whose last known snapshot is not terminal
    fn unfinished_run_id(&self) -> Option<String> {
        let run_id = context_id(&self.session, keys::RUN_ID).ok()?;
        match self.session.context.get_as::<ChainRun>(keys::RUN_RESULT) {
            Some(Ok(run)) if run.id == run_id && run.status.is_terminal() => None,
            _ => Some(run_id),
        }
    }

    /// The latest run snapshot in the session with the cases it exercised
    pub fn run_record(&self) -> Option<RunRecord> {
        let run = match self.session.context.get_as::<ChainRun>(keys::RUN_RESULT)? {
            Ok(run) => run,
            Err(err) => {
                log::warn!("runResult is not a run record: {}", err);
                return None;
            }
        };
        // Missing or malformed cases only cost the per-case breakdown
        let test_cases = generated_cases(&self.session).unwrap_or_default();
        Some(RunRecord {
            suite_id: self
                .session
                .context
                .get_str(keys::TEST_SUITE_ID)
                .map(str::to_string),
            run,
            test_cases,
        })
    }

    /// Result views for the latest run snapshot in the session, if any
    pub fn run_view(&self) -> Option<RunView> {
        self.run_record().map(|record| record.view())
    }

    /// Fill in each step's inputs and walk the wizard to the end
    pub async fn run_to_completion(&mut self, inputs: &WizardInputs) -> Result<Option<RunView>> {
        self.handle(UserAction::SetMode(InteractionMode::StepBased))
            .await?;

        self.session
            .context
            .set(keys::SERVICE_ID, inputs.service_id.as_str());
        self.handle(UserAction::Advance).await?;

        let selected: Vec<String> = if inputs.endpoint_ids.is_empty() {
            let available = match self
                .session
                .context
                .get_as::<Vec<Endpoint>>(keys::AVAILABLE_ENDPOINTS)
            {
                Some(Ok(endpoints)) => endpoints,
                _ => Vec::new(),
            };
            available.into_iter().map(|e| e.id).collect()
        } else {
            inputs.endpoint_ids.clone()
        };
        self.session
            .context
            .set(keys::SELECTED_ENDPOINTS, selected);
        self.handle(UserAction::Advance).await?;

        let ctx = &mut self.session.context;
        ctx.set(keys::SUITE_NAME, inputs.suite_name.as_str());
        if let Some(description) = &inputs.description {
            ctx.set(keys::SUITE_DESCRIPTION, description.as_str());
        }
        if let Some(instructions) = &inputs.instructions {
            ctx.set(keys::GENERATION_INSTRUCTIONS, instructions.as_str());
        }
        self.handle(UserAction::Advance).await?;
        self.handle(UserAction::Advance).await?;
        self.handle(UserAction::Complete).await?;

        Ok(self.run_view())
    }
}

/// Serialize `value` into the context under `key`
fn store<T: Serialize>(ctx: &mut SharedContextStore, key: &str, value: &T) -> Result<()> {
    ctx.set_json(key, value)
        .map_err(|err| WizardError::DataShape(format!("cannot store '{}': {}", key, err)))
}

/// Read an id stored as a string or a number
fn context_id(session: &WizardSession, key: &str) -> Result<String> {
    let step = session
        .current_step()
        .map(|s| s.title())
        .unwrap_or_default();
    match session.context.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        None | Some(Value::Null) | Some(Value::String(_)) => Err(WizardError::missing(step, key)),
        Some(_) => Err(WizardError::InvalidContext {
            key: key.to_string(),
            reason: "expected a string or number".to_string(),
        }),
    }
}

/// Read a non-empty list of ids
fn context_ids(session: &WizardSession, key: &str) -> Result<Vec<String>> {
    let step = session
        .current_step()
        .map(|s| s.title())
        .unwrap_or_default();
    let items = match session.context.get(key) {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) | None | Some(Value::Null) => {
            return Err(WizardError::missing(step, key))
        }
        Some(_) => {
            return Err(WizardError::InvalidContext {
                key: key.to_string(),
                reason: "expected a list of ids".to_string(),
            })
        }
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            // A selected endpoint object carries its own id
            Value::Object(map) => match map.get("id") {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(WizardError::InvalidContext {
                    key: key.to_string(),
                    reason: "endpoint object without an id".to_string(),
                }),
            },
            _ => Err(WizardError::InvalidContext {
                key: key.to_string(),
                reason: format!("unexpected entry {}", item),
            }),
        })
        .collect()
}

fn generated_cases(session: &WizardSession) -> Result<Vec<GeneratedTestCase>> {
    let step = session
        .current_step()
        .map(|s| s.title())
        .unwrap_or_default();
    match session.context.get_as::<Vec<GeneratedTestCase>>(keys::GENERATED_TEST_CASES) {
        None => Err(WizardError::missing(step, keys::GENERATED_TEST_CASES)),
        Some(Ok(cases)) => Ok(cases),
        Some(Err(err)) => Err(WizardError::InvalidContext {
            key: keys::GENERATED_TEST_CASES.to_string(),
            reason: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests;
