pub mod context;
pub mod mode;
pub mod wizard;

pub use context::{keys, SharedContextStore};
pub use mode::{InteractionMode, ModeController};
pub use wizard::{
    CompletionHandler, StepContent, StepKind, WizardDefinition, WizardState, WizardStepSequencer,
};

use crate::error::{Result, WizardError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Kinds of backend request a session can have outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    ListEndpoints,
    GenerateTests,
    TriggerRun,
    PollRun,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::ListEndpoints => "endpoint listing",
            RequestKind::GenerateTests => "test generation",
            RequestKind::TriggerRun => "run trigger",
            RequestKind::PollRun => "run polling",
        };
        f.write_str(name)
    }
}

/// Proof that a request was started by a particular session. Results are
/// only applied while that session is still the live one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    session_id: Uuid,
    kind: RequestKind,
}

impl RequestTicket {
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

/// Navigation state handed to rendering collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationView {
    pub current_step: usize,
    pub total_steps: usize,
    pub mode: InteractionMode,
    pub step_title: String,
}

/// One wizard session: mode, position, shared context and the bookkeeping
/// for outstanding requests. Step handlers receive it by reference.
#[derive(Debug, Clone)]
pub struct WizardSession {
    id: Uuid,
    definition: WizardDefinition,
    sequencer: WizardStepSequencer,
    mode: ModeController,
    pub context: SharedContextStore,
    in_flight: BTreeSet<RequestKind>,
}

impl WizardSession {
    pub fn new(definition: WizardDefinition, initial_mode: InteractionMode) -> Self {
        let sequencer = definition.sequencer();
        Self {
            id: Uuid::new_v4(),
            definition,
            sequencer,
            mode: ModeController::new(initial_mode),
            context: SharedContextStore::new(),
            in_flight: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn definition(&self) -> &WizardDefinition {
        &self.definition
    }

    pub fn sequencer(&self) -> &WizardStepSequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut WizardStepSequencer {
        &mut self.sequencer
    }

    pub fn state(&self) -> WizardState {
        self.sequencer.state()
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode.mode()
    }

    pub fn mode_controller_mut(&mut self) -> &mut ModeController {
        &mut self.mode
    }

    /// Descriptor of the step the user is on
    pub fn current_step(&self) -> Option<StepKind> {
        self.definition.step(self.sequencer.current_step())
    }

    /// Check the keys the current step needs before it can be left
    pub fn validate_current_step(&self) -> Result<()> {
        let Some(step) = self.current_step() else {
            return Ok(());
        };
        for key in step.required_keys() {
            if !self.context.is_filled(key) {
                return Err(WizardError::missing(step.title(), key));
            }
        }
        Ok(())
    }

    pub fn navigation(&self) -> NavigationView {
        let state = self.sequencer.state();
        NavigationView {
            current_step: state.current_step(),
            total_steps: state.total_steps(),
            mode: self.mode.mode(),
            step_title: self
                .current_step()
                .map(|s| s.title().to_string())
                .unwrap_or_default(),
        }
    }

    /// Mark a request as outstanding. Fails if one of the same kind is
    /// already pending.
    pub fn begin_request(&mut self, kind: RequestKind) -> Result<RequestTicket> {
        if !self.in_flight.insert(kind) {
            return Err(WizardError::RequestPending(kind.to_string()));
        }
        Ok(RequestTicket {
            session_id: self.id,
            kind,
        })
    }

    pub fn is_pending(&self, kind: RequestKind) -> bool {
        self.in_flight.contains(&kind)
    }

    pub fn is_live(&self, ticket: &RequestTicket) -> bool {
        ticket.session_id == self.id
    }

    /// Clear the pending flag and apply `apply` if the ticket still belongs
    /// to this session. A stale ticket leaves everything untouched.
    pub fn finish_request<T>(
        &mut self,
        ticket: &RequestTicket,
        apply: impl FnOnce(&mut Self) -> T,
    ) -> Result<T> {
        if !self.is_live(ticket) {
            log::debug!(
                "dropping {} result from ended session {}",
                ticket.kind,
                ticket.session_id
            );
            return Err(WizardError::StaleResult {
                session_id: ticket.session_id.to_string(),
            });
        }
        self.in_flight.remove(&ticket.kind);
        Ok(apply(self))
    }

    /// Release the pending flag after a failed request
    pub fn abandon_request(&mut self, ticket: &RequestTicket) {
        if self.is_live(ticket) {
            self.in_flight.remove(&ticket.kind);
        }
    }

    /// Discard this session's state and start over with a fresh identity.
    /// The mode survives; tickets issued before the restart become stale.
    pub fn restart(&mut self) {
        self.id = Uuid::new_v4();
        self.sequencer = self.definition.sequencer();
        self.context = SharedContextStore::new();
        self.in_flight.clear();
    }
}
