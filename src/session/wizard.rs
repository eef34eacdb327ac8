use super::context::keys;
use crate::error::{Result, WizardError};
use serde::{Deserialize, Serialize};

/// Position within a wizard. `1 <= current_step <= total_steps` always holds;
/// the fields are private so nothing outside the sequencer can break it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    current_step: usize,
    total_steps: usize,
}

impl WizardState {
    pub fn new(total_steps: usize) -> Result<Self> {
        if total_steps == 0 {
            return Err(WizardError::EmptyWizard);
        }
        Ok(Self {
            current_step: 1,
            total_steps,
        })
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn is_first(&self) -> bool {
        self.current_step == 1
    }

    pub fn is_last(&self) -> bool {
        self.current_step == self.total_steps
    }
}

/// The steps of the API-testing wizard, in the order they are presented
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    SelectService,
    SelectEndpoints,
    GenerateTests,
    ExecuteRun,
    ReviewResults,
}

impl StepKind {
    pub fn title(&self) -> &'static str {
        match self {
            StepKind::SelectService => "Select service",
            StepKind::SelectEndpoints => "Select endpoints",
            StepKind::GenerateTests => "Generate tests",
            StepKind::ExecuteRun => "Run tests",
            StepKind::ReviewResults => "Review results",
        }
    }

    /// Context keys that must be filled before the user may leave this step
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            StepKind::SelectService => &[keys::SERVICE_ID],
            StepKind::SelectEndpoints => &[keys::SERVICE_ID, keys::SELECTED_ENDPOINTS],
            StepKind::GenerateTests => &[
                keys::SERVICE_ID,
                keys::SELECTED_ENDPOINTS,
                keys::SUITE_NAME,
            ],
            StepKind::ExecuteRun => &[keys::TEST_SUITE_ID, keys::GENERATED_TEST_CASES],
            StepKind::ReviewResults => &[],
        }
    }
}

/// Ordered, fixed list of step descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardDefinition {
    steps: Vec<StepKind>,
}

impl WizardDefinition {
    pub fn new(steps: Vec<StepKind>) -> Result<Self> {
        if steps.is_empty() {
            return Err(WizardError::EmptyWizard);
        }
        Ok(Self { steps })
    }

    /// Service → endpoints → generation → run → review
    pub fn api_testing() -> Self {
        Self {
            steps: vec![
                StepKind::SelectService,
                StepKind::SelectEndpoints,
                StepKind::GenerateTests,
                StepKind::ExecuteRun,
                StepKind::ReviewResults,
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[StepKind] {
        &self.steps
    }

    /// Step for a 1-based position
    pub fn step(&self, position: usize) -> Option<StepKind> {
        position
            .checked_sub(1)
            .and_then(|i| self.steps.get(i))
            .copied()
    }

    pub fn sequencer(&self) -> WizardStepSequencer {
        WizardStepSequencer {
            state: WizardState {
                current_step: 1,
                total_steps: self.steps.len(),
            },
        }
    }
}

/// What `active_step_content` resolved to
#[derive(Debug, PartialEq, Eq)]
pub enum StepContent<'a, T> {
    Active { position: usize, content: &'a T },
    /// The content list is shorter than `total_steps`
    Placeholder,
}

impl<'a, T> StepContent<'a, T> {
    pub fn content(&self) -> Option<&'a T> {
        match self {
            StepContent::Active { content, .. } => Some(*content),
            StepContent::Placeholder => None,
        }
    }
}

/// Receives the "wizard finished" notification
pub trait CompletionHandler {
    fn wizard_finished(&mut self, state: &WizardState);
}

/// Linear forward/back navigation clamped to `1..=total_steps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardStepSequencer {
    state: WizardState,
}

impl WizardStepSequencer {
    pub fn new(total_steps: usize) -> Result<Self> {
        Ok(Self {
            state: WizardState::new(total_steps)?,
        })
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn current_step(&self) -> usize {
        self.state.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.state.total_steps
    }

    /// Move forward one step; returns false (and does nothing) at the last step
    pub fn advance(&mut self) -> bool {
        if self.state.current_step < self.state.total_steps {
            self.state.current_step += 1;
            true
        } else {
            false
        }
    }

    /// Move back one step; returns false (and does nothing) at the first step
    pub fn retreat(&mut self) -> bool {
        if self.state.current_step > 1 {
            self.state.current_step -= 1;
            true
        } else {
            false
        }
    }

    /// Notify `handler` that the user finished the wizard. Only acts on the
    /// last step, and never moves `current_step`.
    pub fn complete(&self, handler: &mut dyn CompletionHandler) -> bool {
        if !self.state.is_last() {
            log::debug!(
                "complete() ignored at step {}/{}",
                self.state.current_step,
                self.state.total_steps
            );
            return false;
        }
        handler.wizard_finished(&self.state);
        true
    }

    pub fn active_step_content<'a, T>(&self, steps: &'a [T]) -> StepContent<'a, T> {
        let position = self.state.current_step;
        match steps.get(position - 1) {
            Some(content) => StepContent::Active { position, content },
            None => {
                log::warn!(
                    "no content for step {} ({} provided, {} declared)",
                    position,
                    steps.len(),
                    self.state.total_steps
                );
                StepContent::Placeholder
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        finished: Vec<usize>,
    }

    impl CompletionHandler for Recorder {
        fn wizard_finished(&mut self, state: &WizardState) {
            self.finished.push(state.current_step());
        }
    }

    #[test]
    fn test_zero_steps_rejected() {
        assert!(matches!(
            WizardStepSequencer::new(0),
            Err(WizardError::EmptyWizard)
        ));
        assert!(matches!(
            WizardDefinition::new(vec![]),
            Err(WizardError::EmptyWizard)
        ));
    }

    #[test]
    fn test_advance_at_last_step_is_noop() {
        let mut seq = WizardStepSequencer::new(3).unwrap();
        assert!(seq.advance());
        assert!(seq.advance());
        assert!(!seq.advance());
        assert!(!seq.advance());
        assert_eq!(seq.current_step(), 3);
    }

    #[test]
    fn test_retreat_at_first_step_is_noop() {
        let mut seq = WizardStepSequencer::new(3).unwrap();
        assert!(!seq.retreat());
        assert_eq!(seq.current_step(), 1);
        seq.advance();
        assert!(seq.retreat());
        assert_eq!(seq.current_step(), 1);
    }

    #[test]
    fn test_bounds_hold_under_mixed_navigation() {
        for total in 1..=6 {
            let mut seq = WizardStepSequencer::new(total).unwrap();
            // Deterministic mixed walk: long runs both ways
            let pattern = [true, true, false, true, true, true, true, true, false, false, false, false, false, false, false, true];
            for (i, forward) in pattern.iter().cycle().take(200).enumerate() {
                if *forward {
                    seq.advance();
                } else {
                    seq.retreat();
                }
                let step = seq.current_step();
                assert!(
                    (1..=total).contains(&step),
                    "step {} out of range after {} moves with total {}",
                    step,
                    i + 1,
                    total
                );
            }
        }
    }

    #[test]
    fn test_single_step_wizard() {
        let mut seq = WizardStepSequencer::new(1).unwrap();
        assert!(!seq.advance());
        assert!(!seq.retreat());
        assert!(seq.state().is_first() && seq.state().is_last());
    }

    #[test]
    fn test_complete_only_on_last_step() {
        let mut seq = WizardStepSequencer::new(2).unwrap();
        let mut recorder = Recorder::default();

        assert!(!seq.complete(&mut recorder));
        assert!(recorder.finished.is_empty());

        seq.advance();
        assert!(seq.complete(&mut recorder));
        assert_eq!(recorder.finished, vec![2]);
        assert_eq!(seq.current_step(), 2);
    }

    #[test]
    fn test_active_step_content_and_placeholder() {
        let mut seq = WizardStepSequencer::new(3).unwrap();
        let contents = ["service", "endpoints"];

        assert_eq!(seq.active_step_content(&contents).content(), Some(&"service"));
        seq.advance();
        assert_eq!(
            seq.active_step_content(&contents),
            StepContent::Active {
                position: 2,
                content: &"endpoints"
            }
        );
        seq.advance();
        assert_eq!(seq.active_step_content(&contents), StepContent::Placeholder);
    }

    #[test]
    fn test_definition_lookup() {
        let def = WizardDefinition::api_testing();
        assert_eq!(def.len(), 5);
        assert_eq!(def.step(1), Some(StepKind::SelectService));
        assert_eq!(def.step(5), Some(StepKind::ReviewResults));
        assert_eq!(def.step(0), None);
        assert_eq!(def.step(6), None);
        assert_eq!(def.sequencer().total_steps(), 5);
    }
}
