use serde::{Deserialize, Serialize};
use std::fmt;

/// Which surface the user is working in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionMode {
    /// Guided wizard
    #[default]
    StepBased,
    /// Direct editing of test artifacts
    Management,
}

impl InteractionMode {
    pub fn other(self) -> Self {
        match self {
            InteractionMode::StepBased => InteractionMode::Management,
            InteractionMode::Management => InteractionMode::StepBased,
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionMode::StepBased => write!(f, "step-based"),
            InteractionMode::Management => write!(f, "management"),
        }
    }
}

impl std::str::FromStr for InteractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "step-based" | "step" | "wizard" => Ok(InteractionMode::StepBased),
            "management" | "manage" => Ok(InteractionMode::Management),
            other => Err(format!("Unknown interaction mode: {}", other)),
        }
    }
}

/// Tracks the current mode. Switching never touches wizard progress,
/// which lives next to it in the session.
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    mode: InteractionMode,
}

impl ModeController {
    pub fn new(initial: InteractionMode) -> Self {
        Self { mode: initial }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Flip to the other mode and return the new one
    pub fn toggle_mode(&mut self) -> InteractionMode {
        self.mode = self.mode.other();
        self.mode
    }

    /// Returns true when the mode actually changed
    pub fn set_mode(&mut self, mode: InteractionMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        true
    }
}
