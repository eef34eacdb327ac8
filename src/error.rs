//! Error types for the wizard and result layer.
//!
//! Nothing here is fatal: every variant leaves the session usable, and the
//! caller decides whether to surface it as a notice or to retry.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, WizardError>;

/// Which recovery policy an error falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// User input is incomplete; advancing is blocked
    Validation,
    /// The backend call failed; state untouched so the user can retry
    Backend,
    /// A record did not join; it is excluded from aggregates
    DataShape,
    /// Wizard or runner misconfiguration
    Config,
}

#[derive(Error, Debug)]
pub enum WizardError {
    // === Input validation ===
    #[error("'{key}' is required before leaving step '{step}'")]
    MissingContext { step: String, key: String },

    #[error("'{key}' has an unexpected shape: {reason}")]
    InvalidContext { key: String, reason: String },

    // === Network / backend ===
    #[error("Backend returned {status} for {operation}: {message}")]
    Backend {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("A {0} request is already in progress")]
    RequestPending(String),

    #[error("Run {run_id} is still running after {attempts} polls")]
    PollExhausted { run_id: String, attempts: u32 },

    #[error("Result for session {session_id} arrived after the session ended")]
    StaleResult { session_id: String },

    // === Data shape ===
    #[error("Malformed record: {0}")]
    DataShape(String),

    // === Configuration ===
    #[error("A wizard needs at least one step")]
    EmptyWizard,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl WizardError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WizardError::MissingContext { .. } | WizardError::InvalidContext { .. } => {
                ErrorClass::Validation
            }
            WizardError::Backend { .. }
            | WizardError::Http(_)
            | WizardError::RequestPending(_)
            | WizardError::PollExhausted { .. }
            | WizardError::StaleResult { .. } => ErrorClass::Backend,
            WizardError::DataShape(_) => ErrorClass::DataShape,
            WizardError::EmptyWizard | WizardError::Config(_) => ErrorClass::Config,
        }
    }

    pub fn missing(step: &str, key: &str) -> Self {
        WizardError::MissingContext {
            step: step.to_string(),
            key: key.to_string(),
        }
    }
}
