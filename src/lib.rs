pub mod api;
pub mod config;
pub mod error;
pub mod management;
pub mod report;
pub mod results;
pub mod runner;
pub mod session;

pub use error::{ErrorClass, Result, WizardError};
pub use report::generate_report;
pub use runner::WizardRunner;
pub use session::WizardSession;
