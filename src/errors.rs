use std::fmt;

use crate::types::ResolutionAttempt;

/// Result alias used throughout the engine
pub type LocatorResult<T> = std::result::Result<T, LocatorError>;

/// Step of the login flow that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStep {
    /// Opening the login page
    Navigate,
    /// Filling a credential field
    Fill,
    /// Clicking the submit control
    Submit,
    /// Waiting for the success indicator
    SuccessWait,
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthStep::Navigate => "navigate",
            AuthStep::Fill => "fill",
            AuthStep::Submit => "submit",
            AuthStep::SuccessWait => "success-wait",
        };
        f.write_str(name)
    }
}

/// Why a form fill/submit sequence failed
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum FormFailure {
    Fill { field: String, message: String },
    Submit { message: String },
    SuccessNotObserved { message: String },
}

impl fmt::Display for FormFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormFailure::Fill { field, message } => {
                write!(f, "could not fill '{}': {}", field, message)
            }
            FormFailure::Submit { message } => write!(f, "could not submit: {}", message),
            FormFailure::SuccessNotObserved { message } => {
                write!(f, "success indicator not observed: {}", message)
            }
        }
    }
}

/// Error type for locator operations, including exit codes for the CLI
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    /// Zero elements matched a description or selector (exit code 2)
    #[error("No elements found matching {0}")]
    NotFound(String),
    /// More than one element where exactly one was required (exit code 3)
    #[error("Expected exactly one element matching '{selector}', but found {count}")]
    Ambiguous { selector: String, count: usize },
    /// A bounded wait ran out (exit code 5)
    #[error("Operation timed out: {0}")]
    Timeout(String),
    /// Login flow failed (exit code 6)
    #[error("Authentication failed during {step}: {message}")]
    Auth { step: AuthStep, message: String },
    /// A captured snapshot no longer matches a live element (exit code 7)
    #[error("Stale element reference: {0}")]
    StaleReference(String),
    /// Cancelled through the caller's cancellation token
    #[error("Operation cancelled")]
    Cancelled,
    /// Every candidate of a fallback chain failed (exit code 2)
    #[error("All {} locator candidates failed: {}", .attempts.len(), format_attempts(.attempts))]
    Exhausted { attempts: Vec<ResolutionAttempt> },
    /// Form fill or submission failed
    #[error("Form automation failed: {0}")]
    FormFailed(FormFailure),
    /// Expression could not be parsed or was rejected by the driver
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    /// WebDriver communication failed (exit code 4)
    #[error("WebDriver error: {0:#}")]
    Driver(#[from] anyhow::Error),
}

impl LocatorError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LocatorError::NotFound(_) | LocatorError::Exhausted { .. } => 2,
            LocatorError::Ambiguous { .. } => 3,
            LocatorError::Driver(_) => 4,
            LocatorError::Timeout(_) => 5,
            LocatorError::Auth { .. } => 6,
            LocatorError::StaleReference(_) => 7,
            LocatorError::Cancelled
            | LocatorError::FormFailed(_)
            | LocatorError::InvalidSelector(_) => 1,
        }
    }

    pub(crate) fn auth(step: AuthStep, message: impl Into<String>) -> Self {
        LocatorError::Auth {
            step,
            message: message.into(),
        }
    }
}

fn format_attempts(attempts: &[ResolutionAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} [{}, score {}]: {}", a.expression, a.strategy, a.score, a.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[path = "errors_test.rs"]
mod errors_test;
