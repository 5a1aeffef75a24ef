//! Runtime error types.

use umbra_engine::{ConfigError, RegistrationError, UmbraError};

/// Errors that can occur while setting up or running a test environment.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Engine failure
    #[error(transparent)]
    Engine(#[from] UmbraError),

    /// Environment variable could not be parsed
    #[error("{name}: {reason}")]
    Option {
        /// Variable name
        name: String,
        /// What was wrong with it
        reason: String,
    },
}

impl RuntimeError {
    /// True when the error means "this configuration cannot run here"
    pub fn is_assumption_violation(&self) -> bool {
        match self {
            RuntimeError::Engine(e) => e.is_assumption_violation(),
            RuntimeError::Option { .. } => false,
        }
    }

    pub(crate) fn option(name: &str, reason: impl ToString) -> Self {
        RuntimeError::Option {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ConfigError> for RuntimeError {
    fn from(e: ConfigError) -> Self {
        RuntimeError::Engine(e.into())
    }
}

impl From<RegistrationError> for RuntimeError {
    fn from(e: RegistrationError) -> Self {
        RuntimeError::Engine(e.into())
    }
}

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;
