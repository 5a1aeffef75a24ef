//! Engine error types

use thiserror::Error;
use umbra_sdk::{CallError, DispatchError};

/// Invalid test or environment configuration
///
/// Configuration errors mean the requested environment cannot exist; the
/// test using it is skipped rather than failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Class exclusion regex does not compile
    #[error("Invalid class regex '{pattern}': {reason}")]
    InvalidRegex {
        /// Pattern as given
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// SDK is known but not supported on this host
    #[error("{0}")]
    UnsupportedSdk(String),

    /// Legacy resources requested above the last SDK that ships them
    #[error("Legacy resources mode is not supported on SDK {api_level} (max {max})")]
    LegacyResourcesUnsupported {
        /// Requested API level
        api_level: i32,
        /// Highest API level supporting legacy resources
        max: i32,
    },

    /// Option has an unusable value
    #[error("Invalid value '{value}' for {name}")]
    InvalidOption {
        /// Option name
        name: String,
        /// Rejected value
        value: String,
    },
}

/// Malformed shadow registration, fatal for the whole run
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Constructor or static initializer shadow without an `Implementation` marker
    #[error("{shadow}.{method} must be marked as an Implementation")]
    MissingImplementation {
        /// Shadow class
        shadow: String,
        /// Method name
        method: String,
    },

    /// Static initializer shadow declared as an instance method
    #[error("{shadow}.{method} must be static")]
    NotStatic {
        /// Shadow class
        shadow: String,
        /// Method name
        method: String,
    },

    /// Two shadows claim the same real class for an overlapping SDK band
    #[error("Ambiguous shadows for {real}: {first} and {second} overlap")]
    Ambiguous {
        /// Real class
        real: String,
        /// First shadow
        first: String,
        /// Second shadow
        second: String,
    },

    /// Two methods of one shadow class substitute the same real method for
    /// an overlapping SDK band
    #[error("Ambiguous shadow methods {shadow}.{method} overlap")]
    AmbiguousMethod {
        /// Shadow class
        shadow: String,
        /// Real method signature
        method: String,
    },

    /// A mapping names a shadow class that was never defined
    #[error("Unknown shadow class {shadow} for {real}")]
    UnknownShadow {
        /// Real class
        real: String,
        /// Missing shadow class
        shadow: String,
    },

    /// A shadow class was defined twice in one layer
    #[error("Shadow class {0} defined twice")]
    DuplicateShadow(String),

    /// Shadow superclass chain loops back on itself
    #[error("Shadow superclass cycle through {0}")]
    SuperclassCycle(String),
}

/// Failure to make a class available in a sandbox, fatal to the test
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassLoadError {
    /// No definition on the class path
    #[error("Class not found: {0}")]
    NotFound(String),

    /// Instrumented class failed verification
    #[error("Verification of {class} failed: {reason}")]
    Verification {
        /// Class name
        class: String,
        /// Failure description
        reason: String,
    },

    /// Superclass chain loops back on itself
    #[error("Circular superclass chain: {}", .0.join(" -> "))]
    SuperclassCycle(Vec<String>),

    /// Class appears twice on the class path
    #[error("Duplicate class definition: {0}")]
    Duplicate(String),
}

impl From<ClassLoadError> for DispatchError {
    fn from(e: ClassLoadError) -> Self {
        match e {
            ClassLoadError::NotFound(name) => DispatchError::ClassNotFound(name),
            ClassLoadError::Verification { class, reason } => DispatchError::ClassLoad { class, reason },
            other => DispatchError::ClassLoad {
                class: String::new(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<ClassLoadError> for CallError {
    fn from(e: ClassLoadError) -> Self {
        CallError::Dispatch(e.into())
    }
}

/// Any engine failure
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UmbraError {
    /// Configuration problem; the test is skipped
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Shadow registration problem
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Class loading problem
    #[error(transparent)]
    ClassLoad(#[from] ClassLoadError),

    /// Call failure
    #[error(transparent)]
    Call(#[from] CallError),
}

impl UmbraError {
    /// True when the error means "this configuration cannot run here"
    pub fn is_assumption_violation(&self) -> bool {
        matches!(self, UmbraError::Config(_))
    }
}

/// Engine result
pub type UmbraResult<T> = Result<T, UmbraError>;
