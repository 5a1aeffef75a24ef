//! Error types raised across the dispatch boundary

use crate::value::Value;

/// Result of a dispatched call
pub type CallResult = Result<Value, CallError>;

/// An exception thrown by a real method body, a shadow method or an
/// interceptor
///
/// Exceptions are business-level outcomes and propagate to the caller
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{class_name}: {message}")]
pub struct Exception {
    /// Fully qualified exception class
    pub class_name: String,
    /// Detail message
    pub message: String,
}

impl Exception {
    /// Create a new exception
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
        }
    }

    /// `java.lang.IllegalArgumentException`
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new("java.lang.IllegalArgumentException", message)
    }

    /// `java.lang.IllegalStateException`
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new("java.lang.IllegalStateException", message)
    }

    /// `java.lang.NullPointerException`
    pub fn null_pointer(message: impl Into<String>) -> Self {
        Self::new("java.lang.NullPointerException", message)
    }

    /// `java.lang.ArrayIndexOutOfBoundsException`
    pub fn array_index_out_of_bounds(message: impl Into<String>) -> Self {
        Self::new("java.lang.ArrayIndexOutOfBoundsException", message)
    }

    /// `java.lang.ArrayStoreException`
    pub fn array_store(message: impl Into<String>) -> Self {
        Self::new("java.lang.ArrayStoreException", message)
    }

    /// `java.lang.UnsupportedOperationException`
    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::new("java.lang.UnsupportedOperationException", message)
    }

    /// Check the exception class
    pub fn is(&self, class_name: &str) -> bool {
        self.class_name == class_name
    }
}

/// Framework or shadow-authoring fault discovered while dispatching a call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Class could not be found by the sandbox
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Class was found but could not be loaded
    #[error("Failed to load class {class}: {reason}")]
    ClassLoad {
        /// Class name
        class: String,
        /// Failure description
        reason: String,
    },

    /// No method with a compatible signature
    #[error("No method {class}.{method} accepting {args}")]
    NoSuchMethod {
        /// Class searched
        class: String,
        /// Method name
        method: String,
        /// Rendered argument kinds
        args: String,
    },

    /// Wrong number of arguments for the resolved method
    #[error("{method} expects {expected} arguments, got {got}")]
    ArityMismatch {
        /// Method signature
        method: String,
        /// Declared arity
        expected: usize,
        /// Supplied arity
        got: usize,
    },

    /// Argument cannot be passed to the declared parameter kind
    #[error("{method}: argument {index} expected {expected}, got {got}")]
    ArgumentType {
        /// Method signature
        method: String,
        /// Zero-based argument position
        index: usize,
        /// Declared kind
        expected: String,
        /// Supplied kind
        got: String,
    },

    /// Shadow state is not of the type the shadow method asked for
    #[error("Shadow of {class} has no state of type {expected}")]
    ShadowStateMismatch {
        /// Real class being dispatched
        class: String,
        /// Requested Rust type
        expected: &'static str,
    },

    /// Shadow method needs an instance but the object has no shadow bound
    #[error("No shadow bound to instance of {0}")]
    ShadowNotBound(String),

    /// Shadow factory failed
    #[error("Failed to instantiate shadow {shadow}: {reason}")]
    ShadowInstantiation {
        /// Shadow class
        shadow: String,
        /// Failure description
        reason: String,
    },

    /// Static initializer shadow is not static
    #[error("{0} must be static")]
    NotStatic(String),

    /// Instance method called without a receiver (or vice versa)
    #[error("{method} on {class}: {reason}")]
    Receiver {
        /// Class
        class: String,
        /// Method
        method: String,
        /// What went wrong
        reason: String,
    },

    /// The sandbox was evicted from the cache and can no longer run code
    #[error("Sandbox for SDK {0} has been evicted")]
    SandboxEvicted(i32),
}

/// Error produced by a dispatched call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Business exception, propagated unchanged
    #[error(transparent)]
    Thrown(#[from] Exception),

    /// Framework fault
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl CallError {
    /// Dispatch faults are fatal to the test; thrown exceptions are not
    pub fn is_fatal(&self) -> bool {
        matches!(self, CallError::Dispatch(_))
    }

    /// The thrown exception, if this is one
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            CallError::Thrown(e) => Some(e),
            CallError::Dispatch(_) => None,
        }
    }
}
