//! Exceptions raised inside the embedded environment.
//!
//! A method body signals failure by returning a [`ForeignException`]. The bridge never hands
//! an exception object back through the value channel; [`CallScope::invoke`] turns it into
//! [`Error::ForeignException`](crate::Error::ForeignException) so callers can tell a thrown
//! exception apart from a returned value.
//!
//! [`CallScope::invoke`]: super::CallScope::invoke

use thiserror::Error;

use crate::Error as BridgeError;

/// Well-known exception type names used by the runtime itself.
pub mod exception_type {
    /// `System.Exception`
    pub const BASE: &str = "System.Exception";
    /// `System.ArgumentException`
    pub const ARGUMENT: &str = "System.ArgumentException";
    /// `System.ArgumentOutOfRangeException`
    pub const ARGUMENT_OUT_OF_RANGE: &str = "System.ArgumentOutOfRangeException";
    /// `System.IndexOutOfRangeException`
    pub const INDEX_OUT_OF_RANGE: &str = "System.IndexOutOfRangeException";
    /// `System.InvalidCastException`
    pub const INVALID_CAST: &str = "System.InvalidCastException";
    /// `System.InvalidOperationException`
    pub const INVALID_OPERATION: &str = "System.InvalidOperationException";
    /// `System.NullReferenceException`
    pub const NULL_REFERENCE: &str = "System.NullReferenceException";
    /// `System.OutOfMemoryException`
    pub const OUT_OF_MEMORY: &str = "System.OutOfMemoryException";
    /// `System.ExecutionEngineException`, used when a method body panics.
    pub const EXECUTION_ENGINE: &str = "System.ExecutionEngineException";
}

/// An exception thrown by a foreign method.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{type_name}: {message}")]
pub struct ForeignException {
    /// Fully qualified exception type name, e.g. `System.ArgumentOutOfRangeException`.
    pub type_name: String,
    /// Exception message.
    pub message: String,
}

impl ForeignException {
    /// Creates an exception of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        ForeignException {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// `System.ArgumentOutOfRangeException`
    #[must_use]
    pub fn argument_out_of_range(message: impl Into<String>) -> Self {
        Self::new(exception_type::ARGUMENT_OUT_OF_RANGE, message)
    }

    /// `System.ArgumentException`
    #[must_use]
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(exception_type::ARGUMENT, message)
    }

    /// `System.InvalidOperationException`
    #[must_use]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(exception_type::INVALID_OPERATION, message)
    }

    /// `System.NullReferenceException`
    #[must_use]
    pub fn null_reference(message: impl Into<String>) -> Self {
        Self::new(exception_type::NULL_REFERENCE, message)
    }

    /// Returns `true` if this exception has the given type name.
    #[must_use]
    pub fn is(&self, type_name: &str) -> bool {
        self.type_name == type_name
    }
}

impl From<BridgeError> for ForeignException {
    fn from(error: BridgeError) -> Self {
        let type_name = match &error {
            BridgeError::UseAfterFree { .. } => exception_type::NULL_REFERENCE,
            BridgeError::Marshal { .. } => exception_type::INVALID_CAST,
            BridgeError::ArgumentMismatch { .. } => exception_type::ARGUMENT,
            BridgeError::HeapLimitExceeded { .. } => exception_type::OUT_OF_MEMORY,
            BridgeError::ForeignException(inner) => return inner.clone(),
            _ => exception_type::BASE,
        };
        ForeignException::new(type_name, error.to_string())
    }
}
