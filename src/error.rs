use thiserror::Error;

use crate::runtime::{ForeignException, ObjectRef};

macro_rules! marshal_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Marshal {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Marshal {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Each variant names one failure mode of the bridge. Construction-time failures (environment
/// initialization, type and method resolution) abort creation of an emulator instance;
/// everything else is reported per call and leaves the instance usable.
///
/// # Error Categories
///
/// ## Environment Errors
/// - [`Error::EnvironmentInit`] - The embedded environment could not be initialized
/// - [`Error::UseAfterTeardown`] - The environment was torn down before the call
/// - [`Error::EnvironmentMismatch`] - Two instances belong to different environments
///
/// ## Resolution Errors
/// - [`Error::TypeNotFound`] - Requested class does not exist in the loaded image
/// - [`Error::MethodNotFound`] - No method matches the requested signature
/// - [`Error::FieldNotFound`] - Requested field does not exist on the class
/// - [`Error::InvalidSignature`] - A method descriptor could not be parsed
///
/// ## Call Errors
/// - [`Error::ForeignException`] - The foreign method threw
/// - [`Error::UseAfterFree`] - A foreign object reference no longer resolves
/// - [`Error::HeapLimitExceeded`] - The foreign heap is full
/// - [`Error::Marshal`] - A value could not be converted across the boundary
/// - [`Error::ArgumentMismatch`] - Arguments do not match the method's parameter list
/// - [`Error::UnknownResultCode`] - The engine returned an undefined result code
///
/// ## Host Errors
/// - [`Error::LockError`] - The environment lock was poisoned
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust,no_run
/// use mtemu_bridge::{BridgeConfig, Emulator, Error};
///
/// match Emulator::new(BridgeConfig::default()) {
///     Ok(emulator) => println!("{} commands loaded", emulator.commands_count()?),
///     Err(Error::EnvironmentInit(reason)) => eprintln!("environment unavailable: {reason}"),
///     Err(Error::MethodNotFound { type_name, signature }) => {
///         eprintln!("engine is missing {type_name}::{signature}");
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// # Ok::<(), Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The embedded environment could not be initialized.
    ///
    /// Raised when an environment is already live on the same host, when the host has been
    /// torn down (re-initialization is not supported), or when the configured assembly is not
    /// installed.
    #[error("Environment initialization failed - {0}")]
    EnvironmentInit(String),

    /// The environment was torn down; every handle derived from it is dead.
    #[error("The embedded environment has been torn down")]
    UseAfterTeardown,

    /// Two emulator instances that must share an environment do not.
    #[error("Emulator instances belong to different environments")]
    EnvironmentMismatch,

    /// A class could not be found in the loaded image.
    #[error("Type not found - {namespace}.{name}")]
    TypeNotFound {
        /// Namespace that was searched
        namespace: String,
        /// Simple class name that was requested
        name: String,
    },

    /// No method on the class matches the requested descriptor.
    ///
    /// Also raised when the name and parameters match but the declared return type differs
    /// from the expected one.
    #[error("Method not found - {type_name}:{signature}")]
    MethodNotFound {
        /// Fully qualified name of the searched class
        type_name: String,
        /// Descriptor that failed to resolve
        signature: String,
    },

    /// A field could not be found on a class.
    #[error("Field not found - {type_name}.{field}")]
    FieldNotFound {
        /// Fully qualified name of the searched class
        type_name: String,
        /// Requested field name
        field: String,
    },

    /// A method descriptor or type name could not be parsed.
    #[error("Invalid method signature - {0}")]
    InvalidSignature(String),

    /// A foreign method threw an exception.
    ///
    /// The call had no effect on the host side; the instance remains usable.
    #[error("Foreign exception - {0}")]
    ForeignException(ForeignException),

    /// A foreign object reference does not resolve to a live object.
    #[error("Use of released foreign object {reference}")]
    UseAfterFree {
        /// The dangling reference
        reference: ObjectRef,
    },

    /// The foreign heap reached its object limit.
    #[error("Foreign heap limit exceeded - {live} live objects, limit {limit}")]
    HeapLimitExceeded {
        /// Number of live objects at the time of the failed allocation
        live: usize,
        /// Configured maximum
        limit: usize,
    },

    /// A value could not be converted between host and foreign representation.
    ///
    /// The error includes the source location where the mismatch was detected.
    #[error("Marshalling failed - {file}:{line}: {message}")]
    Marshal {
        /// The message to be printed for the marshalling error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The arguments supplied to an invocation do not match the method's parameters.
    #[error("Argument mismatch calling {method} - {message}")]
    ArgumentMismatch {
        /// Descriptor of the invoked method
        method: String,
        /// What did not match
        message: String,
    },

    /// The engine returned an integer outside the defined result-code set.
    #[error("Unknown result code - {0}")]
    UnknownResultCode(i32),

    /// Failed to lock target.
    ///
    /// A method body panicked while holding the environment lock and the lock is poisoned.
    #[error("Failed to lock target")]
    LockError,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors raised while reading or writing program files.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}

impl From<ForeignException> for Error {
    fn from(exception: ForeignException) -> Self {
        Error::ForeignException(exception)
    }
}
