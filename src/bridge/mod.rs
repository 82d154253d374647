//! The typed bridge to the Execution Engine.
//!
//! This module turns the untyped invoke surface of [`crate::runtime`] into the MT1804
//! emulator API:
//!
//! - [`methods`] - the method binding cache, resolved once per environment
//! - [`marshal`] - host records ([`Command`], [`Call`], [`MapCall`]) and their conversions
//! - [`Emulator`] - instance lifecycle: create, clone, swap, destroy
//! - execution control and inspection operations on [`Emulator`], with [`ResultCode`],
//!   [`ExecutionState`] and [`ProcessorState`]
//!
//! # Call Path
//!
//! ```text
//! Emulator::add_command(i, &cmd)
//!     └─> Environment::enter ── lock ──> CallScope
//!             ├─> ToForeign: i32, Command ──> foreign objects
//!             ├─> CallScope::invoke(cache.emulator.add_command, object, args)
//!             └─> FromForeign: bool <── return value
//!         <── scope drop collects unreachable objects, lock released
//! ```

mod emulator;
mod facade;

pub mod marshal;
pub mod methods;

pub use emulator::{Emulator, Role};
pub use facade::{ExecutionState, ProcessorState, ResultCode, StatusFlags, REGISTER_COUNT};
pub use marshal::{Call, Command, FromForeign, MapCall, ToForeign};
pub use methods::{CallFields, CommandFields, CommandMethods, EmulatorMethods, MethodCache, RecordLayouts};
